//! Spreadsheet client: reads the live task list and writes staging edits.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::{debug, info};

use super::{SourceError, StagingWriter, TaskSource, TokenProvider, check_status};
use crate::config::SheetsConfig;
use crate::departments::{normalize_department, staging_row};
use crate::types::{DescriptionChange, Task};

/// Column a new project lands in on the staging sheet (right after column D).
const NEW_PROJECT_COLUMN: i64 = 4;

#[derive(Debug, Deserialize)]
struct ValueRange {
    values: Option<Vec<Vec<String>>>,
}

#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetMeta>,
}

#[derive(Debug, Deserialize)]
struct SheetMeta {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: i64,
    title: String,
}

/// Convert value rows into tasks.
///
/// The first row is a header. Row `i` becomes `task-<i>`; rows without any
/// cells are skipped. Columns: A week, B project, C project description,
/// D date, E department, F value, G hours, H day number, I total days,
/// J description.
pub fn parse_sheet_rows(rows: &[Vec<String>]) -> Vec<Task> {
    rows.iter()
        .enumerate()
        .skip(1)
        .filter(|(_, row)| !row.is_empty())
        .map(|(i, row)| {
            let cell = |idx: usize| row.get(idx).cloned().unwrap_or_default();
            Task {
                id: format!("task-{}", i),
                week: cell(0),
                project: cell(1),
                project_description: cell(2),
                date: cell(3),
                department: normalize_department(&cell(4)),
                value: cell(5),
                hours: cell(6),
                day_number: cell(7),
                total_days: cell(8),
                description: cell(9),
                ..Default::default()
            }
        })
        .collect()
}

fn update_cell_request(sheet_id: i64, row: i64, column: i64, text: &str) -> Value {
    json!({
        "updateCells": {
            "range": {
                "sheetId": sheet_id,
                "startRowIndex": row,
                "endRowIndex": row + 1,
                "startColumnIndex": column,
                "endColumnIndex": column + 1
            },
            "rows": [{
                "values": [{
                    "userEnteredValue": { "stringValue": text }
                }]
            }],
            "fields": "userEnteredValue"
        }
    })
}

/// Build the `batchUpdate` requests for a set of description changes.
///
/// A project without a staging column gets a fresh column inserted at index 4
/// with the project name as its header. Changes whose department/day pair has
/// no staging row are dropped.
pub fn build_staging_requests(
    sheet_id: i64,
    headers: &[String],
    project: &str,
    changes: &[DescriptionChange],
) -> Vec<Value> {
    let mut requests = Vec::new();

    let column = match headers.iter().position(|h| h == project) {
        Some(col) => col as i64,
        None => {
            requests.push(json!({
                "insertDimension": {
                    "range": {
                        "sheetId": sheet_id,
                        "dimension": "COLUMNS",
                        "startIndex": NEW_PROJECT_COLUMN,
                        "endIndex": NEW_PROJECT_COLUMN + 1
                    },
                    "inheritFromBefore": false
                }
            }));
            requests.push(update_cell_request(sheet_id, 0, NEW_PROJECT_COLUMN, project));
            NEW_PROJECT_COLUMN
        }
    };

    for change in changes {
        match staging_row(&change.task.department, &change.task.day_number) {
            Some(row) => requests.push(update_cell_request(
                sheet_id,
                i64::from(row) - 1,
                column,
                &change.new_text,
            )),
            None => debug!(
                task_id = %change.task.id,
                department = %change.task.department,
                day_number = %change.task.day_number,
                "No staging row for change"
            ),
        }
    }

    requests
}

/// Reads the live task list and writes staging-sheet edits.
pub struct SheetsClient {
    http: reqwest::Client,
    base_url: String,
    spreadsheet_id: String,
    sheet_name: String,
    staging_sheet_name: String,
    api_key: String,
    tokens: Option<Arc<TokenProvider>>,
}

impl SheetsClient {
    pub fn new(
        http: reqwest::Client,
        config: &SheetsConfig,
        tokens: Option<Arc<TokenProvider>>,
    ) -> Result<Self, SourceError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| SourceError::Config("sheets api key is not configured".into()))?;
        if config.spreadsheet_id.trim().is_empty() {
            return Err(SourceError::Config("spreadsheet id is not configured".into()));
        }
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            spreadsheet_id: config.spreadsheet_id.clone(),
            sheet_name: config.sheet_name.clone(),
            staging_sheet_name: config.staging_sheet_name.clone(),
            api_key,
            tokens,
        })
    }

    fn values_url(&self, sheet: &str, range: &str) -> String {
        format!(
            "{}/v4/spreadsheets/{}/values/{}!{}?key={}",
            self.base_url,
            self.spreadsheet_id,
            urlencoding::encode(sheet),
            range,
            urlencoding::encode(&self.api_key)
        )
    }

    async fn get_values(&self, sheet: &str, range: &str) -> Result<Option<Vec<Vec<String>>>, SourceError> {
        let resp = self.http.get(self.values_url(sheet, range)).send().await?;
        let body: ValueRange = check_status(resp).await?.json().await?;
        Ok(body.values)
    }

    /// Numeric id of the tab called `name`.
    pub async fn sheet_id(&self, name: &str) -> Result<Option<i64>, SourceError> {
        let url = format!(
            "{}/v4/spreadsheets/{}?key={}",
            self.base_url,
            self.spreadsheet_id,
            urlencoding::encode(&self.api_key)
        );
        let resp = self.http.get(url).send().await?;
        let meta: SpreadsheetMeta = check_status(resp).await?.json().await?;
        Ok(meta
            .sheets
            .into_iter()
            .find(|s| s.properties.title == name)
            .map(|s| s.properties.sheet_id))
    }

    /// Full contents of the staging tab.
    pub async fn staging_data(&self) -> Result<Vec<Vec<String>>, SourceError> {
        Ok(self
            .get_values(&self.staging_sheet_name, "A1:ZZ")
            .await?
            .unwrap_or_default())
    }
}

#[async_trait]
impl TaskSource for SheetsClient {
    async fn fetch_tasks(&self) -> Result<Vec<Task>, SourceError> {
        let rows = self
            .get_values(&self.sheet_name, "A1:Z")
            .await?
            .ok_or_else(|| SourceError::Empty("No data found in sheet".into()))?;
        let tasks = parse_sheet_rows(&rows);
        debug!(count = tasks.len(), "Fetched sheet tasks");
        Ok(tasks)
    }
}

#[async_trait]
impl StagingWriter for SheetsClient {
    async fn save_to_staging(
        &self,
        project: &str,
        changes: &[DescriptionChange],
    ) -> Result<(), SourceError> {
        let sheet_id = self
            .sheet_id(&self.staging_sheet_name)
            .await?
            .ok_or_else(|| SourceError::Empty("Staging sheet not found".into()))?;
        let staging = self.staging_data().await?;
        let headers = staging.first().map(Vec::as_slice).unwrap_or_default();

        let requests = build_staging_requests(sheet_id, headers, project, changes);
        if requests.is_empty() {
            debug!(project = %project, "No staging cells for these changes");
            return Ok(());
        }

        let tokens = self
            .tokens
            .as_ref()
            .ok_or_else(|| SourceError::Config("service account is not configured".into()))?;
        let token = tokens.access_token().await?;
        let url = format!(
            "{}/v4/spreadsheets/{}:batchUpdate",
            self.base_url, self.spreadsheet_id
        );
        let resp = self
            .http
            .post(url)
            .bearer_auth(token)
            .json(&json!({ "requests": requests }))
            .send()
            .await?;
        check_status(resp).await?;

        info!(project = %project, requests = requests.len(), "Saved descriptions to staging sheet");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(cells: &[&str]) -> Vec<String> {
        cells.iter().map(|c| c.to_string()).collect()
    }

    #[test]
    fn test_parse_rows_maps_columns() {
        let rows = vec![
            row(&["Week", "Project", "Desc", "Date", "Dept"]),
            row(&[
                "2024-03-11", "P-100", "Panels", "03/15/2024", "form out", "1200", "6", "1", "3",
                "Pour east wall",
            ]),
        ];
        let tasks = parse_sheet_rows(&rows);
        assert_eq!(tasks.len(), 1);
        let t = &tasks[0];
        assert_eq!(t.id, "task-1");
        assert_eq!(t.project, "P-100");
        assert_eq!(t.project_description, "Panels");
        assert_eq!(t.date, "03/15/2024");
        assert_eq!(t.department, "Form Out");
        assert_eq!(t.hours, "6");
        assert_eq!(t.day_number, "1");
        assert_eq!(t.total_days, "3");
        assert_eq!(t.description, "Pour east wall");
        assert!(!t.is_manual);
    }

    #[test]
    fn test_parse_rows_skips_empty_and_keeps_positions() {
        let rows = vec![row(&["header"]), row(&[]), row(&["w", "P-2"])];
        let tasks = parse_sheet_rows(&rows);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, "task-2");
        assert_eq!(tasks[0].description, "");
    }

    #[test]
    fn test_parse_header_only() {
        assert!(parse_sheet_rows(&[row(&["Week"])]).is_empty());
        assert!(parse_sheet_rows(&[]).is_empty());
    }
}
