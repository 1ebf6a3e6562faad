//! REST client for the hosted task store and its broadcast endpoint.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value, json};
use tracing::debug;

use super::{ManualTaskStore, SignalRelay, SourceError, check_status};
use crate::config::StoreConfig;
use crate::departments::normalize_department;
use crate::refresh::RefreshSignal;
use crate::types::Task;

/// Accept a string, a number, or null for free-form columns.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(s) => s,
        other => other.to_string(),
    })
}

/// A `weekly_tasks` row as returned by the store.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StoreRow {
    #[serde(deserialize_with = "lenient_string")]
    pub id: String,
    #[serde(deserialize_with = "lenient_string")]
    pub week: String,
    #[serde(deserialize_with = "lenient_string")]
    pub project: String,
    #[serde(deserialize_with = "lenient_string")]
    pub project_description: String,
    #[serde(deserialize_with = "lenient_string")]
    pub description: String,
    #[serde(deserialize_with = "lenient_string")]
    pub date: String,
    #[serde(deserialize_with = "lenient_string")]
    pub department: String,
    #[serde(deserialize_with = "lenient_string")]
    pub value: String,
    #[serde(deserialize_with = "lenient_string")]
    pub hours: String,
    #[serde(deserialize_with = "lenient_string")]
    pub day_number: String,
    #[serde(deserialize_with = "lenient_string")]
    pub total_days: String,
}

impl From<StoreRow> for Task {
    fn from(row: StoreRow) -> Self {
        Task {
            missing_date: row.date.trim().is_empty(),
            department: normalize_department(&row.department),
            id: row.id,
            week: row.week,
            project: row.project,
            project_description: row.project_description,
            description: row.description,
            date: row.date,
            value: row.value,
            hours: row.hours,
            day_number: row.day_number,
            total_days: row.total_days,
            day_counter: String::new(),
            is_manual: true,
        }
    }
}

#[derive(Debug, Serialize)]
struct InsertRow<'a> {
    id: &'a str,
    week: &'a str,
    project: &'a str,
    project_description: &'a str,
    description: &'a str,
    date: &'a str,
    department: &'a str,
    value: &'a str,
    hours: &'a str,
    day_number: &'a str,
    total_days: &'a str,
    created_at: String,
    updated_at: String,
}

impl<'a> InsertRow<'a> {
    fn from_task(task: &'a Task) -> Self {
        let now = Utc::now().to_rfc3339();
        Self {
            id: &task.id,
            week: &task.week,
            project: &task.project,
            project_description: &task.project_description,
            description: &task.description,
            date: &task.date,
            department: &task.department,
            value: &task.value,
            hours: &task.hours,
            day_number: &task.day_number,
            total_days: &task.total_days,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}

/// Client for the manual-task table and the refresh broadcast.
pub struct StoreClient {
    http: reqwest::Client,
    base_url: String,
    key: String,
    table: String,
    channel: String,
    event: String,
    write_timeout: Duration,
}

impl StoreClient {
    pub fn new(http: reqwest::Client, config: &StoreConfig) -> Result<Self, SourceError> {
        let base_url = config
            .url
            .as_deref()
            .map(|u| u.trim_end_matches('/').to_string())
            .filter(|u| !u.is_empty())
            .ok_or_else(|| SourceError::Config("store url is not configured".into()))?;
        let key = config
            .key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| SourceError::Config("store key is not configured".into()))?;
        Ok(Self {
            http,
            base_url,
            key,
            table: config.table.clone(),
            channel: config.channel.clone(),
            event: config.event.clone(),
            write_timeout: Duration::from_secs(config.write_timeout_secs),
        })
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }

    fn request(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        self.http
            .request(method, url)
            .header("apikey", &self.key)
            .bearer_auth(&self.key)
    }

    fn write(&self, method: reqwest::Method, url: String) -> reqwest::RequestBuilder {
        self.request(method, url)
            .header("Prefer", "return=minimal")
            .timeout(self.write_timeout)
    }
}

#[async_trait]
impl ManualTaskStore for StoreClient {
    async fn load_manual_tasks(&self) -> Result<Vec<Task>, SourceError> {
        let resp = self
            .request(reqwest::Method::GET, self.table_url())
            .query(&[("select", "*"), ("order", "created_at.desc")])
            .send()
            .await?;
        let rows: Vec<StoreRow> = check_status(resp).await?.json().await?;
        debug!(count = rows.len(), "Loaded manual tasks");
        Ok(rows.into_iter().map(Task::from).collect())
    }

    async fn insert_task(&self, task: &Task) -> Result<(), SourceError> {
        let resp = self
            .write(reqwest::Method::POST, self.table_url())
            .json(&[InsertRow::from_task(task)])
            .send()
            .await?;
        check_status(resp).await?;
        Ok(())
    }

    async fn update_task_schedule(&self, task: &Task) -> Result<(), SourceError> {
        let resp = self
            .write(reqwest::Method::PATCH, self.table_url())
            .query(&[("id", format!("eq.{}", task.id))])
            .json(&json!({
                "date": task.date,
                "week": task.week,
                "updated_at": Utc::now().to_rfc3339(),
            }))
            .send()
            .await?;
        check_status(resp).await?;
        Ok(())
    }

    async fn delete_task(&self, id: &str) -> Result<(), SourceError> {
        let resp = self
            .write(reqwest::Method::DELETE, self.table_url())
            .query(&[("id", format!("eq.{}", id))])
            .send()
            .await?;
        check_status(resp).await?;
        Ok(())
    }
}

#[async_trait]
impl SignalRelay for StoreClient {
    async fn publish(&self, signal: &RefreshSignal) -> Result<(), SourceError> {
        let url = format!("{}/realtime/v1/api/broadcast", self.base_url);
        let resp = self
            .write(reqwest::Method::POST, url)
            .json(&json!({
                "messages": [{
                    "topic": self.channel,
                    "event": self.event,
                    "payload": signal,
                }]
            }))
            .send()
            .await?;
        check_status(resp).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_row_to_task_normalizes_and_flags_manual() {
        let row: StoreRow = serde_json::from_value(json!({
            "id": "manual-1",
            "week": "2024-03-11",
            "project": "P-100",
            "date": "2024-03-15",
            "department": "formout",
            "hours": 6,
            "day_number": null,
            "created_at": "2024-03-10T00:00:00Z"
        }))
        .unwrap();
        let task = Task::from(row);
        assert!(task.is_manual);
        assert_eq!(task.department, "Form Out");
        assert_eq!(task.hours, "6");
        assert_eq!(task.day_number, "");
        assert!(!task.missing_date);
    }

    #[test]
    fn test_row_without_date_is_missing() {
        let row: StoreRow = serde_json::from_value(json!({"id": "manual-2"})).unwrap();
        assert!(Task::from(row).missing_date);
    }

    #[test]
    fn test_new_requires_url_and_key() {
        let http = reqwest::Client::new();
        assert!(matches!(
            StoreClient::new(http.clone(), &StoreConfig::default()),
            Err(SourceError::Config(_))
        ));
        let config = StoreConfig {
            url: Some("https://store.example/".into()),
            key: Some("anon".into()),
            ..Default::default()
        };
        let client = StoreClient::new(http, &config).unwrap();
        assert_eq!(client.table_url(), "https://store.example/rest/v1/weekly_tasks");
    }
}
