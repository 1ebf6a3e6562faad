//! Core types for the scheduling board.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::dates::{get_monday, local_date_string, parse_date};
use crate::departments::normalize_department;
use crate::error::{ErrorCode, ScheduleError};

/// A unit of shop work on a given day in a given department.
///
/// Sheet rows become tasks with a positional id (`task-<row>`); tasks created
/// on the board live in the store and carry `is_manual`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Task {
    pub id: String,
    pub week: String,
    pub project: String,
    pub project_description: String,
    pub description: String,
    /// `MM/DD/YYYY` or `YYYY-MM-DD`; may be empty or malformed.
    pub date: String,
    pub department: String,
    pub value: String,
    pub hours: String,
    pub day_number: String,
    pub total_days: String,
    /// `Day X of Y`, or empty.
    pub day_counter: String,
    pub missing_date: bool,
    pub is_manual: bool,
}

impl Task {
    pub fn parsed_date(&self) -> Option<NaiveDate> {
        parse_date(&self.date)
    }

    /// Numeric hours, when the free-form field holds a number.
    pub fn hours_value(&self) -> Option<f64> {
        self.hours.trim().parse::<f64>().ok().filter(|h| h.is_finite())
    }

    /// Batch/Layout look-ahead rows are generated, never stored.
    pub fn is_synthetic(&self) -> bool {
        self.id.starts_with("batch-") || self.id.starts_with("layout-")
    }

    /// Only store-backed tasks can be moved or deleted.
    pub fn is_editable(&self) -> bool {
        self.is_manual && !self.is_synthetic()
    }
}

/// Payload of the "Add Task" form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct NewTask {
    pub project: String,
    pub department: String,
    pub date: String,
    pub description: String,
    pub hours: String,
    pub day_number: String,
    pub total_days: String,
    /// Monday of the target week; derived from `date` when absent.
    pub week: Option<String>,
}

impl NewTask {
    /// Check required fields, reporting every missing one at once.
    pub fn validate(&self) -> Result<(), ScheduleError> {
        let mut errors = Vec::new();
        let mut first_field = None;
        for (field, value, message) in [
            ("project", &self.project, "Project name is required"),
            ("department", &self.department, "Department is required"),
            ("date", &self.date, "Date is required"),
        ] {
            if value.trim().is_empty() {
                errors.push(message);
                first_field.get_or_insert(field);
            }
        }

        match first_field {
            None => Ok(()),
            Some(field) => Err(ScheduleError::new(
                ErrorCode::MissingRequiredField,
                errors.join("\n"),
            )
            .with_field(field)),
        }
    }

    /// Key used to reject duplicate in-flight submissions.
    pub fn fingerprint(&self) -> String {
        format!(
            "{}|{}|{}|{}",
            self.project.trim(),
            normalize_department(&self.department),
            self.date.trim(),
            self.description.trim()
        )
    }

    /// Build the manual task that will be written to the store.
    pub fn into_task(self, id: String) -> Task {
        let week = self.week.filter(|w| !w.trim().is_empty()).unwrap_or_else(|| {
            parse_date(&self.date)
                .map(|d| local_date_string(get_monday(d)))
                .unwrap_or_default()
        });
        Task {
            id,
            week,
            project: self.project.trim().to_string(),
            project_description: String::new(),
            description: self.description,
            date: self.date.trim().to_string(),
            department: normalize_department(&self.department),
            value: String::new(),
            hours: self.hours,
            day_number: self.day_number,
            total_days: self.total_days,
            day_counter: String::new(),
            missing_date: false,
            is_manual: true,
        }
    }
}

/// A description edit destined for the staging sheet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescriptionChange {
    pub task: Task,
    pub new_text: String,
}

/// A description edit submitted from the build-plan view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DescriptionEdit {
    pub task_id: String,
    pub text: String,
}
