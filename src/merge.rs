//! Combining sheet and store tasks, and department filtering.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::types::Task;

/// Merge sheet-sourced tasks with store-sourced manual tasks.
///
/// A manual task replaces any sheet task with the same id entirely; manual
/// tasks are always kept and appended after the surviving sheet tasks.
pub fn merge_tasks(sheet: Vec<Task>, manual: Vec<Task>) -> Vec<Task> {
    let manual_ids: HashSet<&str> = manual.iter().map(|t| t.id.as_str()).collect();
    let mut merged: Vec<Task> = sheet
        .into_iter()
        .filter(|t| !manual_ids.contains(t.id.as_str()))
        .collect();
    merged.extend(manual);
    merged
}

/// Derive `missing_date` and `day_counter` from each task's own fields.
pub fn compute_day_counts(tasks: &mut [Task]) {
    for task in tasks.iter_mut() {
        task.missing_date = task.parsed_date().is_none();
        task.day_counter = day_counter(&task.day_number, &task.total_days).unwrap_or_default();
    }
}

fn day_counter(day_number: &str, total_days: &str) -> Option<String> {
    let day: i64 = day_number.trim().parse().ok()?;
    let total: i64 = total_days.trim().parse().ok()?;
    Some(format!("Day {} of {}", day, total))
}

/// Which departments the board shows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode", content = "departments")]
pub enum DepartmentSelection {
    #[default]
    All,
    Only(Vec<String>),
}

impl DepartmentSelection {
    /// Parse a comma-separated list; an absent list means every department.
    pub fn from_query(param: Option<&str>) -> Self {
        match param {
            None => DepartmentSelection::All,
            Some(raw) => DepartmentSelection::Only(
                raw.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect(),
            ),
        }
    }

    pub fn includes(&self, department: &str) -> bool {
        match self {
            DepartmentSelection::All => true,
            DepartmentSelection::Only(list) => list.iter().any(|d| d == department),
        }
    }
}

/// Apply a department selection to the merged task list.
pub fn filter_tasks(tasks: &[Task], selection: &DepartmentSelection) -> Vec<Task> {
    match selection {
        DepartmentSelection::All => return tasks.to_vec(),
        DepartmentSelection::Only(list) if list.is_empty() => return Vec::new(),
        DepartmentSelection::Only(_) => {}
    }

    let present: HashSet<&str> = tasks
        .iter()
        .map(|t| t.department.as_str())
        .filter(|d| !d.is_empty())
        .collect();
    if present.iter().all(|d| selection.includes(d)) {
        return tasks.to_vec();
    }

    tasks
        .iter()
        .filter(|t| selection.includes(&t.department))
        .cloned()
        .collect()
}
