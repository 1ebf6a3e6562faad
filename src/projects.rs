//! Project-level views: search results and the build plan.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::departments::{OTHER, compare_departments};
use crate::types::Task;

/// Maximum number of search results returned.
pub const SEARCH_LIMIT: usize = 50;

/// All tasks of one project with their summed hours.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSummary {
    pub project: String,
    pub total_hours: f64,
    pub task_count: usize,
    pub tasks: Vec<Task>,
}

/// Group tasks by non-empty project name, sorted by name.
pub fn project_summaries(tasks: &[Task]) -> Vec<ProjectSummary> {
    let mut by_project: BTreeMap<&str, Vec<&Task>> = BTreeMap::new();
    for task in tasks {
        let name = task.project.trim();
        if !name.is_empty() {
            by_project.entry(name).or_default().push(task);
        }
    }

    by_project
        .into_iter()
        .map(|(project, tasks)| ProjectSummary {
            project: project.to_string(),
            total_hours: tasks.iter().filter_map(|t| t.hours_value()).sum(),
            task_count: tasks.len(),
            tasks: tasks.into_iter().cloned().collect(),
        })
        .collect()
}

/// Case-insensitive substring search over project names.
pub fn search_projects(tasks: &[Task], query: &str) -> Vec<ProjectSummary> {
    let needle = query.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }
    project_summaries(tasks)
        .into_iter()
        .filter(|p| p.project.to_lowercase().contains(&needle))
        .take(SEARCH_LIMIT)
        .collect()
}

/// One department's section of a build plan.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanSection {
    pub department: String,
    pub tasks: Vec<Task>,
}

/// Department-by-department breakdown of a project.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildPlan {
    pub project: String,
    pub title: String,
    pub total_hours: i64,
    pub sections: Vec<PlanSection>,
}

/// Build the plan for `project`, or `None` when it has no tasks.
pub fn build_plan(tasks: &[Task], project: &str) -> Option<BuildPlan> {
    let project = project.trim();
    let mine: Vec<&Task> = tasks.iter().filter(|t| t.project.trim() == project).collect();
    if mine.is_empty() {
        return None;
    }

    let total: f64 = mine.iter().filter_map(|t| t.hours_value()).sum();
    let total_hours = total.round() as i64;

    let mut by_dept: BTreeMap<String, Vec<Task>> = BTreeMap::new();
    for task in mine {
        let dept = if task.department.is_empty() {
            OTHER.to_string()
        } else {
            task.department.clone()
        };
        by_dept.entry(dept).or_default().push(task.clone());
    }

    let mut sections: Vec<PlanSection> = by_dept
        .into_iter()
        .map(|(department, mut tasks)| {
            tasks.sort_by(|a, b| {
                a.parsed_date()
                    .cmp(&b.parsed_date())
                    .then_with(|| day_index(a).cmp(&day_index(b)))
            });
            PlanSection { department, tasks }
        })
        .collect();
    sections.sort_by(|a, b| match (a.department == OTHER, b.department == OTHER) {
        (true, false) => std::cmp::Ordering::Greater,
        (false, true) => std::cmp::Ordering::Less,
        _ => compare_departments(&a.department, &b.department),
    });

    Some(BuildPlan {
        project: project.to_string(),
        title: format!("Build Plan: {} - Total Hours: {}", project, total_hours),
        total_hours,
        sections,
    })
}

fn day_index(task: &Task) -> i64 {
    task.day_number.trim().parse().unwrap_or(i64::MAX)
}
