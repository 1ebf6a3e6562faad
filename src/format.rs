//! Terminal output for the CLI subcommands.

use crate::dates::format_mm_dd_yyyy;
use crate::grid::{Cell, WeekGrid};
use crate::projects::{BuildPlan, ProjectSummary};
use crate::types::Task;

/// Output format for CLI results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Markdown,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(OutputFormat::Json),
            "markdown" | "md" => Some(OutputFormat::Markdown),
            _ => None,
        }
    }
}

/// Single-line summary of a task for table cells.
fn cell_text(task: &Task) -> String {
    let mut parts = Vec::new();
    if !task.project.is_empty() {
        parts.push(task.project.clone());
    }
    if !task.description.is_empty() {
        parts.push(task.description.replace('\n', "; "));
    }
    if !task.hours.is_empty() {
        parts.push(format!("{}h", task.hours));
    }
    if !task.day_counter.is_empty() {
        parts.push(format!("({})", task.day_counter));
    }
    parts.join(" ").replace('|', "\\|")
}

/// Render one week as a markdown table: one line per department row, one
/// column per day.
pub fn format_week_markdown(week: &WeekGrid) -> String {
    let mut md = format!("# {}\n\n", week.label);

    md.push_str("| Department |");
    for date in &week.dates {
        md.push_str(&format!(" {} {} |", date.format("%a"), format_mm_dd_yyyy(*date)));
    }
    md.push('\n');
    md.push_str("|---|");
    for _ in &week.dates {
        md.push_str("---|");
    }
    md.push('\n');

    for row in &week.rows {
        for (index, cells) in row.cells.iter().enumerate() {
            let label = if index == 0 { row.department.as_str() } else { "" };
            md.push_str(&format!("| {} |", label));
            for cell in cells {
                match cell {
                    Cell::Task(task) => md.push_str(&format!(" {} |", cell_text(task))),
                    Cell::Placeholder { .. } => md.push_str("  |"),
                }
            }
            md.push('\n');
        }
    }

    md
}

/// Render a build plan with one section per department.
pub fn format_plan_markdown(plan: &BuildPlan) -> String {
    let mut md = format!("# {}\n", plan.title);

    for section in &plan.sections {
        md.push_str(&format!("\n## {}\n", section.department));
        for task in &section.tasks {
            let date = task
                .parsed_date()
                .map(format_mm_dd_yyyy)
                .unwrap_or_else(|| "no date".to_string());
            md.push_str(&format!("- **{}**", date));
            if !task.hours.is_empty() {
                md.push_str(&format!(" ({}h)", task.hours));
            }
            if !task.description.is_empty() {
                md.push_str(&format!(": {}", task.description.replace('\n', "; ")));
            }
            md.push('\n');
        }
    }

    md
}

/// Render project search results.
pub fn format_summaries_markdown(summaries: &[ProjectSummary]) -> String {
    if summaries.is_empty() {
        return "No matching projects.\n".to_string();
    }
    let mut md = format!("# Projects ({})\n\n", summaries.len());
    for summary in summaries {
        md.push_str(&format!(
            "- **{}**: {} tasks, {} hours\n",
            summary.project, summary.task_count, summary.total_hours
        ));
    }
    md
}
