//! HTML for the board page.
//!
//! The page shell is embedded at compile time using `include_str!`; week grids
//! are rendered into fragments the page swaps in.

use crate::dates::format_mm_dd_yyyy;
use crate::error::ScheduleError;
use crate::grid::{Cell, WeekGrid};
use crate::types::Task;

/// The board page shell with the refresh script.
pub const BOARD_TEMPLATE: &str = include_str!("templates/board.html");

/// Escape HTML special characters.
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Escaped text with line breaks kept.
fn multiline(s: &str) -> String {
    html_escape(s).replace('\n', "<br>")
}

fn task_cell(task: &Task, class: &str) -> String {
    let mut classes = vec!["task", class];
    if task.is_manual {
        classes.push("manual");
    }
    if task.missing_date {
        classes.push("missing-date");
    }
    let draggable = if task.is_editable() { " draggable=\"true\"" } else { "" };

    let mut html = format!(
        r#"<td class="{}" data-task-id="{}" data-department="{}"{}>"#,
        classes.join(" "),
        html_escape(&task.id),
        html_escape(&task.department),
        draggable
    );
    if !task.project.is_empty() {
        html.push_str(&format!(
            r#"<div class="project" data-project="{0}">{0}</div>"#,
            html_escape(&task.project)
        ));
    }
    if !task.description.is_empty() {
        html.push_str(&format!(
            r#"<div class="description">{}</div>"#,
            multiline(&task.description)
        ));
    }
    if !task.hours.is_empty() {
        html.push_str(&format!(r#"<div class="hours">{}h</div>"#, html_escape(&task.hours)));
    }
    if !task.day_counter.is_empty() {
        html.push_str(&format!(
            r#"<div class="day-counter">{}</div>"#,
            html_escape(&task.day_counter)
        ));
    }
    if task.missing_date {
        html.push_str(r#"<div class="warning">No date</div>"#);
    }
    html.push_str("</td>");
    html
}

/// Render one week with navigation and the error banner, if any.
pub fn render_week(
    week: &WeekGrid,
    index: usize,
    total: usize,
    banner: Option<&ScheduleError>,
) -> String {
    let mut html = String::new();

    if let Some(err) = banner {
        html.push_str(&format!(
            r#"<div class="error-banner" data-code="{}">{}</div>"#,
            html_escape(&format!("{:?}", err.code)),
            html_escape(&err.user_message())
        ));
    }

    html.push_str(&format!(
        r#"<div class="week-nav" data-week-index="{index}" data-week-count="{total}">
    <button class="prev" data-week="{prev}"{prev_disabled}>&larr;</button>
    <h2>{label}</h2>
    <button class="next" data-week="{next}"{next_disabled}>&rarr;</button>
</div>
"#,
        index = index,
        total = total,
        prev = index.saturating_sub(1),
        next = (index + 1).min(total.saturating_sub(1)),
        prev_disabled = if index == 0 { " disabled" } else { "" },
        next_disabled = if index + 1 >= total { " disabled" } else { "" },
        label = html_escape(&week.label),
    ));

    html.push_str(r#"<table class="week-grid"><thead><tr><th>Department</th>"#);
    for date in &week.dates {
        html.push_str(&format!(
            "<th>{}<br>{}</th>",
            date.format("%A"),
            format_mm_dd_yyyy(*date)
        ));
    }
    html.push_str("</tr></thead><tbody>");

    for row in &week.rows {
        for (row_index, cells) in row.cells.iter().enumerate() {
            html.push_str(&format!(r#"<tr class="{}">"#, html_escape(&row.class)));
            if row_index == 0 {
                html.push_str(&format!(
                    r#"<th rowspan="{}">{}</th>"#,
                    row.cells.len(),
                    html_escape(&row.department)
                ));
            }
            for cell in cells {
                match cell {
                    Cell::Task(task) => html.push_str(&task_cell(task, &row.class)),
                    Cell::Placeholder {
                        department,
                        date,
                        week,
                    } => html.push_str(&format!(
                        r#"<td class="placeholder" data-department="{}" data-date="{}" data-week="{}"></td>"#,
                        html_escape(department),
                        html_escape(date),
                        html_escape(week)
                    )),
                }
            }
            html.push_str("</tr>");
        }
    }
    html.push_str("</tbody></table>");
    html
}

/// Fragment shown when there is nothing to lay out.
pub fn render_empty(banner: Option<&ScheduleError>) -> String {
    let mut html = String::new();
    if let Some(err) = banner {
        html.push_str(&format!(
            r#"<div class="error-banner">{}</div>"#,
            html_escape(&err.user_message())
        ));
    }
    html.push_str(r#"<div class="empty-state">No tasks scheduled</div>"#);
    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::DepartmentRow;
    use chrono::NaiveDate;

    fn one_cell_week(cell: Cell) -> WeekGrid {
        let monday = NaiveDate::from_ymd_opt(2024, 1, 8).unwrap();
        WeekGrid {
            monday,
            label: "January Week 2".into(),
            dates: vec![monday],
            rows: vec![DepartmentRow {
                department: "Mill".into(),
                class: "mill".into(),
                cells: vec![vec![cell]],
            }],
        }
    }

    #[test]
    fn test_html_escape() {
        assert_eq!(html_escape("<a href=\"x\">&'"), "&lt;a href=&quot;x&quot;&gt;&amp;&#39;");
    }

    #[test]
    fn test_description_line_breaks() {
        let task = Task {
            id: "batch-2024-01-08".into(),
            department: "Batch".into(),
            description: "P1 <rush>\nP2".into(),
            ..Default::default()
        };
        let html = render_week(&one_cell_week(Cell::Task(task)), 0, 1, None);
        assert!(html.contains("P1 &lt;rush&gt;<br>P2"));
        assert!(!html.contains("draggable"));
    }

    #[test]
    fn test_manual_task_is_draggable() {
        let task = Task {
            id: "manual-1".into(),
            department: "Mill".into(),
            is_manual: true,
            ..Default::default()
        };
        let html = render_week(&one_cell_week(Cell::Task(task)), 0, 1, None);
        assert!(html.contains(r#"data-task-id="manual-1""#));
        assert!(html.contains("draggable=\"true\""));
    }

    #[test]
    fn test_navigation_bounds() {
        let cell = Cell::Placeholder {
            department: "Mill".into(),
            date: "2024-01-08".into(),
            week: "2024-01-08".into(),
        };
        let html = render_week(&one_cell_week(cell), 0, 1, None);
        assert!(html.contains(r#"class="prev" data-week="0" disabled"#));
        assert!(html.contains(r#"class="next" data-week="0" disabled"#));
        assert!(html.contains(r#"class="placeholder""#));
    }

    #[test]
    fn test_banner_rendered() {
        let err = ScheduleError::from(crate::sources::SourceError::Network("timeout".into()));
        let html = render_empty(Some(&err));
        assert!(html.contains("error-banner"));
        assert!(html.contains("No tasks scheduled"));
    }
}
