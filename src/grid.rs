//! Weekly grid layout.
//!
//! Every week shows the same department rows with the same row counts, so
//! scrolling between weeks never shifts the layout. Row counts come from the
//! busiest single day of each department across the whole filtered set.

use std::collections::{BTreeSet, HashMap};

use chrono::{Duration, NaiveDate};
use serde::Serialize;

use crate::dates::{get_monday, local_date_string, week_dates, week_label};
use crate::departments::{
    BATCH, CAST, LAYOUT, OTHER, compare_departments, department_class, is_synthetic_department,
};
use crate::merge::{DepartmentSelection, filter_tasks};
use crate::types::Task;

/// Weeks either side of the current week a task date may fall in.
pub const DEFAULT_MAX_WEEK_SPAN: u32 = 104;

/// Range of dates the board lays out, centred on the current week.
///
/// Dates outside it are treated like missing dates, so one mistyped year
/// cannot stretch the board over thousands of weeks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    today: NaiveDate,
    first: NaiveDate,
    last: NaiveDate,
}

impl DateWindow {
    pub fn new(today: NaiveDate, max_week_span: u32) -> Self {
        let current = get_monday(today);
        let span = Duration::weeks(i64::from(max_week_span));
        let first = current.checked_sub_signed(span).unwrap_or(NaiveDate::MIN);
        let last = current
            .checked_add_signed(span + Duration::days(6))
            .unwrap_or(NaiveDate::MAX);
        Self { today, first, last }
    }

    /// Window with [`DEFAULT_MAX_WEEK_SPAN`].
    pub fn around(today: NaiveDate) -> Self {
        Self::new(today, DEFAULT_MAX_WEEK_SPAN)
    }

    pub fn today(&self) -> NaiveDate {
        self.today
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.first <= date && date <= self.last
    }

    /// Date a task is displayed on. Unparseable and out-of-window dates fall
    /// back to the Monday of the current week.
    pub fn effective_date(&self, task: &Task) -> NaiveDate {
        task.parsed_date()
            .filter(|date| self.contains(*date))
            .unwrap_or_else(|| get_monday(self.today))
    }
}

/// Tasks whose parseable date falls outside the window.
pub fn out_of_window<'a>(tasks: &'a [Task], window: &DateWindow) -> Vec<&'a Task> {
    tasks
        .iter()
        .filter(|t| t.parsed_date().is_some_and(|date| !window.contains(date)))
        .collect()
}

fn group_name(task: &Task) -> &str {
    if task.department.is_empty() {
        OTHER
    } else {
        &task.department
    }
}

/// Contiguous, sorted Mondays covering every task plus the current week.
pub fn enumerate_weeks(tasks: &[Task], window: &DateWindow) -> Vec<NaiveDate> {
    let current = get_monday(window.today());
    let mondays: BTreeSet<NaiveDate> = tasks
        .iter()
        .map(|t| get_monday(window.effective_date(t)))
        .collect();

    let mut weeks = Vec::new();
    if let (Some(first), Some(last)) = (mondays.first(), mondays.last()) {
        let mut monday = *first;
        while monday <= *last {
            weeks.push(monday);
            monday += Duration::days(7);
        }
    }
    if !weeks.contains(&current) {
        weeks.push(current);
        weeks.sort();
    }
    weeks
}

/// Rows reserved for one department in every week.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RowCount {
    pub department: String,
    pub rows: usize,
}

/// Per-department row counts, in display order.
///
/// Batch and Layout rows are generated and never counted here.
pub fn department_row_counts(tasks: &[Task], window: &DateWindow) -> Vec<RowCount> {
    let mut buckets: HashMap<&str, HashMap<NaiveDate, usize>> = HashMap::new();
    for task in tasks {
        let dept = group_name(task);
        if is_synthetic_department(dept) {
            continue;
        }
        *buckets
            .entry(dept)
            .or_default()
            .entry(window.effective_date(task))
            .or_default() += 1;
    }

    let mut counts: Vec<RowCount> = buckets
        .into_iter()
        .filter_map(|(dept, by_date)| {
            let rows = by_date.values().copied().max().unwrap_or(0);
            (rows > 0).then(|| RowCount {
                department: dept.to_string(),
                rows,
            })
        })
        .collect();
    counts.sort_by(|a, b| compare_departments(&a.department, &b.department));
    counts
}

/// The two generated look-ahead rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyntheticKind {
    Batch,
    Layout,
}

impl SyntheticKind {
    pub fn department(self) -> &'static str {
        match self {
            SyntheticKind::Batch => BATCH,
            SyntheticKind::Layout => LAYOUT,
        }
    }

    fn id_prefix(self) -> &'static str {
        match self {
            SyntheticKind::Batch => "batch",
            SyntheticKind::Layout => "layout",
        }
    }
}

fn casting_on(all_tasks: &[Task], date: NaiveDate) -> Vec<&str> {
    all_tasks
        .iter()
        .filter(|t| t.department == CAST && t.parsed_date() == Some(date))
        .map(|t| t.project.as_str())
        .collect()
}

/// Build the Monday-Friday look-ahead tasks for one week.
///
/// Each day lists the Cast projects of the next calendar day. Friday lists
/// Saturday and the following Monday under `Sat:` / `Mon:` labels. The lookup
/// runs against the unfiltered task list.
pub fn synthetic_tasks(kind: SyntheticKind, dates: &[NaiveDate], all_tasks: &[Task]) -> Vec<Task> {
    dates
        .iter()
        .take(5)
        .enumerate()
        .map(|(i, date)| {
            let lines: Vec<String> = if i == 4 {
                let mut lines = Vec::new();
                let saturday = casting_on(all_tasks, *date + Duration::days(1));
                if !saturday.is_empty() {
                    lines.push(format!("Sat: {}", saturday.join(", ")));
                }
                let monday = casting_on(all_tasks, *date + Duration::days(3));
                if !monday.is_empty() {
                    lines.push(format!("Mon: {}", monday.join(", ")));
                }
                lines
            } else {
                casting_on(all_tasks, *date + Duration::days(1))
                    .into_iter()
                    .map(String::from)
                    .collect()
            };

            Task {
                id: format!("{}-{}", kind.id_prefix(), local_date_string(*date)),
                week: local_date_string(get_monday(*date)),
                project: kind.department().to_string(),
                description: lines.join("\n"),
                date: local_date_string(*date),
                department: kind.department().to_string(),
                ..Default::default()
            }
        })
        .collect()
}

/// One slot in a department row.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Cell {
    Task(Task),
    Placeholder {
        department: String,
        date: String,
        week: String,
    },
}

impl Cell {
    pub fn task(&self) -> Option<&Task> {
        match self {
            Cell::Task(task) => Some(task),
            Cell::Placeholder { .. } => None,
        }
    }
}

/// A department's block within one week: `cells[row][day]`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DepartmentRow {
    pub department: String,
    pub class: String,
    pub cells: Vec<Vec<Cell>>,
}

/// A Monday-Saturday grid.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekGrid {
    pub monday: NaiveDate,
    pub label: String,
    pub dates: Vec<NaiveDate>,
    pub rows: Vec<DepartmentRow>,
}

/// Every week of the board with shared row counts.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleGrid {
    pub row_counts: Vec<RowCount>,
    pub weeks: Vec<WeekGrid>,
}

/// Shared rows and weeks of the board for one selection.
///
/// Row counts are computed once; weeks are rendered on demand.
pub struct BoardLayout<'a> {
    all_tasks: &'a [Task],
    filtered: Vec<Task>,
    by_cell: HashMap<(String, NaiveDate), Vec<usize>>,
    pub row_counts: Vec<RowCount>,
    pub weeks: Vec<NaiveDate>,
}

impl<'a> BoardLayout<'a> {
    pub fn new(all_tasks: &'a [Task], selection: &DepartmentSelection, window: &DateWindow) -> Self {
        let filtered = filter_tasks(all_tasks, selection);
        let weeks = enumerate_weeks(&filtered, window);

        // Batch and Layout are always shown, whatever the selection.
        let mut row_counts = department_row_counts(&filtered, window);
        for kind in [SyntheticKind::Batch, SyntheticKind::Layout] {
            row_counts.push(RowCount {
                department: kind.department().to_string(),
                rows: 1,
            });
        }
        row_counts.sort_by(|a, b| compare_departments(&a.department, &b.department));

        let mut by_cell: HashMap<(String, NaiveDate), Vec<usize>> = HashMap::new();
        for (i, task) in filtered.iter().enumerate() {
            let dept = group_name(task);
            if is_synthetic_department(dept) {
                continue;
            }
            by_cell
                .entry((dept.to_string(), window.effective_date(task)))
                .or_default()
                .push(i);
        }

        Self {
            all_tasks,
            filtered,
            by_cell,
            row_counts,
            weeks,
        }
    }

    fn cell_task(&self, department: &str, date: NaiveDate, row: usize) -> Option<&Task> {
        let index = *self.by_cell.get(&(department.to_string(), date))?.get(row)?;
        self.filtered.get(index)
    }

    /// Lay out the week starting `monday`.
    pub fn week(&self, monday: NaiveDate) -> WeekGrid {
        let dates = week_dates(monday);
        let rows = self
            .row_counts
            .iter()
            .map(|count| {
                let synthetic = match count.department.as_str() {
                    BATCH => Some(SyntheticKind::Batch),
                    LAYOUT => Some(SyntheticKind::Layout),
                    _ => None,
                }
                .map(|kind| synthetic_tasks(kind, &dates, self.all_tasks));

                let cells = (0..count.rows)
                    .map(|row| {
                        dates
                            .iter()
                            .map(|date| {
                                let task = match &synthetic {
                                    Some(generated) => generated
                                        .iter()
                                        .filter(|t| t.parsed_date() == Some(*date))
                                        .nth(row),
                                    None => self.cell_task(&count.department, *date, row),
                                };
                                match task {
                                    Some(task) => Cell::Task(task.clone()),
                                    None => Cell::Placeholder {
                                        department: count.department.clone(),
                                        date: local_date_string(*date),
                                        week: local_date_string(monday),
                                    },
                                }
                            })
                            .collect()
                    })
                    .collect();

                DepartmentRow {
                    department: count.department.clone(),
                    class: department_class(&count.department),
                    cells,
                }
            })
            .collect();

        WeekGrid {
            monday,
            label: week_label(monday),
            dates,
            rows,
        }
    }

    /// Every week of the board.
    pub fn schedule(&self) -> ScheduleGrid {
        ScheduleGrid {
            row_counts: self.row_counts.clone(),
            weeks: self.weeks.iter().map(|monday| self.week(*monday)).collect(),
        }
    }
}

/// Lay out the full board for a department selection.
pub fn build_schedule(
    all_tasks: &[Task],
    selection: &DepartmentSelection,
    window: &DateWindow,
) -> ScheduleGrid {
    BoardLayout::new(all_tasks, selection, window).schedule()
}

/// Week to show first: the saved index when valid, else the current week,
/// else the first week after today, else the last week.
pub fn initial_week_index(weeks: &[NaiveDate], today: NaiveDate, saved: Option<usize>) -> usize {
    if let Some(index) = saved
        && index < weeks.len()
    {
        return index;
    }
    let current = get_monday(today);
    weeks
        .iter()
        .position(|m| *m == current)
        .or_else(|| weeks.iter().position(|m| *m > current))
        .unwrap_or_else(|| weeks.len().saturating_sub(1))
}
