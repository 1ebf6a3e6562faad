//! End-to-end tests of the board pipeline: sheet rows to merged tasks to
//! weekly grids.

use chrono::NaiveDate;
use shop_schedule::dates::get_monday;
use shop_schedule::grid::{Cell, DateWindow, ScheduleGrid, build_schedule, initial_week_index};
use shop_schedule::merge::{DepartmentSelection, compute_day_counts, merge_tasks};
use shop_schedule::sources::parse_sheet_rows;
use shop_schedule::types::Task;

fn d(y: i32, m: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, day).expect("valid date")
}

fn row(cells: &[&str]) -> Vec<String> {
    cells.iter().map(|c| c.to_string()).collect()
}

/// Sheet rows spanning the weeks of 2024-01-01 through 2024-02-01.
fn january_rows() -> Vec<Vec<String>> {
    vec![
        row(&["Week", "Project", "Desc", "Date", "Department", "Value", "Hours", "Day", "Total", "Notes"]),
        row(&["", "P1", "", "01/01/2024", "mill", "", "4", "1", "2", "rough"]),
        row(&["", "P1", "", "01/02/2024", "mill", "", "4", "2", "2", "finish"]),
        row(&["", "P2", "", "01/02/2024", "Mill", "", "2", "", "", ""]),
        row(&["", "P1", "", "01/10/2024", "cast", "", "6", "", "", ""]),
        row(&["", "P3", "", "2024-01-24", "Ship", "", "1", "", "", ""]),
        row(&["", "P4", "", "02/01/2024", "Seal", "", "3", "", "", ""]),
    ]
}

fn pipeline(manual: Vec<Task>) -> Vec<Task> {
    let mut tasks = merge_tasks(parse_sheet_rows(&january_rows()), manual);
    compute_day_counts(&mut tasks);
    tasks
}

fn row_shape(grid: &ScheduleGrid) -> Vec<Vec<(String, usize)>> {
    grid.weeks
        .iter()
        .map(|w| {
            w.rows
                .iter()
                .map(|r| (r.department.clone(), r.cells.len()))
                .collect()
        })
        .collect()
}

mod pipeline_tests {
    use super::*;

    #[test]
    fn january_span_gives_five_contiguous_weeks() {
        let tasks = pipeline(vec![]);
        let today = d(2024, 1, 17);
        let grid = build_schedule(&tasks, &DepartmentSelection::All, &DateWindow::around(today));

        let mondays: Vec<NaiveDate> = grid.weeks.iter().map(|w| w.monday).collect();
        assert_eq!(
            mondays,
            vec![d(2024, 1, 1), d(2024, 1, 8), d(2024, 1, 15), d(2024, 1, 22), d(2024, 1, 29)]
        );

        // Every week carries the same rows in the same order.
        let shapes = row_shape(&grid);
        assert!(shapes.windows(2).all(|pair| pair[0] == pair[1]));

        let mill = grid
            .row_counts
            .iter()
            .find(|c| c.department == "Mill")
            .expect("mill row");
        assert_eq!(mill.rows, 2);
    }

    #[test]
    fn rows_follow_department_order() {
        let tasks = pipeline(vec![]);
        let grid = build_schedule(&tasks, &DepartmentSelection::All, &DateWindow::around(d(2024, 1, 17)));
        let order: Vec<&str> = grid.row_counts.iter().map(|c| c.department.as_str()).collect();
        assert_eq!(order, vec!["Mill", "Cast", "Batch", "Layout", "Seal", "Ship"]);
    }

    #[test]
    fn rendering_twice_is_identical() {
        let tasks = pipeline(vec![]);
        let selection = DepartmentSelection::Only(vec!["Mill".into(), "Batch".into()]);
        let today = d(2024, 1, 17);
        assert_eq!(
            build_schedule(&tasks, &selection, &DateWindow::around(today)),
            build_schedule(&tasks, &selection, &DateWindow::around(today))
        );
    }

    #[test]
    fn current_week_is_added_outside_the_task_span() {
        let tasks = pipeline(vec![]);
        let today = d(2024, 3, 6);
        let grid = build_schedule(&tasks, &DepartmentSelection::All, &DateWindow::around(today));
        let mondays: Vec<NaiveDate> = grid.weeks.iter().map(|w| w.monday).collect();
        assert_eq!(mondays.last(), Some(&get_monday(today)));

        let index = initial_week_index(&mondays, today, None);
        assert_eq!(mondays[index], d(2024, 3, 4));
    }

    #[test]
    fn manual_task_lands_in_its_cell_with_day_counter() {
        let manual = Task {
            id: "manual-1".into(),
            project: "P9".into(),
            department: "Mill".into(),
            date: "2024-01-03".into(),
            day_number: "1".into(),
            total_days: "1".into(),
            is_manual: true,
            ..Default::default()
        };
        let tasks = pipeline(vec![manual]);
        let grid = build_schedule(&tasks, &DepartmentSelection::All, &DateWindow::around(d(2024, 1, 17)));

        let week = &grid.weeks[0];
        let mill = week.rows.iter().find(|r| r.department == "Mill").expect("mill");
        // Wednesday column.
        let task = mill.cells[0][2].task().expect("manual task in cell");
        assert_eq!(task.id, "manual-1");
        assert_eq!(task.day_counter, "Day 1 of 1");
    }

    #[test]
    fn batch_row_looks_ahead_to_casting() {
        let tasks = pipeline(vec![]);
        let grid = build_schedule(&tasks, &DepartmentSelection::All, &DateWindow::around(d(2024, 1, 17)));

        let week = &grid.weeks[1];
        let batch = week.rows.iter().find(|r| r.department == "Batch").expect("batch");
        assert_eq!(batch.cells.len(), 1);
        // Tuesday 01/09 looks at Wednesday 01/10 casting.
        let tuesday = batch.cells[0][1].task().expect("synthetic task");
        assert_eq!(tuesday.id, "batch-2024-01-09");
        assert_eq!(tuesday.description, "P1");
        // Saturday has no look-ahead.
        assert!(matches!(batch.cells[0][5], Cell::Placeholder { .. }));
    }

    #[test]
    fn filtering_hides_other_departments_but_keeps_look_ahead_rows() {
        let tasks = pipeline(vec![]);
        let selection = DepartmentSelection::Only(vec!["Ship".into()]);
        let grid = build_schedule(&tasks, &selection, &DateWindow::around(d(2024, 1, 17)));

        let departments: Vec<&str> = grid.row_counts.iter().map(|c| c.department.as_str()).collect();
        assert_eq!(departments, vec!["Batch", "Layout", "Ship"]);
    }
}
