//! Integration tests for the board store.
//!
//! The remote sources are replaced with in-memory fakes implementing the
//! source traits, so no test touches the network.

use async_trait::async_trait;
use chrono::NaiveDate;
use shop_schedule::board::{Board, LoadMode, MutationKind, MutationStatus, SYNC_FAILED};
use shop_schedule::config::BoardConfig;
use shop_schedule::error::{ErrorCategory, ErrorCode};
use shop_schedule::merge::DepartmentSelection;
use shop_schedule::refresh::RefreshHub;
use shop_schedule::sources::{ManualTaskStore, SourceError, StagingWriter, TaskSource};
use shop_schedule::types::{DescriptionChange, DescriptionEdit, NewTask, Task};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Sheet that replays queued responses, then repeats its base list.
#[derive(Default)]
struct FakeSheet {
    base: Mutex<Vec<Task>>,
    queued: Mutex<VecDeque<(Duration, Vec<Task>)>>,
    fail: AtomicBool,
}

#[async_trait]
impl TaskSource for FakeSheet {
    async fn fetch_tasks(&self) -> Result<Vec<Task>, SourceError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SourceError::Network("connection refused".into()));
        }
        let next = self.queued.lock().unwrap().pop_front();
        match next {
            Some((delay, tasks)) => {
                tokio::time::sleep(delay).await;
                Ok(tasks)
            }
            None => Ok(self.base.lock().unwrap().clone()),
        }
    }
}

#[derive(Default)]
struct FakeStore {
    tasks: Mutex<Vec<Task>>,
    fail_loads: AtomicBool,
    fail_writes: AtomicBool,
    insert_delay: Mutex<Option<Duration>>,
}

impl FakeStore {
    fn write_result(&self) -> Result<(), SourceError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(SourceError::Status {
                status: 503,
                body: "unavailable".into(),
            })
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ManualTaskStore for FakeStore {
    async fn load_manual_tasks(&self) -> Result<Vec<Task>, SourceError> {
        if self.fail_loads.load(Ordering::SeqCst) {
            return Err(SourceError::Decode("invalid json".into()));
        }
        Ok(self.tasks.lock().unwrap().clone())
    }

    async fn insert_task(&self, task: &Task) -> Result<(), SourceError> {
        let delay = *self.insert_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.write_result()?;
        self.tasks.lock().unwrap().push(task.clone());
        Ok(())
    }

    async fn update_task_schedule(&self, task: &Task) -> Result<(), SourceError> {
        self.write_result()?;
        let mut tasks = self.tasks.lock().unwrap();
        if let Some(slot) = tasks.iter_mut().find(|t| t.id == task.id) {
            *slot = task.clone();
        }
        Ok(())
    }

    async fn delete_task(&self, id: &str) -> Result<(), SourceError> {
        self.write_result()?;
        self.tasks.lock().unwrap().retain(|t| t.id != id);
        Ok(())
    }
}

#[derive(Default)]
struct FakeStaging {
    calls: Mutex<Vec<(String, Vec<DescriptionChange>)>>,
    fail: AtomicBool,
}

#[async_trait]
impl StagingWriter for FakeStaging {
    async fn save_to_staging(
        &self,
        project: &str,
        changes: &[DescriptionChange],
    ) -> Result<(), SourceError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(SourceError::Empty("Staging sheet not found".into()));
        }
        self.calls
            .lock()
            .unwrap()
            .push((project.to_string(), changes.to_vec()));
        Ok(())
    }
}

struct Harness {
    sheet: Arc<FakeSheet>,
    store: Arc<FakeStore>,
    staging: Arc<FakeStaging>,
    board: Board,
}

fn sheet_task(id: &str, project: &str, department: &str, date: &str) -> Task {
    Task {
        id: id.into(),
        project: project.into(),
        department: department.into(),
        date: date.into(),
        hours: "4".into(),
        ..Default::default()
    }
}

fn manual_task(id: &str, project: &str, department: &str, date: &str) -> Task {
    Task {
        is_manual: true,
        ..sheet_task(id, project, department, date)
    }
}

fn harness_with(settings: BoardConfig, sheet: Vec<Task>, manual: Vec<Task>) -> Harness {
    let sheet_src = Arc::new(FakeSheet::default());
    *sheet_src.base.lock().unwrap() = sheet;
    let store = Arc::new(FakeStore::default());
    *store.tasks.lock().unwrap() = manual;
    let staging = Arc::new(FakeStaging::default());
    let board = Board::new(
        sheet_src.clone(),
        store.clone(),
        staging.clone(),
        RefreshHub::new(16, "test"),
        settings,
    );
    Harness {
        sheet: sheet_src,
        store,
        staging,
        board,
    }
}

fn harness(sheet: Vec<Task>, manual: Vec<Task>) -> Harness {
    harness_with(BoardConfig::default(), sheet, manual)
}

mod reload_tests {
    use super::*;

    #[tokio::test]
    async fn manual_task_replaces_sheet_task_with_same_id() {
        let h = harness(
            vec![
                sheet_task("task-1", "P1", "Mill", "01/08/2024"),
                sheet_task("task-2", "P2", "Cast", "01/09/2024"),
            ],
            vec![manual_task("task-2", "P2-manual", "Cast", "2024-01-10")],
        );

        let snapshot = h.board.reload(LoadMode::Foreground).await.expect("reload");
        assert_eq!(snapshot.tasks.len(), 2);
        assert_eq!(snapshot.tasks[0].id, "task-1");
        assert_eq!(snapshot.tasks[1].project, "P2-manual");
        assert!(snapshot.tasks[1].is_manual);
        assert!(snapshot.loaded_at.is_some());
        assert!(snapshot.last_error.is_none());
    }

    #[tokio::test]
    async fn day_counter_and_missing_date_are_derived() {
        let mut task = sheet_task("task-1", "P1", "Mill", "");
        task.day_number = "2".into();
        task.total_days = "3".into();
        let h = harness(vec![task], vec![]);

        let snapshot = h.board.reload(LoadMode::Foreground).await.expect("reload");
        assert_eq!(snapshot.tasks[0].day_counter, "Day 2 of 3");
        assert!(snapshot.tasks[0].missing_date);
    }

    #[tokio::test]
    async fn foreground_failure_sets_banner_and_keeps_tasks() {
        let h = harness(vec![sheet_task("task-1", "P1", "Mill", "01/08/2024")], vec![]);
        h.board.reload(LoadMode::Foreground).await.expect("first reload");

        h.sheet.fail.store(true, Ordering::SeqCst);
        let err = h.board.reload(LoadMode::Foreground).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::NetworkError);

        let snapshot = h.board.snapshot();
        assert_eq!(snapshot.tasks.len(), 1);
        let banner = snapshot.last_error.as_ref().expect("banner set");
        assert_eq!(banner.category(), ErrorCategory::Network);
    }

    #[tokio::test]
    async fn silent_failure_leaves_no_banner() {
        let h = harness(vec![sheet_task("task-1", "P1", "Mill", "01/08/2024")], vec![]);
        h.board.reload(LoadMode::Foreground).await.expect("first reload");

        h.sheet.fail.store(true, Ordering::SeqCst);
        assert!(h.board.reload(LoadMode::Silent).await.is_err());

        let snapshot = h.board.snapshot();
        assert!(snapshot.last_error.is_none());
        assert_eq!(snapshot.tasks.len(), 1);
    }

    #[tokio::test]
    async fn successful_reload_clears_banner() {
        let h = harness(vec![sheet_task("task-1", "P1", "Mill", "01/08/2024")], vec![]);
        h.sheet.fail.store(true, Ordering::SeqCst);
        let _ = h.board.reload(LoadMode::Foreground).await;
        assert!(h.board.snapshot().last_error.is_some());

        h.sheet.fail.store(false, Ordering::SeqCst);
        h.board.reload(LoadMode::Foreground).await.expect("reload");
        assert!(h.board.snapshot().last_error.is_none());
    }

    #[tokio::test]
    async fn store_failure_aborts_the_merge() {
        let h = harness(vec![sheet_task("task-1", "P1", "Mill", "01/08/2024")], vec![]);
        h.store.fail_loads.store(true, Ordering::SeqCst);

        let err = h.board.reload(LoadMode::Foreground).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::DataError);
        assert!(h.board.snapshot().tasks.is_empty());
    }

    #[tokio::test]
    async fn stale_reload_is_discarded() {
        let h = harness(vec![], vec![]);
        h.sheet.queued.lock().unwrap().extend([
            (
                Duration::from_millis(150),
                vec![sheet_task("old", "Old", "Mill", "01/08/2024")],
            ),
            (
                Duration::from_millis(0),
                vec![sheet_task("new", "New", "Mill", "01/08/2024")],
            ),
        ]);

        let (slow, fast) = tokio::join!(
            h.board.reload(LoadMode::Silent),
            h.board.reload(LoadMode::Silent)
        );
        assert!(slow.is_ok());
        assert!(fast.is_ok());

        let snapshot = h.board.snapshot();
        assert_eq!(snapshot.tasks.len(), 1);
        assert_eq!(snapshot.tasks[0].id, "new");
    }
}

mod move_tests {
    use super::*;

    #[tokio::test]
    async fn move_updates_date_week_and_signals() {
        let h = harness(vec![], vec![manual_task("manual-1", "P1", "Mill", "01/08/2024")]);
        h.board.reload(LoadMode::Foreground).await.expect("reload");
        let mut rx = h.board.hub().subscribe();

        let moved = h
            .board
            .move_task("manual-1", "Mill", "01/11/2024")
            .await
            .expect("move");
        assert_eq!(moved.date, "2024-01-11");
        assert_eq!(moved.week, "2024-01-08");

        let signal = rx.try_recv().expect("signal published");
        assert_eq!(signal.info["action"], "task_moved");
        assert_eq!(signal.info["taskId"], "manual-1");

        let snapshot = h.board.snapshot();
        assert_eq!(snapshot.tasks[0].date, "2024-01-11");

        let mutations = h.board.mutations();
        assert_eq!(mutations.len(), 1);
        assert_eq!(mutations[0].kind, MutationKind::Move);
        assert_eq!(mutations[0].status, MutationStatus::Confirmed);
    }

    #[tokio::test]
    async fn failed_move_rolls_back() {
        let h = harness(vec![], vec![manual_task("manual-1", "P1", "Mill", "01/08/2024")]);
        h.board.reload(LoadMode::Foreground).await.expect("reload");
        h.store.fail_writes.store(true, Ordering::SeqCst);

        let err = h
            .board
            .move_task("manual-1", "Mill", "01/11/2024")
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::UpstreamError);
        assert_eq!(h.board.snapshot().tasks[0].date, "01/08/2024");

        let mutations = h.board.mutations();
        assert_eq!(mutations[0].status, MutationStatus::Failed);
        assert!(mutations[0].error.is_some());
    }

    #[tokio::test]
    async fn failed_move_without_rollback_keeps_local_change() {
        let settings = BoardConfig {
            rollback_on_failure: false,
            ..Default::default()
        };
        let h = harness_with(
            settings,
            vec![],
            vec![manual_task("manual-1", "P1", "Mill", "01/08/2024")],
        );
        h.board.reload(LoadMode::Foreground).await.expect("reload");
        h.store.fail_writes.store(true, Ordering::SeqCst);

        let err = h
            .board
            .move_task("manual-1", "Mill", "01/11/2024")
            .await
            .unwrap_err();
        assert!(err.message.starts_with(SYNC_FAILED));
        assert_eq!(h.board.snapshot().tasks[0].date, "2024-01-11");
    }

    #[tokio::test]
    async fn sheet_tasks_cannot_move() {
        let h = harness(vec![sheet_task("task-1", "P1", "Mill", "01/08/2024")], vec![]);
        h.board.reload(LoadMode::Foreground).await.expect("reload");

        let err = h
            .board
            .move_task("task-1", "Mill", "01/09/2024")
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::NotEditable);
    }

    #[tokio::test]
    async fn move_rejects_other_department_and_same_date() {
        let h = harness(vec![], vec![manual_task("manual-1", "P1", "Mill", "01/08/2024")]);
        h.board.reload(LoadMode::Foreground).await.expect("reload");

        let err = h
            .board
            .move_task("manual-1", "Cast", "01/09/2024")
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::DepartmentMismatch);

        let err = h
            .board
            .move_task("manual-1", "Mill", "2024-01-08")
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::SameDate);

        let err = h
            .board
            .move_task("missing", "Mill", "2024-01-09")
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::TaskNotFound);
    }
}

mod move_department_tests {
    use super::*;

    #[tokio::test]
    async fn unknown_department_matches_case_insensitively() {
        let h = harness(vec![], vec![manual_task("manual-1", "P1", "Paint", "01/08/2024")]);
        h.board.reload(LoadMode::Foreground).await.expect("reload");

        let moved = h
            .board
            .move_task("manual-1", "paint", "01/10/2024")
            .await
            .expect("move");
        assert_eq!(moved.department, "Paint");
        assert_eq!(moved.date, "2024-01-10");
    }
}

mod add_delete_tests {
    use super::*;

    fn new_task() -> NewTask {
        NewTask {
            project: "P9".into(),
            department: "mill".into(),
            date: "01/10/2024".into(),
            description: "rough cut".into(),
            hours: "3".into(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn add_creates_manual_task() {
        let h = harness(vec![], vec![]);
        h.board.reload(LoadMode::Foreground).await.expect("reload");

        let task = h.board.add_task(new_task()).await.expect("add");
        assert!(task.id.starts_with("manual-"));
        assert!(task.is_manual);
        assert_eq!(task.week, "2024-01-08");

        // The silent reload after the write picks the task up from the store.
        let snapshot = h.board.snapshot();
        assert!(snapshot.tasks.iter().any(|t| t.id == task.id));
    }

    #[tokio::test]
    async fn add_reports_all_missing_fields() {
        let h = harness(vec![], vec![]);
        let err = h.board.add_task(NewTask::default()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::MissingRequiredField);
        assert_eq!(err.field.as_deref(), Some("project"));
        assert_eq!(err.message.lines().count(), 3);
    }

    #[tokio::test]
    async fn duplicate_submission_in_flight_is_rejected() {
        let h = harness(vec![], vec![]);
        *h.store.insert_delay.lock().unwrap() = Some(Duration::from_millis(100));

        let (first, second) = tokio::join!(h.board.add_task(new_task()), h.board.add_task(new_task()));
        assert!(first.is_ok());
        assert_eq!(second.unwrap_err().code, ErrorCode::DuplicateSubmission);

        // The guard is released once the first add completes.
        *h.store.insert_delay.lock().unwrap() = None;
        assert!(h.board.add_task(new_task()).await.is_ok());
    }

    #[tokio::test]
    async fn failed_delete_restores_task_in_place() {
        let h = harness(
            vec![],
            vec![
                manual_task("manual-1", "P1", "Mill", "01/08/2024"),
                manual_task("manual-2", "P2", "Mill", "01/09/2024"),
            ],
        );
        h.board.reload(LoadMode::Foreground).await.expect("reload");
        h.store.fail_writes.store(true, Ordering::SeqCst);

        assert!(h.board.delete_task("manual-1").await.is_err());
        let ids: Vec<String> = h.board.snapshot().tasks.iter().map(|t| t.id.clone()).collect();
        assert_eq!(ids, vec!["manual-1", "manual-2"]);
    }

    #[tokio::test]
    async fn delete_removes_task() {
        let h = harness(vec![], vec![manual_task("manual-1", "P1", "Mill", "01/08/2024")]);
        h.board.reload(LoadMode::Foreground).await.expect("reload");

        h.board.delete_task("manual-1").await.expect("delete");
        assert!(h.board.snapshot().tasks.is_empty());
    }
}

mod description_tests {
    use super::*;

    #[tokio::test]
    async fn project_edits_skip_unchanged_descriptions() {
        let mut first = sheet_task("task-1", "P1", "Mill", "01/08/2024");
        first.description = "rough".into();
        let mut second = sheet_task("task-2", "P1", "Cast", "01/09/2024");
        second.description = "pour".into();
        let h = harness(vec![first, second], vec![]);
        h.board.reload(LoadMode::Foreground).await.expect("reload");

        let saved = h
            .board
            .save_project_descriptions(
                "P1",
                &[
                    DescriptionEdit {
                        task_id: "task-1".into(),
                        text: "rough".into(),
                    },
                    DescriptionEdit {
                        task_id: "task-2".into(),
                        text: "pour twice".into(),
                    },
                ],
            )
            .await
            .expect("save");
        assert_eq!(saved, 1);

        let calls = h.staging.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "P1");
        assert_eq!(calls[0].1[0].new_text, "pour twice");
        drop(calls);

        let snapshot = h.board.snapshot();
        assert_eq!(snapshot.tasks[1].description, "pour twice");
    }

    #[tokio::test]
    async fn failed_staging_write_rolls_back_descriptions() {
        let mut task = sheet_task("task-1", "P1", "Mill", "01/08/2024");
        task.description = "rough".into();
        let h = harness(vec![task], vec![]);
        h.board.reload(LoadMode::Foreground).await.expect("reload");
        h.staging.fail.store(true, Ordering::SeqCst);

        let err = h
            .board
            .update_description("task-1", "finish")
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::DataError);
        assert_eq!(h.board.snapshot().tasks[0].description, "rough");
    }

    #[tokio::test]
    async fn edits_must_belong_to_project() {
        let h = harness(vec![sheet_task("task-1", "P1", "Mill", "01/08/2024")], vec![]);
        h.board.reload(LoadMode::Foreground).await.expect("reload");

        let err = h
            .board
            .save_project_descriptions(
                "P2",
                &[DescriptionEdit {
                    task_id: "task-1".into(),
                    text: "x".into(),
                }],
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidFieldValue);
    }
}

mod view_tests {
    use super::*;

    #[tokio::test]
    async fn build_plan_for_unknown_project_fails() {
        let h = harness(vec![sheet_task("task-1", "P1", "Mill", "01/08/2024")], vec![]);
        h.board.reload(LoadMode::Foreground).await.expect("reload");

        assert_eq!(
            h.board.build_plan("Nope").unwrap_err().code,
            ErrorCode::ProjectNotFound
        );
        let plan = h.board.build_plan("P1").expect("plan");
        assert_eq!(plan.total_hours, 4);
    }

    #[tokio::test]
    async fn mistyped_year_does_not_stretch_the_board() {
        let h = harness(
            vec![
                sheet_task("task-1", "P1", "Mill", "03/15/2024"),
                sheet_task("task-2", "P1", "Mill", "03/15/20244"),
            ],
            vec![],
        );
        h.board.reload(LoadMode::Foreground).await.expect("reload");

        let today = NaiveDate::from_ymd_opt(2024, 3, 13).expect("date");
        let view = h.board.week_view(&DepartmentSelection::All, today, None);
        assert_eq!(view.total, 1);
        assert_eq!(view.index, 0);
        let week = view.week.expect("current week");
        assert_eq!(week.monday, NaiveDate::from_ymd_opt(2024, 3, 11).expect("date"));

        let (grid, _) = h.board.grid(&DepartmentSelection::All, today, None);
        assert_eq!(grid.weeks.len(), 1);
    }

    #[tokio::test]
    async fn week_view_at_finds_requested_monday() {
        let h = harness(
            vec![
                sheet_task("task-1", "P1", "Mill", "01/08/2024"),
                sheet_task("task-2", "P1", "Mill", "01/22/2024"),
            ],
            vec![],
        );
        h.board.reload(LoadMode::Foreground).await.expect("reload");

        let today = NaiveDate::from_ymd_opt(2024, 1, 17).expect("date");
        let monday = NaiveDate::from_ymd_opt(2024, 1, 22).expect("date");
        let view = h
            .board
            .week_view_at(&DepartmentSelection::All, today, monday)
            .expect("week on board");
        assert_eq!(view.index, 2);
        assert_eq!(view.total, 3);
        assert_eq!(view.week.expect("week").monday, monday);

        let missing = NaiveDate::from_ymd_opt(2025, 1, 6).expect("date");
        assert!(h.board.week_view_at(&DepartmentSelection::All, today, missing).is_none());
    }

    #[tokio::test]
    async fn search_is_case_insensitive() {
        let h = harness(
            vec![
                sheet_task("task-1", "Alpha Frame", "Mill", "01/08/2024"),
                sheet_task("task-2", "Beta", "Mill", "01/08/2024"),
            ],
            vec![],
        );
        h.board.reload(LoadMode::Foreground).await.expect("reload");

        let results = h.board.search("frame");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].project, "Alpha Frame");
    }
}
