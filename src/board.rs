//! Application state for the board.
//!
//! The merged task list lives in an immutable snapshot swapped atomically on
//! every change; derived views (grid, search, build plan) are computed from a
//! snapshot by pure functions. Edits are applied optimistically, tracked as
//! pending mutations, and rolled back if the remote write fails.

use std::collections::HashSet;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use arc_swap::ArcSwap;
use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::BoardConfig;
use crate::dates::{get_monday, local_date_string, parse_date};
use crate::departments::same_department;
use crate::error::{ErrorCode, ScheduleError, ScheduleResult};
use crate::grid::{
    BoardLayout, DateWindow, ScheduleGrid, WeekGrid, initial_week_index, out_of_window,
};
use crate::merge::{DepartmentSelection, compute_day_counts, merge_tasks};
use crate::projects::{BuildPlan, ProjectSummary, build_plan, search_projects};
use crate::refresh::RefreshHub;
use crate::sources::{ManualTaskStore, SourceError, StagingWriter, TaskSource};
use crate::types::{DescriptionChange, DescriptionEdit, NewTask, Task};

/// Message used when a write fails and the local change is kept.
pub const SYNC_FAILED: &str = "Saved locally, sync failed";

/// How a reload reports failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadMode {
    /// User-initiated: failures set the error banner.
    Foreground,
    /// Background: failures are only logged.
    Silent,
}

/// Immutable view of the board at one point in time.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BoardSnapshot {
    pub tasks: Vec<Task>,
    pub loaded_at: Option<DateTime<Utc>>,
    pub last_error: Option<ScheduleError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Move,
    Add,
    Delete,
    Description,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationStatus {
    Pending,
    Confirmed,
    Failed,
}

/// A single rendered week and its position on the board.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeekView {
    pub week: Option<WeekGrid>,
    pub index: usize,
    pub total: usize,
}

/// A local edit and what happened to its remote write.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Mutation {
    pub id: u64,
    pub kind: MutationKind,
    pub task_id: String,
    pub status: MutationStatus,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
}

/// Removes a submission fingerprint when the add completes.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<String>>,
    key: String,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if let Ok(mut set) = self.set.lock() {
            set.remove(&self.key);
        }
    }
}

/// The board's single state store.
pub struct Board {
    sheet: Arc<dyn TaskSource>,
    store: Arc<dyn ManualTaskStore>,
    staging: Arc<dyn StagingWriter>,
    hub: RefreshHub,
    settings: BoardConfig,
    snapshot: ArcSwap<BoardSnapshot>,
    generation: AtomicU64,
    next_mutation: AtomicU64,
    last_manual_id: AtomicI64,
    mutations: Mutex<Vec<Mutation>>,
    in_flight: Mutex<HashSet<String>>,
}

impl Board {
    pub fn new(
        sheet: Arc<dyn TaskSource>,
        store: Arc<dyn ManualTaskStore>,
        staging: Arc<dyn StagingWriter>,
        hub: RefreshHub,
        settings: BoardConfig,
    ) -> Self {
        Self {
            sheet,
            store,
            staging,
            hub,
            settings,
            snapshot: ArcSwap::from_pointee(BoardSnapshot::default()),
            generation: AtomicU64::new(0),
            next_mutation: AtomicU64::new(1),
            last_manual_id: AtomicI64::new(0),
            mutations: Mutex::new(Vec::new()),
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn hub(&self) -> &RefreshHub {
        &self.hub
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<BoardSnapshot> {
        self.snapshot.load_full()
    }

    /// Fetch both sources, merge, and publish a new snapshot.
    ///
    /// A reload whose response arrives after a newer reload has started is
    /// discarded, so stale data never overwrites fresh data.
    pub async fn reload(&self, mode: LoadMode) -> ScheduleResult<Arc<BoardSnapshot>> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let started = Instant::now();

        let result = self.fetch_merged().await;

        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(generation, "Discarding stale reload result");
            return result.map(|_| self.snapshot());
        }

        match result {
            Ok(tasks) => {
                let count = tasks.len();
                let window = self.window(Local::now().date_naive());
                for task in out_of_window(&tasks, &window) {
                    warn!(
                        task_id = %task.id,
                        date = %task.date,
                        "Task date outside the board window, showing it in the current week"
                    );
                }
                self.snapshot.store(Arc::new(BoardSnapshot {
                    tasks,
                    loaded_at: Some(Utc::now()),
                    last_error: None,
                }));
                info!(
                    tasks = count,
                    duration_ms = started.elapsed().as_millis() as u64,
                    "Board reloaded"
                );
                Ok(self.snapshot())
            }
            Err(err) => {
                match mode {
                    LoadMode::Foreground => {
                        warn!(error = %err, "Board reload failed");
                        let banner = err.clone();
                        self.snapshot.rcu(|current| BoardSnapshot {
                            last_error: Some(banner.clone()),
                            ..BoardSnapshot::clone(current)
                        });
                    }
                    LoadMode::Silent => {
                        warn!(error = %err, "Background reload failed");
                    }
                }
                Err(err)
            }
        }
    }

    async fn fetch_merged(&self) -> ScheduleResult<Vec<Task>> {
        let sheet = self.sheet.fetch_tasks().await?;
        let manual = self.store.load_manual_tasks().await?;
        let mut merged = merge_tasks(sheet, manual);
        compute_day_counts(&mut merged);
        Ok(merged)
    }

    fn find_task(&self, id: &str) -> ScheduleResult<Task> {
        self.snapshot
            .load()
            .tasks
            .iter()
            .find(|t| t.id == id)
            .cloned()
            .ok_or_else(|| ScheduleError::task_not_found(id))
    }

    /// Replace tasks by id in the current snapshot.
    fn replace_tasks(&self, updated: &[Task]) {
        self.snapshot.rcu(|current| {
            let mut next = BoardSnapshot::clone(current);
            for task in updated {
                if let Some(slot) = next.tasks.iter_mut().find(|t| t.id == task.id) {
                    *slot = task.clone();
                }
            }
            compute_day_counts(&mut next.tasks);
            next
        });
    }

    fn remove_task(&self, id: &str) -> Option<usize> {
        let mut removed_at = None;
        self.snapshot.rcu(|current| {
            let mut next = BoardSnapshot::clone(current);
            removed_at = next.tasks.iter().position(|t| t.id == id);
            if let Some(index) = removed_at {
                next.tasks.remove(index);
            }
            next
        });
        removed_at
    }

    fn restore_task(&self, task: &Task, index: usize) {
        self.snapshot.rcu(|current| {
            let mut next = BoardSnapshot::clone(current);
            if !next.tasks.iter().any(|t| t.id == task.id) {
                let at = index.min(next.tasks.len());
                next.tasks.insert(at, task.clone());
            }
            next
        });
    }

    fn begin(&self, kind: MutationKind, task_id: &str) -> u64 {
        let id = self.next_mutation.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut log) = self.mutations.lock() {
            log.push(Mutation {
                id,
                kind,
                task_id: task_id.to_string(),
                status: MutationStatus::Pending,
                error: None,
                started_at: Utc::now(),
            });
            let overflow = log.len().saturating_sub(self.settings.mutation_history.max(1));
            log.drain(..overflow);
        }
        id
    }

    fn settle(&self, id: u64, error: Option<&SourceError>) {
        if let Ok(mut log) = self.mutations.lock()
            && let Some(entry) = log.iter_mut().find(|m| m.id == id)
        {
            match error {
                None => entry.status = MutationStatus::Confirmed,
                Some(e) => {
                    entry.status = MutationStatus::Failed;
                    entry.error = Some(e.to_string());
                }
            }
        }
    }

    /// Recent mutations, oldest first.
    pub fn mutations(&self) -> Vec<Mutation> {
        self.mutations.lock().map(|log| log.clone()).unwrap_or_default()
    }

    /// Signal other clients, then reconcile with a silent reload. A failed
    /// reload never undoes a confirmed write.
    async fn after_write(&self, action: &str, task_id: &str) {
        self.hub
            .publish(json!({ "action": action, "taskId": task_id }))
            .await;
        let _ = self.reload(LoadMode::Silent).await;
    }

    fn write_failed(&self, err: SourceError) -> ScheduleError {
        let base: ScheduleError = err.into();
        if self.settings.rollback_on_failure {
            base
        } else {
            ScheduleError::new(base.code, format!("{}: {}", SYNC_FAILED, base.message))
        }
    }

    /// Move a manual task to another date in the same department.
    pub async fn move_task(
        &self,
        id: &str,
        target_department: &str,
        new_date: &str,
    ) -> ScheduleResult<Task> {
        let original = self.find_task(id)?;
        if !original.is_editable() {
            return Err(ScheduleError::not_editable(id));
        }
        if !same_department(target_department, &original.department) {
            return Err(ScheduleError::department_mismatch());
        }
        let date = parse_date(new_date)
            .ok_or_else(|| ScheduleError::invalid_value("date", "Invalid date"))?;
        if original.parsed_date() == Some(date) {
            return Err(ScheduleError::same_date());
        }

        let mut moved = original.clone();
        moved.date = local_date_string(date);
        moved.week = local_date_string(get_monday(date));

        self.replace_tasks(std::slice::from_ref(&moved));
        let mutation = self.begin(MutationKind::Move, id);

        match self.store.update_task_schedule(&moved).await {
            Ok(()) => {
                self.settle(mutation, None);
                info!(task_id = %id, date = %moved.date, "Task moved");
                self.after_write("task_moved", id).await;
                Ok(moved)
            }
            Err(e) => {
                warn!(task_id = %id, error = %e, "Failed to persist task move");
                self.settle(mutation, Some(&e));
                if self.settings.rollback_on_failure {
                    self.replace_tasks(std::slice::from_ref(&original));
                }
                Err(self.write_failed(e))
            }
        }
    }

    fn next_manual_id(&self) -> String {
        let now = Utc::now().timestamp_millis();
        let mut last = self.last_manual_id.load(Ordering::SeqCst);
        loop {
            let candidate = now.max(last + 1);
            match self.last_manual_id.compare_exchange(
                last,
                candidate,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return format!("manual-{}", candidate),
                Err(actual) => last = actual,
            }
        }
    }

    /// Create a manual task in the store.
    ///
    /// An identical submission already in flight is rejected.
    pub async fn add_task(&self, new_task: NewTask) -> ScheduleResult<Task> {
        new_task.validate()?;
        if parse_date(&new_task.date).is_none() {
            return Err(ScheduleError::invalid_value("date", "Invalid date"));
        }

        let key = new_task.fingerprint();
        {
            let mut set = self
                .in_flight
                .lock()
                .map_err(|_| ScheduleError::internal("submission guard poisoned"))?;
            if !set.insert(key.clone()) {
                return Err(ScheduleError::duplicate_submission());
            }
        }
        let _guard = InFlight {
            set: &self.in_flight,
            key,
        };

        let task = new_task.into_task(self.next_manual_id());
        let mutation = self.begin(MutationKind::Add, &task.id);

        match self.store.insert_task(&task).await {
            Ok(()) => {
                self.settle(mutation, None);
                info!(task_id = %task.id, project = %task.project, "Task added");
                self.after_write("task_added", &task.id).await;
                Ok(task)
            }
            Err(e) => {
                warn!(error = %e, "Failed to add task");
                self.settle(mutation, Some(&e));
                Err(e.into())
            }
        }
    }

    /// Delete a manual task.
    pub async fn delete_task(&self, id: &str) -> ScheduleResult<()> {
        let original = self.find_task(id)?;
        if !original.is_editable() {
            return Err(ScheduleError::not_editable(id));
        }

        let position = self.remove_task(id);
        let mutation = self.begin(MutationKind::Delete, id);

        match self.store.delete_task(id).await {
            Ok(()) => {
                self.settle(mutation, None);
                info!(task_id = %id, "Task deleted");
                self.after_write("task_deleted", id).await;
                Ok(())
            }
            Err(e) => {
                warn!(task_id = %id, error = %e, "Failed to delete task");
                self.settle(mutation, Some(&e));
                if self.settings.rollback_on_failure
                    && let Some(index) = position
                {
                    self.restore_task(&original, index);
                }
                Err(self.write_failed(e))
            }
        }
    }

    /// Apply description edits locally, then push them to the staging sheet.
    async fn sync_descriptions(
        &self,
        project: &str,
        originals: Vec<Task>,
        updated: Vec<Task>,
    ) -> ScheduleResult<usize> {
        let changes: Vec<DescriptionChange> = updated
            .iter()
            .map(|t| DescriptionChange {
                task: t.clone(),
                new_text: t.description.clone(),
            })
            .collect();

        self.replace_tasks(&updated);
        let mutations: Vec<u64> = updated
            .iter()
            .map(|t| self.begin(MutationKind::Description, &t.id))
            .collect();

        match self.staging.save_to_staging(project, &changes).await {
            Ok(()) => {
                for m in mutations {
                    self.settle(m, None);
                }
                info!(project = %project, count = changes.len(), "Descriptions saved");
                self.hub
                    .publish(json!({ "action": "descriptions_updated", "project": project }))
                    .await;
                Ok(changes.len())
            }
            Err(e) => {
                warn!(project = %project, error = %e, "Failed to save descriptions");
                for m in &mutations {
                    self.settle(*m, Some(&e));
                }
                if self.settings.rollback_on_failure {
                    self.replace_tasks(&originals);
                }
                Err(self.write_failed(e))
            }
        }
    }

    /// Inline description edit of one task.
    pub async fn update_description(&self, id: &str, text: &str) -> ScheduleResult<Task> {
        let original = self.find_task(id)?;
        if original.is_synthetic() {
            return Err(ScheduleError::not_editable(id));
        }
        let mut updated = original.clone();
        updated.description = text.to_string();
        let project = original.project.clone();
        self.sync_descriptions(&project, vec![original], vec![updated.clone()])
            .await?;
        Ok(updated)
    }

    /// Build-plan edit: several descriptions of one project at once.
    ///
    /// Unchanged descriptions are skipped. Returns how many were saved.
    pub async fn save_project_descriptions(
        &self,
        project: &str,
        edits: &[DescriptionEdit],
    ) -> ScheduleResult<usize> {
        let mut originals = Vec::new();
        let mut updated = Vec::new();
        for edit in edits {
            let task = self.find_task(&edit.task_id)?;
            if task.project.trim() != project.trim() {
                return Err(ScheduleError::new(
                    ErrorCode::InvalidFieldValue,
                    format!("Task {} does not belong to project {}", task.id, project),
                )
                .with_field("taskId"));
            }
            if task.description == edit.text {
                continue;
            }
            let mut changed = task.clone();
            changed.description = edit.text.clone();
            originals.push(task);
            updated.push(changed);
        }

        if updated.is_empty() {
            return Ok(0);
        }
        self.sync_descriptions(project, originals, updated).await
    }

    /// Dates the board lays out around `today`.
    pub fn window(&self, today: NaiveDate) -> DateWindow {
        DateWindow::new(today, self.settings.max_week_span)
    }

    /// Grid for a selection, plus the week index to show first.
    pub fn grid(
        &self,
        selection: &DepartmentSelection,
        today: NaiveDate,
        saved_index: Option<usize>,
    ) -> (ScheduleGrid, usize) {
        let snapshot = self.snapshot.load();
        let layout = BoardLayout::new(&snapshot.tasks, selection, &self.window(today));
        let index = initial_week_index(&layout.weeks, today, saved_index);
        (layout.schedule(), index)
    }

    fn view(
        &self,
        selection: &DepartmentSelection,
        today: NaiveDate,
        pick: impl FnOnce(&[NaiveDate]) -> Option<usize>,
    ) -> Option<WeekView> {
        let snapshot = self.snapshot.load();
        let layout = BoardLayout::new(&snapshot.tasks, selection, &self.window(today));
        let index = pick(&layout.weeks)?;
        Some(WeekView {
            week: layout.weeks.get(index).map(|monday| layout.week(*monday)),
            index,
            total: layout.weeks.len(),
        })
    }

    /// One week of the grid, laid out with the same rows as every other week.
    /// Only that week is rendered.
    pub fn week_view(
        &self,
        selection: &DepartmentSelection,
        today: NaiveDate,
        saved_index: Option<usize>,
    ) -> WeekView {
        self.view(selection, today, |weeks| {
            Some(initial_week_index(weeks, today, saved_index))
        })
        .unwrap_or(WeekView {
            week: None,
            index: 0,
            total: 0,
        })
    }

    /// The week starting `monday`, if the board has it.
    pub fn week_view_at(
        &self,
        selection: &DepartmentSelection,
        today: NaiveDate,
        monday: NaiveDate,
    ) -> Option<WeekView> {
        self.view(selection, today, |weeks| weeks.iter().position(|m| *m == monday))
    }

    pub fn search(&self, query: &str) -> Vec<ProjectSummary> {
        search_projects(&self.snapshot.load().tasks, query)
    }

    pub fn build_plan(&self, project: &str) -> ScheduleResult<BuildPlan> {
        build_plan(&self.snapshot.load().tasks, project)
            .ok_or_else(|| ScheduleError::project_not_found(project))
    }
}
