//! External task sources and sinks.
//!
//! The board only talks to these through the traits below, so tests can swap
//! in in-memory fakes.

pub mod auth;
pub mod sheets;
pub mod store;

use async_trait::async_trait;
use thiserror::Error;

use crate::refresh::RefreshSignal;
use crate::types::{DescriptionChange, Task};

pub use auth::{ServiceAccountKey, TokenProvider};
pub use sheets::{SheetsClient, build_staging_requests, parse_sheet_rows};
pub use store::StoreClient;

/// Failure talking to the spreadsheet, token endpoint, or store.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("network error: {0}")]
    Network(String),

    #[error("request failed with status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to parse response data: {0}")]
    Decode(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Empty(String),
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SourceError::Decode(err.to_string())
        } else if let Some(status) = err.status() {
            SourceError::Status {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else {
            SourceError::Network(err.to_string())
        }
    }
}

/// Turn a non-success response into a `Status` error carrying the body.
pub(crate) async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, SourceError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    Err(SourceError::Status {
        status: status.as_u16(),
        body,
    })
}

/// Read-only source of spreadsheet tasks.
#[async_trait]
pub trait TaskSource: Send + Sync {
    async fn fetch_tasks(&self) -> Result<Vec<Task>, SourceError>;
}

/// Store of tasks created on the board.
#[async_trait]
pub trait ManualTaskStore: Send + Sync {
    async fn load_manual_tasks(&self) -> Result<Vec<Task>, SourceError>;

    async fn insert_task(&self, task: &Task) -> Result<(), SourceError>;

    /// Persist a task's `date` and `week`.
    async fn update_task_schedule(&self, task: &Task) -> Result<(), SourceError>;

    async fn delete_task(&self, id: &str) -> Result<(), SourceError>;
}

/// Writes per-project description edits to the staging sheet.
#[async_trait]
pub trait StagingWriter: Send + Sync {
    async fn save_to_staging(
        &self,
        project: &str,
        changes: &[DescriptionChange],
    ) -> Result<(), SourceError>;
}

/// Forwards refresh signals to clients outside this process.
#[async_trait]
pub trait SignalRelay: Send + Sync {
    async fn publish(&self, signal: &RefreshSignal) -> Result<(), SourceError>;
}
