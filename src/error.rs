//! Structured errors for board operations.
//!
//! Upstream services give no usable error codes, so the user-facing category is
//! derived by matching keywords in the message text.

use serde::Serialize;
use std::fmt;

use crate::sources::SourceError;

/// Error codes for programmatic error handling.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Validation errors
    MissingRequiredField,
    InvalidFieldValue,
    DepartmentMismatch,
    SameDate,
    DuplicateSubmission,
    IncorrectPassword,

    // Not found / permission
    TaskNotFound,
    ProjectNotFound,
    NotEditable,

    // Upstream errors
    NetworkError,
    AuthError,
    DataError,
    UpstreamError,

    // Internal errors
    InternalError,
}

/// Coarse category used to choose the banner text.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Network,
    Auth,
    Data,
    Validation,
    Unknown,
}

/// Classify an error message by keyword.
pub fn classify(message: &str) -> ErrorCategory {
    let lowered = message.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| lowered.contains(w));

    if has(&["network", "fetch", "timeout", "timed out", "connection"]) {
        ErrorCategory::Network
    } else if has(&["unauthorized", "forbidden", "authentication", "auth", "401", "403"]) {
        ErrorCategory::Auth
    } else if has(&["data", "parse", "json", "load"]) {
        ErrorCategory::Data
    } else if has(&["required", "invalid"]) {
        ErrorCategory::Validation
    } else {
        ErrorCategory::Unknown
    }
}

/// Structured error for board operations.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ScheduleError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            field: None,
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    // Convenience constructors

    pub fn invalid_value(field: &str, reason: &str) -> Self {
        Self::new(ErrorCode::InvalidFieldValue, reason).with_field(field)
    }

    pub fn task_not_found(task_id: &str) -> Self {
        Self::new(
            ErrorCode::TaskNotFound,
            format!("Task not found: {}", task_id),
        )
    }

    pub fn project_not_found(project: &str) -> Self {
        Self::new(
            ErrorCode::ProjectNotFound,
            format!("Project not found: {}", project),
        )
    }

    pub fn not_editable(task_id: &str) -> Self {
        Self::new(
            ErrorCode::NotEditable,
            format!("Task {} comes from the spreadsheet and cannot be changed here", task_id),
        )
    }

    pub fn department_mismatch() -> Self {
        Self::new(
            ErrorCode::DepartmentMismatch,
            "Cannot move task to different department",
        )
    }

    pub fn same_date() -> Self {
        Self::new(ErrorCode::SameDate, "Task is already on this date")
    }

    pub fn duplicate_submission() -> Self {
        Self::new(
            ErrorCode::DuplicateSubmission,
            "An identical task is already being added",
        )
    }

    pub fn incorrect_password() -> Self {
        Self::new(ErrorCode::IncorrectPassword, "Incorrect password")
    }

    pub fn internal(err: impl fmt::Display) -> Self {
        Self::new(ErrorCode::InternalError, err.to_string())
    }

    /// Category of this error, from its code or, failing that, its text.
    pub fn category(&self) -> ErrorCategory {
        match self.code {
            ErrorCode::NetworkError => ErrorCategory::Network,
            ErrorCode::AuthError | ErrorCode::IncorrectPassword => ErrorCategory::Auth,
            ErrorCode::DataError => ErrorCategory::Data,
            ErrorCode::MissingRequiredField
            | ErrorCode::InvalidFieldValue
            | ErrorCode::DepartmentMismatch
            | ErrorCode::SameDate
            | ErrorCode::DuplicateSubmission => ErrorCategory::Validation,
            _ => classify(&self.message),
        }
    }

    /// Banner text shown to the user, with the raw message appended.
    pub fn user_message(&self) -> String {
        let lead = match self.category() {
            ErrorCategory::Network => "Network error - please check your connection",
            ErrorCategory::Auth => "Authentication failed",
            ErrorCategory::Data => "Failed to load tasks",
            ErrorCategory::Validation => return self.message.clone(),
            ErrorCategory::Unknown => "Something went wrong",
        };
        format!("{}: {}", lead, self.message)
    }
}

impl fmt::Display for ScheduleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ScheduleError {}

impl From<SourceError> for ScheduleError {
    fn from(err: SourceError) -> Self {
        let code = match &err {
            SourceError::Network(_) => ErrorCode::NetworkError,
            SourceError::Auth(_) => ErrorCode::AuthError,
            SourceError::Status { status, .. } if *status == 401 || *status == 403 => {
                ErrorCode::AuthError
            }
            SourceError::Status { .. } => ErrorCode::UpstreamError,
            SourceError::Decode(_) | SourceError::Empty(_) => ErrorCode::DataError,
            SourceError::Config(_) => ErrorCode::InternalError,
        };
        Self::new(code, err.to_string())
    }
}

// Allow using ? with anyhow errors by converting them
impl From<anyhow::Error> for ScheduleError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<ScheduleError>() {
            Ok(schedule_err) => schedule_err,
            Err(err) => ScheduleError::internal(err),
        }
    }
}

/// Result type for board operations.
pub type ScheduleResult<T> = std::result::Result<T, ScheduleError>;
