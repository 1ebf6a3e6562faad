//! Weekly production-scheduling board.
//!
//! Merges spreadsheet rows and manually added tasks into department/day grids
//! and serves them with live refresh. This module exports the core components
//! for testing and integration.

pub mod board;
pub mod cli;
pub mod config;
pub mod dashboard;
pub mod dates;
pub mod departments;
pub mod error;
pub mod format;
pub mod grid;
pub mod logging;
pub mod merge;
pub mod poller;
pub mod preferences;
pub mod projects;
pub mod refresh;
pub mod sources;
pub mod types;
