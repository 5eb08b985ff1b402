//! Local run-history boundary.
//!
//! The embedded store itself belongs to the host; the pipeline only agrees
//! on the record shapes and the operations it expects to call.

use crate::change_log::ChangeLogEntry;
use crate::enrich::RunOutput;
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct NewRun {
    pub name: String,
    pub created_at: String,
    pub mode: String,
    pub transcript: String,
    pub result: RunOutput,
    pub change_log: Vec<ChangeLogEntry>,
    pub is_follow_up: bool,
    pub parent_id: Option<i64>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub name: String,
    pub created_at: String,
    pub mode: String,
    pub transcript: String,
    pub result: RunOutput,
    pub change_log: Vec<ChangeLogEntry>,
    pub is_follow_up: bool,
    pub parent_id: Option<i64>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RunSummary {
    pub id: i64,
    pub name: String,
    pub created_at: String,
    pub mode: String,
    pub is_follow_up: bool,
    pub parent_id: Option<i64>,
}

/// Host-provided persistence for completed runs.
pub trait HistoryStore: Send + Sync {
    fn save_run(&self, run: NewRun) -> Result<i64>;
    fn list_runs(&self, limit: usize) -> Result<Vec<RunSummary>>;
    fn get_run(&self, id: i64) -> Result<Option<RunRecord>>;
    fn rename_run(&self, id: i64, name: &str) -> Result<bool>;
}

/// Rename precondition shared by every store implementation.
pub fn validate_run_name(name: &str) -> Result<&str> {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        return Err(anyhow!("Run name cannot be empty."));
    }
    Ok(trimmed)
}
