//! # Command History
//!
//! Records of dispatched commands plus a small key/value session context.
//! [`InMemoryHistory`] keeps everything in process; hosts that need durable
//! history implement [`HistoryStore`] themselves.

use crate::constants::history_status;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One dispatched command and its outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: String,
    pub command: String,
    pub intent: String,
    pub timestamp: DateTime<Utc>,
    pub status: String,
    pub result: Option<String>,
    pub error: Option<String>,
    pub execution_time_ms: u64,
}

impl TaskRecord {
    pub fn new(
        task_id: impl Into<String>,
        command: impl Into<String>,
        intent: impl Into<String>,
        status: &str,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            command: command.into(),
            intent: intent.into(),
            timestamp: Utc::now(),
            status: status.to_string(),
            result: None,
            error: None,
            execution_time_ms: 0,
        }
    }
}

/// Aggregate counts over all records
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryStats {
    pub total_tasks: usize,
    pub completed: usize,
    pub failed: usize,
    pub success_rate: f64,
}

/// Storage for command history and session context
pub trait HistoryStore: Send + Sync {
    fn append(&self, record: TaskRecord);

    /// Update a record in place. Returns `false` if the id is unknown.
    fn update_status(
        &self,
        task_id: &str,
        status: &str,
        result: Option<String>,
        error: Option<String>,
        execution_time_ms: u64,
    ) -> bool;

    fn get(&self, task_id: &str) -> Option<TaskRecord>;

    fn session_get(&self, key: &str) -> Option<Value>;

    fn session_set(&self, key: &str, value: Value);

    fn stats(&self) -> HistoryStats;
}

/// Concurrent in-memory [`HistoryStore`]
#[derive(Debug, Default)]
pub struct InMemoryHistory {
    records: DashMap<String, TaskRecord>,
    session: DashMap<String, Value>,
}

impl InMemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records, oldest first
    pub fn records(&self) -> Vec<TaskRecord> {
        let mut records: Vec<TaskRecord> = self.records.iter().map(|r| r.value().clone()).collect();
        records.sort_by_key(|r| r.timestamp);
        records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl HistoryStore for InMemoryHistory {
    fn append(&self, record: TaskRecord) {
        self.records.insert(record.task_id.clone(), record);
    }

    fn update_status(
        &self,
        task_id: &str,
        status: &str,
        result: Option<String>,
        error: Option<String>,
        execution_time_ms: u64,
    ) -> bool {
        let Some(mut record) = self.records.get_mut(task_id) else {
            return false;
        };
        record.status = status.to_string();
        if result.is_some() {
            record.result = result;
        }
        if error.is_some() {
            record.error = error;
        }
        record.execution_time_ms = execution_time_ms;
        true
    }

    fn get(&self, task_id: &str) -> Option<TaskRecord> {
        self.records.get(task_id).map(|r| r.value().clone())
    }

    fn session_get(&self, key: &str) -> Option<Value> {
        self.session.get(key).map(|v| v.value().clone())
    }

    fn session_set(&self, key: &str, value: Value) {
        self.session.insert(key.to_string(), value);
    }

    fn stats(&self) -> HistoryStats {
        let total_tasks = self.records.len();
        let mut completed = 0;
        let mut failed = 0;
        for record in self.records.iter() {
            match record.status.as_str() {
                history_status::COMPLETED => completed += 1,
                history_status::FAILED => failed += 1,
                _ => {}
            }
        }
        let success_rate = if total_tasks == 0 {
            0.0
        } else {
            completed as f64 / total_tasks as f64
        };

        HistoryStats {
            total_tasks,
            completed,
            failed,
            success_rate,
        }
    }
}
