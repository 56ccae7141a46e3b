//! Events emitted while a pipeline runs

use crate::core::OperationKind;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Events that can occur during pipeline execution
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    RunStarted {
        run_id: Uuid,
        pipeline: String,
        started_at: DateTime<Utc>,
    },
    StageStarted {
        run_id: Uuid,
        index: usize,
        stage: String,
        kind: OperationKind,
    },
    StageCompleted {
        run_id: Uuid,
        index: usize,
        stage: String,
        kind: OperationKind,
        elapsed: Duration,
    },
    StageFailed {
        run_id: Uuid,
        index: usize,
        stage: String,
        kind: OperationKind,
        error: String,
    },
    RunCompleted {
        run_id: Uuid,
        pipeline: String,
        failures: usize,
        finished_at: DateTime<Utc>,
    },
    RebuildTriggered {
        pipeline: String,
        paths: Vec<PathBuf>,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;
