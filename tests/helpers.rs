//! Test utility functions for batchpipe
#![allow(dead_code)]

use batchpipe::{ExecutionEvent, Pipeline};
use std::path::PathBuf;
use std::sync::{Arc, Mutex, Once};

/// Install a test-friendly subscriber once per test binary
pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(batchpipe::logging::filter(false))
            .with_test_writer()
            .try_init();
    });
}

/// A pipeline whose first stage yields `values`
pub fn numbers(values: Vec<i64>) -> Pipeline<i64> {
    Pipeline::new(".").from(move |_| {
        let values = values.clone();
        async move { Ok(values) }
    })
}

/// Collects the events a pipeline emits
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<ExecutionEvent>>>,
}

impl EventLog {
    pub fn attach<T: Clone + Send + Sync + 'static>(pipeline: &Pipeline<T>) -> Self {
        let log = Self::default();
        let sink = log.events.clone();
        pipeline.add_event_handler(move |event| sink.lock().unwrap().push(event));
        log
    }

    pub fn events(&self) -> Vec<ExecutionEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Names of the stages that failed, in order
    pub fn failed_stages(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ExecutionEvent::StageFailed { stage, .. } => Some(stage),
                _ => None,
            })
            .collect()
    }

    /// Changed paths of every rebuild, in order
    pub fn rebuilds(&self) -> Vec<Vec<PathBuf>> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                ExecutionEvent::RebuildTriggered { paths, .. } => Some(paths),
                _ => None,
            })
            .collect()
    }

    pub fn completed_runs(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| matches!(event, ExecutionEvent::RunCompleted { .. }))
            .count()
    }
}

/// Shared, append-only record for observing handler side effects
#[derive(Clone)]
pub struct Recorder<T> {
    entries: Arc<Mutex<Vec<T>>>,
}

impl<T> Default for Recorder<T> {
    fn default() -> Self {
        Self {
            entries: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<T: Clone> Recorder<T> {
    pub fn push(&self, value: T) {
        self.entries.lock().unwrap().push(value);
    }

    pub fn entries(&self) -> Vec<T> {
        self.entries.lock().unwrap().clone()
    }
}
