//! batchpipe - a pluggable async batch content pipeline with incremental rebuilds

pub mod cli;
pub mod core;
pub mod error;
pub mod execution;
pub mod io;
pub mod logging;
pub mod plugins;
pub mod site;

// Re-export commonly used types
pub use crate::core::{BuildConfig, Entry, ErrorPolicy, Metadata, OperationKind, Output, Stage, StageContext};
pub use error::{EngineError, Result};
pub use execution::{ExecutionEvent, Pipeline, PipelineNode, RebuildScheduler};
pub use io::FileItem;
