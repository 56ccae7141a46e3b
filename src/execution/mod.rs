//! Pipeline execution engine

pub mod engine;
pub mod events;
pub mod node;
pub mod rebuild;
mod strategy;

pub use engine::Pipeline;
pub use events::{EventHandler, ExecutionEvent};
pub use node::{root_of, PipelineNode};
pub use rebuild::{RebuildScheduler, DEFAULT_DEBOUNCE};
