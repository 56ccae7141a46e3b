//! Core domain models for the pipeline engine
//!
//! This module defines the stage model, the values that flow between
//! stages, the context handed to handlers, and build configuration.

pub mod config;
pub mod context;
pub mod sort;
pub mod stage;
pub mod value;

pub use config::{BuildConfig, ErrorPolicy};
pub use context::{Metadata, StageContext};
pub use stage::*;
pub use value::Output;
