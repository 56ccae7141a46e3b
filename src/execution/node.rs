//! Type-erased view of a pipeline, used to climb composition chains

use crate::execution::ExecutionEvent;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;

/// A pipeline seen without its element type
///
/// Parents are held weakly by their children, so walking `parent()` never
/// keeps a pipeline alive on its own.
#[async_trait]
pub trait PipelineNode: Send + Sync {
    /// Diagnostic name
    fn name(&self) -> String;

    /// The pipeline this one is embedded in, if any
    fn parent(&self) -> Option<Arc<dyn PipelineNode>>;

    /// Deliver an event to this pipeline's event handlers
    fn emit(&self, event: ExecutionEvent);

    /// Whether a run is in flight
    fn is_running(&self) -> bool;

    /// Wait until no run is in flight
    async fn idle(&self);

    /// A receiver whose `changed()` fails once the pipeline is dropped
    fn closed(&self) -> watch::Receiver<()>;

    /// Execute again from an empty sequence, discarding the final value
    async fn rerun(&self);
}

/// Walk `parent` links until reaching a pipeline with no parent
pub fn root_of(node: Arc<dyn PipelineNode>) -> Arc<dyn PipelineNode> {
    let mut current = node;
    while let Some(parent) = current.parent() {
        current = parent;
    }
    current
}

/// Identity of a node, ignoring the vtable
pub(crate) fn node_id(node: &Arc<dyn PipelineNode>) -> *const () {
    Arc::as_ptr(node) as *const ()
}
