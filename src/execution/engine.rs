//! Pipeline engine - ordered stages, composition and execution

use crate::core::{ErrorPolicy, Metadata, OperationKind, Output, Stage, StageContext};
use crate::error::{EngineError, Result};
use crate::execution::node::{node_id, root_of, PipelineNode};
use crate::execution::strategy;
use crate::execution::{EventHandler, ExecutionEvent};
use async_trait::async_trait;
use chrono::Utc;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};
use std::time::Instant;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info};
use uuid::Uuid;

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(PoisonError::into_inner)
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Debug, Clone)]
struct Settings {
    name: String,
    policy: ErrorPolicy,
}

struct PipelineInner<T> {
    me: Weak<PipelineInner<T>>,
    base: Arc<PathBuf>,
    metadata: Metadata,
    settings: RwLock<Settings>,
    parent: RwLock<Option<Weak<dyn PipelineNode>>>,
    stages: RwLock<Vec<Arc<Stage<T>>>>,
    event_handlers: RwLock<Vec<EventHandler>>,
    /// Held for the whole of a run
    running: Mutex<()>,
    /// Never sent on; receivers see it close when the pipeline is dropped
    closed: watch::Sender<()>,
}

/// An ordered, append-only list of stages over items of type `T`
///
/// Cloning a `Pipeline` yields another handle to the same instance.
pub struct Pipeline<T> {
    inner: Arc<PipelineInner<T>>,
}

impl<T> Clone for Pipeline<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> std::fmt::Debug for Pipeline<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &read(&self.inner.settings).name)
            .field("base", &self.inner.base)
            .field("stages", &*read(&self.inner.stages))
            .finish()
    }
}

impl<T: Clone + Send + Sync + 'static> Default for Pipeline<T> {
    fn default() -> Self {
        let base = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        Self::new(base)
    }
}

impl<T: Clone + Send + Sync + 'static> Pipeline<T> {
    /// Create an empty pipeline rooted at `base`
    pub fn new(base: impl Into<PathBuf>) -> Self {
        let base = Arc::new(base.into());
        let inner = Arc::new_cyclic(|me| PipelineInner {
            me: me.clone(),
            base,
            metadata: Metadata::new(),
            settings: RwLock::new(Settings {
                name: "pipeline".to_string(),
                policy: ErrorPolicy::default(),
            }),
            parent: RwLock::new(None),
            stages: RwLock::new(Vec::new()),
            event_handlers: RwLock::new(Vec::new()),
            running: Mutex::new(()),
            closed: watch::channel(()).0,
        });
        Self { inner }
    }

    /// Set the diagnostic name
    pub fn named(self, name: impl Into<String>) -> Self {
        write(&self.inner.settings).name = name.into();
        self
    }

    pub fn with_error_policy(self, policy: ErrorPolicy) -> Self {
        write(&self.inner.settings).policy = policy;
        self
    }

    pub fn name(&self) -> String {
        read(&self.inner.settings).name.clone()
    }

    pub fn error_policy(&self) -> ErrorPolicy {
        read(&self.inner.settings).policy
    }

    pub fn base(&self) -> &Path {
        &self.inner.base
    }

    pub fn metadata(&self) -> &Metadata {
        &self.inner.metadata
    }

    /// The pipeline this one is embedded in, if it is still alive
    pub fn parent(&self) -> Option<Arc<dyn PipelineNode>> {
        self.inner.parent()
    }

    /// Topmost pipeline of the composition chain
    pub fn root(&self) -> Arc<dyn PipelineNode> {
        root_of(self.node())
    }

    pub fn is_root(&self) -> bool {
        self.parent().is_none()
    }

    /// Type-erased handle to this pipeline
    pub fn node(&self) -> Arc<dyn PipelineNode> {
        self.inner.clone()
    }

    pub fn stage_count(&self) -> usize {
        read(&self.inner.stages).len()
    }

    /// Kind and name of every stage, in execution order
    pub fn stages(&self) -> Vec<(OperationKind, String)> {
        read(&self.inner.stages)
            .iter()
            .map(|stage| (stage.kind(), stage.name().to_string()))
            .collect()
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        write(&self.inner.event_handlers).push(Arc::new(handler));
    }

    /// Validate a stage and append it to the end of the stage list
    pub fn append(self, stage: Stage<T>) -> Result<Self> {
        stage.validate()?;
        Ok(self.push(stage))
    }

    fn push(self, stage: Stage<T>) -> Self {
        debug!(
            "Appending {} stage '{}' to pipeline {}",
            stage.kind(),
            stage.name(),
            self.name()
        );
        write(&self.inner.stages).push(Arc::new(stage));
        self
    }

    /// Embed another pipeline as a data source.
    ///
    /// The child becomes a descendant of this pipeline and, when this stage
    /// runs, is executed in full with its sequence appended after the current
    /// one.
    pub fn embed(self, child: &Pipeline<T>) -> Result<Self> {
        let child_node = child.node();
        let mut cursor = Some(self.node());
        while let Some(node) = cursor {
            if node_id(&node) == node_id(&child_node) {
                return Err(EngineError::CompositionCycle {
                    parent: self.name(),
                    child: child.name(),
                });
            }
            cursor = node.parent();
        }

        if let Some(existing) = child.parent() {
            if node_id(&existing) != node_id(&self.node()) {
                return Err(EngineError::AlreadyEmbedded(child.name()));
            }
        }

        let me: Weak<dyn PipelineNode> = self.inner.me.clone();
        *write(&child.inner.parent) = Some(me);

        let embedded = child.clone();
        let name = format!("embed:{}", child.name());
        let stage = Stage::all(move |mut items: Vec<T>, _ctx| {
            let embedded = embedded.clone();
            async move {
                let output = embedded.run().await?;
                items.extend(output.into_sequence(OperationKind::All)?);
                Ok(items)
            }
        })
        .named(name);

        Ok(self.push(stage))
    }

    /// Execute every stage in order, starting from an empty sequence.
    ///
    /// Stage failures are logged and reported as events; under
    /// [`ErrorPolicy::Continue`] the next stage receives the value the failed
    /// stage was given. Under [`ErrorPolicy::Abort`] the failure is returned.
    ///
    /// Runs of one pipeline never overlap: a second call waits until the
    /// first has finished, so a handler must not run its own pipeline.
    pub async fn run(&self) -> Result<Output<T>> {
        self.inner.run().await
    }

    /// FROM
    pub fn from<F, Fut>(self, f: F) -> Self
    where
        F: Fn(StageContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Vec<T>>> + Send + 'static,
    {
        self.push(Stage::source(f))
    }

    pub fn map<F, Fut, O>(self, f: F) -> Self
    where
        F: Fn(T, Arc<[T]>, StageContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<O>> + Send + 'static,
        O: Into<crate::core::Entry<T>> + 'static,
    {
        self.push(Stage::map(f))
    }

    pub fn map_series<F, Fut, O>(self, f: F) -> Self
    where
        F: Fn(T, Arc<[T]>, StageContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<O>> + Send + 'static,
        O: Into<crate::core::Entry<T>> + 'static,
    {
        self.push(Stage::map_series(f))
    }

    pub fn filter<F, Fut>(self, f: F) -> Self
    where
        F: Fn(T, Arc<[T]>, StageContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<bool>> + Send + 'static,
    {
        self.push(Stage::filter(f))
    }

    pub fn find<F, Fut>(self, f: F) -> Self
    where
        F: Fn(T, Arc<[T]>, StageContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<bool>> + Send + 'static,
    {
        self.push(Stage::find(f))
    }

    pub fn find_last<F, Fut>(self, f: F) -> Self
    where
        F: Fn(T, Arc<[T]>, StageContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<bool>> + Send + 'static,
    {
        self.push(Stage::find_last(f))
    }

    pub fn take_while<F, Fut>(self, f: F) -> Self
    where
        F: Fn(T, Arc<[T]>, StageContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<bool>> + Send + 'static,
    {
        self.push(Stage::take_while(f))
    }

    pub fn take_until<F, Fut>(self, f: F) -> Self
    where
        F: Fn(T, Arc<[T]>, StageContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<bool>> + Send + 'static,
    {
        self.push(Stage::take_until(f))
    }

    pub fn for_each<F, Fut>(self, f: F) -> Self
    where
        F: Fn(T, Arc<[T]>, StageContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.push(Stage::for_each(f))
    }

    pub fn for_each_series<F, Fut>(self, f: F) -> Self
    where
        F: Fn(T, Arc<[T]>, StageContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.push(Stage::for_each_series(f))
    }

    pub fn tap<F, Fut>(self, f: F) -> Self
    where
        F: Fn(T, Arc<[T]>, StageContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.push(Stage::tap(f))
    }

    pub fn all<F, Fut>(self, f: F) -> Self
    where
        F: Fn(Vec<T>, StageContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Vec<T>>> + Send + 'static,
    {
        self.push(Stage::all(f))
    }

    pub fn reduce<F, Fut>(self, f: F, initial: T) -> Self
    where
        F: Fn(T, T, Arc<[T]>, StageContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.push(Stage::reduce(f, initial))
    }

    pub fn reduce_right<F, Fut>(self, f: F, initial: T) -> Self
    where
        F: Fn(T, T, Arc<[T]>, StageContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.push(Stage::reduce_right(f, initial))
    }

    pub fn sort<F, Fut>(self, f: F) -> Self
    where
        F: Fn(T, T, Arc<[T]>, StageContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<i64>> + Send + 'static,
    {
        self.push(Stage::sort(f))
    }

    pub fn max<F, Fut>(self, f: F) -> Self
    where
        F: Fn(T, T, Arc<[T]>, StageContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<i64>> + Send + 'static,
    {
        self.push(Stage::max(f))
    }

    pub fn min<F, Fut>(self, f: F) -> Self
    where
        F: Fn(T, T, Arc<[T]>, StageContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<i64>> + Send + 'static,
    {
        self.push(Stage::min(f))
    }

    pub fn take(self, n: usize) -> Self {
        self.push(Stage::take(n))
    }

    pub fn take_last(self, n: usize) -> Self {
        self.push(Stage::take_last(n))
    }

    pub fn count(self) -> Self {
        self.push(Stage::count())
    }
}

impl<T: Clone + Send + Sync + 'static> PipelineInner<T> {
    fn emit_event(&self, event: ExecutionEvent) {
        let handlers = read(&self.event_handlers);
        for handler in handlers.iter() {
            handler(event.clone());
        }
    }

    fn context(&self) -> StageContext {
        let node: Weak<dyn PipelineNode> = self.me.clone();
        StageContext::new(Arc::clone(&self.base), self.metadata.clone(), node)
    }

    async fn run(&self) -> Result<Output<T>> {
        let _running = self.running.lock().await;
        let stages: Vec<Arc<Stage<T>>> = read(&self.stages).clone();
        let Settings { name, policy } = read(&self.settings).clone();
        let run_id = Uuid::new_v4();

        info!("Starting pipeline run: {} ({} stages)", name, stages.len());
        self.emit_event(ExecutionEvent::RunStarted {
            run_id,
            pipeline: name.clone(),
            started_at: Utc::now(),
        });

        let ctx = self.context();
        let mut value = Output::default();
        let mut failures = 0;

        for (index, stage) in stages.iter().enumerate() {
            self.emit_event(ExecutionEvent::StageStarted {
                run_id,
                index,
                stage: stage.name().to_string(),
                kind: stage.kind(),
            });

            let started = Instant::now();
            match strategy::apply(stage, &value, &ctx).await {
                Ok(outcome) => {
                    value = outcome.prune();
                    debug!(
                        "Stage {} ({}) of {} produced {}",
                        index,
                        stage.name(),
                        name,
                        value.variant_name()
                    );
                    self.emit_event(ExecutionEvent::StageCompleted {
                        run_id,
                        index,
                        stage: stage.name().to_string(),
                        kind: stage.kind(),
                        elapsed: started.elapsed(),
                    });
                }
                Err(source) => {
                    failures += 1;
                    error!(
                        "Stage {} ({}) of {} failed: {:#}",
                        index,
                        stage.name(),
                        name,
                        source
                    );
                    self.emit_event(ExecutionEvent::StageFailed {
                        run_id,
                        index,
                        stage: stage.name().to_string(),
                        kind: stage.kind(),
                        error: format!("{:#}", source),
                    });

                    if policy == ErrorPolicy::Abort {
                        self.emit_event(ExecutionEvent::RunCompleted {
                            run_id,
                            pipeline: name.clone(),
                            failures,
                            finished_at: Utc::now(),
                        });
                        return Err(EngineError::Stage {
                            index,
                            stage: stage.name().to_string(),
                            source,
                        });
                    }
                }
            }
        }

        info!("Pipeline run finished: {} ({} failed stages)", name, failures);
        self.emit_event(ExecutionEvent::RunCompleted {
            run_id,
            pipeline: name,
            failures,
            finished_at: Utc::now(),
        });

        Ok(value)
    }
}

#[async_trait]
impl<T: Clone + Send + Sync + 'static> PipelineNode for PipelineInner<T> {
    fn name(&self) -> String {
        read(&self.settings).name.clone()
    }

    fn parent(&self) -> Option<Arc<dyn PipelineNode>> {
        read(&self.parent).as_ref().and_then(Weak::upgrade)
    }

    fn emit(&self, event: ExecutionEvent) {
        self.emit_event(event);
    }

    fn is_running(&self) -> bool {
        self.running.try_lock().is_err()
    }

    async fn idle(&self) {
        drop(self.running.lock().await);
    }

    fn closed(&self) -> watch::Receiver<()> {
        self.closed.subscribe()
    }

    async fn rerun(&self) {
        if let Err(e) = self.run().await {
            error!("Pipeline {} failed: {}", PipelineNode::name(self), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[tokio::test]
    async fn test_execute_simple_pipeline() {
        let output = Pipeline::new(".")
            .from(|_| async { Ok(vec![1, 2, 3]) })
            .map(|n: i64, _, _| async move { Ok(n * 10) })
            .run()
            .await
            .unwrap();
        assert_eq!(output, Output::Items(vec![10, 20, 30]));
    }

    #[tokio::test]
    async fn test_empty_pipeline_yields_empty_sequence() {
        let output = Pipeline::<i64>::new(".").run().await.unwrap();
        assert_eq!(output, Output::Items(vec![]));
    }

    #[tokio::test]
    async fn test_events_are_emitted_in_order() {
        let pipeline = Pipeline::new(".")
            .named("events")
            .from(|_| async { Ok(vec![1]) })
            .count();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        pipeline.add_event_handler(move |event| {
            let label = match event {
                ExecutionEvent::RunStarted { .. } => "run_started",
                ExecutionEvent::StageStarted { .. } => "stage_started",
                ExecutionEvent::StageCompleted { .. } => "stage_completed",
                ExecutionEvent::StageFailed { .. } => "stage_failed",
                ExecutionEvent::RunCompleted { .. } => "run_completed",
                ExecutionEvent::RebuildTriggered { .. } => "rebuild",
            };
            sink.lock().unwrap().push(label);
        });

        let output: Output<i64> = pipeline.run().await.unwrap();
        assert_eq!(output.count(), Some(1));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                "run_started",
                "stage_started",
                "stage_completed",
                "stage_started",
                "stage_completed",
                "run_completed"
            ]
        );
    }

    #[tokio::test]
    async fn test_append_rejects_mismatched_handler() {
        use crate::core::Handler;
        let stage = Stage::new(OperationKind::Filter, Handler::Take(1), "bad");
        let result = Pipeline::<i64>::new(".").append(stage);
        assert!(matches!(result, Err(EngineError::HandlerMismatch { .. })));
    }

    #[test]
    fn test_stage_order_is_insertion_order() {
        let pipeline = Pipeline::<i64>::new(".")
            .from(|_| async { Ok(vec![]) })
            .take(1)
            .count();
        let kinds: Vec<_> = pipeline.stages().into_iter().map(|(kind, _)| kind).collect();
        assert_eq!(
            kinds,
            vec![OperationKind::From, OperationKind::Take, OperationKind::Count]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_runs_of_one_pipeline_do_not_overlap() {
        let in_flight = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let overlaps = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let pipeline = {
            let in_flight = in_flight.clone();
            let overlaps = overlaps.clone();
            Pipeline::new(".").from(move |_| {
                let in_flight = in_flight.clone();
                let overlaps = overlaps.clone();
                async move {
                    use std::sync::atomic::Ordering;
                    if in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
                        overlaps.fetch_add(1, Ordering::SeqCst);
                    }
                    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok(vec![1])
                }
            })
        };

        let node = pipeline.node();
        let (first, second) = tokio::join!(pipeline.run(), async {
            tokio::task::yield_now().await;
            assert!(node.is_running());
            pipeline.run().await
        });
        first.unwrap();
        second.unwrap();
        assert_eq!(overlaps.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert!(!node.is_running());
    }

    #[tokio::test]
    async fn test_closed_fires_when_pipeline_is_dropped() {
        let pipeline = Pipeline::<i64>::new(".");
        let mut closed = pipeline.node().closed();
        drop(pipeline);
        assert!(closed.changed().await.is_err());
    }
}
