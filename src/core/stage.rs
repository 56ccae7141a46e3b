//! Stage domain model

use crate::core::context::StageContext;
use crate::error::{EngineError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// The operation a stage performs on the flowing value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    All,
    Count,
    Filter,
    Find,
    FindLast,
    From,
    ForEach,
    ForEachSeries,
    Map,
    MapSeries,
    Max,
    Min,
    Reduce,
    ReduceRight,
    Sort,
    Take,
    TakeLast,
    TakeUntil,
    TakeWhile,
    Tap,
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::All => "all",
            OperationKind::Count => "count",
            OperationKind::Filter => "filter",
            OperationKind::Find => "find",
            OperationKind::FindLast => "find_last",
            OperationKind::From => "from",
            OperationKind::ForEach => "for_each",
            OperationKind::ForEachSeries => "for_each_series",
            OperationKind::Map => "map",
            OperationKind::MapSeries => "map_series",
            OperationKind::Max => "max",
            OperationKind::Min => "min",
            OperationKind::Reduce => "reduce",
            OperationKind::ReduceRight => "reduce_right",
            OperationKind::Sort => "sort",
            OperationKind::Take => "take",
            OperationKind::TakeLast => "take_last",
            OperationKind::TakeUntil => "take_until",
            OperationKind::TakeWhile => "take_while",
            OperationKind::Tap => "tap",
        }
    }

    /// Name of the handler shape this kind requires
    pub fn handler_shape(&self) -> &'static str {
        match self {
            OperationKind::From => "source",
            OperationKind::Map | OperationKind::MapSeries => "transform",
            OperationKind::Filter
            | OperationKind::Find
            | OperationKind::FindLast
            | OperationKind::TakeWhile
            | OperationKind::TakeUntil => "predicate",
            OperationKind::ForEach | OperationKind::ForEachSeries | OperationKind::Tap => "visit",
            OperationKind::All => "batch",
            OperationKind::Reduce | OperationKind::ReduceRight => "reduce",
            OperationKind::Sort | OperationKind::Max | OperationKind::Min => "comparator",
            OperationKind::Take | OperationKind::TakeLast => "take",
            OperationKind::Count => "count",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a per-item transform: either a value or a tombstone.
///
/// Removed entries are pruned by the engine once the stage completes, so a
/// `map` can double as a filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Entry<T> {
    Item(T),
    Removed,
}

impl<T> Entry<T> {
    pub fn is_removed(&self) -> bool {
        matches!(self, Entry::Removed)
    }

    pub fn into_option(self) -> Option<T> {
        match self {
            Entry::Item(item) => Some(item),
            Entry::Removed => None,
        }
    }
}

impl<T> From<T> for Entry<T> {
    fn from(item: T) -> Self {
        Entry::Item(item)
    }
}

/// Boxed future returned by every stage handler
pub type HandlerFuture<O> = Pin<Box<dyn Future<Output = anyhow::Result<O>> + Send>>;

pub type SourceFn<T> = Arc<dyn Fn(StageContext) -> HandlerFuture<Vec<T>> + Send + Sync>;
pub type ItemFn<T, O> = Arc<dyn Fn(T, Arc<[T]>, StageContext) -> HandlerFuture<O> + Send + Sync>;
pub type BatchFn<T> = Arc<dyn Fn(Vec<T>, StageContext) -> HandlerFuture<Vec<T>> + Send + Sync>;
pub type ReducerFn<T> = Arc<dyn Fn(T, T, Arc<[T]>, StageContext) -> HandlerFuture<T> + Send + Sync>;
pub type ComparatorFn<T> =
    Arc<dyn Fn(T, T, Arc<[T]>, StageContext) -> HandlerFuture<i64> + Send + Sync>;

/// Handler attached to a stage; its shape is fixed by the operation kind
pub enum Handler<T> {
    Source(SourceFn<T>),
    Transform(ItemFn<T, Entry<T>>),
    Predicate(ItemFn<T, bool>),
    Visit(ItemFn<T, ()>),
    Batch(BatchFn<T>),
    Reduce { reducer: ReducerFn<T>, initial: T },
    Comparator(ComparatorFn<T>),
    Take(usize),
    Count,
}

impl<T> Handler<T> {
    pub fn shape(&self) -> &'static str {
        match self {
            Handler::Source(_) => "source",
            Handler::Transform(_) => "transform",
            Handler::Predicate(_) => "predicate",
            Handler::Visit(_) => "visit",
            Handler::Batch(_) => "batch",
            Handler::Reduce { .. } => "reduce",
            Handler::Comparator(_) => "comparator",
            Handler::Take(_) => "take",
            Handler::Count => "count",
        }
    }
}

/// A single unit of work in a pipeline
pub struct Stage<T> {
    kind: OperationKind,
    handler: Handler<T>,
    name: String,
}

impl<T> fmt::Debug for Stage<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("kind", &self.kind)
            .field("handler", &self.handler.shape())
            .field("name", &self.name)
            .finish()
    }
}

impl<T> Stage<T> {
    /// Build a stage from raw parts. The pairing is checked by [`Stage::validate`].
    pub fn new(kind: OperationKind, handler: Handler<T>, name: impl Into<String>) -> Self {
        Self {
            kind,
            handler,
            name: name.into(),
        }
    }

    /// Override the diagnostic name
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn handler(&self) -> &Handler<T> {
        &self.handler
    }

    /// Check that the handler has the shape the operation kind requires
    pub fn validate(&self) -> Result<()> {
        if self.kind.handler_shape() == self.handler.shape() {
            Ok(())
        } else {
            Err(EngineError::HandlerMismatch {
                kind: self.kind,
                handler: self.handler.shape(),
            })
        }
    }
}

fn display_name<F>() -> String {
    std::any::type_name::<F>().to_string()
}

fn item_fn<T, O, F, Fut>(f: F) -> ItemFn<T, O>
where
    F: Fn(T, Arc<[T]>, StageContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<O>> + Send + 'static,
{
    Arc::new(move |item, items, ctx| Box::pin(f(item, items, ctx)) as HandlerFuture<O>)
}

fn comparator_fn<T, F, Fut>(f: F) -> ComparatorFn<T>
where
    F: Fn(T, T, Arc<[T]>, StageContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<i64>> + Send + 'static,
{
    Arc::new(move |a, b, items, ctx| Box::pin(f(a, b, items, ctx)) as HandlerFuture<i64>)
}

impl<T: Clone + Send + Sync + 'static> Stage<T> {
    /// FROM: produce the initial sequence
    pub fn source<F, Fut>(f: F) -> Self
    where
        F: Fn(StageContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Vec<T>>> + Send + 'static,
    {
        let handler: SourceFn<T> = Arc::new(move |ctx| Box::pin(f(ctx)) as HandlerFuture<Vec<T>>);
        Self::new(OperationKind::From, Handler::Source(handler), display_name::<F>())
    }

    fn transform<F, Fut, O>(kind: OperationKind, f: F) -> Self
    where
        F: Fn(T, Arc<[T]>, StageContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<O>> + Send + 'static,
        O: Into<Entry<T>> + 'static,
    {
        let handler = item_fn(move |item, items, ctx| {
            let fut = f(item, items, ctx);
            async move { fut.await.map(Into::into) }
        });
        Self::new(kind, Handler::Transform(handler), display_name::<F>())
    }

    /// MAP: transform every item concurrently; order is preserved
    pub fn map<F, Fut, O>(f: F) -> Self
    where
        F: Fn(T, Arc<[T]>, StageContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<O>> + Send + 'static,
        O: Into<Entry<T>> + 'static,
    {
        Self::transform(OperationKind::Map, f)
    }

    /// MAP_SERIES: transform items one at a time, in order
    pub fn map_series<F, Fut, O>(f: F) -> Self
    where
        F: Fn(T, Arc<[T]>, StageContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<O>> + Send + 'static,
        O: Into<Entry<T>> + 'static,
    {
        Self::transform(OperationKind::MapSeries, f)
    }

    fn predicate<F, Fut>(kind: OperationKind, f: F) -> Self
    where
        F: Fn(T, Arc<[T]>, StageContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<bool>> + Send + 'static,
    {
        Self::new(kind, Handler::Predicate(item_fn(f)), display_name::<F>())
    }

    pub fn filter<F, Fut>(f: F) -> Self
    where
        F: Fn(T, Arc<[T]>, StageContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<bool>> + Send + 'static,
    {
        Self::predicate(OperationKind::Filter, f)
    }

    pub fn find<F, Fut>(f: F) -> Self
    where
        F: Fn(T, Arc<[T]>, StageContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<bool>> + Send + 'static,
    {
        Self::predicate(OperationKind::Find, f)
    }

    /// FIND_LAST: last item of the leading run that satisfies the predicate
    pub fn find_last<F, Fut>(f: F) -> Self
    where
        F: Fn(T, Arc<[T]>, StageContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<bool>> + Send + 'static,
    {
        Self::predicate(OperationKind::FindLast, f)
    }

    pub fn take_while<F, Fut>(f: F) -> Self
    where
        F: Fn(T, Arc<[T]>, StageContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<bool>> + Send + 'static,
    {
        Self::predicate(OperationKind::TakeWhile, f)
    }

    pub fn take_until<F, Fut>(f: F) -> Self
    where
        F: Fn(T, Arc<[T]>, StageContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<bool>> + Send + 'static,
    {
        Self::predicate(OperationKind::TakeUntil, f)
    }

    fn visit<F, Fut>(kind: OperationKind, f: F) -> Self
    where
        F: Fn(T, Arc<[T]>, StageContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::new(kind, Handler::Visit(item_fn(f)), display_name::<F>())
    }

    pub fn for_each<F, Fut>(f: F) -> Self
    where
        F: Fn(T, Arc<[T]>, StageContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::visit(OperationKind::ForEach, f)
    }

    pub fn for_each_series<F, Fut>(f: F) -> Self
    where
        F: Fn(T, Arc<[T]>, StageContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::visit(OperationKind::ForEachSeries, f)
    }

    /// TAP: serial side effects, sequence passes through unchanged
    pub fn tap<F, Fut>(f: F) -> Self
    where
        F: Fn(T, Arc<[T]>, StageContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self::visit(OperationKind::Tap, f)
    }

    /// ALL: replace the whole sequence
    pub fn all<F, Fut>(f: F) -> Self
    where
        F: Fn(Vec<T>, StageContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Vec<T>>> + Send + 'static,
    {
        let handler: BatchFn<T> =
            Arc::new(move |items, ctx| Box::pin(f(items, ctx)) as HandlerFuture<Vec<T>>);
        Self::new(OperationKind::All, Handler::Batch(handler), display_name::<F>())
    }

    fn reducer<F, Fut>(kind: OperationKind, f: F, initial: T) -> Self
    where
        F: Fn(T, T, Arc<[T]>, StageContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        let reducer: ReducerFn<T> =
            Arc::new(move |acc, item, items, ctx| Box::pin(f(acc, item, items, ctx)) as HandlerFuture<T>);
        Self::new(kind, Handler::Reduce { reducer, initial }, display_name::<F>())
    }

    pub fn reduce<F, Fut>(f: F, initial: T) -> Self
    where
        F: Fn(T, T, Arc<[T]>, StageContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Self::reducer(OperationKind::Reduce, f, initial)
    }

    pub fn reduce_right<F, Fut>(f: F, initial: T) -> Self
    where
        F: Fn(T, T, Arc<[T]>, StageContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        Self::reducer(OperationKind::ReduceRight, f, initial)
    }

    pub fn sort<F, Fut>(f: F) -> Self
    where
        F: Fn(T, T, Arc<[T]>, StageContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<i64>> + Send + 'static,
    {
        Self::new(OperationKind::Sort, Handler::Comparator(comparator_fn(f)), display_name::<F>())
    }

    pub fn max<F, Fut>(f: F) -> Self
    where
        F: Fn(T, T, Arc<[T]>, StageContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<i64>> + Send + 'static,
    {
        Self::new(OperationKind::Max, Handler::Comparator(comparator_fn(f)), display_name::<F>())
    }

    pub fn min<F, Fut>(f: F) -> Self
    where
        F: Fn(T, T, Arc<[T]>, StageContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<i64>> + Send + 'static,
    {
        Self::new(OperationKind::Min, Handler::Comparator(comparator_fn(f)), display_name::<F>())
    }

    pub fn take(n: usize) -> Self {
        Self::new(OperationKind::Take, Handler::Take(n), "take")
    }

    pub fn take_last(n: usize) -> Self {
        Self::new(OperationKind::TakeLast, Handler::Take(n), "take_last")
    }

    pub fn count() -> Self {
        Self::new(OperationKind::Count, Handler::Count, "count")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builders_validate() {
        let stages: Vec<Stage<i64>> = vec![
            Stage::<i64>::source(|_| async { Ok(vec![1, 2]) }),
            Stage::<i64>::map(|n: i64, _, _| async move { Ok(n + 1) }),
            Stage::<i64>::filter(|n: i64, _, _| async move { Ok(n > 1) }),
            Stage::<i64>::tap(|_, _, _| async { Ok(()) }),
            Stage::<i64>::reduce(|a: i64, b: i64, _, _| async move { Ok(a + b) }, 0),
            Stage::<i64>::sort(|a: i64, b: i64, _, _| async move { Ok(a - b) }),
            Stage::<i64>::take(2),
            Stage::<i64>::count(),
        ];
        for stage in &stages {
            assert!(stage.validate().is_ok(), "{:?}", stage);
        }
    }

    #[test]
    fn test_mismatched_handler_is_rejected() {
        let stage: Stage<i64> = Stage::new(OperationKind::Map, Handler::Count, "broken");
        let err = stage.validate().unwrap_err();
        assert!(matches!(
            err,
            EngineError::HandlerMismatch { kind: OperationKind::Map, handler: "count" }
        ));
    }

    #[test]
    fn test_display_name_comes_from_handler() {
        let stage = Stage::<i64>::map(|n: i64, _, _| async move { Ok(n) });
        assert!(stage.name().contains("closure"));
        assert_eq!(stage.named("double").name(), "double");
    }

    #[test]
    fn test_entry_conversions() {
        let entry: Entry<i64> = 3.into();
        assert_eq!(entry.clone().into_option(), Some(3));
        assert!(!entry.is_removed());
        assert!(Entry::<i64>::Removed.is_removed());
    }
}
