//! Execution strategies - one per operation kind

use crate::core::{
    sort::merge_sort, Entry, Handler, ItemFn, OperationKind, Output, Stage, StageContext,
};
use crate::error::EngineError;
use anyhow::{anyhow, Result};
use std::sync::Arc;
use tokio::task::JoinSet;

/// What a stage produced, before tombstones are pruned
pub(crate) enum Outcome<T> {
    Entries(Vec<Entry<T>>),
    Value(Output<T>),
}

impl<T> Outcome<T> {
    /// Drop removed entries and settle into the value the next stage sees
    pub(crate) fn prune(self) -> Output<T> {
        match self {
            Outcome::Entries(entries) => {
                Output::Items(entries.into_iter().filter_map(Entry::into_option).collect())
            }
            Outcome::Value(value) => value,
        }
    }
}

/// Run one stage against the current value
pub(crate) async fn apply<T>(stage: &Stage<T>, input: &Output<T>, ctx: &StageContext) -> Result<Outcome<T>>
where
    T: Clone + Send + Sync + 'static,
{
    let kind = stage.kind();

    if let Handler::Source(source) = stage.handler() {
        let items = source(ctx.clone()).await?;
        return Ok(Outcome::Value(Output::Items(items)));
    }

    let items = input.as_sequence(kind)?;

    let outcome = match (kind, stage.handler()) {
        (OperationKind::Map, Handler::Transform(f)) => Outcome::Entries(fan_out(f, items, ctx).await?),
        (OperationKind::MapSeries, Handler::Transform(f)) => {
            Outcome::Entries(series(f, items, ctx).await?)
        }
        (OperationKind::Filter, Handler::Predicate(f)) => {
            let keep = fan_out(f, items, ctx).await?;
            let kept = items
                .iter()
                .zip(keep)
                .filter_map(|(item, keep)| keep.then(|| item.clone()))
                .collect();
            Outcome::Value(Output::Items(kept))
        }
        (OperationKind::ForEach, Handler::Visit(f)) => {
            fan_out(f, items, ctx).await?;
            Outcome::Value(Output::Void)
        }
        (OperationKind::ForEachSeries, Handler::Visit(f)) => {
            series(f, items, ctx).await?;
            Outcome::Value(Output::Void)
        }
        (OperationKind::Tap, Handler::Visit(f)) => {
            series(f, items, ctx).await?;
            Outcome::Value(Output::Items(items.to_vec()))
        }
        (OperationKind::All, Handler::Batch(f)) => {
            Outcome::Value(Output::Items(f(items.to_vec(), ctx.clone()).await?))
        }
        (OperationKind::Reduce, Handler::Reduce { reducer, initial }) => {
            let shared: Arc<[T]> = Arc::from(items.to_vec());
            let mut acc = initial.clone();
            for item in items.iter().cloned() {
                acc = reducer(acc, item, shared.clone(), ctx.clone()).await?;
            }
            Outcome::Value(Output::Item(Some(acc)))
        }
        (OperationKind::ReduceRight, Handler::Reduce { reducer, initial }) => {
            let reversed: Vec<T> = items.iter().rev().cloned().collect();
            let shared: Arc<[T]> = Arc::from(reversed.clone());
            let mut acc = initial.clone();
            for item in reversed {
                acc = reducer(acc, item, shared.clone(), ctx.clone()).await?;
            }
            Outcome::Value(Output::Item(Some(acc)))
        }
        (OperationKind::Count, Handler::Count) => Outcome::Value(Output::Count(items.len())),
        (OperationKind::Find, Handler::Predicate(f)) => {
            let shared: Arc<[T]> = Arc::from(items.to_vec());
            let mut found = None;
            for item in items {
                if f(item.clone(), shared.clone(), ctx.clone()).await? {
                    found = Some(item.clone());
                    break;
                }
            }
            Outcome::Value(Output::Item(found))
        }
        (OperationKind::FindLast, Handler::Predicate(f)) => {
            // Last match of the leading run, not of the whole sequence
            let shared: Arc<[T]> = Arc::from(items.to_vec());
            let mut last = None;
            for item in items {
                if !f(item.clone(), shared.clone(), ctx.clone()).await? {
                    break;
                }
                last = Some(item.clone());
            }
            Outcome::Value(Output::Item(last))
        }
        (OperationKind::TakeWhile, Handler::Predicate(f)) => {
            Outcome::Value(Output::Items(leading_run(f, items, ctx, true).await?))
        }
        (OperationKind::TakeUntil, Handler::Predicate(f)) => {
            Outcome::Value(Output::Items(leading_run(f, items, ctx, false).await?))
        }
        (OperationKind::Sort, Handler::Comparator(f)) => {
            Outcome::Value(Output::Items(sorted(f, items, ctx).await?))
        }
        (OperationKind::Max, Handler::Comparator(f)) => {
            Outcome::Value(Output::Item(sorted(f, items, ctx).await?.pop()))
        }
        (OperationKind::Min, Handler::Comparator(f)) => {
            Outcome::Value(Output::Item(sorted(f, items, ctx).await?.into_iter().next()))
        }
        (OperationKind::Take, Handler::Take(n)) => {
            Outcome::Value(Output::Items(items.iter().take(*n).cloned().collect()))
        }
        (OperationKind::TakeLast, Handler::Take(n)) => {
            let skip = items.len().saturating_sub(*n);
            Outcome::Value(Output::Items(items[skip..].to_vec()))
        }
        (kind, handler) => {
            return Err(EngineError::HandlerMismatch {
                kind,
                handler: handler.shape(),
            }
            .into())
        }
    };

    Ok(outcome)
}

/// Launch every invocation at once and wait for all of them to settle.
///
/// Results come back in input order regardless of completion order. If any
/// invocation failed, the first failure by position is returned.
async fn fan_out<T, O>(f: &ItemFn<T, O>, items: &[T], ctx: &StageContext) -> Result<Vec<O>>
where
    T: Clone + Send + Sync + 'static,
    O: Send + 'static,
{
    let shared: Arc<[T]> = Arc::from(items.to_vec());
    let mut join = JoinSet::new();
    for (index, item) in items.iter().cloned().enumerate() {
        let fut = f(item, shared.clone(), ctx.clone());
        join.spawn(async move { (index, fut.await) });
    }

    let mut slots: Vec<Option<Result<O>>> = items.iter().map(|_| None).collect();
    while let Some(joined) = join.join_next().await {
        let (index, result) = joined.map_err(|e| EngineError::HandlerPanicked(e.to_string()))?;
        slots[index] = Some(result);
    }

    slots
        .into_iter()
        .map(|slot| slot.unwrap_or_else(|| Err(anyhow!("handler produced no result"))))
        .collect()
}

/// Invoke the handler one item at a time, in order
async fn series<T, O>(f: &ItemFn<T, O>, items: &[T], ctx: &StageContext) -> Result<Vec<O>>
where
    T: Clone + Send + Sync + 'static,
{
    let shared: Arc<[T]> = Arc::from(items.to_vec());
    let mut out = Vec::with_capacity(items.len());
    for item in items.iter().cloned() {
        out.push(f(item, shared.clone(), ctx.clone()).await?);
    }
    Ok(out)
}

/// Leading items for which the predicate equals `expected`
async fn leading_run<T>(
    f: &ItemFn<T, bool>,
    items: &[T],
    ctx: &StageContext,
    expected: bool,
) -> Result<Vec<T>>
where
    T: Clone + Send + Sync + 'static,
{
    let shared: Arc<[T]> = Arc::from(items.to_vec());
    let mut out = Vec::new();
    for item in items {
        if f(item.clone(), shared.clone(), ctx.clone()).await? != expected {
            break;
        }
        out.push(item.clone());
    }
    Ok(out)
}

async fn sorted<T>(
    f: &crate::core::ComparatorFn<T>,
    items: &[T],
    ctx: &StageContext,
) -> Result<Vec<T>>
where
    T: Clone + Send + Sync + 'static,
{
    let shared: Arc<[T]> = Arc::from(items.to_vec());
    let compare = |a: T, b: T| f(a, b, shared.clone(), ctx.clone());
    merge_sort(items.to_vec(), &compare).await
}
