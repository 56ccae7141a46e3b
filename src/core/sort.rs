//! Stable merge sort with an asynchronous comparator

use anyhow::Result;
use std::future::Future;
use std::pin::Pin;

type SortFuture<'a, T> = Pin<Box<dyn Future<Output = Result<Vec<T>>> + Send + 'a>>;

/// Sort `items` with a comparator that may need awaiting.
///
/// Only the sign of the comparator's result matters. Ties keep the element
/// from the earlier run first, so the sort is stable. Each comparison is
/// awaited before the next one is issued.
pub async fn merge_sort<T, F, Fut>(items: Vec<T>, compare: &F) -> Result<Vec<T>>
where
    T: Clone + Send,
    F: Fn(T, T) -> Fut + Sync,
    Fut: Future<Output = Result<i64>> + Send,
{
    sort_run(items, compare).await
}

fn sort_run<'a, T, F, Fut>(mut items: Vec<T>, compare: &'a F) -> SortFuture<'a, T>
where
    T: Clone + Send + 'a,
    F: Fn(T, T) -> Fut + Sync,
    Fut: Future<Output = Result<i64>> + Send + 'a,
{
    Box::pin(async move {
        if items.len() <= 1 {
            return Ok(items);
        }
        let right = items.split_off(items.len() / 2);
        let left = sort_run(items, compare).await?;
        let right = sort_run(right, compare).await?;
        merge(left, right, compare).await
    })
}

async fn merge<T, F, Fut>(left: Vec<T>, right: Vec<T>, compare: &F) -> Result<Vec<T>>
where
    T: Clone + Send,
    F: Fn(T, T) -> Fut + Sync,
    Fut: Future<Output = Result<i64>> + Send,
{
    let mut out = Vec::with_capacity(left.len() + right.len());
    let mut left = left.into_iter().peekable();
    let mut right = right.into_iter().peekable();

    loop {
        let (a, b) = match (left.peek(), right.peek()) {
            (Some(a), Some(b)) => (a.clone(), b.clone()),
            _ => break,
        };
        if compare(a, b).await? <= 0 {
            out.extend(left.next());
        } else {
            out.extend(right.next());
        }
    }

    out.extend(left);
    out.extend(right);
    Ok(out)
}
