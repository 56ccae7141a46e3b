//! Debounced rebuilds driven by recorded changes

mod helpers;

use batchpipe::{Pipeline, RebuildScheduler};
use helpers::*;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const WINDOW: Duration = Duration::from_millis(2500);

/// A pipeline fed by the scheduler, recording the batch every run sees
fn watched(
    scheduler: &RebuildScheduler,
    batches: &Recorder<Vec<PathBuf>>,
) -> Pipeline<PathBuf> {
    let batches = batches.clone();
    Pipeline::new(scheduler.root())
        .named("site")
        .append(scheduler.source_stage(|path: PathBuf| async move { Ok(path) }))
        .unwrap()
        .all(move |paths: Vec<PathBuf>, _| {
            let batches = batches.clone();
            async move {
                batches.push(paths.clone());
                Ok(paths)
            }
        })
}

#[tokio::test(start_paused = true)]
async fn burst_of_changes_triggers_one_rebuild() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let scheduler = RebuildScheduler::new(dir.path()).with_window(WINDOW);
    let batches = Recorder::default();
    let pipeline = watched(&scheduler, &batches);
    let log = EventLog::attach(&pipeline);

    pipeline.run().await.unwrap();
    assert!(scheduler.is_started());

    let root = scheduler.root().to_path_buf();
    for name in ["a.md", "b.md", "a.md", "c.md", "b.md"] {
        assert!(scheduler.record_change(root.join(name)));
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    tokio::time::sleep(WINDOW * 2).await;

    let expected: Vec<PathBuf> = ["a.md", "b.md", "c.md"]
        .iter()
        .map(|name| root.join(name))
        .collect();
    assert_eq!(log.rebuilds(), vec![expected.clone()]);
    assert_eq!(batches.entries(), vec![vec![], expected]);
    assert_eq!(scheduler.pending_len(), 0);
    assert!(scheduler.active_batch().is_empty());
}

#[tokio::test(start_paused = true)]
async fn changes_during_a_rebuild_wait_for_the_next_one() {
    let dir = tempfile::tempdir().unwrap();
    let scheduler = RebuildScheduler::new(dir.path()).with_window(WINDOW);
    let root = scheduler.root().to_path_buf();

    let in_flight = Arc::new(AtomicUsize::new(0));
    let overlap = Arc::new(AtomicUsize::new(0));
    let batches = Recorder::default();
    let pipeline = {
        let in_flight = in_flight.clone();
        let overlap = overlap.clone();
        watched(&scheduler, &batches).tap(move |_, _, _| {
            let in_flight = in_flight.clone();
            let overlap = overlap.clone();
            async move {
                if in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
                    overlap.fetch_add(1, Ordering::SeqCst);
                }
                tokio::time::sleep(Duration::from_millis(1000)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok(())
            }
        })
    };
    let log = EventLog::attach(&pipeline);

    pipeline.run().await.unwrap();

    scheduler.record_change(root.join("first.md"));
    // The rebuild starts after the window and takes a second
    tokio::time::sleep(WINDOW + Duration::from_millis(500)).await;
    scheduler.record_change(root.join("second.md"));
    tokio::time::sleep(WINDOW * 3).await;

    assert_eq!(
        log.rebuilds(),
        vec![vec![root.join("first.md")], vec![root.join("second.md")]]
    );
    assert_eq!(log.completed_runs(), 3);
    assert_eq!(overlap.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn rebuild_reruns_the_root_pipeline() {
    let dir = tempfile::tempdir().unwrap();
    let scheduler = RebuildScheduler::new(dir.path()).with_window(WINDOW);
    let root_path = scheduler.root().to_path_buf();

    let batches = Recorder::default();
    let child = watched(&scheduler, &batches).named("posts");
    let site = Pipeline::new(&root_path)
        .named("site")
        .embed(&child)
        .unwrap()
        .count();
    let site_log = EventLog::attach(&site);

    site.run().await.unwrap();
    scheduler.record_change(root_path.join("post.md"));
    tokio::time::sleep(WINDOW * 2).await;

    assert_eq!(site_log.rebuilds(), vec![vec![root_path.join("post.md")]]);
    assert_eq!(site_log.completed_runs(), 2);
    assert_eq!(batches.entries().last(), Some(&vec![root_path.join("post.md")]));
}

#[tokio::test(start_paused = true)]
async fn worker_stops_once_the_pipeline_is_gone() {
    let dir = tempfile::tempdir().unwrap();
    let scheduler = RebuildScheduler::new(dir.path()).with_window(WINDOW);
    let batches = Recorder::default();
    let pipeline = watched(&scheduler, &batches);

    pipeline.run().await.unwrap();
    drop(pipeline);

    scheduler.record_change(scheduler.root().join("late.md"));
    tokio::time::sleep(WINDOW * 2).await;

    assert_eq!(batches.entries().len(), 1);
}

#[test]
fn filtered_changes_are_ignored() {
    let scheduler = RebuildScheduler::new("/site")
        .with_pattern("**/*.md")
        .unwrap();
    assert!(scheduler.record_change("/site/posts/a.md"));
    assert!(!scheduler.record_change("/site/posts/a.txt"));
    assert_eq!(scheduler.pending_len(), 1);
}

#[tokio::test(start_paused = true)]
async fn loaders_that_fail_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let scheduler = RebuildScheduler::new(dir.path()).with_window(WINDOW);
    let root = scheduler.root().to_path_buf();
    let loaded = Recorder::default();
    let sink = loaded.clone();

    let pipeline = Pipeline::new(&root)
        .append(scheduler.stage(|path: PathBuf| async move {
            if path.ends_with("bad.md") {
                anyhow::bail!("unreadable");
            }
            Ok(path)
        }))
        .unwrap()
        .tap(move |path: PathBuf, _, _| {
            let sink = sink.clone();
            async move {
                sink.push(path);
                Ok(())
            }
        });

    pipeline.run().await.unwrap();
    scheduler.record_change(root.join("good.md"));
    scheduler.record_change(root.join("bad.md"));
    tokio::time::sleep(WINDOW * 2).await;

    assert_eq!(loaded.entries(), vec![root.join("good.md")]);
}

#[tokio::test(start_paused = true)]
async fn change_during_a_running_build_waits_for_it() {
    let dir = tempfile::tempdir().unwrap();
    let scheduler = RebuildScheduler::new(dir.path()).with_window(WINDOW);
    let root = scheduler.root().to_path_buf();

    let runs = Arc::new(AtomicUsize::new(0));
    let in_flight = Arc::new(AtomicUsize::new(0));
    let overlap = Arc::new(AtomicUsize::new(0));
    let pipeline = {
        let (runs, in_flight, overlap) = (runs.clone(), in_flight.clone(), overlap.clone());
        let (scheduler, root) = (scheduler.clone(), root.clone());
        Pipeline::new(&root)
            .append(scheduler.stage(|path: PathBuf| async move { Ok(path) }))
            .unwrap()
            .all(move |paths: Vec<PathBuf>, _| {
                let (runs, in_flight, overlap) = (runs.clone(), in_flight.clone(), overlap.clone());
                let (scheduler, root) = (scheduler.clone(), root.clone());
                async move {
                    if in_flight.fetch_add(1, Ordering::SeqCst) > 0 {
                        overlap.fetch_add(1, Ordering::SeqCst);
                    }
                    // The first build sees an edit while it is still busy
                    if runs.fetch_add(1, Ordering::SeqCst) == 0 {
                        scheduler.record_change(root.join("early.md"));
                    }
                    tokio::time::sleep(WINDOW * 2).await;
                    in_flight.fetch_sub(1, Ordering::SeqCst);
                    Ok(paths)
                }
            })
    };
    let log = EventLog::attach(&pipeline);

    pipeline.run().await.unwrap();
    tokio::time::sleep(WINDOW * 4).await;

    assert_eq!(overlap.load(Ordering::SeqCst), 0);
    assert_eq!(log.rebuilds(), vec![vec![root.join("early.md")]]);
    assert_eq!(log.completed_runs(), 2);
}

#[tokio::test(start_paused = true)]
async fn dropping_the_pipeline_releases_the_watch() {
    let dir = tempfile::tempdir().unwrap();
    let scheduler = RebuildScheduler::new(dir.path()).with_window(WINDOW);
    let batches = Recorder::default();
    let pipeline = watched(&scheduler, &batches);

    pipeline.run().await.unwrap();
    assert!(scheduler.is_watching());

    // No change ever arrives, the drop alone stops the worker
    drop(pipeline);
    tokio::time::sleep(Duration::from_millis(1)).await;

    assert!(!scheduler.is_watching());
    assert!(!scheduler.is_started());
}
