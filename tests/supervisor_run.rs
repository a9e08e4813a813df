mod common;

use std::error::Error;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use common::builders::{diamond_pipeline, JobSpecBuilder, PipelineBuilder};
use common::fake_backend::{FakeOutcome, TagWritingBackend};
use common::{fast_run_options, init_tracing, quiet_init_options, with_timeout};

use pipedag::fs::mock::MockFileSystem;
use pipedag::fs::FileSystem;
use pipedag::job::{JobStatus, Pipeline};
use pipedag::store::{LogsLayout, PipelineState, TagKind};

type TestResult = Result<(), Box<dyn Error>>;

const LOGS: &str = "/logs";

fn layout() -> LogsLayout {
    LogsLayout::new(LOGS)
}

/// A backend that finishes every job of the pipeline, creating its declared
/// outputs.
fn finish_all_backend(fs: &MockFileSystem, pipeline: &Pipeline) -> TagWritingBackend {
    let mut backend = TagWritingBackend::new(Arc::new(fs.clone()), layout());
    for (name, spec) in pipeline.iter() {
        backend = backend.with_outcome(
            name,
            FakeOutcome::Finish {
                outputs: spec.files_out.clone(),
            },
        );
    }
    backend
}

async fn run(fs: &MockFileSystem, backend: TagWritingBackend, max_queued: usize) -> TestResult {
    with_timeout(pipedag::run_pipeline_with(
        Arc::new(fs.clone()),
        Path::new(LOGS),
        &fast_run_options(max_queued),
        Box::new(backend),
    ))
    .await?;
    Ok(())
}

#[tokio::test]
async fn diamond_runs_to_completion_in_dependency_order() -> TestResult {
    init_tracing();
    let fs = MockFileSystem::new();
    let pipeline = diamond_pipeline();
    pipedag::init_pipeline_with(&fs, pipeline.clone(), &quiet_init_options(LOGS))?;

    let backend = finish_all_backend(&fs, &pipeline);
    let submitted = backend.submitted();
    run(&fs, backend, 8).await?;

    let order = submitted.lock().unwrap().clone();
    assert_eq!(order.len(), 4, "each job is submitted exactly once");
    let pos = |name: &str| order.iter().position(|n| n == name).unwrap();
    assert_eq!(pos("a"), 0);
    assert!(pos("d") > pos("b") && pos("d") > pos("c"));

    let state = PipelineState::load(&fs, &layout())?;
    for name in pipeline.keys() {
        assert_eq!(state.status_of(name), JobStatus::Finished);
    }
    assert!(fs.exists(Path::new("/w/d.out")));

    // Lock released on normal completion.
    assert!(!fs.exists(&layout().lock()));
    Ok(())
}

#[tokio::test]
async fn stores_keep_key_parity_after_a_run() -> TestResult {
    init_tracing();
    let fs = MockFileSystem::new();
    let pipeline = diamond_pipeline();
    pipedag::init_pipeline_with(&fs, pipeline.clone(), &quiet_init_options(LOGS))?;
    let backend = finish_all_backend(&fs, &pipeline);
    run(&fs, backend, 8).await?;

    let state = PipelineState::load(&fs, &layout())?;
    let keys: Vec<_> = state.jobs.keys().collect();
    assert_eq!(state.status.keys().collect::<Vec<_>>(), keys);
    assert_eq!(state.logs.keys().collect::<Vec<_>>(), keys);
    assert_eq!(state.profile.keys().collect::<Vec<_>>(), keys);

    // Logs and profiles were ingested from the per-job files.
    assert_eq!(state.logs["a"], "a: ok\n");
    assert_eq!(state.profile["a"]["elapsed_secs"], 0.1);
    Ok(())
}

#[tokio::test]
async fn failure_cascades_to_descendants_but_spares_siblings() -> TestResult {
    init_tracing();
    let fs = MockFileSystem::new();
    let pipeline = diamond_pipeline();
    pipedag::init_pipeline_with(&fs, pipeline.clone(), &quiet_init_options(LOGS))?;

    let mut backend = finish_all_backend(&fs, &pipeline);
    backend = backend.with_outcome("c", FakeOutcome::Fail);
    let submitted = backend.submitted();
    run(&fs, backend, 8).await?;

    let state = PipelineState::load(&fs, &layout())?;
    assert_eq!(state.status_of("a"), JobStatus::Finished);
    assert_eq!(state.status_of("b"), JobStatus::Finished);
    assert_eq!(state.status_of("c"), JobStatus::Failed);
    assert_eq!(state.status_of("d"), JobStatus::None, "d never started");

    let order = submitted.lock().unwrap().clone();
    assert!(!order.contains(&"d".to_string()));

    // The failed job's log was ingested; the lock was released.
    assert_eq!(state.logs["c"], "c: boom\n");
    assert!(!fs.exists(&layout().lock()));
    Ok(())
}

#[tokio::test]
async fn exit_without_outcome_tag_counts_as_failure() -> TestResult {
    init_tracing();
    let fs = MockFileSystem::new();
    let pipeline = PipelineBuilder::new()
        .with_job("crashy", JobSpecBuilder::new("boom").output("/w/x.out").build())
        .build();
    pipedag::init_pipeline_with(&fs, pipeline.clone(), &quiet_init_options(LOGS))?;

    let backend = TagWritingBackend::new(Arc::new(fs.clone()), layout())
        .with_outcome("crashy", FakeOutcome::ExitOnly);
    run(&fs, backend, 1).await?;

    let state = PipelineState::load(&fs, &layout())?;
    assert_eq!(state.status_of("crashy"), JobStatus::Failed);
    Ok(())
}

#[tokio::test]
async fn edgeless_pipeline_respects_the_concurrency_cap() -> TestResult {
    init_tracing();
    let fs = MockFileSystem::new();
    let mut builder = PipelineBuilder::new();
    for name in ["j1", "j2", "j3", "j4", "j5"] {
        builder = builder.with_job(name, JobSpecBuilder::new("run").build());
    }
    let pipeline = builder.build();
    pipedag::init_pipeline_with(&fs, pipeline.clone(), &quiet_init_options(LOGS))?;

    let backend = finish_all_backend(&fs, &pipeline);
    let max_in_flight = backend.max_in_flight();
    let submitted = backend.submitted();
    run(&fs, backend, 2).await?;

    assert!(*max_in_flight.lock().unwrap() <= 2);
    assert_eq!(submitted.lock().unwrap().len(), 5);

    let state = PipelineState::load(&fs, &layout())?;
    for name in pipeline.keys() {
        assert_eq!(state.status_of(name), JobStatus::Finished);
    }
    Ok(())
}

#[tokio::test]
async fn empty_pipeline_returns_immediately() -> TestResult {
    init_tracing();
    let fs = MockFileSystem::new();
    pipedag::init_pipeline_with(&fs, Pipeline::new(), &quiet_init_options(LOGS))?;

    let backend = TagWritingBackend::new(Arc::new(fs.clone()), layout());
    let submitted = backend.submitted();
    run(&fs, backend, 4).await?;

    assert!(submitted.lock().unwrap().is_empty());
    Ok(())
}

#[tokio::test]
async fn deleting_the_lock_interrupts_the_supervisor() -> TestResult {
    init_tracing();
    let fs = MockFileSystem::new();
    let pipeline = PipelineBuilder::new()
        .with_job("slow1", JobSpecBuilder::new("sleep").output("/w/s1.out").build())
        .with_job("slow2", JobSpecBuilder::new("sleep").output("/w/s2.out").build())
        .build();
    pipedag::init_pipeline_with(&fs, pipeline.clone(), &quiet_init_options(LOGS))?;

    let backend = TagWritingBackend::new(Arc::new(fs.clone()), layout())
        .with_outcome("slow1", FakeOutcome::Hang)
        .with_outcome("slow2", FakeOutcome::Hang);

    // Remove the lock once both jobs are in flight.
    let fs_clone = fs.clone();
    let lock_path = layout().lock();
    tokio::spawn(async move {
        while !fs_clone.exists(&lock_path) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        let _ = pipedag::fs::FileSystem::remove_file(&fs_clone, &lock_path);
    });

    run(&fs, backend, 4).await?;

    // Both jobs stay in flight on disk; a later initialization normalizes
    // them: one finished after the fact, the other reverts to none.
    let state = PipelineState::load(&fs, &layout())?;
    assert!(matches!(
        state.status_of("slow1"),
        JobStatus::Submitted | JobStatus::Running
    ));

    fs.write(&layout().tag("slow1", TagKind::Finished), b"")?;
    fs.write(&layout().job_log("slow1"), b"made it\n")?;

    pipedag::init_pipeline_with(&fs, pipeline.clone(), &quiet_init_options(LOGS))?;
    let state = PipelineState::load(&fs, &layout())?;
    assert_eq!(state.status_of("slow1"), JobStatus::Finished);
    assert_eq!(state.logs["slow1"], "made it\n");
    assert_eq!(state.status_of("slow2"), JobStatus::None);
    Ok(())
}
