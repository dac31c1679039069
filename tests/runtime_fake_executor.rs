// tests/runtime_fake_executor.rs

mod common;
use crate::common::{RegistryBuilder, WorkdirFixture, init_tracing, params, resolve_link, with_timeout};

use std::error::Error;
use std::sync::{Arc, Mutex};

use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use autobuilder::engine::{
    CoreRuntime, Runtime, RuntimeEvent, RuntimeOptions, ScheduledTask, SchedulerEvent,
    SchedulerHandle, SchedulerOptions, TaskOutcome, TaskParameters, TaskScheduler,
};
use autobuilder::errors::AutobuilderError;
use autobuilder::registry::TaskRegistry;
use autobuilder_test_utils::fake_executor::{FakeExecutor, dispatched_names};

type TestResult = Result<(), Box<dyn Error>>;

struct Harness {
    handle: SchedulerHandle,
    tx: mpsc::Sender<RuntimeEvent>,
    events: mpsc::UnboundedReceiver<SchedulerEvent>,
    runtime: JoinHandle<autobuilder::errors::Result<()>>,
    dispatched: Arc<Mutex<Vec<ScheduledTask>>>,
}

fn start(
    fixture: &WorkdirFixture,
    registry: Arc<TaskRegistry>,
    max_concurrent: usize,
    exit_when_idle: bool,
    make_executor: impl FnOnce(mpsc::Sender<RuntimeEvent>) -> FakeExecutor,
) -> Harness {
    let (tx, rx) = mpsc::channel(64);
    let (obs_tx, obs_rx) = mpsc::unbounded_channel();

    let executor = make_executor(tx.clone());
    let dispatched = executor.dispatched();
    let core = CoreRuntime::new(
        TaskScheduler::new(
            registry,
            SchedulerOptions::default().with_max_concurrent(max_concurrent),
        ),
        RuntimeOptions { exit_when_idle },
    );
    let runtime = Runtime::new(core, rx, &tx, executor, fixture.workdir.clone()).with_observer(obs_tx);

    Harness {
        handle: SchedulerHandle::new(tx.clone()),
        tx,
        events: obs_rx,
        runtime: tokio::spawn(runtime.run()),
        dispatched,
    }
}

fn summarize(event: &SchedulerEvent) -> String {
    match event {
        SchedulerEvent::TaskExecuting(task) => format!("executing {}", task.name()),
        SchedulerEvent::TaskComplete { task, outcome } => {
            format!("complete {} success={}", task.name(), outcome.is_success())
        }
        SchedulerEvent::QueueEmpty => "queue-empty".to_string(),
    }
}

async fn next_executing(events: &mut mpsc::UnboundedReceiver<SchedulerEvent>) -> ScheduledTask {
    loop {
        match events.recv().await {
            Some(SchedulerEvent::TaskExecuting(task)) => return task,
            Some(_) => continue,
            None => panic!("observer closed before a task started"),
        }
    }
}

#[tokio::test]
async fn single_build_cascades_and_updates_symlinks() -> TestResult {
    init_tracing();
    let fixture = WorkdirFixture::new();
    let build = fixture.build_dir("builds/2024/01/15/0");
    let registry = RegistryBuilder::new()
        .task("resolve")
        .task_after("build", &["resolve"])
        .task_after("smoketest", &["build"])
        .build();

    let mut h = start(&fixture, registry, 2, true, FakeExecutor::succeeding);

    h.handle
        .push_task(&build, "resolve", TaskParameters::new())
        .await?;
    with_timeout(&mut h.runtime).await??;

    assert_eq!(
        dispatched_names(&h.dispatched),
        vec!["resolve", "build", "smoketest"]
    );

    let mut seen = Vec::new();
    while let Some(event) = h.events.recv().await {
        seen.push(summarize(&event));
    }
    assert_eq!(
        seen,
        vec![
            "executing resolve",
            "complete resolve success=true",
            "executing build",
            "complete build success=true",
            "executing smoketest",
            "complete smoketest success=true",
            "queue-empty",
        ]
    );

    let canonical = std::fs::canonicalize(&build)?;
    for task in ["resolve", "build", "smoketest"] {
        assert_eq!(resolve_link(&fixture.workdir.task_link(task)), canonical);
        assert_eq!(resolve_link(&fixture.workdir.completed_link(task)), canonical);
    }
    // Links are relative so the workdir can move.
    let raw = std::fs::read_link(fixture.workdir.task_link("build"))?;
    assert!(raw.is_relative(), "expected relative link, got {raw:?}");
    Ok(())
}

#[tokio::test]
async fn failed_task_records_completion_and_stalls_pipeline() -> TestResult {
    init_tracing();
    let fixture = WorkdirFixture::new();
    let build = fixture.build_dir("builds/2024/01/15/0");
    let registry = RegistryBuilder::new()
        .task("build")
        .task_after("smoketest", &["build"])
        .build();

    let mut h = start(&fixture, registry, 2, true, |tx| {
        FakeExecutor::with_outcomes(tx, |task| {
            Some(if task.name() == "build" {
                TaskOutcome::Failed {
                    error: "Child process exited with code 2".to_string(),
                }
            } else {
                TaskOutcome::Success { changed: true }
            })
        })
    });

    h.handle.push_task(&build, "build", TaskParameters::new()).await?;
    with_timeout(&mut h.runtime).await??;

    assert_eq!(dispatched_names(&h.dispatched), vec!["build"]);
    assert_eq!(
        resolve_link(&fixture.workdir.completed_link("build")),
        std::fs::canonicalize(&build)?
    );
    assert!(!fixture.workdir.completed_link("smoketest").exists());

    let mut failure = None;
    while let Some(event) = h.events.recv().await {
        if let SchedulerEvent::TaskComplete { outcome, .. } = event {
            failure = outcome.error().map(str::to_string);
        }
    }
    assert_eq!(failure.as_deref(), Some("Child process exited with code 2"));
    Ok(())
}

#[tokio::test]
async fn unknown_push_is_reported_and_runtime_keeps_going() -> TestResult {
    init_tracing();
    let fixture = WorkdirFixture::new();
    let build = fixture.build_dir("local");
    let registry = RegistryBuilder::new().task("a").build();

    let h = start(&fixture, registry, 1, false, FakeExecutor::manual);

    let err = h
        .handle
        .push_task(&build, "missing", TaskParameters::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AutobuilderError::UnknownTask(_)));
    assert!(!fixture.workdir.task_link("missing").exists());

    h.handle.push_task(&build, "a", TaskParameters::new()).await?;
    assert!(with_timeout(h.handle.is_task_executing("a")).await?);

    h.handle.shutdown().await?;
    with_timeout(h.runtime).await??;
    Ok(())
}

#[tokio::test]
async fn concurrency_cap_and_status_queries() -> TestResult {
    init_tracing();
    let fixture = WorkdirFixture::new();
    let build = fixture.build_dir("local");
    let registry = RegistryBuilder::new().task("a").task("b").task("c").build();

    let mut h = start(&fixture, registry, 2, false, FakeExecutor::manual);

    for name in ["a", "b", "c"] {
        h.handle.push_task(&build, name, params(json!({"who": name}))).await?;
    }
    let a = with_timeout(next_executing(&mut h.events)).await;
    let b = with_timeout(next_executing(&mut h.events)).await;
    assert_eq!((a.name(), b.name()), ("a", "b"));

    let state = h.handle.task_state().await?;
    let summary: Vec<(bool, &str)> = state.iter().map(|s| (s.running, s.name.as_str())).collect();
    assert_eq!(summary, vec![(false, "c"), (true, "a"), (true, "b")]);
    assert!(h.handle.is_task_queued("c").await?);
    assert!(!h.handle.is_task_queued("a").await?);
    assert!(h.handle.is_task_executing("a").await?);

    h.tx.send(RuntimeEvent::TaskCompleted {
        run_id: a.run_id,
        task: "a".to_string(),
        outcome: TaskOutcome::Success { changed: false },
    })
    .await?;

    let c = with_timeout(next_executing(&mut h.events)).await;
    assert_eq!(c.name(), "c");
    assert_eq!(c.data.parameters, params(json!({"who": "c"})));
    assert_eq!(dispatched_names(&h.dispatched), vec!["a", "b", "c"]);

    h.handle.shutdown().await?;
    with_timeout(h.runtime).await??;
    Ok(())
}

#[tokio::test]
async fn stray_completion_is_fatal() -> TestResult {
    init_tracing();
    let fixture = WorkdirFixture::new();
    let registry = RegistryBuilder::new().task("a").build();

    let h = start(&fixture, registry, 1, false, FakeExecutor::manual);

    h.tx.send(RuntimeEvent::TaskCompleted {
        run_id: 7,
        task: "a".to_string(),
        outcome: TaskOutcome::Success { changed: true },
    })
    .await?;

    let result = with_timeout(h.runtime).await?;
    assert!(matches!(
        result,
        Err(AutobuilderError::ConcurrencyInvariantViolation { run_id: 7, .. })
    ));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn rate_limited_pushes_fire_once_after_cool_down() -> TestResult {
    init_tracing();
    let fixture = WorkdirFixture::new();
    let build = fixture.build_dir("builds/2024/01/15/0");
    let registry = RegistryBuilder::new().task("resolve").rate_limited(60).build();

    let mut h = start(&fixture, registry, 1, false, |tx| {
        FakeExecutor::with_outcomes(tx, |_| Some(TaskOutcome::Success { changed: false }))
    });

    for n in 0..5 {
        h.handle.push_task(&build, "resolve", params(json!({"n": n}))).await?;
    }

    let first = next_executing(&mut h.events).await;
    assert_eq!(first.data.parameters, params(json!({"n": 0})));

    // Paused clock: the runtime's 60s timer is auto-advanced.
    let started = tokio::time::Instant::now();
    let second = next_executing(&mut h.events).await;
    assert_eq!(second.data.parameters, params(json!({"n": 4})));
    assert!(started.elapsed() >= std::time::Duration::from_secs(59));

    h.handle.shutdown().await?;
    h.runtime.await??;
    assert_eq!(dispatched_names(&h.dispatched).len(), 2);
    Ok(())
}
