// tests/task_runner.rs

#![cfg(unix)]

mod common;
use crate::common::{WorkdirFixture, init_tracing, params, with_timeout};

use std::error::Error;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde_json::json;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use autobuilder::engine::{RuntimeEvent, ScheduledTask, TaskData, TaskOutcome, TaskParameters};
use autobuilder::exec::task_files::TaskMeta;
use autobuilder::exec::task_runner::run_task;
use autobuilder::registry::TaskDefinition;

type TestResult = Result<(), Box<dyn Error>>;

const BUILD: &str = "builds/2024/01/15/0";

/// `sh -c <script> sh <name> <json>`: the task name is `$1`, the
/// parameters `$2`.
fn shell_task(build_path: PathBuf, name: &str, script: &str, parameters: TaskParameters) -> ScheduledTask {
    let command = ["sh", "-c", script, "sh"].iter().map(|s| s.to_string()).collect();
    ScheduledTask {
        run_id: 1,
        data: TaskData::new(TaskDefinition::new(name, command), parameters),
        build_path,
    }
}

async fn run(fixture: &WorkdirFixture, task: ScheduledTask) -> (u64, String, TaskOutcome) {
    let (tx, mut rx) = mpsc::channel(4);
    with_timeout(run_task(task, fixture.workdir.clone(), tx, CancellationToken::new())).await;
    match rx.recv().await {
        Some(RuntimeEvent::TaskCompleted {
            run_id,
            task,
            outcome,
        }) => (run_id, task, outcome),
        other => panic!("expected TaskCompleted, got {other:?}"),
    }
}

#[tokio::test]
async fn successful_task_writes_final_meta_and_reports_change() -> TestResult {
    init_tracing();
    let fixture = WorkdirFixture::new();
    let build = fixture.build_dir(BUILD);
    let script = r#"
        test "$1" = build || exit 9
        printf '%s' "$2" > params.json
        printf '%s' "$_OSTBUILD_BUILDDIR" > builddir.txt
        printf '%s' "$_OSTBUILD_WORKDIR" > workdir.txt
        pwd -P > cwd.txt
        echo hello
        echo oops >&2
        printf '{"modified": false}' > modified.json
        printf 'compiled 12 components \n\n' > status.txt
    "#;
    let task = shell_task(build.clone(), "build", script, params(json!({"arch": "x86_64"})));

    let (run_id, name, outcome) = run(&fixture, task).await;
    assert_eq!((run_id, name.as_str()), (1, "build"));
    assert_eq!(outcome, TaskOutcome::Success { changed: false });

    let task_dir = build.join("build");
    let sent: serde_json::Value = serde_json::from_str(&fs::read_to_string(task_dir.join("params.json"))?)?;
    assert_eq!(sent, json!({"arch": "x86_64"}));
    assert_eq!(
        fs::read_to_string(task_dir.join("builddir.txt"))?,
        fs::canonicalize(&build)?.display().to_string()
    );
    assert_eq!(
        fs::read_to_string(task_dir.join("workdir.txt"))?,
        fixture.root().display().to_string()
    );
    assert_eq!(
        fs::read_to_string(task_dir.join("cwd.txt"))?.trim_end(),
        fs::canonicalize(&task_dir)?.display().to_string()
    );

    let output = fs::read_to_string(task_dir.join("output.txt"))?;
    assert!(output.contains("hello"));
    assert!(output.contains("oops"), "stderr is merged into output.txt");
    assert!(!task_dir.join("errors.txt").exists());

    let meta = TaskMeta::load(&task_dir)?;
    assert_eq!(meta.task_meta_version, 0);
    assert!(meta.complete);
    assert_eq!(meta.success, Some(true));
    assert_eq!(meta.errmsg, None);
    assert_eq!(meta.build_path, BUILD);
    assert_eq!(meta.path, format!("{BUILD}/build"));
    assert_eq!(meta.status.as_deref(), Some("compiled 12 components"));
    assert!(meta.elapsed_millis.is_some());
    Ok(())
}

#[tokio::test]
async fn missing_modified_file_counts_as_changed() -> TestResult {
    let fixture = WorkdirFixture::new();
    let build = fixture.build_dir(BUILD);
    let task_dir = build.join("resolve");
    fs::create_dir_all(&task_dir)?;
    // Left over from an earlier run in the same build.
    fs::write(task_dir.join("modified.json"), r#"{"modified": false}"#)?;

    let task = shell_task(build, "resolve", "true", TaskParameters::new());
    let (_, _, outcome) = run(&fixture, task).await;

    assert_eq!(outcome, TaskOutcome::Success { changed: true });
    assert_eq!(TaskMeta::load(&task_dir)?.status, None);
    Ok(())
}

#[tokio::test]
async fn nonzero_exit_is_a_failure_with_message() -> TestResult {
    let fixture = WorkdirFixture::new();
    let build = fixture.build_dir(BUILD);
    let task = shell_task(build.clone(), "smoketest", "echo broken > status.txt; exit 3", TaskParameters::new());

    let (_, _, outcome) = run(&fixture, task).await;
    assert_eq!(
        outcome,
        TaskOutcome::Failed {
            error: "Child process exited with code 3".to_string()
        }
    );

    let meta = TaskMeta::load(&build.join("smoketest"))?;
    assert!(meta.complete);
    assert_eq!(meta.success, Some(false));
    assert_eq!(meta.errmsg.as_deref(), Some("Child process exited with code 3"));
    assert_eq!(meta.status.as_deref(), Some("broken"));
    Ok(())
}

#[tokio::test]
async fn killed_by_signal_is_reported() -> TestResult {
    let fixture = WorkdirFixture::new();
    let build = fixture.build_dir(BUILD);
    let task = shell_task(build, "build", "kill -9 $$", TaskParameters::new());

    let (_, _, outcome) = run(&fixture, task).await;
    assert_eq!(
        outcome,
        TaskOutcome::Failed {
            error: "Child process killed by signal 9".to_string()
        }
    );
    Ok(())
}

#[tokio::test]
async fn malformed_modified_file_fails_the_run() -> TestResult {
    let fixture = WorkdirFixture::new();
    let build = fixture.build_dir(BUILD);
    let task = shell_task(build.clone(), "resolve", "echo 'not json' > modified.json", TaskParameters::new());

    let (_, _, outcome) = run(&fixture, task).await;
    let error = outcome.error().unwrap_or_default().to_string();
    assert!(error.starts_with("Malformed task file"), "unexpected error: {error}");

    let meta = TaskMeta::load(&build.join("resolve"))?;
    assert_eq!(meta.success, Some(false));
    assert_eq!(meta.errmsg.as_deref(), Some(error.as_str()));
    Ok(())
}

#[tokio::test]
async fn errors_only_capture_discards_stdout() -> TestResult {
    let fixture = WorkdirFixture::new();
    let build = fixture.build_dir(BUILD);
    let mut task = shell_task(build.clone(), "build", "echo visible; echo problem >&2", TaskParameters::new());
    task.data.definition.preserve_stdout = false;

    run(&fixture, task).await;

    let task_dir = build.join("build");
    assert_eq!(fs::read_to_string(task_dir.join("errors.txt"))?, "problem\n");
    assert!(!task_dir.join("output.txt").exists());
    Ok(())
}

#[tokio::test]
async fn spawn_failure_is_a_task_failure() -> TestResult {
    let fixture = WorkdirFixture::new();
    let build = fixture.build_dir(BUILD);
    let task = ScheduledTask {
        run_id: 5,
        data: TaskData::new(
            TaskDefinition::new("build", vec!["/nonexistent/ostbuild".to_string()]),
            TaskParameters::new(),
        ),
        build_path: build.clone(),
    };

    let (run_id, _, outcome) = run(&fixture, task).await;
    assert_eq!(run_id, 5);
    let error = outcome.error().unwrap_or_default().to_string();
    assert!(error.starts_with("Failed to spawn"), "unexpected error: {error}");
    assert!(error.contains("/nonexistent/ostbuild"));

    let meta = TaskMeta::load(&build.join("build"))?;
    assert!(meta.complete);
    assert_eq!(meta.success, Some(false));
    Ok(())
}

#[tokio::test]
async fn cancelled_run_sends_nothing_and_leaves_partial_meta() -> TestResult {
    let fixture = WorkdirFixture::new();
    let build = fixture.build_dir(BUILD);
    let task = shell_task(build.clone(), "build", "touch started; sleep 30", TaskParameters::new());
    let (tx, mut rx) = mpsc::channel(4);
    let cancel = CancellationToken::new();

    let runner = tokio::spawn(run_task(task, fixture.workdir.clone(), tx, cancel.clone()));

    let started = build.join("build").join("started");
    with_timeout(async {
        while !started.exists() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    cancel.cancel();
    with_timeout(runner).await?;

    assert!(rx.recv().await.is_none());
    let meta = TaskMeta::load(&build.join("build"))?;
    assert!(!meta.complete);
    assert_eq!(meta.success, None);
    Ok(())
}
