// tests/fs_workdir.rs

#![cfg(unix)]

mod common;
use crate::common::WorkdirFixture;

use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use autobuilder::fs::{Workdir, atomic_symlink_swap, relative_path, write_json_atomic};

type TestResult = Result<(), Box<dyn Error>>;

#[test]
fn open_creates_layout() -> TestResult {
    let fixture = WorkdirFixture::new();
    assert!(fixture.workdir.tasks_path().is_dir());
    assert!(fixture.workdir.completed_tasks_path().is_dir());
    assert_eq!(fixture.workdir.results_path(), fixture.root().join("results"));
    Ok(())
}

#[test]
fn workdir_check_requires_manifest_and_rejects_git() -> TestResult {
    let tmp = tempfile::tempdir()?;
    let err = Workdir::check_is_work_directory(tmp.path()).unwrap_err();
    assert!(err.to_string().contains("No manifest.json"));

    fs::write(tmp.path().join("manifest.json"), "{}")?;
    Workdir::check_is_work_directory(tmp.path())?;

    fs::create_dir(tmp.path().join(".git"))?;
    let err = Workdir::check_is_work_directory(tmp.path()).unwrap_err();
    assert!(err.to_string().contains(".git"));
    Ok(())
}

#[test]
fn symlink_swap_replaces_existing_link_with_relative_target() -> TestResult {
    let fixture = WorkdirFixture::new();
    let old = fixture.build_dir("builds/2024/01/15/0");
    let new = fixture.build_dir("builds/2024/01/15/1");
    let link = fixture.workdir.task_link("build");

    fixture.workdir.set_task_build_path("build", &old)?;
    assert_eq!(fs::canonicalize(&link)?, fs::canonicalize(&old)?);

    fixture.workdir.set_task_build_path("build", &new)?;
    assert_eq!(fs::canonicalize(&link)?, fs::canonicalize(&new)?);
    assert_eq!(
        fs::read_link(&link)?,
        PathBuf::from("../builds/2024/01/15/1")
    );

    // No temporary links left behind.
    let leftovers: Vec<_> = fs::read_dir(fixture.workdir.tasks_path())?
        .filter_map(|e| e.ok())
        .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
    Ok(())
}

#[test]
fn symlink_swap_to_missing_target_fails() {
    let fixture = WorkdirFixture::new();
    let link = fixture.root().join("results").join("successful");
    let missing = fixture.root().join("builds/nope");
    assert!(atomic_symlink_swap(&link, &missing).is_err());
    assert!(fs::symlink_metadata(&link).is_err());
}

#[test]
fn relative_paths_between_directories() {
    assert_eq!(
        relative_path(Path::new("/w/tasks"), Path::new("/w/builds/2024/01/15/0")),
        PathBuf::from("../builds/2024/01/15/0")
    );
    assert_eq!(
        relative_path(Path::new("/w/results/tasks"), Path::new("/w/local")),
        PathBuf::from("../../local")
    );
    assert_eq!(relative_path(Path::new("/w"), Path::new("/w")), PathBuf::from("."));
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Sample {
    task_meta_version: u32,
    complete: bool,
}

#[test]
fn json_is_written_atomically_and_pretty() -> TestResult {
    let tmp = tempfile::tempdir()?;
    let path = tmp.path().join("meta.json");
    fs::write(&path, "stale")?;

    write_json_atomic(&path, &Sample { task_meta_version: 0, complete: false })?;

    let contents = fs::read_to_string(&path)?;
    assert!(contents.ends_with("}\n"));
    let value: serde_json::Value = serde_json::from_str(&contents)?;
    assert_eq!(value, serde_json::json!({"taskMetaVersion": 0, "complete": false}));
    assert!(!tmp.path().join(".meta.json.tmp").exists());
    Ok(())
}

#[test]
fn relative_name_is_relative_to_root() {
    let fixture = WorkdirFixture::new();
    let inside = fixture.root().join("builds/2024/01/15/0/build");
    assert_eq!(fixture.workdir.relative_name(&inside), "builds/2024/01/15/0/build");
    assert_eq!(fixture.workdir.relative_name(Path::new("/opt/x")), "/opt/x");
}
