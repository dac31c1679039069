// src/fs/mod.rs

//! Workdir layout and the atomic file primitives the scheduler and task
//! runner rely on.
//!
//! Layout under a workdir:
//! - `tasks/<name>` -> build dir the next run of `<name>` will use
//! - `results/tasks/<name>` -> build dir of the last completed `<name>`
//! - `manifest.json` marks the directory as a workdir

use std::fs;
use std::io::ErrorKind;
use std::os::unix::fs::symlink;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, bail};
use serde::Serialize;
use tracing::debug;

/// Paths of a workdir, resolved once.
#[derive(Debug, Clone)]
pub struct Workdir {
    root: PathBuf,
    tasks_path: PathBuf,
    completed_tasks_path: PathBuf,
}

impl Workdir {
    /// Open (and create if needed) the `tasks/` and `results/tasks/`
    /// directories under `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref();
        fs::create_dir_all(root).with_context(|| format!("creating workdir {:?}", root))?;
        let root = fs::canonicalize(root).with_context(|| format!("canonicalizing {:?}", root))?;

        let tasks_path = root.join("tasks");
        fs::create_dir_all(&tasks_path)
            .with_context(|| format!("creating dir {:?}", tasks_path))?;

        let completed_tasks_path = root.join("results").join("tasks");
        fs::create_dir_all(&completed_tasks_path)
            .with_context(|| format!("creating dir {:?}", completed_tasks_path))?;

        Ok(Self {
            root,
            tasks_path,
            completed_tasks_path,
        })
    }

    /// Refuse directories that don't look like a workdir.
    pub fn check_is_work_directory(dir: &Path) -> Result<()> {
        if !dir.join("manifest.json").exists() {
            bail!("No manifest.json found in {}", dir.display());
        }
        if dir.join(".git").exists() {
            bail!(
                ".git found in {}; are you in a source checkout?",
                dir.display()
            );
        }
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tasks_path(&self) -> &Path {
        &self.tasks_path
    }

    pub fn completed_tasks_path(&self) -> &Path {
        &self.completed_tasks_path
    }

    pub fn results_path(&self) -> PathBuf {
        self.root.join("results")
    }

    /// `tasks/<name>`.
    pub fn task_link(&self, task: &str) -> PathBuf {
        self.tasks_path.join(task)
    }

    /// `results/tasks/<name>`.
    pub fn completed_link(&self, task: &str) -> PathBuf {
        self.completed_tasks_path.join(task)
    }

    /// Repoint `tasks/<name>` at `build_path`.
    pub fn set_task_build_path(&self, task: &str, build_path: &Path) -> Result<()> {
        atomic_symlink_swap(&self.task_link(task), build_path)
    }

    /// Repoint `results/tasks/<name>` at `build_path`.
    pub fn record_completed(&self, task: &str, build_path: &Path) -> Result<()> {
        atomic_symlink_swap(&self.completed_link(task), build_path)
    }

    /// `path` relative to the workdir root, or the full path when it lies
    /// outside of it.
    pub fn relative_name(&self, path: &Path) -> String {
        match path.strip_prefix(&self.root) {
            Ok(rel) => rel.display().to_string(),
            Err(_) => path.display().to_string(),
        }
    }
}

/// Replace `link` with a symlink to `target` so that readers only ever see
/// the old or the new target.
///
/// The symlink is relative to the link's parent directory.
pub fn atomic_symlink_swap(link: &Path, target: &Path) -> Result<()> {
    let parent = link
        .parent()
        .with_context(|| format!("symlink {:?} has no parent directory", link))?;
    let file_name = link
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("symlink {:?} has no file name", link))?;

    let parent = fs::canonicalize(parent).with_context(|| format!("canonicalizing {:?}", parent))?;
    let target = fs::canonicalize(target).with_context(|| format!("canonicalizing {:?}", target))?;
    let relative = relative_path(&parent, &target);

    let tmp_link = parent.join(format!(".{file_name}-new.tmp"));
    remove_path_if_exists(&tmp_link)?;
    symlink(&relative, &tmp_link)
        .with_context(|| format!("creating symlink {:?} -> {:?}", tmp_link, relative))?;
    fs::rename(&tmp_link, parent.join(file_name))
        .with_context(|| format!("renaming {:?} over {:?}", tmp_link, link))?;

    debug!(link = %link.display(), target = %relative.display(), "symlink swapped");
    Ok(())
}

/// Serialize `value` as pretty JSON into `path` via a temporary file and a
/// rename, so readers never observe a partial document.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("{:?} has no parent directory", path))?;
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("{:?} has no file name", path))?;

    let mut buf = serde_json::to_vec_pretty(value)
        .with_context(|| format!("serializing JSON for {:?}", path))?;
    buf.push(b'\n');

    let tmp = parent.join(format!(".{file_name}.tmp"));
    fs::write(&tmp, &buf).with_context(|| format!("writing {:?}", tmp))?;
    fs::rename(&tmp, path).with_context(|| format!("renaming {:?} to {:?}", tmp, path))?;
    Ok(())
}

/// Remove a file, symlink or directory tree; missing paths are fine.
pub fn remove_path_if_exists(path: &Path) -> Result<()> {
    let meta = match fs::symlink_metadata(path) {
        Ok(m) => m,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e).with_context(|| format!("stat {:?}", path)),
    };

    if meta.is_dir() {
        fs::remove_dir_all(path).with_context(|| format!("removing dir {:?}", path))
    } else {
        fs::remove_file(path).with_context(|| format!("removing {:?}", path))
    }
}

/// Relative path from directory `from` to `to`. Both must be absolute and
/// normalized.
pub fn relative_path(from: &Path, to: &Path) -> PathBuf {
    let from: Vec<Component<'_>> = from.components().collect();
    let to: Vec<Component<'_>> = to.components().collect();

    let common = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut rel = PathBuf::new();
    for _ in common..from.len() {
        rel.push("..");
    }
    for comp in &to[common..] {
        rel.push(comp.as_os_str());
    }

    if rel.as_os_str().is_empty() {
        PathBuf::from(".")
    } else {
        rel
    }
}
