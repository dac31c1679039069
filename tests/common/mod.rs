#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

use autobuilder::fs::Workdir;

pub use autobuilder_test_utils::builders::{ConfigFileBuilder, RegistryBuilder, TaskConfigBuilder};
pub use autobuilder_test_utils::{init_tracing, params, with_timeout};

/// A temporary workdir with `manifest.json`, `tasks/` and `results/tasks/`.
pub struct WorkdirFixture {
    pub dir: TempDir,
    pub workdir: Workdir,
}

impl WorkdirFixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        fs::write(dir.path().join("manifest.json"), "{}\n").expect("write manifest");
        let workdir = Workdir::open(dir.path()).expect("open workdir");
        Self { dir, workdir }
    }

    /// Create (if needed) and return `<workdir>/<rel>`.
    pub fn build_dir(&self, rel: &str) -> PathBuf {
        let path = self.workdir.root().join(rel);
        fs::create_dir_all(&path).expect("create build dir");
        path
    }

    pub fn root(&self) -> &Path {
        self.workdir.root()
    }
}

/// Target of a symlink, resolved to an absolute canonical path.
pub fn resolve_link(link: &Path) -> PathBuf {
    fs::canonicalize(link).expect("resolve symlink")
}
