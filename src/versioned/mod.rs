// src/versioned/mod.rs

//! Append-only, date-partitioned build directories.
//!
//! Versions live at `<root>/YYYY/MM/DD/serial`. Every directory level that
//! gains a child gets an `index.json` (`{"subdirs": [...]}`) listing its
//! immediate subdirectories, so consumers never need to scan the tree.

mod clock;
mod version;

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use anyhow::Context;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub use clock::{Clock, FixedClock, SystemClock};
pub use version::BuildVersion;

use crate::errors::{AutobuilderError, Result};
use crate::fs::{remove_path_if_exists, write_json_atomic};

static YEAR_OR_SERIAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+$").expect("static regex"));
static MONTH_OR_DAY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d\d$").expect("static regex"));
static LEGACY_VERSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+\d\d\d\d\.\d+$").expect("static regex"));

/// Contents of an `index.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirIndex {
    pub subdirs: Vec<String>,
}

pub struct VersionedDir {
    path: PathBuf,
    clock: Arc<dyn Clock>,
    /// Sorted ascending; `None` until first loaded.
    cached: Option<Vec<BuildVersion>>,
}

impl std::fmt::Debug for VersionedDir {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VersionedDir")
            .field("path", &self.path)
            .field("cached", &self.cached)
            .finish_non_exhaustive()
    }
}

impl VersionedDir {
    /// Open the versioned root at `path` using the system UTC clock.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_clock(path, Arc::new(SystemClock))
    }

    pub fn with_clock(path: impl AsRef<Path>, clock: Arc<dyn Clock>) -> Result<Self> {
        let path = path.as_ref();
        fs::create_dir_all(path).with_context(|| format!("creating dir {:?}", path))?;
        Ok(Self {
            path: path.to_path_buf(),
            clock,
            cached: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory for a version. Pure path computation.
    pub fn create_path_for_version(&self, version: &BuildVersion) -> PathBuf {
        let mut path = self.path.clone();
        for comp in version.path_components() {
            path.push(comp);
        }
        path
    }

    /// Parse a dotted `YYYYMMDD.serial` string and map it to its directory.
    pub fn create_path_for_version_str(&self, version: &str) -> Result<PathBuf> {
        let version: BuildVersion = version.parse()?;
        Ok(self.create_path_for_version(&version))
    }

    /// Inverse of [`create_path_for_version`](Self::create_path_for_version).
    pub fn path_to_version(&self, path: &Path) -> Result<BuildVersion> {
        let rel = path
            .strip_prefix(&self.path)
            .map_err(|_| AutobuilderError::InvalidVersion(path.display().to_string()))?;
        relpath_to_version(rel)
    }

    /// All allocated versions, ascending. Loaded from disk once, then cached.
    pub fn load_versions(&mut self) -> Result<&[BuildVersion]> {
        if self.cached.is_none() {
            self.convert_legacy_layout()?;
            let mut results = Vec::new();
            for year in children_matching(&self.path, &YEAR_OR_SERIAL_RE)? {
                for month in children_matching(&year, &MONTH_OR_DAY_RE)? {
                    for day in children_matching(&month, &MONTH_OR_DAY_RE)? {
                        for serial in children_matching(&day, &YEAR_OR_SERIAL_RE)? {
                            results.push(self.path_to_version(&serial)?);
                        }
                    }
                }
            }
            results.sort();
            debug!(root = %self.path.display(), count = results.len(), "loaded build versions");
            self.cached = Some(results);
        }
        Ok(self.cached.as_deref().unwrap_or(&[]))
    }

    /// The highest allocated version, if any.
    pub fn current_version(&mut self) -> Result<Option<BuildVersion>> {
        Ok(self.load_versions()?.last().copied())
    }

    /// Allocate and create the next version directory for today (UTC).
    pub fn allocate_new_version(&mut self) -> Result<PathBuf> {
        let today = self.clock.today_utc();
        let last = self.current_version()?;

        let mut version = match last {
            Some(last) if last.is_same_day(today) => last.next_serial(),
            _ => BuildVersion::first_of_day(today),
        };
        // A clock stepping backwards must never produce an older version.
        if let Some(last) = last {
            if version <= last {
                version = last.next_serial();
            }
        }

        let path = self.create_path_for_version(&version);
        self.make_dir_update_index(&path)?;
        if let Some(cached) = self.cached.as_mut() {
            cached.push(version);
        }

        info!(version = %version, path = %path.display(), "allocated build version");
        Ok(path)
    }

    /// Remove the highest version's directory tree.
    pub fn delete_current_version(&mut self) -> Result<()> {
        self.load_versions()?;
        let last = self
            .cached
            .as_mut()
            .and_then(|v| v.pop())
            .ok_or(AutobuilderError::NoVersions)?;

        let path = self.create_path_for_version(&last);
        remove_path_if_exists(&path)?;
        if let Some(parent) = path.parent() {
            write_index(parent)?;
        }

        info!(version = %last, "deleted build version");
        Ok(())
    }

    /// Create `path` and any missing ancestors below the root, refreshing
    /// each parent's `index.json` when a child was created or the index is
    /// missing.
    fn make_dir_update_index(&self, path: &Path) -> Result<()> {
        if path == self.path.as_path() || !path.starts_with(&self.path) {
            fs::create_dir_all(path).with_context(|| format!("creating dir {:?}", path))?;
            return Ok(());
        }

        let parent = path
            .parent()
            .with_context(|| format!("{:?} has no parent", path))?;
        self.make_dir_update_index(parent)?;

        let mut created = match fs::create_dir(path) {
            Ok(()) => true,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => false,
            Err(e) => {
                return Err(anyhow::Error::from(e)
                    .context(format!("creating dir {:?}", path))
                    .into());
            }
        };
        if !created {
            created = !parent.join("index.json").exists();
        }
        if created {
            write_index(parent)?;
        }
        Ok(())
    }

    /// Move flat `<root>/YYYYMMDD.serial` directories into the partitioned
    /// layout.
    fn convert_legacy_layout(&self) -> Result<()> {
        for src in children_matching(&self.path, &LEGACY_VERSION_RE)? {
            let Some(name) = src.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            let version: BuildVersion = name.parse()?;
            let dest = self.create_path_for_version(&version);
            info!(from = %src.display(), to = %dest.display(), "converting legacy build dir");
            if let Some(parent) = dest.parent() {
                self.make_dir_update_index(parent)?;
            }
            fs::rename(&src, &dest)
                .with_context(|| format!("renaming {:?} to {:?}", src, dest))?;
            if let Some(parent) = dest.parent() {
                write_index(parent)?;
            }
        }
        Ok(())
    }
}

/// `YYYY/MM/DD/serial` relative path to a version.
pub fn relpath_to_version(rel: &Path) -> Result<BuildVersion> {
    let parts: Vec<&str> = rel
        .components()
        .map(|c| c.as_os_str().to_str().unwrap_or(""))
        .collect();
    match parts.as_slice() {
        [year, month, day, serial] => BuildVersion::from_components(year, month, day, serial)
            .ok_or_else(|| AutobuilderError::InvalidVersion(rel.display().to_string())),
        _ => Err(AutobuilderError::InvalidVersion(rel.display().to_string())),
    }
}

/// Subdirectories of `dir` whose names match `pattern`, not following
/// symlinks.
fn children_matching(dir: &Path, pattern: &Regex) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("reading dir {:?}", dir))? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        if name.to_str().is_some_and(|n| pattern.is_match(n)) {
            out.push(entry.path());
        }
    }
    Ok(out)
}

/// Rewrite `dir/index.json` from its current subdirectories.
fn write_index(dir: &Path) -> Result<()> {
    let mut subdirs = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("reading dir {:?}", dir))? {
        let entry = entry?;
        if entry.file_type()?.is_dir() {
            if let Some(name) = entry.file_name().to_str() {
                subdirs.push(name.to_string());
            }
        }
    }
    subdirs.sort();
    write_json_atomic(&dir.join("index.json"), &DirIndex { subdirs })?;
    Ok(())
}
