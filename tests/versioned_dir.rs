// tests/versioned_dir.rs

use std::error::Error;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use chrono::NaiveDate;
use tempfile::tempdir;

use autobuilder::errors::AutobuilderError;
use autobuilder::versioned::{BuildVersion, FixedClock, VersionedDir};

type TestResult = Result<(), Box<dyn Error>>;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
}

fn read_index(dir: &Path) -> Vec<String> {
    let raw = fs::read_to_string(dir.join("index.json")).expect("index.json");
    let value: serde_json::Value = serde_json::from_str(&raw).expect("index json");
    value["subdirs"]
        .as_array()
        .expect("subdirs array")
        .iter()
        .map(|v| v.as_str().expect("string").to_string())
        .collect()
}

#[test]
fn same_day_allocations_get_increasing_serials() -> TestResult {
    let tmp = tempdir()?;
    let clock = Arc::new(FixedClock::new(date(2024, 1, 15)));
    let mut dir = VersionedDir::with_clock(tmp.path().join("builds"), clock.clone())?;

    let first = dir.allocate_new_version()?;
    let second = dir.allocate_new_version()?;
    assert_eq!(first, dir.path().join("2024/01/15/0"));
    assert_eq!(second, dir.path().join("2024/01/15/1"));
    assert!(first.is_dir() && second.is_dir());

    clock.set(date(2024, 1, 16));
    let next_day = dir.allocate_new_version()?;
    assert_eq!(next_day, dir.path().join("2024/01/16/0"));
    assert_eq!(dir.current_version()?, Some(BuildVersion::new(2024, 1, 16, 0)));
    Ok(())
}

#[test]
fn versions_sort_numerically() -> TestResult {
    let tmp = tempdir()?;
    let root = tmp.path().join("builds");
    for rel in ["2024/01/15/9", "2024/01/15/10", "2023/12/31/3", "2024/01/02/0"] {
        fs::create_dir_all(root.join(rel))?;
    }
    // Not versions; ignored by the scan.
    fs::create_dir_all(root.join("2024/1/15/0"))?;
    fs::create_dir_all(root.join("scratch"))?;

    let mut dir = VersionedDir::open(&root)?;
    let versions: Vec<String> = dir.load_versions()?.iter().map(|v| v.to_string()).collect();
    assert_eq!(
        versions,
        vec!["20231231.3", "20240102.0", "20240115.9", "20240115.10"]
    );
    assert_eq!(dir.current_version()?, Some(BuildVersion::new(2024, 1, 15, 10)));
    Ok(())
}

#[test]
fn allocation_continues_after_existing_versions_on_reopen() -> TestResult {
    let tmp = tempdir()?;
    let root = tmp.path().join("builds");
    fs::create_dir_all(root.join("2024/01/15/10"))?;

    let clock = Arc::new(FixedClock::new(date(2024, 1, 15)));
    let mut dir = VersionedDir::with_clock(&root, clock)?;
    assert_eq!(dir.allocate_new_version()?, root.join("2024/01/15/11"));
    Ok(())
}

#[test]
fn clock_going_backwards_still_moves_forward() -> TestResult {
    let tmp = tempdir()?;
    let clock = Arc::new(FixedClock::new(date(2024, 3, 1)));
    let mut dir = VersionedDir::with_clock(tmp.path().join("builds"), clock.clone())?;

    dir.allocate_new_version()?;
    clock.set(date(2024, 2, 28));
    let path = dir.allocate_new_version()?;
    assert_eq!(dir.path_to_version(&path)?, BuildVersion::new(2024, 3, 1, 1));
    Ok(())
}

#[test]
fn path_and_version_round_trip() -> TestResult {
    let tmp = tempdir()?;
    let dir = VersionedDir::open(tmp.path().join("builds"))?;

    let path = dir.create_path_for_version_str("20240115.3")?;
    assert_eq!(path, dir.path().join("2024/01/15/3"));
    assert_eq!(dir.path_to_version(&path)?.to_string(), "20240115.3");

    assert!(matches!(
        dir.create_path_for_version_str("2024-01-15"),
        Err(AutobuilderError::InvalidVersion(_))
    ));
    assert!(matches!(
        dir.path_to_version(&dir.path().join("2024/01/15")),
        Err(AutobuilderError::InvalidVersion(_))
    ));
    assert!(matches!(
        dir.path_to_version(Path::new("/elsewhere/2024/01/15/0")),
        Err(AutobuilderError::InvalidVersion(_))
    ));
    Ok(())
}

#[test]
fn zero_padded_serials_keep_their_directory_name() -> TestResult {
    let tmp = tempdir()?;
    let dir = VersionedDir::open(tmp.path().join("builds"))?;

    let path = dir.create_path_for_version_str("20240115.05")?;
    assert_eq!(path, dir.path().join("2024/01/15/05"));
    assert_eq!(dir.path_to_version(&path)?.to_string(), "20240115.05");

    let padded: BuildVersion = "20240115.05".parse()?;
    assert!(padded > BuildVersion::new(2024, 1, 15, 4));
    assert!(padded < BuildVersion::new(2024, 1, 15, 6));
    assert_eq!(padded.next_serial().to_string(), "20240115.6");
    Ok(())
}

#[test]
fn delete_removes_zero_padded_serial_directory() -> TestResult {
    let tmp = tempdir()?;
    let root = tmp.path().join("builds");
    fs::create_dir_all(root.join("2024/01/15/3"))?;
    fs::create_dir_all(root.join("2024/01/15/07"))?;

    let clock = Arc::new(FixedClock::new(date(2024, 1, 15)));
    let mut dir = VersionedDir::with_clock(&root, clock)?;
    assert_eq!(
        dir.current_version()?.map(|v| v.to_string()).as_deref(),
        Some("20240115.07")
    );

    dir.delete_current_version()?;
    assert!(!root.join("2024/01/15/07").exists());
    assert!(root.join("2024/01/15/3").exists());
    assert_eq!(read_index(&root.join("2024/01/15")), vec!["3"]);

    assert_eq!(dir.allocate_new_version()?, root.join("2024/01/15/4"));
    Ok(())
}

#[test]
fn allocation_maintains_index_files() -> TestResult {
    let tmp = tempdir()?;
    let clock = Arc::new(FixedClock::new(date(2024, 1, 15)));
    let mut dir = VersionedDir::with_clock(tmp.path().join("builds"), clock.clone())?;

    dir.allocate_new_version()?;
    dir.allocate_new_version()?;
    clock.set(date(2024, 2, 1));
    dir.allocate_new_version()?;

    let root = dir.path().to_path_buf();
    assert_eq!(read_index(&root), vec!["2024"]);
    assert_eq!(read_index(&root.join("2024")), vec!["01", "02"]);
    assert_eq!(read_index(&root.join("2024/01")), vec!["15"]);
    assert_eq!(read_index(&root.join("2024/01/15")), vec!["0", "1"]);
    assert_eq!(read_index(&root.join("2024/02/01")), vec!["0"]);
    Ok(())
}

#[test]
fn delete_current_version_removes_newest_and_refreshes_index() -> TestResult {
    let tmp = tempdir()?;
    let clock = Arc::new(FixedClock::new(date(2024, 1, 15)));
    let mut dir = VersionedDir::with_clock(tmp.path().join("builds"), clock)?;

    let first = dir.allocate_new_version()?;
    let second = dir.allocate_new_version()?;
    fs::write(second.join("junk"), "x")?;

    dir.delete_current_version()?;
    assert!(!second.exists());
    assert!(first.exists());
    assert_eq!(dir.current_version()?, Some(BuildVersion::new(2024, 1, 15, 0)));
    assert_eq!(read_index(&dir.path().join("2024/01/15")), vec!["0"]);

    // The serial is reused once the newest version is gone.
    assert_eq!(dir.allocate_new_version()?, second);
    Ok(())
}

#[test]
fn delete_without_versions_fails() -> TestResult {
    let tmp = tempdir()?;
    let mut dir = VersionedDir::open(tmp.path().join("builds"))?;
    assert!(matches!(
        dir.delete_current_version(),
        Err(AutobuilderError::NoVersions)
    ));
    Ok(())
}

#[test]
fn legacy_flat_layout_is_converted_on_load() -> TestResult {
    let tmp = tempdir()?;
    let root = tmp.path().join("builds");
    fs::create_dir_all(root.join("20240115.2"))?;
    fs::write(root.join("20240115.2").join("manifest.json"), "{}")?;
    fs::create_dir_all(root.join("20231130.0"))?;

    let mut dir = VersionedDir::open(&root)?;
    let versions: Vec<String> = dir.load_versions()?.iter().map(|v| v.to_string()).collect();
    assert_eq!(versions, vec!["20231130.0", "20240115.2"]);

    assert!(!root.join("20240115.2").exists());
    assert!(root.join("2024/01/15/2/manifest.json").is_file());
    assert_eq!(read_index(&root.join("2024/01/15")), vec!["2"]);
    Ok(())
}

#[test]
fn version_strings_parse_and_order() -> TestResult {
    let a: BuildVersion = "20240115.9".parse()?;
    let b: BuildVersion = "20240115.10".parse()?;
    let c: BuildVersion = "20240116.0".parse()?;
    assert!(a < b && b < c);
    assert_eq!(a, BuildVersion::new(2024, 1, 15, 9));
    assert!("20240115".parse::<BuildVersion>().is_err());
    assert!("build.1".parse::<BuildVersion>().is_err());
    Ok(())
}
