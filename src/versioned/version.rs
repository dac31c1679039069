// src/versioned/version.rs

//! The `YYYYMMDD.serial` build version identifier.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate};
use regex::Regex;

use crate::errors::AutobuilderError;

static YMD_SERIAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(\d+)(\d\d)(\d\d)\.(\d+)$").expect("static regex")
});

/// A build version. Ordering compares year, month, day and serial
/// numerically, in that order.
///
/// Year and serial directory names may carry leading zeros (`15/07`); the
/// padded width is kept so the version maps back to the same directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BuildVersion {
    pub year: u32,
    pub month: u32,
    pub day: u32,
    pub serial: u64,
    /// Zero-padded width of the year name; 0 when written without padding.
    year_width: u8,
    /// Zero-padded width of the serial name; 0 when written without padding.
    serial_width: u8,
}

impl BuildVersion {
    pub fn new(year: u32, month: u32, day: u32, serial: u64) -> Self {
        Self {
            year,
            month,
            day,
            serial,
            year_width: 0,
            serial_width: 0,
        }
    }

    /// Serial 0 on the given calendar day.
    pub fn first_of_day(date: NaiveDate) -> Self {
        Self::new(date.year() as u32, date.month(), date.day(), 0)
    }

    pub fn is_same_day(&self, date: NaiveDate) -> bool {
        self.year == date.year() as u32 && self.month == date.month() && self.day == date.day()
    }

    /// The following serial on the same day, written without padding.
    pub fn next_serial(&self) -> Self {
        Self {
            serial: self.serial + 1,
            serial_width: 0,
            ..*self
        }
    }

    /// Path components `[YYYY, MM, DD, serial]` below the versioned root.
    pub fn path_components(&self) -> [String; 4] {
        [
            self.year_name(),
            format!("{:02}", self.month),
            format!("{:02}", self.day),
            self.serial_name(),
        ]
    }

    fn year_name(&self) -> String {
        format!("{:0width$}", self.year, width = self.year_width as usize)
    }

    fn serial_name(&self) -> String {
        format!("{:0width$}", self.serial, width = self.serial_width as usize)
    }

    /// Parse `[year, month, day, serial]` directory names.
    pub fn from_components(year: &str, month: &str, day: &str, serial: &str) -> Option<Self> {
        if month.len() != 2 || day.len() != 2 {
            return None;
        }
        let year_num: u32 = year.parse().ok()?;
        let serial_num: u64 = serial.parse().ok()?;
        Some(Self {
            year_width: padded_width(year, &year_num.to_string())?,
            serial_width: padded_width(serial, &serial_num.to_string())?,
            ..Self::new(year_num, month.parse().ok()?, day.parse().ok()?, serial_num)
        })
    }
}

/// Width to keep for `name`: 0 when it is already the plain rendering.
fn padded_width(name: &str, plain: &str) -> Option<u8> {
    if name.len() == plain.len() {
        Some(0)
    } else {
        u8::try_from(name.len()).ok()
    }
}

impl fmt::Display for BuildVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{:02}{:02}.{}",
            self.year_name(),
            self.month,
            self.day,
            self.serial_name()
        )
    }
}

impl FromStr for BuildVersion {
    type Err = AutobuilderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = YMD_SERIAL_RE
            .captures(s)
            .ok_or_else(|| AutobuilderError::InvalidVersion(s.to_string()))?;
        BuildVersion::from_components(&caps[1], &caps[2], &caps[3], &caps[4])
            .ok_or_else(|| AutobuilderError::InvalidVersion(s.to_string()))
    }
}
