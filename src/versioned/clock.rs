// src/versioned/clock.rs

use chrono::{NaiveDate, Utc};

/// Source of "today" for version allocation.
pub trait Clock: Send + Sync {
    fn today_utc(&self) -> NaiveDate;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today_utc(&self) -> NaiveDate {
        Utc::now().date_naive()
    }
}

/// A clock pinned to one date; tests move it with [`FixedClock::set`].
#[derive(Debug)]
pub struct FixedClock {
    date: std::sync::Mutex<NaiveDate>,
}

impl FixedClock {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date: std::sync::Mutex::new(date),
        }
    }

    pub fn set(&self, date: NaiveDate) {
        if let Ok(mut guard) = self.date.lock() {
            *guard = date;
        }
    }
}

impl Clock for FixedClock {
    fn today_utc(&self) -> NaiveDate {
        self.date
            .lock()
            .map(|d| *d)
            .unwrap_or_else(|poisoned| *poisoned.into_inner())
    }
}
