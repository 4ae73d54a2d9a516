//! Ordinal-based period estimation.
//!
//! The source never states which month a snapshot covers. The only signal is
//! the sequence number in the published filename, so periods are estimated
//! by stepping back a fixed number of days per rank from a known anchor.
//! Fixed-width steps drift away from calendar months over long batches;
//! consumers key on the produced dates, so the drift is kept as is.

use std::fmt;

use chrono::{Datelike, Duration, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::config::PeriodSettings;
use crate::error::SnapshotError;

static DIGIT_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"[0-9]+").expect("static regex"));

/// Resolved time bucket of a snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Period(NaiveDate);

impl Period {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    pub fn year(&self) -> i32 {
        self.0.year()
    }

    pub fn month(&self) -> u32 {
        self.0.month()
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

/// First run of ASCII digits in `filename`, e.g. 138 for
/// `policia-estadisticas-138.xlsx`.
pub fn ordinal_from_filename(filename: &str) -> Result<u64, SnapshotError> {
    let digits = DIGIT_RUN
        .find(filename)
        .ok_or_else(|| SnapshotError::Identification(filename.to_string()))?
        .as_str();
    digits.parse().map_err(|_| SnapshotError::OrdinalOverflow {
        filename: filename.to_string(),
        digits: digits.to_string(),
    })
}

/// A snapshot with a resolved period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedSnapshot {
    /// Position in the provider's sequence.
    pub position: usize,
    pub filename: String,
    pub ordinal: u64,
    /// 0 for the most recent snapshot, counting up going back in time.
    pub rank: usize,
    pub period: Period,
}

#[derive(Debug, Clone, Default)]
pub struct PeriodAssignment {
    /// Oldest first.
    pub resolved: Vec<ResolvedSnapshot>,
    pub rejected: Vec<(usize, SnapshotError)>,
}

impl PeriodAssignment {
    pub fn period_of(&self, position: usize) -> Option<Period> {
        self.resolved
            .iter()
            .find(|s| s.position == position)
            .map(|s| s.period)
    }
}

/// Assigns a period to every identifiable filename in the batch.
///
/// Snapshots are ranked by `(ordinal, position)`: with equal ordinals the one
/// later in the provider's sequence counts as more recent. Rank `r` gets
/// `anchor - r * step_days`.
pub fn resolve<'a, I>(filenames: I, settings: PeriodSettings) -> PeriodAssignment
where
    I: IntoIterator<Item = &'a str>,
{
    let mut identified: Vec<(usize, &str, u64)> = Vec::new();
    let mut rejected = Vec::new();

    for (position, filename) in filenames.into_iter().enumerate() {
        match ordinal_from_filename(filename) {
            Ok(ordinal) => identified.push((position, filename, ordinal)),
            Err(err) => rejected.push((position, err)),
        }
    }

    identified.sort_by_key(|&(position, _, ordinal)| (ordinal, position));

    let newest = identified.len();
    let resolved = identified
        .into_iter()
        .enumerate()
        .map(|(ascending_index, (position, filename, ordinal))| {
            let rank = newest - 1 - ascending_index;
            ResolvedSnapshot {
                position,
                filename: filename.to_string(),
                ordinal,
                rank,
                period: period_for_rank(rank, settings),
            }
        })
        .collect();

    PeriodAssignment { resolved, rejected }
}

fn period_for_rank(rank: usize, settings: PeriodSettings) -> Period {
    let date = i64::try_from(rank)
        .ok()
        .and_then(|r| r.checked_mul(settings.step_days))
        .and_then(Duration::try_days)
        .and_then(|offset| settings.anchor.checked_sub_signed(offset))
        .unwrap_or(NaiveDate::MIN);
    Period(date)
}
