//! Job-run record for one consolidation: what went in, what was absorbed,
//! what came out. Serialized to JSON by the CLI.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::config::{PeriodSettings, SheetKind};
use crate::merge::ConsolidatedStore;
use crate::period::Period;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SheetFailure {
    pub kind: SheetKind,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotSummary {
    pub filename: String,
    pub ordinal: u64,
    pub period: Period,
    /// `sha256:<hex>` of the raw bytes.
    pub content_hash: String,
    pub districts: usize,
    pub sheets_used: Vec<SheetKind>,
    pub sheet_failures: Vec<SheetFailure>,
}

/// A snapshot that contributed nothing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedSnapshot {
    pub filename: String,
    pub reason: String,
}

/// Two snapshots with byte-identical content.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DuplicateContent {
    pub content_hash: String,
    pub first: String,
    pub second: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub anchor: NaiveDate,
    pub step_days: i64,
    /// Oldest first.
    pub snapshots: Vec<SnapshotSummary>,
    pub skipped: Vec<SkippedSnapshot>,
    pub duplicates: Vec<DuplicateContent>,
    pub records: usize,
    pub columns: Vec<String>,
}

impl RunReport {
    pub fn start(periods: PeriodSettings) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            anchor: periods.anchor,
            step_days: periods.step_days,
            snapshots: Vec::new(),
            skipped: Vec::new(),
            duplicates: Vec::new(),
            records: 0,
            columns: Vec::new(),
        }
    }

    pub fn skip(&mut self, filename: &str, reason: impl ToString) {
        self.skipped.push(SkippedSnapshot {
            filename: filename.to_string(),
            reason: reason.to_string(),
        });
    }

    /// Stamps the finish time and the store's final shape.
    pub fn finish(&mut self, store: &ConsolidatedStore) {
        self.finished_at = Some(Utc::now());
        self.records = store.len();
        self.columns = store.columns().map(str::to_string).collect();
    }

    pub fn sheet_failure_count(&self) -> usize {
        self.snapshots.iter().map(|s| s.sheet_failures.len()).sum()
    }

    /// True when any snapshot or sheet was dropped.
    pub fn has_failures(&self) -> bool {
        !self.skipped.is_empty() || self.sheet_failure_count() > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::DistrictKey;
    use crate::merge::{DistrictMap, IndicatorMap};

    #[test]
    fn test_report_lifecycle() {
        let mut report = RunReport::start(PeriodSettings::default());
        assert!(report.finished_at.is_none());
        assert!(!report.has_failures());

        report.skip("sin-numero.xlsx", "no digit run");
        assert!(report.has_failures());

        let mut store = ConsolidatedStore::new();
        let mut districts = DistrictMap::new();
        districts.insert(
            DistrictKey::normalize("CENTRO"),
            IndicatorMap::from([("a".to_string(), 1.0)]),
        );
        store.absorb(Period::new(report.anchor), "s-1.xlsx", districts);

        report.finish(&store);
        assert!(report.finished_at.unwrap() >= report.started_at);
        assert_eq!(report.records, 1);
        assert_eq!(report.columns, vec!["a"]);
    }

    #[test]
    fn test_report_serializes_snake_case_kinds() {
        let mut report = RunReport::start(PeriodSettings::default());
        report.snapshots.push(SnapshotSummary {
            filename: "s-1.xlsx".to_string(),
            ordinal: 1,
            period: Period::new(report.anchor),
            content_hash: "sha256:00".to_string(),
            districts: 0,
            sheets_used: vec![SheetKind::Security],
            sheet_failures: vec![SheetFailure {
                kind: SheetKind::Alcohol,
                reason: "sheet 'CONSUMO ALCOHOL' not present in snapshot".to_string(),
            }],
        });
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["anchor"], "2025-06-01");
        assert_eq!(json["snapshots"][0]["period"], "2025-06-01");
        assert_eq!(json["snapshots"][0]["sheets_used"][0], "security");
        assert_eq!(json["snapshots"][0]["sheet_failures"][0]["kind"], "alcohol");
        assert_eq!(report.sheet_failure_count(), 1);
    }
}
