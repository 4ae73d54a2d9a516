//! Merging partial district maps and accumulating the consolidated table.
//!
//! All maps preserve insertion order so the final column set comes out in
//! first-observed order. Every merge is a per-key overwrite by the later
//! contribution; the caller fixes the order (sheet priority within a
//! snapshot, chronological across snapshots).

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use indexmap::{IndexMap, IndexSet};
use serde::Serialize;

use crate::cell::format_number;
use crate::config::SheetKind;
use crate::layout::DistrictKey;
use crate::period::Period;

/// Canonical indicator name -> value. Absent key means missing, not zero.
pub type IndicatorMap = IndexMap<String, f64>;

pub type DistrictMap = IndexMap<DistrictKey, IndicatorMap>;

/// Shallow merge of `partial` into `target`; `partial` wins on collisions.
pub fn merge_into(target: &mut DistrictMap, partial: DistrictMap) {
    for (district, indicators) in partial {
        target.entry(district).or_default().extend(indicators);
    }
}

/// Merges one snapshot's per-sheet maps in sheet-kind priority order,
/// regardless of the order they are handed in.
pub fn merge_sheets(mut parts: Vec<(SheetKind, DistrictMap)>) -> DistrictMap {
    parts.sort_by_key(|(kind, _)| *kind);
    let mut merged = DistrictMap::new();
    for (_, partial) in parts {
        merge_into(&mut merged, partial);
    }
    merged
}

#[derive(Debug, Clone)]
struct Record {
    source: String,
    indicators: IndicatorMap,
}

/// Records keyed by (period, district) for the whole run.
#[derive(Debug, Default)]
pub struct ConsolidatedStore {
    records: HashMap<(Period, DistrictKey), Record>,
    columns: IndexSet<String>,
}

impl ConsolidatedStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one snapshot's merged districts. A (period, district) pair that
    /// already exists is merged per indicator, the new values winning, and
    /// takes `source` as its source filename.
    pub fn absorb(&mut self, period: Period, source: &str, districts: DistrictMap) {
        for (district, indicators) in districts {
            for name in indicators.keys() {
                if !self.columns.contains(name) {
                    self.columns.insert(name.clone());
                }
            }
            let record = self
                .records
                .entry((period, district))
                .or_insert_with(|| Record {
                    source: source.to_string(),
                    indicators: IndicatorMap::new(),
                });
            record.source = source.to_string();
            record.indicators.extend(indicators);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Indicator columns in first-observed order.
    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(String::as_str)
    }

    /// Default-fills every record to the full column set and sorts rows by
    /// period, then district (case-insensitive).
    pub fn finalize(self) -> Table {
        let columns: Vec<String> = self.columns.into_iter().collect();

        let mut rows: Vec<TableRow> = self
            .records
            .into_iter()
            .map(|((period, district), record)| {
                let values = columns
                    .iter()
                    .map(|name| record.indicators.get(name).copied().unwrap_or(0.0))
                    .collect();
                TableRow {
                    period,
                    district,
                    source: record.source,
                    values,
                }
            })
            .collect();

        rows.sort_by(compare_rows);
        Table { columns, rows }
    }
}

fn compare_rows(a: &TableRow, b: &TableRow) -> Ordering {
    a.period
        .cmp(&b.period)
        .then_with(|| {
            a.district
                .as_str()
                .to_lowercase()
                .cmp(&b.district.as_str().to_lowercase())
        })
        .then_with(|| a.district.cmp(&b.district))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableRow {
    pub period: Period,
    pub district: DistrictKey,
    pub source: String,
    /// Aligned with [`Table::columns`].
    pub values: Vec<f64>,
}

/// The finalized, externally visible artifact.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Table {
    /// Indicator columns only; see [`Table::header`] for the full header.
    pub columns: Vec<String>,
    pub rows: Vec<TableRow>,
}

impl Table {
    pub const KEY_COLUMNS: [&'static str; 5] = ["fecha", "año", "mes", "distrito", "archivo_fuente"];

    pub fn header(&self) -> Vec<String> {
        Self::KEY_COLUMNS
            .iter()
            .map(|c| c.to_string())
            .chain(self.columns.iter().cloned())
            .collect()
    }

    /// One row rendered as text fields, aligned with [`Table::header`].
    pub fn render_row(&self, row: &TableRow) -> Vec<String> {
        let mut fields = vec![
            row.period.to_string(),
            row.period.year().to_string(),
            row.period.month().to_string(),
            row.district.to_string(),
            row.source.clone(),
        ];
        fields.extend(row.values.iter().map(|v| format_number(*v)));
        fields
    }

    pub fn value(&self, row: &TableRow, column: &str) -> Option<f64> {
        let idx = self.columns.iter().position(|c| c == column)?;
        row.values.get(idx).copied()
    }

    /// Earliest and latest period present; rows are already period-sorted.
    pub fn period_range(&self) -> Option<(Period, Period)> {
        let first = self.rows.first()?.period;
        let last = self.rows.last()?.period;
        Some((first, last))
    }

    pub fn district_count(&self) -> usize {
        self.rows
            .iter()
            .map(|r| &r.district)
            .collect::<HashSet<_>>()
            .len()
    }

    pub fn find(&self, period: Period, district: &str) -> Option<&TableRow> {
        let key = DistrictKey::normalize(district);
        self.rows
            .iter()
            .find(|r| r.period == period && r.district == key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use proptest::prelude::*;

    fn period(y: i32, m: u32, d: u32) -> Period {
        Period::new(NaiveDate::from_ymd_opt(y, m, d).unwrap())
    }

    fn district_map(entries: &[(&str, &[(&str, f64)])]) -> DistrictMap {
        entries
            .iter()
            .map(|(district, values)| {
                (
                    DistrictKey::normalize(district),
                    values.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
                )
            })
            .collect()
    }

    // -------------------------------------------------------------------------
    // INTRA-SNAPSHOT MERGE TESTS
    // -------------------------------------------------------------------------

    #[test]
    fn test_merge_sheets_combines_districts() {
        let security = district_map(&[("CENTRO", &[("relacionadas_con_personas", 4.0)])]);
        let detentions = district_map(&[
            ("CENTRO", &[("personas_detenidas_total", 10.0)]),
            ("RETIRO", &[("personas_detenidas_total", 2.0)]),
        ]);
        let merged = merge_sheets(vec![
            (SheetKind::Security, security),
            (SheetKind::Detentions, detentions),
        ]);
        assert_eq!(merged.len(), 2);
        let centro = &merged[&DistrictKey::normalize("CENTRO")];
        assert_eq!(centro["relacionadas_con_personas"], 4.0);
        assert_eq!(centro["personas_detenidas_total"], 10.0);
    }

    #[test]
    fn test_merge_sheets_priority_overwrites() {
        let a = district_map(&[("CENTRO", &[("x", 1.0)])]);
        let b = district_map(&[("CENTRO", &[("x", 2.0)])]);
        // Handed in reverse; the later kind (alcohol) still wins.
        let merged = merge_sheets(vec![(SheetKind::Alcohol, b), (SheetKind::Accidents, a)]);
        assert_eq!(merged[&DistrictKey::normalize("CENTRO")]["x"], 2.0);
    }

    #[test]
    fn test_merge_normalized_spellings_collapse() {
        let mut target = district_map(&[("Arganzuela ", &[("a", 1.0)])]);
        merge_into(&mut target, district_map(&[("ARGANZUELA", &[("b", 2.0)])]));
        assert_eq!(target.len(), 1);
        assert_eq!(target[&DistrictKey::normalize("arganzuela")].len(), 2);
    }

    // -------------------------------------------------------------------------
    // STORE TESTS
    // -------------------------------------------------------------------------

    #[test]
    fn test_finalize_fills_missing_with_zero() {
        let mut store = ConsolidatedStore::new();
        let p = period(2025, 6, 1);
        store.absorb(
            p,
            "s-11.xlsx",
            district_map(&[
                ("CENTRO", &[("a", 1.0), ("b", 2.0)]),
                ("RETIRO", &[("a", 3.0)]),
            ]),
        );
        let table = store.finalize();
        assert_eq!(table.columns, vec!["a", "b"]);
        let retiro = table.find(p, "Retiro").unwrap();
        assert_eq!(table.value(retiro, "b"), Some(0.0));
        assert_eq!(table.value(retiro, "a"), Some(3.0));
    }

    #[test]
    fn test_finalize_sort_order() {
        let mut store = ConsolidatedStore::new();
        store.absorb(period(2025, 6, 1), "b.xlsx", district_map(&[("USERA", &[("a", 1.0)])]));
        store.absorb(period(2025, 5, 2), "a.xlsx", district_map(&[("TETUAN", &[("a", 1.0)])]));
        store.absorb(period(2025, 6, 1), "b.xlsx", district_map(&[("ARGANZUELA", &[("a", 1.0)])]));
        store.absorb(period(2025, 5, 2), "a.xlsx", district_map(&[("CENTRO", &[("a", 1.0)])]));

        let table = store.finalize();
        let order: Vec<(String, &str)> = table
            .rows
            .iter()
            .map(|r| (r.period.to_string(), r.district.as_str()))
            .collect();
        assert_eq!(
            order,
            vec![
                ("2025-05-02".to_string(), "CENTRO"),
                ("2025-05-02".to_string(), "TETUAN"),
                ("2025-06-01".to_string(), "ARGANZUELA"),
                ("2025-06-01".to_string(), "USERA"),
            ]
        );
    }

    #[test]
    fn test_columns_first_observed_order() {
        let mut store = ConsolidatedStore::new();
        store.absorb(period(2025, 5, 2), "a", district_map(&[("CENTRO", &[("z", 1.0), ("m", 1.0)])]));
        store.absorb(period(2025, 6, 1), "b", district_map(&[("CENTRO", &[("a", 1.0), ("z", 2.0)])]));
        let cols: Vec<&str> = store.columns().collect();
        assert_eq!(cols, vec!["z", "m", "a"]);
    }

    #[test]
    fn test_repeated_key_later_overwrites() {
        let mut store = ConsolidatedStore::new();
        let p = period(2025, 6, 1);
        store.absorb(p, "first.xlsx", district_map(&[("CENTRO", &[("a", 1.0), ("b", 5.0)])]));
        store.absorb(p, "second.xlsx", district_map(&[("centro", &[("a", 9.0)])]));
        assert_eq!(store.len(), 1);

        let table = store.finalize();
        let row = table.find(p, "CENTRO").unwrap();
        assert_eq!(table.value(row, "a"), Some(9.0));
        assert_eq!(table.value(row, "b"), Some(5.0));
        assert_eq!(row.source, "second.xlsx");
    }

    #[test]
    fn test_period_range_and_district_count() {
        let mut store = ConsolidatedStore::new();
        store.absorb(period(2025, 6, 1), "c", district_map(&[("CENTRO", &[("a", 1.0)])]));
        store.absorb(
            period(2025, 4, 2),
            "a",
            district_map(&[("CENTRO", &[("a", 1.0)]), ("RETIRO", &[("a", 1.0)])]),
        );
        store.absorb(period(2025, 5, 2), "b", district_map(&[("usera", &[("a", 1.0)])]));

        let table = store.finalize();
        assert_eq!(table.period_range(), Some((period(2025, 4, 2), period(2025, 6, 1))));
        assert_eq!(table.district_count(), 3);
    }

    #[test]
    fn test_empty_store() {
        let store = ConsolidatedStore::new();
        assert!(store.is_empty());
        let table = store.finalize();
        assert_eq!(table.period_range(), None);
        assert_eq!(table.district_count(), 0);
        assert!(table.rows.is_empty());
        assert_eq!(table.header().len(), 5);
    }

    #[test]
    fn test_render_row() {
        let mut store = ConsolidatedStore::new();
        let p = period(2025, 5, 2);
        store.absorb(p, "s-10.xlsx", district_map(&[("CENTRO", &[("a", 2.0), ("b", 0.5)])]));
        store.absorb(p, "s-10.xlsx", district_map(&[("RETIRO", &[("c", 7.0)])]));
        let table = store.finalize();
        assert_eq!(
            table.header(),
            vec!["fecha", "año", "mes", "distrito", "archivo_fuente", "a", "b", "c"]
        );
        assert_eq!(
            table.render_row(&table.rows[0]),
            vec!["2025-05-02", "2025", "5", "CENTRO", "s-10.xlsx", "2", "0.5", "0"]
        );
    }

    proptest! {
        #[test]
        fn prop_disjoint_merge_order_independent(
            left in prop::collection::btree_map("[A-Z]{3,6}", 0.0f64..100.0, 0..6),
            right in prop::collection::btree_map("[a-z]{3,6}", 0.0f64..100.0, 0..6),
        ) {
            // Prefix keeps the two key sets disjoint after normalization.
            let a: DistrictMap = left
                .iter()
                .map(|(d, v)| (DistrictKey::normalize(d), IndicatorMap::from([("x".to_string(), *v)])))
                .collect();
            let b: DistrictMap = right
                .iter()
                .map(|(d, v)| (DistrictKey::normalize(&format!("R_{d}")), IndicatorMap::from([("y".to_string(), *v)])))
                .collect();

            let ab = merge_sheets(vec![(SheetKind::Security, a.clone()), (SheetKind::Detentions, b.clone())]);
            let ba = merge_sheets(vec![(SheetKind::Security, b), (SheetKind::Detentions, a)]);

            prop_assert_eq!(ab.len(), ba.len());
            for (district, indicators) in &ab {
                let other = ba.get(district);
                prop_assert_eq!(Some(indicators), other);
            }
        }
    }
}
