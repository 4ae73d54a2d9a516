//! Batch consolidation: period resolution, per-snapshot extraction and the
//! chronological merge into one store.
//!
//! Extraction runs on a rayon pool, one task per snapshot. Results come back
//! in input order and only this coordinator touches the store, so output is
//! identical for any worker count.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};

use rayon::prelude::*;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::config::{RunContext, SheetKind};
use crate::error::{SheetError, SnapshotError};
use crate::extract::extract_sheet;
use crate::merge::{merge_sheets, ConsolidatedStore, DistrictMap};
use crate::period::{self, ResolvedSnapshot};
use crate::report::{DuplicateContent, RunReport, SheetFailure, SnapshotSummary};
use crate::workbook::SnapshotWorkbook;

/// One published snapshot as handed over by a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSnapshot {
    pub filename: String,
    pub content: Vec<u8>,
}

impl RawSnapshot {
    pub fn new(filename: impl Into<String>, content: Vec<u8>) -> Self {
        Self {
            filename: filename.into(),
            content,
        }
    }
}

/// Same format as the artifact hashes elsewhere in the pipeline.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("sha256:{:x}", hasher.finalize())
}

/// Everything one snapshot contributes, merged across its sheets.
#[derive(Debug, Clone)]
pub struct SnapshotExtraction {
    pub districts: DistrictMap,
    pub content_hash: String,
    pub sheets_used: Vec<SheetKind>,
    pub sheet_failures: Vec<(SheetKind, SheetError)>,
}

/// Runs every configured sheet strategy over one snapshot.
///
/// Only an unreadable workbook fails the snapshot; a missing sheet or marker
/// is recorded and the remaining sheets still contribute.
pub fn extract_snapshot(
    snapshot: &RawSnapshot,
    ctx: &RunContext,
) -> Result<SnapshotExtraction, SnapshotError> {
    let content_hash = content_hash(&snapshot.content);
    let mut workbook = SnapshotWorkbook::open(&snapshot.filename, &snapshot.content)?;

    let mut parts = Vec::with_capacity(ctx.sheets().len());
    let mut sheets_used = Vec::new();
    let mut sheet_failures = Vec::new();

    for spec in ctx.sheets() {
        let result = workbook
            .grid(&spec.sheet_name)
            .and_then(|grid| extract_sheet(&grid, spec, ctx));
        match result {
            Ok(extraction) => {
                sheets_used.push(spec.kind);
                parts.push((spec.kind, extraction.districts));
            }
            Err(err) => sheet_failures.push((spec.kind, err)),
        }
    }

    Ok(SnapshotExtraction {
        districts: merge_sheets(parts),
        content_hash,
        sheets_used,
        sheet_failures,
    })
}

/// Result of a batch: the populated store plus its job-run record.
#[derive(Debug)]
pub struct Consolidation {
    pub store: ConsolidatedStore,
    pub report: RunReport,
}

/// Consolidates one batch. Never fails: unusable snapshots and sheets are
/// logged and recorded in the report. An empty store is for the caller to
/// judge.
pub fn consolidate(snapshots: Vec<RawSnapshot>, ctx: &RunContext) -> Consolidation {
    consolidate_with(snapshots, ctx, extract_snapshot)
}

fn consolidate_with<F>(snapshots: Vec<RawSnapshot>, ctx: &RunContext, extract: F) -> Consolidation
where
    F: Fn(&RawSnapshot, &RunContext) -> Result<SnapshotExtraction, SnapshotError> + Sync,
{
    let mut report = RunReport::start(ctx.periods());
    let assignment = period::resolve(snapshots.iter().map(|s| s.filename.as_str()), ctx.periods());

    for (position, err) in &assignment.rejected {
        warn!(file = %snapshots[*position].filename, error = %err, "skipping snapshot");
        report.skip(&snapshots[*position].filename, err);
    }

    info!(
        snapshots = assignment.resolved.len(),
        skipped = assignment.rejected.len(),
        jobs = ctx.jobs(),
        "extracting snapshots"
    );

    let extractions = run_extractions(&snapshots, &assignment.resolved, ctx, &extract);

    let mut store = ConsolidatedStore::new();
    let mut seen_hashes: HashMap<String, String> = HashMap::new();

    // Oldest first, so later snapshots overwrite earlier ones per key.
    for (resolved, outcome) in assignment.resolved.iter().zip(extractions) {
        let extraction = match outcome {
            Ok(extraction) => extraction,
            Err(err) => {
                warn!(file = %resolved.filename, error = %err, "skipping snapshot");
                report.skip(&resolved.filename, &err);
                continue;
            }
        };

        if let Some(first) = seen_hashes.get(&extraction.content_hash) {
            warn!(
                file = %resolved.filename,
                same_as = %first,
                "snapshot content identical to an earlier file"
            );
            report.duplicates.push(DuplicateContent {
                content_hash: extraction.content_hash.clone(),
                first: first.clone(),
                second: resolved.filename.clone(),
            });
        } else {
            seen_hashes.insert(extraction.content_hash.clone(), resolved.filename.clone());
        }

        for (kind, err) in &extraction.sheet_failures {
            warn!(file = %resolved.filename, sheet = %kind, error = %err, "sheet skipped");
        }

        info!(
            file = %resolved.filename,
            ordinal = resolved.ordinal,
            period = %resolved.period,
            districts = extraction.districts.len(),
            sheets = extraction.sheets_used.len(),
            "snapshot processed"
        );

        report.snapshots.push(SnapshotSummary {
            filename: resolved.filename.clone(),
            ordinal: resolved.ordinal,
            period: resolved.period,
            content_hash: extraction.content_hash,
            districts: extraction.districts.len(),
            sheets_used: extraction.sheets_used,
            sheet_failures: extraction
                .sheet_failures
                .iter()
                .map(|(kind, err)| SheetFailure {
                    kind: *kind,
                    reason: err.to_string(),
                })
                .collect(),
        });

        store.absorb(resolved.period, &resolved.filename, extraction.districts);
    }

    report.finish(&store);
    info!(
        records = store.len(),
        columns = report.columns.len(),
        skipped = report.skipped.len(),
        "batch consolidated"
    );

    Consolidation { store, report }
}

/// Extracts every resolved snapshot, returning results aligned with
/// `resolved`. Falls back to the calling thread if no pool can be built.
fn run_extractions<F>(
    snapshots: &[RawSnapshot],
    resolved: &[ResolvedSnapshot],
    ctx: &RunContext,
    extract: &F,
) -> Vec<Result<SnapshotExtraction, SnapshotError>>
where
    F: Fn(&RawSnapshot, &RunContext) -> Result<SnapshotExtraction, SnapshotError> + Sync,
{
    let guarded = |r: &ResolvedSnapshot| extract_guarded(extract, &snapshots[r.position], ctx);

    match rayon::ThreadPoolBuilder::new().num_threads(ctx.jobs()).build() {
        Ok(pool) => pool.install(|| resolved.par_iter().map(guarded).collect()),
        Err(err) => {
            debug!(error = %err, "thread pool unavailable, extracting sequentially");
            resolved.iter().map(guarded).collect()
        }
    }
}

/// The workbook reader can panic on corrupt input; such a snapshot becomes
/// a workbook error like any other unreadable file.
fn extract_guarded<F>(
    extract: &F,
    snapshot: &RawSnapshot,
    ctx: &RunContext,
) -> Result<SnapshotExtraction, SnapshotError>
where
    F: Fn(&RawSnapshot, &RunContext) -> Result<SnapshotExtraction, SnapshotError>,
{
    panic::catch_unwind(AssertUnwindSafe(|| extract(snapshot, ctx))).unwrap_or_else(|payload| {
        Err(SnapshotError::Workbook {
            filename: snapshot.filename.clone(),
            reason: format!("reader panicked: {}", panic_message(payload.as_ref())),
        })
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_format() {
        let hash = content_hash(b"abc");
        assert_eq!(
            hash,
            "sha256:ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_unreadable_snapshot_is_skipped() {
        let ctx = RunContext::default();
        let out = consolidate(
            vec![
                RawSnapshot::new("s-1.xlsx", b"garbage".to_vec()),
                RawSnapshot::new("no-number.xlsx", b"garbage".to_vec()),
            ],
            &ctx,
        );
        assert!(out.store.is_empty());
        assert_eq!(out.report.skipped.len(), 2);
        assert!(out.report.snapshots.is_empty());
        assert!(out.report.finished_at.is_some());
    }

    // -------------------------------------------------------------------------
    // PANIC ISOLATION TESTS
    // -------------------------------------------------------------------------

    fn security_xlsx(value: f64) -> Vec<u8> {
        let mut workbook = rust_xlsxwriter::Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.set_name("SEGURIDAD").unwrap();
        sheet.write_string(0, 0, "DISTRITOS").unwrap();
        sheet.write_string(0, 1, "Relacionadas con las personas").unwrap();
        sheet.write_string(1, 0, "CENTRO").unwrap();
        sheet.write_number(1, 1, value).unwrap();
        workbook.save_to_buffer().unwrap()
    }

    fn panics_on_first(
        snapshot: &RawSnapshot,
        ctx: &RunContext,
    ) -> Result<SnapshotExtraction, SnapshotError> {
        if snapshot.filename == "s-1.xlsx" {
            panic!("index out of bounds: the len is 1 but the index is 7");
        }
        extract_snapshot(snapshot, ctx)
    }

    #[test]
    fn test_reader_panic_becomes_skip() {
        for jobs in [1, 2] {
            let ctx = RunContext::default().with_jobs(jobs);
            let out = consolidate_with(
                vec![
                    RawSnapshot::new("s-1.xlsx", security_xlsx(1.0)),
                    RawSnapshot::new("s-2.xlsx", security_xlsx(4.0)),
                ],
                &ctx,
                panics_on_first,
            );

            assert_eq!(out.report.skipped.len(), 1);
            assert_eq!(out.report.skipped[0].filename, "s-1.xlsx");
            assert!(out.report.skipped[0].reason.contains("reader panicked: index out of bounds"));

            let table = out.store.finalize();
            assert_eq!(table.rows.len(), 1);
            assert_eq!(table.rows[0].source, "s-2.xlsx");
            assert_eq!(table.value(&table.rows[0], "relacionadas_con_personas"), Some(4.0));
        }
    }

    #[test]
    fn test_panic_message_payloads() {
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let literal: Box<dyn Any + Send> = Box::new("literal");
        let other: Box<dyn Any + Send> = Box::new(7_u8);
        assert_eq!(panic_message(owned.as_ref()), "owned");
        assert_eq!(panic_message(literal.as_ref()), "literal");
        assert_eq!(panic_message(other.as_ref()), "unknown panic");
    }

    #[test]
    fn test_empty_batch() {
        let out = consolidate(Vec::new(), &RunContext::default());
        assert!(out.store.is_empty());
        assert!(!out.report.has_failures());
    }
}
