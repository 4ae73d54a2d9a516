//! One sheet -> `district -> {indicator -> value}`.
//!
//! Two extraction shapes exist: header-driven, where the label row supplies a
//! variable set of indicator columns, and fixed-position, where a handful of
//! known columns carry hard-coded names. Both share the same row walk.

use tracing::debug;

use crate::cell::{coerce, Grid};
use crate::config::{ColumnMapping, RunContext, SheetSpec};
use crate::error::SheetError;
use crate::layout::{column_label, locate_marker, RowKind};
use crate::merge::{DistrictMap, IndicatorMap};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExtractionStats {
    pub rows_scanned: usize,
    pub district_rows: usize,
    pub excluded_rows: usize,
    pub missing_cells: usize,
    pub values: usize,
}

#[derive(Debug, Clone, Default)]
pub struct SheetExtraction {
    pub districts: DistrictMap,
    pub stats: ExtractionStats,
}

/// Where the data region starts and which columns it carries.
struct Region {
    first_data_row: usize,
    columns: Vec<(usize, String)>,
}

pub fn extract_sheet(
    grid: &Grid,
    spec: &SheetSpec,
    ctx: &RunContext,
) -> Result<SheetExtraction, SheetError> {
    let region = resolve_region(grid, spec, ctx)?;

    let mut extraction = SheetExtraction::default();
    let stats = &mut extraction.stats;

    for row_idx in region.first_data_row..grid.height() {
        let Some(row) = grid.row(row_idx) else { break };
        stats.rows_scanned += 1;

        let district = match ctx.classifier().classify(row) {
            RowKind::District(key) => key,
            RowKind::Excluded => {
                stats.excluded_rows += 1;
                continue;
            }
        };
        stats.district_rows += 1;

        let mut indicators = IndicatorMap::new();
        for (col, name) in &region.columns {
            match row.get(*col).and_then(coerce) {
                Some(value) => {
                    indicators.insert(name.clone(), value);
                }
                None => stats.missing_cells += 1,
            }
        }

        if indicators.is_empty() {
            continue;
        }
        stats.values += indicators.len();
        // Same district twice in one sheet: later row wins per indicator.
        extraction
            .districts
            .entry(district)
            .or_default()
            .extend(indicators);
    }

    debug!(
        sheet = %spec.sheet_name,
        rows = extraction.stats.rows_scanned,
        districts = extraction.districts.len(),
        district_rows = extraction.stats.district_rows,
        values = extraction.stats.values,
        excluded = extraction.stats.excluded_rows,
        missing = extraction.stats.missing_cells,
        "sheet extracted"
    );

    Ok(extraction)
}

fn resolve_region(grid: &Grid, spec: &SheetSpec, ctx: &RunContext) -> Result<Region, SheetError> {
    let marker_row = match &spec.marker {
        Some(marker) => Some(locate_marker(grid, marker).ok_or_else(|| {
            SheetError::MarkerNotFound {
                sheet: spec.sheet_name.clone(),
                marker: marker.clone(),
            }
        })?),
        None => None,
    };

    let first_data_row = marker_row.map_or(0, |m| m + 1 + spec.header_offset);

    let columns = match &spec.columns {
        ColumnMapping::FixedPosition { columns } => columns
            .iter()
            .map(|c| (c.index, c.name.clone()))
            .collect(),
        ColumnMapping::HeaderDriven => {
            // Validated config guarantees a marker here; an absent one just
            // means no labelled columns.
            marker_row.map_or_else(Vec::new, |m| header_columns(grid, m, spec.header_offset, ctx))
        }
    };

    Ok(Region {
        first_data_row,
        columns,
    })
}

/// Labels come from the row just above the data. With a sub-header row, a
/// blank sub-header cell falls back to the marker row's cell (merged headers).
fn header_columns(
    grid: &Grid,
    marker_row: usize,
    header_offset: usize,
    ctx: &RunContext,
) -> Vec<(usize, String)> {
    let label_row = marker_row + header_offset;
    let width = [marker_row, label_row]
        .iter()
        .filter_map(|&r| grid.row(r).map(<[_]>::len))
        .max()
        .unwrap_or(0);

    (1..width)
        .filter_map(|col| {
            let label = column_label(grid.get(label_row, col)).or_else(|| {
                (label_row != marker_row)
                    .then(|| column_label(grid.get(marker_row, col)))
                    .flatten()
            })?;
            Some((col, ctx.canonicalizer().canonicalize(&label)))
        })
        .collect()
}
