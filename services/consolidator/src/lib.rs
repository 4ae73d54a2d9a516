//! Consolidator - Turns monthly district police statistics workbooks into one
//! table keyed by (period, district)
//!
//! Responsibilities:
//! - Classify raw cells once at the workbook boundary
//! - Locate the district region of each recognized sheet
//! - Canonicalize drifting indicator labels into stable column names
//! - Estimate each snapshot's period from its filename ordinal
//! - Merge sheets within a snapshot, then snapshots chronologically
//!
//! CRITICAL: Output is DETERMINISTIC
//! Same batch + same configuration = same table, for any worker count

pub mod canonical;
pub mod cell;
pub mod config;
pub mod error;
pub mod extract;
pub mod layout;
pub mod merge;
pub mod output;
pub mod period;
pub mod pipeline;
pub mod provider;
pub mod report;
pub mod workbook;

pub use canonical::{CanonicalRule, Canonicalizer};
pub use cell::{Cell, Grid};
pub use config::{PeriodSettings, RunContext, SheetKind, SheetSpec, TaxonomyConfig};
pub use error::{ConfigError, SheetError, SnapshotError};
pub use layout::DistrictKey;
pub use merge::{ConsolidatedStore, Table, TableRow};
pub use output::{CsvTableWriter, TableConsumer};
pub use period::Period;
pub use pipeline::{consolidate, Consolidation, RawSnapshot};
pub use provider::{DirectoryProvider, SnapshotProvider};
pub use report::RunReport;
