//! Error taxonomy of the extraction core.
//!
//! None of these abort a batch: snapshot errors drop one snapshot, sheet
//! errors drop one sheet. Batch emptiness is a post-condition checked by the
//! caller (see [`crate::ConsolidatedStore::is_empty`]), not an error raised here.

use thiserror::Error;

/// A snapshot that cannot take part in the batch at all.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SnapshotError {
    #[error("IDENTIFICATION: no digit run in filename '{0}'")]
    Identification(String),

    #[error("IDENTIFICATION: ordinal '{digits}' in filename '{filename}' is out of range")]
    OrdinalOverflow { filename: String, digits: String },

    #[error("failed to open workbook '{filename}': {reason}")]
    Workbook { filename: String, reason: String },
}

/// A recognized sheet that contributes nothing for one snapshot.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SheetError {
    #[error("sheet '{0}' not present in snapshot")]
    Absent(String),

    #[error("marker '{marker}' not found in sheet '{sheet}'")]
    MarkerNotFound { sheet: String, marker: String },

    #[error("sheet '{sheet}' could not be read: {reason}")]
    Unreadable { sheet: String, reason: String },
}

/// Invalid taxonomy or period configuration, rejected before any work starts.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConfigError {
    #[error("canonical rule target '{0}' is not a slug of [a-z0-9_]")]
    RuleTargetNotSlug(String),

    #[error("canonical rule phrase '{0}' could match an already canonical name")]
    RulePhraseAmbiguous(String),

    #[error("sheet '{sheet}': header offset must be 0 or 1, got {offset}")]
    HeaderOffset { sheet: String, offset: usize },

    #[error("sheet '{0}': header-driven extraction needs a marker token")]
    HeaderDrivenWithoutMarker(String),

    #[error("sheet '{0}': fixed-position mapping needs at least one column")]
    NoFixedColumns(String),

    #[error("sheet '{sheet}': fixed column name '{name}' is not a slug")]
    FixedColumnNotSlug { sheet: String, name: String },

    #[error("sheet kind {0} is declared more than once")]
    DuplicateSheetKind(String),

    #[error("period step must be a positive number of days, got {0}")]
    StepDays(i64),
}
