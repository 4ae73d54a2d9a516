//! Run configuration: the sheet taxonomy, canonicalization rules and period
//! heuristic, bundled into one [`RunContext`] passed through the pipeline.

use std::fmt;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::canonical::{default_rules, is_slug, CanonicalRule, Canonicalizer};
use crate::error::ConfigError;
use crate::layout::RowClassifier;

/// Tokens that mark header echoes and aggregate rows in first-column labels.
pub const DEFAULT_EXCLUDED_TOKENS: [&str; 2] = ["DISTRITO", "TOTAL"];

/// Marker found in the first column right above the security-incident rows.
pub const DEFAULT_SECURITY_MARKER: &str = "DISTRITOS";

/// Latest known real-world period; assigned to the highest ordinal.
pub const DEFAULT_ANCHOR: NaiveDate = match NaiveDate::from_ymd_opt(2025, 6, 1) {
    Some(date) => date,
    None => panic!("invalid default anchor"),
};

/// Days subtracted per rank step below the anchor.
pub const DEFAULT_STEP_DAYS: i64 = 30;

/// Recognized sheet kinds. Declaration order is the merge priority: when two
/// sheets produce the same indicator for a district, the later kind wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SheetKind {
    Security,
    Detentions,
    Accidents,
    Venues,
    Alcohol,
}

impl fmt::Display for SheetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SheetKind::Security => "security",
            SheetKind::Detentions => "detentions",
            SheetKind::Accidents => "accidents",
            SheetKind::Venues => "venues",
            SheetKind::Alcohol => "alcohol",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixedColumn {
    pub index: usize,
    pub name: String,
}

impl FixedColumn {
    pub fn new(index: usize, name: &str) -> Self {
        Self {
            index,
            name: name.to_string(),
        }
    }
}

/// How a sheet's columns become indicator names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum ColumnMapping {
    /// Every labelled column after the first is an indicator, named by
    /// canonicalizing its label.
    HeaderDriven,
    /// A small known set of columns with hard-coded names.
    FixedPosition { columns: Vec<FixedColumn> },
}

/// Extraction strategy for one sheet kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SheetSpec {
    pub kind: SheetKind,
    /// Worksheet name in the workbook, matched trimmed and case-insensitively.
    pub sheet_name: String,
    /// Without a marker the whole sheet is scanned and rows are filtered by
    /// the row classifier alone.
    #[serde(default)]
    pub marker: Option<String>,
    /// Rows between the marker and the first data row (0 or 1).
    #[serde(default)]
    pub header_offset: usize,
    pub columns: ColumnMapping,
}

impl SheetSpec {
    fn fixed(kind: SheetKind, sheet_name: &str, columns: &[(usize, &str)]) -> Self {
        Self {
            kind,
            sheet_name: sheet_name.to_string(),
            marker: None,
            header_offset: 0,
            columns: ColumnMapping::FixedPosition {
                columns: columns
                    .iter()
                    .map(|(index, name)| FixedColumn::new(*index, name))
                    .collect(),
            },
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.header_offset > 1 {
            return Err(ConfigError::HeaderOffset {
                sheet: self.sheet_name.clone(),
                offset: self.header_offset,
            });
        }
        match &self.columns {
            ColumnMapping::HeaderDriven if self.marker.is_none() => {
                Err(ConfigError::HeaderDrivenWithoutMarker(self.sheet_name.clone()))
            }
            ColumnMapping::HeaderDriven => Ok(()),
            ColumnMapping::FixedPosition { columns } if columns.is_empty() => {
                Err(ConfigError::NoFixedColumns(self.sheet_name.clone()))
            }
            ColumnMapping::FixedPosition { columns } => {
                match columns.iter().find(|c| !is_slug(&c.name)) {
                    Some(bad) => Err(ConfigError::FixedColumnNotSlug {
                        sheet: self.sheet_name.clone(),
                        name: bad.name.clone(),
                    }),
                    None => Ok(()),
                }
            }
        }
    }
}

/// The five sheets of the municipal police monthly workbook.
pub fn default_sheets() -> Vec<SheetSpec> {
    vec![
        SheetSpec {
            kind: SheetKind::Security,
            sheet_name: "SEGURIDAD".to_string(),
            marker: Some(DEFAULT_SECURITY_MARKER.to_string()),
            header_offset: 0,
            columns: ColumnMapping::HeaderDriven,
        },
        SheetSpec::fixed(
            SheetKind::Detentions,
            "PERS. DETENIDAS X DISTRITOS",
            &[(1, "personas_detenidas_total")],
        ),
        SheetSpec::fixed(
            SheetKind::Accidents,
            "ACCIDENTES",
            &[(1, "accidentes_con_victimas"), (2, "accidentes_sin_victimas")],
        ),
        SheetSpec::fixed(
            SheetKind::Venues,
            "LOCALES",
            &[(1, "inspecciones_locales"), (2, "denuncias_locales")],
        ),
        SheetSpec::fixed(
            SheetKind::Alcohol,
            "CONSUMO ALCOHOL",
            &[
                (1, "infracciones_alcohol_adultos"),
                (2, "infracciones_alcohol_menores"),
            ],
        ),
    ]
}

fn default_excluded_tokens() -> Vec<String> {
    DEFAULT_EXCLUDED_TOKENS.iter().map(|t| t.to_string()).collect()
}

/// File-loadable part of the configuration. Missing sections keep defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxonomyConfig {
    #[serde(default = "default_sheets")]
    pub sheets: Vec<SheetSpec>,
    #[serde(default = "default_rules")]
    pub rules: Vec<CanonicalRule>,
    #[serde(default = "default_excluded_tokens")]
    pub excluded_tokens: Vec<String>,
}

impl Default for TaxonomyConfig {
    fn default() -> Self {
        Self {
            sheets: default_sheets(),
            rules: default_rules(),
            excluded_tokens: default_excluded_tokens(),
        }
    }
}

impl TaxonomyConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodSettings {
    pub anchor: NaiveDate,
    pub step_days: i64,
}

impl Default for PeriodSettings {
    fn default() -> Self {
        Self {
            anchor: DEFAULT_ANCHOR,
            step_days: DEFAULT_STEP_DAYS,
        }
    }
}

/// Everything a run needs, validated once and shared read-only by workers.
#[derive(Debug, Clone)]
pub struct RunContext {
    sheets: Vec<SheetSpec>,
    canonicalizer: Canonicalizer,
    classifier: RowClassifier,
    periods: PeriodSettings,
    jobs: usize,
}

impl RunContext {
    pub fn new(taxonomy: TaxonomyConfig, periods: PeriodSettings) -> Result<Self, ConfigError> {
        if periods.step_days <= 0 {
            return Err(ConfigError::StepDays(periods.step_days));
        }

        let mut sheets = taxonomy.sheets;
        for spec in &sheets {
            spec.validate()?;
        }
        sheets.sort_by_key(|spec| spec.kind);
        if let Some(pair) = sheets.windows(2).find(|w| w[0].kind == w[1].kind) {
            return Err(ConfigError::DuplicateSheetKind(pair[0].kind.to_string()));
        }

        Ok(Self {
            sheets,
            canonicalizer: Canonicalizer::new(taxonomy.rules)?,
            classifier: RowClassifier::new(&taxonomy.excluded_tokens),
            periods,
            jobs: 0,
        })
    }

    /// Worker count for per-snapshot extraction; 0 means one per core.
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs;
        self
    }

    /// Sheet strategies in merge-priority order.
    pub fn sheets(&self) -> &[SheetSpec] {
        &self.sheets
    }

    pub fn canonicalizer(&self) -> &Canonicalizer {
        &self.canonicalizer
    }

    pub fn classifier(&self) -> &RowClassifier {
        &self.classifier
    }

    pub fn periods(&self) -> PeriodSettings {
        self.periods
    }

    pub fn jobs(&self) -> usize {
        self.jobs
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self {
            sheets: default_sheets(),
            canonicalizer: Canonicalizer::default(),
            classifier: RowClassifier::default(),
            periods: PeriodSettings::default(),
            jobs: 0,
        }
    }
}
