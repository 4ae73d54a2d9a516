//! Finding the district-keyed region inside a semi-structured sheet.

use std::fmt;

use serde::Serialize;

use crate::cell::{Cell, Grid};

/// Normalized district identity: trimmed and uppercased.
///
/// "Arganzuela " and "ARGANZUELA" are the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DistrictKey(String);

impl DistrictKey {
    pub fn normalize(raw: &str) -> Self {
        Self(raw.trim().to_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DistrictKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Labels that spreadsheet exports use for "no value".
fn is_blank_label(label: &str) -> bool {
    let label = label.trim();
    label.is_empty() || label.eq_ignore_ascii_case("nan") || label.eq_ignore_ascii_case("none")
}

/// Normalized first-column label, or `None` when it is blank.
pub fn first_column_label(row: &[Cell]) -> Option<String> {
    let label = row.first()?.label();
    (!is_blank_label(&label)).then_some(label)
}

/// Column label for header-driven sheets; blank labels yield `None`.
pub fn column_label(cell: Option<&Cell>) -> Option<String> {
    let label = cell?.label();
    (!is_blank_label(&label)).then_some(label)
}

/// Index of the first row whose first cell contains `marker`, ignoring case.
pub fn locate_marker(grid: &Grid, marker: &str) -> Option<usize> {
    let marker = marker.trim().to_uppercase();
    grid.rows().position(|row| {
        row.first()
            .map(|cell| cell.label().to_uppercase().contains(&marker))
            .unwrap_or(false)
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowKind {
    District(DistrictKey),
    Excluded,
}

/// Separates district rows from header echoes, totals and noise.
#[derive(Debug, Clone)]
pub struct RowClassifier {
    excluded_tokens: Vec<String>,
}

impl RowClassifier {
    /// Shortest accepted district label is three characters.
    const MIN_LABEL_CHARS: usize = 3;

    pub fn new<I, S>(excluded_tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            excluded_tokens: excluded_tokens
                .into_iter()
                .map(|t| t.as_ref().trim().to_uppercase())
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    pub fn classify(&self, row: &[Cell]) -> RowKind {
        let Some(label) = first_column_label(row) else {
            return RowKind::Excluded;
        };
        if label.chars().count() < Self::MIN_LABEL_CHARS {
            return RowKind::Excluded;
        }
        let key = DistrictKey::normalize(&label);
        if self
            .excluded_tokens
            .iter()
            .any(|token| key.as_str().contains(token.as_str()))
        {
            return RowKind::Excluded;
        }
        RowKind::District(key)
    }
}

impl Default for RowClassifier {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_EXCLUDED_TOKENS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn row(cells: &[&str]) -> Vec<Cell> {
        cells
            .iter()
            .map(|s| if s.is_empty() { Cell::Empty } else { Cell::text(*s) })
            .collect()
    }

    // -------------------------------------------------------------------------
    // MARKER LOCATION TESTS
    // -------------------------------------------------------------------------

    #[test]
    fn test_locate_marker_case_insensitive() {
        let grid = Grid::from_strings(vec![
            vec!["POLICÍA MUNICIPAL", ""],
            vec!["", ""],
            vec!["Distritos", "Relacionadas con las personas"],
            vec!["CENTRO", "4"],
        ]);
        assert_eq!(locate_marker(&grid, "DISTRITOS"), Some(2));
        assert_eq!(locate_marker(&grid, "distritos"), Some(2));
    }

    #[test]
    fn test_locate_marker_first_match() {
        let grid = Grid::from_strings(vec![
            vec!["DISTRITOS"],
            vec!["TOTAL DISTRITOS"],
        ]);
        assert_eq!(locate_marker(&grid, "DISTRITOS"), Some(0));
    }

    #[test]
    fn test_locate_marker_not_found() {
        let grid = Grid::from_strings(vec![vec!["CENTRO", "1"], vec!["", "DISTRITOS"]]);
        assert_eq!(locate_marker(&grid, "DISTRITOS"), None);
        assert_eq!(locate_marker(&Grid::default(), "DISTRITOS"), None);
    }

    // -------------------------------------------------------------------------
    // ROW CLASSIFICATION TESTS
    // -------------------------------------------------------------------------

    #[test]
    fn test_classify_district_row() {
        let classifier = RowClassifier::default();
        assert_eq!(
            classifier.classify(&row(&["Arganzuela ", "2"])),
            RowKind::District(DistrictKey::normalize("ARGANZUELA"))
        );
    }

    #[test]
    fn test_classify_excludes_totals_and_header_echo() {
        let classifier = RowClassifier::default();
        assert_eq!(classifier.classify(&row(&["TOTAL DISTRITOS", "99"])), RowKind::Excluded);
        assert_eq!(classifier.classify(&row(&["Total", "99"])), RowKind::Excluded);
        assert_eq!(classifier.classify(&row(&["DISTRITOS", "x"])), RowKind::Excluded);
        assert_eq!(classifier.classify(&row(&["distrito", "x"])), RowKind::Excluded);
    }

    #[test]
    fn test_classify_excludes_blank_and_short() {
        let classifier = RowClassifier::default();
        assert_eq!(classifier.classify(&row(&["", "1"])), RowKind::Excluded);
        assert_eq!(classifier.classify(&row(&["nan", "1"])), RowKind::Excluded);
        assert_eq!(classifier.classify(&row(&["None", "1"])), RowKind::Excluded);
        assert_eq!(classifier.classify(&row(&["AB", "1"])), RowKind::Excluded);
        assert_eq!(classifier.classify(&[]), RowKind::Excluded);
        assert_eq!(classifier.classify(&[Cell::Number(12.0)]), RowKind::Excluded);
    }

    #[test]
    fn test_normalization_collapse() {
        assert_eq!(
            DistrictKey::normalize("Arganzuela "),
            DistrictKey::normalize("ARGANZUELA")
        );
        assert_eq!(DistrictKey::normalize("  Puente de Vallecas").as_str(), "PUENTE DE VALLECAS");
    }

    proptest! {
        #[test]
        fn prop_anything_with_district_token_is_excluded(
            prefix in "[A-Za-z ]{0,8}",
            suffix in "[A-Za-z ]{0,8}",
        ) {
            let classifier = RowClassifier::default();
            let label = format!("{prefix}Distrito{suffix}");
            prop_assert_eq!(classifier.classify(&row(&[label.as_str(), "1"])), RowKind::Excluded);
        }
    }
}
