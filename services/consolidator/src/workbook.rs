//! Workbook access over in-memory snapshot bytes.

use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Reader, Sheets};
use tracing::debug;

use crate::cell::Grid;
use crate::error::{SheetError, SnapshotError};

/// An opened snapshot workbook (xlsx, xls, xlsb or ods; calamine sniffs the
/// format from the content).
pub struct SnapshotWorkbook {
    filename: String,
    sheets: Sheets<Cursor<Vec<u8>>>,
    names: Vec<String>,
}

impl SnapshotWorkbook {
    pub fn open(filename: &str, content: &[u8]) -> Result<Self, SnapshotError> {
        let sheets = open_workbook_auto_from_rs(Cursor::new(content.to_vec())).map_err(|e| {
            SnapshotError::Workbook {
                filename: filename.to_string(),
                reason: e.to_string(),
            }
        })?;
        let names = sheets.sheet_names();
        Ok(Self {
            filename: filename.to_string(),
            sheets,
            names,
        })
    }

    /// Reads a sheet by name. Exports are inconsistent about padding and
    /// case in sheet names, so both are ignored.
    pub fn grid(&mut self, sheet_name: &str) -> Result<Grid, SheetError> {
        let wanted = sheet_name.trim();
        let Some(actual) = self
            .names
            .iter()
            .find(|n| n.trim().eq_ignore_ascii_case(wanted))
            .cloned()
        else {
            debug!(
                file = %self.filename,
                wanted,
                available = ?self.names,
                "sheet not in workbook"
            );
            return Err(SheetError::Absent(sheet_name.to_string()));
        };

        let range = self
            .sheets
            .worksheet_range(&actual)
            .map_err(|e| SheetError::Unreadable {
                sheet: actual.clone(),
                reason: e.to_string(),
            })?;
        Ok(Grid::from_range(&range))
    }
}
