//! Table consumers and run report persistence.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::info;

use crate::merge::Table;
use crate::report::RunReport;

/// Accepts the finalized table and persists or renders it.
pub trait TableConsumer {
    fn consume(&mut self, table: &Table) -> Result<()>;
}

/// Writes the table as CSV to any writer.
pub fn write_csv<W: Write>(table: &Table, writer: W) -> Result<()> {
    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(table.header())
        .context("Failed to write CSV header")?;
    for row in &table.rows {
        wtr.write_record(table.render_row(row))
            .with_context(|| format!("Failed to write CSV row for {} {}", row.period, row.district))?;
    }
    wtr.flush().context("Failed to flush CSV output")?;
    Ok(())
}

/// CSV file consumer. Parent directories are created as needed.
#[derive(Debug, Clone)]
pub struct CsvTableWriter {
    path: PathBuf,
}

impl CsvTableWriter {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TableConsumer for CsvTableWriter {
    fn consume(&mut self, table: &Table) -> Result<()> {
        ensure_parent(&self.path)?;
        let file = std::fs::File::create(&self.path)
            .with_context(|| format!("Failed to create {}", self.path.display()))?;
        write_csv(table, file)?;
        info!(
            path = %self.path.display(),
            rows = table.rows.len(),
            columns = table.columns.len(),
            "table written"
        );
        Ok(())
    }
}

pub fn write_report(report: &RunReport, path: &Path) -> Result<()> {
    ensure_parent(path)?;
    let json = serde_json::to_string_pretty(report).context("Failed to serialize run report")?;
    std::fs::write(path, json)
        .with_context(|| format!("Failed to write run report {}", path.display()))?;
    info!(path = %path.display(), run_id = %report.run_id, "run report written");
    Ok(())
}

fn ensure_parent(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display())),
        _ => Ok(()),
    }
}
