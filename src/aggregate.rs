// src/aggregate.rs

use crate::error::BillError;
use crate::record::{BillRecord, CSV_HEADERS};
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use tracing::info;

/// Records in arrival order. No dedup, no sorting.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct ResultSet {
    records: Vec<BillRecord>,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: BillRecord) {
        self.records.push(record);
    }

    pub fn records(&self) -> &[BillRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// (succeeded, failed)
    pub fn counts(&self) -> (usize, usize) {
        let failed = self.records.iter().filter(|r| r.error().is_some()).count();
        (self.records.len() - failed, failed)
    }

    /// Fixed header, plus a trailing `error` column when any record failed.
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<(), BillError> {
        let with_errors = self.counts().1 > 0;
        let mut writer = csv::Writer::from_writer(writer);

        let mut header: Vec<&str> = CSV_HEADERS.to_vec();
        if with_errors {
            header.push("error");
        }
        writer.write_record(&header)?;

        for record in &self.records {
            let mut row = record.csv_row();
            if with_errors {
                row.push(record.error().unwrap_or_default().to_string());
            }
            writer.write_record(&row)?;
        }

        writer.flush()?;
        Ok(())
    }

    pub fn write_csv_file(&self, path: impl AsRef<Path>) -> Result<(), BillError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        self.write_csv(File::create(path)?)?;
        info!(path = %path.display(), rows = self.records.len(), "Exported bills");
        Ok(())
    }

    /// Fixed-width console summary, one line per record.
    pub fn render_table(&self) -> String {
        const WIDTHS: [usize; 5] = [28, 24, 23, 12, 12];
        let mut out = String::new();

        let header = ["FILE", "PROVIDER", "PERIOD", "KWH", "AMOUNT DUE"];
        out.push_str(&row_line(&header.map(String::from), &WIDTHS));
        out.push_str("STATUS\n");

        for record in &self.records {
            let (cells, status) = match record.fields() {
                Some(f) => {
                    let period = match (f.start_date, f.end_date) {
                        (Some(s), Some(e)) => format!("{s} - {e}"),
                        (Some(s), None) => format!("{s} -"),
                        (None, Some(e)) => format!("- {e}"),
                        (None, None) => String::new(),
                    };
                    let status = if f.tariff_split { "ok (split tariff)" } else { "ok" };
                    (
                        [
                            record.filename.clone(),
                            f.provider.clone(),
                            period,
                            f.kwh_usage.map(|v| v.to_string()).unwrap_or_default(),
                            f.amount_due.map(|v| format!("{v:.2}")).unwrap_or_default(),
                        ],
                        status.to_string(),
                    )
                }
                None => (
                    [
                        record.filename.clone(),
                        String::new(),
                        String::new(),
                        String::new(),
                        String::new(),
                    ],
                    format!(
                        "error: {}",
                        record.error().unwrap_or_default().lines().next().unwrap_or_default()
                    ),
                ),
            };
            out.push_str(&row_line(&cells, &WIDTHS));
            out.push_str(&status);
            out.push('\n');
        }

        out
    }
}

fn row_line(cells: &[String; 5], widths: &[usize; 5]) -> String {
    cells
        .iter()
        .zip(widths)
        .map(|(cell, &w)| format!("{:<w$} ", clip(cell, w)))
        .collect()
}

fn clip(s: &str, width: usize) -> String {
    if s.chars().count() <= width {
        s.to_string()
    } else {
        let mut clipped: String = s.chars().take(width.saturating_sub(1)).collect();
        clipped.push('~');
        clipped
    }
}
