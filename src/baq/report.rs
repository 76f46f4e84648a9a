//! Missing-value report written next to the query results.
//!
//! The report is a two-column CSV file (`missing_items.csv` by default), not a
//! spreadsheet workbook.

use std::fs;
use std::io;
use std::path::Path;

use crate::baq::tracker::MissingValues;

pub const DEFAULT_REPORT_PATH: &str = "missing_items.csv";

const HEADER: [&str; 2] = ["Filter_Key", "Missing_Value"];

/// Renders the report as CSV, one line per missing value.
pub fn render_csv(missing: &MissingValues) -> String {
    let mut out = format!("{}\n", HEADER.join(","));
    for (key, values) in missing.iter() {
        for value in values {
            out.push_str(&csv_field(key));
            out.push(',');
            out.push_str(&csv_field(value));
            out.push('\n');
        }
    }
    out
}

/// Writes the report, creating the parent directory if needed.
pub fn write_report(path: &Path, missing: &MissingValues) -> io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, render_csv(missing))
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
