use anyhow::{Context, Result};
use std::io::{Read, Write};

use crate::state::DiagnosticReport;

/// Export the whole report as pretty-printed JSON
pub fn export_json<W: Write>(report: &DiagnosticReport, mut writer: W) -> Result<()> {
    serde_json::to_writer_pretty(&mut writer, report)?;
    writeln!(writer)?;
    Ok(())
}

/// Load a report previously written by [`export_json`]
pub fn load_json<R: Read>(reader: R) -> Result<DiagnosticReport> {
    serde_json::from_reader(reader).context("Failed to parse report JSON")
}
