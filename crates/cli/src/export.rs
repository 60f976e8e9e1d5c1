//! `sheetsync export`: the rows a full sync would write, as CSV.

use std::io::Write;
use std::path::PathBuf;

use tracing::info;

use sheetsync_engine::{include, transform, OutputRow, RecordFilter, SourceRecord, HEADERS};

use crate::CliError;

/// Filter and expand records into destination rows, in source order.
pub fn export_rows(records: &[SourceRecord], filter: &RecordFilter) -> Vec<OutputRow> {
    records
        .iter()
        .filter(|r| include(r, filter))
        .flat_map(transform)
        .collect()
}

/// Write `HEADERS` then `rows` to `out` (stdout when `None`).
/// The header is always written, even with zero rows.
pub fn write_csv(rows: &[OutputRow], out: &Option<PathBuf>) -> Result<String, CliError> {
    let out_label = out
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "stdout".to_string());

    let writer: Box<dyn Write> = match out {
        Some(path) => {
            let f = std::fs::File::create(path)
                .map_err(|e| CliError::io(format!("cannot create {}: {}", path.display(), e)))?;
            Box::new(std::io::BufWriter::new(f))
        }
        None => Box::new(std::io::BufWriter::new(std::io::stdout().lock())),
    };

    write_to(writer, rows)?;
    info!(rows = rows.len(), out = %out_label, "exported");
    Ok(out_label)
}

fn write_to<W: Write>(writer: W, rows: &[OutputRow]) -> Result<(), CliError> {
    let mut csv_writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(writer);

    csv_writer
        .write_record(HEADERS)
        .map_err(|e| CliError::io(format!("CSV write error: {}", e)))?;
    for row in rows {
        csv_writer
            .write_record(row.rendered())
            .map_err(|e| CliError::io(format!("CSV write error: {}", e)))?;
    }
    csv_writer
        .flush()
        .map_err(|e| CliError::io(format!("CSV flush error: {}", e)))?;
    Ok(())
}
