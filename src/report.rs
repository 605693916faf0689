use std::path::Path;

use anyhow::Context;

use crate::models::Row;

/// Flattens table rows into CSV records. Blank spacer rows become a single
/// empty field so they still render as an empty line.
pub fn to_records(rows: &[Row]) -> Vec<Vec<String>> {
    rows.iter()
        .map(|row| {
            if row.is_empty() {
                vec![String::new()]
            } else {
                row.iter().map(|cell| cell.to_string()).collect()
            }
        })
        .collect()
}

pub fn write_csv(path: &Path, rows: &[Row]) -> anyhow::Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("failed to open {} for writing", path.display()))?;

    for record in to_records(rows) {
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}
