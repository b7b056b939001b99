//! CSV exports: the metric table and the per-profile series companion.
//!
//! Both are meant to be easy to consume in spreadsheets or downstream scripts.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{CalibrationError, Result};
use crate::io::ingest::ObservedData;
use crate::report::ReportTable;

/// Write the metric table (`{parameter…, metric…}` per row).
pub fn write_table_csv(path: &Path, table: &ReportTable) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| csv_error(path, e))?;
    writer
        .write_record(table.headers())
        .map_err(|e| csv_error(path, e))?;
    for row in &table.rows {
        let cells = row
            .parameters
            .iter()
            .chain(&row.metrics)
            .map(|v| v.to_string());
        writer.write_record(cells).map_err(|e| csv_error(path, e))?;
    }
    writer
        .flush()
        .map_err(|e| CalibrationError::io(format!("Failed to flush '{}'", path.display()), e))?;
    info!(path = %path.display(), rows = table.len(), "wrote result table");
    Ok(())
}

/// Write observed and simulated series side by side, one row per profile.
///
/// Column names carry each candidate's parameter values, e.g. `sim[n=0.035]`.
pub fn write_series_csv(path: &Path, observed: &ObservedData, table: &ReportTable) -> Result<()> {
    let mut writer = csv::Writer::from_path(path).map_err(|e| csv_error(path, e))?;

    let mut header = vec!["flow".to_string(), "observed".to_string()];
    for row in &table.rows {
        let label: Vec<String> = table
            .parameter_names
            .iter()
            .zip(&row.parameters)
            .map(|(n, v)| format!("{n}={v}"))
            .collect();
        header.push(format!("sim[{}]", label.join(";")));
    }
    writer.write_record(&header).map_err(|e| csv_error(path, e))?;

    for (i, (flow, stage)) in observed.flows.iter().zip(&observed.stages).enumerate() {
        let mut record = vec![flow.to_string(), stage.to_string()];
        record.extend(
            table
                .rows
                .iter()
                .map(|r| r.series.get(i).map(f64::to_string).unwrap_or_default()),
        );
        writer.write_record(&record).map_err(|e| csv_error(path, e))?;
    }
    writer
        .flush()
        .map_err(|e| CalibrationError::io(format!("Failed to flush '{}'", path.display()), e))?;
    Ok(())
}

/// `results.csv` -> `results-data.csv`.
pub fn series_path_for(table_path: &Path) -> PathBuf {
    let stem = table_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("results");
    let name = match table_path.extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{stem}-data.{ext}"),
        None => format!("{stem}-data"),
    };
    table_path.with_file_name(name)
}

fn csv_error(path: &Path, err: csv::Error) -> CalibrationError {
    let context = format!("Failed to write CSV '{}'", path.display());
    match err.into_kind() {
        csv::ErrorKind::Io(source) => CalibrationError::io(context, source),
        other => CalibrationError::io(context, std::io::Error::other(format!("{other:?}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::sample_results;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("rcal-export-{}-{name}", std::process::id()))
    }

    #[test]
    fn table_csv_has_header_and_rows() {
        let path = temp_path("table.csv");
        let table = ReportTable::from_results(&sample_results());
        write_table_csv(&path, &table).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "n,rmse,r2");
        assert_eq!(lines[1], "0.035,0.12345,0.98");
        assert_eq!(lines.len(), 3);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn series_csv_lines_up_profiles() {
        let path = temp_path("series.csv");
        let observed = ObservedData {
            flows: vec![100.0, 200.0],
            stages: vec![10.0, 11.0],
        };
        let table = ReportTable::from_results(&sample_results());
        write_series_csv(&path, &observed, &table).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "flow,observed,sim[n=0.035],sim[n=0.04]");
        assert_eq!(lines[1], "100,10,10.035,10.04");
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn series_path_gets_data_suffix() {
        assert_eq!(
            series_path_for(Path::new("out/results.csv")),
            PathBuf::from("out/results-data.csv")
        );
        assert_eq!(series_path_for(Path::new("table")), PathBuf::from("table-data"));
    }
}
