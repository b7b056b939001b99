//! Observed rating-curve ingest.
//!
//! The observed file is a CSV with one row per flow profile, in profile order,
//! and at least the columns `Flow` and `Stage` (case-insensitive; a UTF-8 BOM
//! on the first header is tolerated). Extra columns are ignored. Unlike a
//! bulk data import, a bad row is fatal: every row is one profile, so skipping
//! it would shift the whole comparison.

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use csv::StringRecord;
use tracing::info;

use crate::error::{CalibrationError, Result};

/// Flow/stage pairs, one per profile.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedData {
    pub flows: Vec<f64>,
    pub stages: Vec<f64>,
}

impl ObservedData {
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}

/// Load an observed CSV file.
pub fn load_observed(path: &Path) -> Result<ObservedData> {
    let file = File::open(path).map_err(|e| {
        CalibrationError::io(format!("Failed to open observed CSV '{}'", path.display()), e)
    })?;
    let data = read_observed(file)?;
    info!(profiles = data.len(), path = %path.display(), "loaded observed series");
    Ok(data)
}

/// Parse observed CSV content from any reader.
pub fn read_observed<R: std::io::Read>(input: R) -> Result<ObservedData> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(input);

    let headers = reader
        .headers()
        .map_err(|e| CalibrationError::configuration(format!("Failed to read CSV headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);
    let flow_idx = required_column(&header_map, "flow")?;
    let stage_idx = required_column(&header_map, "stage")?;

    let mut flows = Vec::new();
    let mut stages = Vec::new();
    for (idx, result) in reader.records().enumerate() {
        // Line numbers are 1-based and the header is line 1.
        let line = idx + 2;
        let record = result.map_err(|e| {
            CalibrationError::configuration(format!("Observed CSV line {line}: {e}"))
        })?;
        flows.push(parse_cell(&record, flow_idx, "Flow", line)?);
        stages.push(parse_cell(&record, stage_idx, "Stage", line)?);
    }

    if stages.is_empty() {
        return Err(CalibrationError::configuration("Observed CSV has no data rows."));
    }
    Ok(ObservedData { flows, stages })
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    name.trim().trim_start_matches('\u{feff}').to_ascii_lowercase()
}

fn required_column(header_map: &HashMap<String, usize>, name: &str) -> Result<usize> {
    header_map.get(name).copied().ok_or_else(|| {
        CalibrationError::configuration(format!("Observed CSV is missing required column `{name}`."))
    })
}

fn parse_cell(record: &StringRecord, idx: usize, column: &str, line: usize) -> Result<f64> {
    let raw = record.get(idx).unwrap_or("");
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(CalibrationError::configuration(format!(
            "Observed CSV line {line}: invalid {column} value '{raw}'."
        ))),
    }
}
