use anyhow::{Context, Result};
use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::path::Path;

pub const TRIAL_HISTORY_FILE_NAME: &str = "trials.csv";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrialStatus {
    /// Files written, engine not started
    Prepared,
    Completed,
    Failed,
    Interrupted,
}

// One row of the trial history: the value given to one zone in one trial
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrialRecord {
    pub trial: u32,
    pub zone: usize,
    pub value: f64,
    pub manning_file: String,
    pub simfile: String,
    pub status: TrialStatus,
    pub recorded_at: String,
}

/// Append records to the history file, writing the header if the file is new
pub fn append_trial_records(path: &Path, records: &[TrialRecord]) -> Result<()> {
    let is_new = std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open trial history: {:?}", path))?;

    let mut wtr = WriterBuilder::new().has_headers(is_new).from_writer(file);
    for record in records {
        wtr.serialize(record)?;
    }
    wtr.flush().context("Failed to flush trial history")?;

    Ok(())
}

pub fn read_trial_records(path: &Path) -> Result<Vec<TrialRecord>> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("Failed to open trial history: {:?}", path))?;

    let records = rdr
        .deserialize()
        .collect::<Result<Vec<TrialRecord>, _>>()
        .with_context(|| format!("Invalid trial history: {:?}", path))?;
    Ok(records)
}
