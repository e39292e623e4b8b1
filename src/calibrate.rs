//! Sequential calibration trials.
//!
//! Each trial suggests one Manning value per zone, writes a new roughness file and simulation
//! file named after the previous trial's files, and optionally runs the engine on them. A trial
//! that fails is logged and skipped; an interrupted run ends the whole calibration.
use crate::io::csv::{TrialRecord, TrialStatus, append_trial_records};
use crate::io::netcdf::read_field;
use crate::runner::is_interrupted;
use crate::suggest::{Suggester, suggest_new_manning};
use crate::trial::{create_new_manning_file, create_new_simfile};
use crate::zones::{Zone, find_zones};
use anyhow::{Result, ensure};
use chrono::Local;
use log::{error, info};
use std::path::{Path, PathBuf};

/// Runs the engine on a simulation file
pub type Engine<'a> = dyn FnMut(&Path) -> Result<()> + 'a;

/// Files and values produced by one trial
#[derive(Debug, Clone, PartialEq)]
pub struct TrialOutcome {
    pub trial_no: u32,
    pub values: Vec<f64>,
    pub manning_file: PathBuf,
    pub simfile: PathBuf,
    pub status: TrialStatus,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct CalibrationSummary {
    pub completed: Vec<TrialOutcome>,
    pub failed: Vec<u32>,
}

pub struct Calibration {
    simfile: PathBuf,
    manning_file: PathBuf,
    item_name: String,
    zones: Vec<Zone>,
    history_file: Option<PathBuf>,
}

impl Calibration {
    /// Start from a base simulation file and roughness file, finding zones in the latter
    pub fn new(simfile: &Path, manning_file: &Path, item_name: &str) -> Result<Self> {
        let field = read_field(manning_file, item_name)?;
        let zones = find_zones(&field);
        info!("Found {} zones in {:?}", zones.len(), manning_file);

        Ok(Calibration {
            simfile: simfile.to_path_buf(),
            manning_file: manning_file.to_path_buf(),
            item_name: item_name.to_string(),
            zones,
            history_file: None,
        })
    }

    /// Append a row per zone to this CSV file after every trial
    pub fn with_history(mut self, path: &Path) -> Self {
        self.history_file = Some(path.to_path_buf());
        self
    }

    pub fn zones(&self) -> &[Zone] {
        &self.zones
    }

    /// Simulation file the next trial is derived from
    pub fn simfile(&self) -> &Path {
        &self.simfile
    }

    /// Roughness file the next trial is derived from
    pub fn manning_file(&self) -> &Path {
        &self.manning_file
    }

    /// Run a single trial. Without an engine the files are only written.
    pub fn run_trial(
        &mut self,
        trial_no: u32,
        suggester: &mut dyn Suggester,
        engine: Option<&mut Engine<'_>>,
    ) -> Result<TrialOutcome> {
        let values = suggest_new_manning(suggester, &self.zones);
        let manning_file = create_new_manning_file(
            trial_no,
            &self.manning_file,
            &self.item_name,
            &self.zones,
            &values,
        )?;
        let simfile = create_new_simfile(trial_no, &self.simfile, &manning_file, &self.item_name)?;

        self.manning_file = manning_file.clone();
        self.simfile = simfile.clone();

        let (result, status) = match engine {
            None => (Ok(()), TrialStatus::Prepared),
            Some(engine) => {
                let result = engine(&simfile);
                let status = match &result {
                    Ok(()) => TrialStatus::Completed,
                    Err(e) if is_interrupted(e) => TrialStatus::Interrupted,
                    Err(_) => TrialStatus::Failed,
                };
                (result, status)
            }
        };

        let outcome = TrialOutcome {
            trial_no,
            values,
            manning_file,
            simfile,
            status,
        };
        if let Err(e) = self.record(&outcome) {
            // An engine error, an interruption in particular, takes precedence
            if result.is_ok() {
                return Err(e);
            }
            error!("Failed to record trial {}: {:#}", trial_no, e);
        }
        result.map(|()| outcome)
    }

    /// Run `count` trials numbered from `first`.
    ///
    /// Failed trials are skipped. An interruption stops the loop and is returned as the error.
    pub fn run_trials(
        &mut self,
        first: u32,
        count: u32,
        suggester: &mut dyn Suggester,
        mut engine: Option<&mut Engine<'_>>,
    ) -> Result<CalibrationSummary> {
        ensure!(
            count == 0 || first.checked_add(count - 1).is_some(),
            "Cannot number {} trials starting at {}",
            count,
            first
        );

        let mut summary = CalibrationSummary::default();
        for trial_no in (first..=u32::MAX).take(count as usize) {
            info!("Starting trial {}", trial_no);
            match self.run_trial(trial_no, suggester, engine.as_deref_mut()) {
                Ok(outcome) => summary.completed.push(outcome),
                Err(e) if is_interrupted(&e) => return Err(e),
                Err(e) => {
                    error!("Trial {} failed: {:#}", trial_no, e);
                    summary.failed.push(trial_no);
                }
            }
        }

        info!(
            "{} trials completed, {} failed",
            summary.completed.len(),
            summary.failed.len()
        );
        Ok(summary)
    }

    fn record(&self, outcome: &TrialOutcome) -> Result<()> {
        let Some(path) = &self.history_file else {
            return Ok(());
        };

        let recorded_at = Local::now().format("%Y-%m-%dT%H:%M:%S").to_string();
        let records: Vec<TrialRecord> = outcome
            .values
            .iter()
            .enumerate()
            .map(|(zone, &value)| TrialRecord {
                trial: outcome.trial_no,
                zone,
                value,
                manning_file: outcome.manning_file.display().to_string(),
                simfile: outcome.simfile.display().to_string(),
                status: outcome.status,
                recorded_at: recorded_at.clone(),
            })
            .collect();
        append_trial_records(path, &records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::csv::read_trial_records;
    use crate::io::netcdf::write_field;
    use crate::manning::tests::grid;
    use crate::pfs::PfsDocument;
    use crate::pfs::tests::SIMFILE;
    use crate::runner::SimulationInterrupted;
    use crate::suggest::RandomSuggester;
    use crate::trial::MANNING_SECTION;
    use anyhow::bail;
    use tempfile::{TempDir, tempdir};

    fn model_dir() -> (TempDir, PathBuf, PathBuf) {
        let dir = tempdir().unwrap();
        let simfile = dir.path().join("sim.m21fm");
        let manning = dir.path().join("manning.nc");
        std::fs::write(&simfile, SIMFILE).unwrap();
        write_field(&manning, &grid(vec![1.0, 1.0, 2.0, 3.0, 3.0, 3.0], 2, 3)).unwrap();
        (dir, simfile, manning)
    }

    #[test]
    fn test_run_trials_without_engine() {
        let (dir, simfile, manning) = model_dir();
        let mut calibration = Calibration::new(&simfile, &manning, "manning").unwrap();
        assert_eq!(calibration.zones().len(), 3);

        let mut suggester = RandomSuggester::new(Some(1));
        let summary = calibration
            .run_trials(1, 3, &mut suggester, None)
            .unwrap();

        assert_eq!(summary.completed.len(), 3);
        assert!(summary.failed.is_empty());
        assert!(
            summary
                .completed
                .iter()
                .all(|o| o.status == TrialStatus::Prepared && o.values.len() == 3)
        );
        assert_eq!(calibration.simfile(), dir.path().join("sim_trial_3.m21fm"));
        assert_eq!(calibration.manning_file(), dir.path().join("manning_trial_3.nc"));

        // The last simfile points at the last roughness file
        let pfs = PfsDocument::read(calibration.simfile()).unwrap();
        let file_name = pfs.section(MANNING_SECTION).unwrap().keyword("file_name").unwrap();
        assert!(file_name.contains("manning_trial_3.nc"));

        // Each trial's field holds exactly its suggested values
        let last = &summary.completed[2];
        let field = read_field(&last.manning_file, "manning").unwrap();
        let v = &last.values;
        assert_eq!(field.values, vec![v[0], v[0], v[1], v[2], v[2], v[2]]);
    }

    #[test]
    fn test_failed_trial_is_skipped() {
        let (dir, simfile, manning) = model_dir();
        let history = dir.path().join("trials.csv");
        let mut calibration = Calibration::new(&simfile, &manning, "manning")
            .unwrap()
            .with_history(&history);

        let mut engine = |path: &Path| -> Result<()> {
            if path.to_string_lossy().contains("_trial_2") {
                bail!("Simulation exited with exit status: 1");
            }
            Ok(())
        };
        let mut suggester = RandomSuggester::new(Some(2));
        let summary = calibration
            .run_trials(1, 3, &mut suggester, Some(&mut engine))
            .unwrap();

        assert_eq!(summary.failed, vec![2]);
        assert_eq!(
            summary.completed.iter().map(|o| o.trial_no).collect::<Vec<_>>(),
            vec![1, 3]
        );

        let records = read_trial_records(&history).unwrap();
        assert_eq!(records.len(), 9);
        assert!(
            records
                .iter()
                .filter(|r| r.trial == 2)
                .all(|r| r.status == TrialStatus::Failed)
        );
        assert!(
            records
                .iter()
                .filter(|r| r.trial != 2)
                .all(|r| r.status == TrialStatus::Completed)
        );
    }

    #[test]
    fn test_interruption_stops_calibration() {
        let (dir, simfile, manning) = model_dir();
        let history = dir.path().join("trials.csv");
        let mut calibration = Calibration::new(&simfile, &manning, "manning")
            .unwrap()
            .with_history(&history);

        let mut calls = 0;
        let mut engine = |_: &Path| -> Result<()> {
            calls += 1;
            Err(SimulationInterrupted.into())
        };
        let mut suggester = RandomSuggester::new(Some(3));
        let err = calibration
            .run_trials(1, 5, &mut suggester, Some(&mut engine))
            .unwrap_err();

        assert!(is_interrupted(&err));
        assert_eq!(calls, 1);
        let records = read_trial_records(&history).unwrap();
        assert!(records.iter().all(|r| r.status == TrialStatus::Interrupted));
        assert!(!dir.path().join("manning_trial_2.nc").exists());
    }

    #[test]
    fn test_interruption_survives_history_failure() {
        let (dir, simfile, manning) = model_dir();
        // A directory can't be appended to
        let mut calibration = Calibration::new(&simfile, &manning, "manning")
            .unwrap()
            .with_history(dir.path());

        let mut calls = 0;
        let mut engine = |_: &Path| -> Result<()> {
            calls += 1;
            Err(SimulationInterrupted.into())
        };
        let mut suggester = RandomSuggester::new(Some(4));
        let err = calibration
            .run_trials(1, 3, &mut suggester, Some(&mut engine))
            .unwrap_err();

        assert!(is_interrupted(&err));
        assert_eq!(calls, 1);
    }

    #[test]
    fn test_history_failure_fails_trial() {
        let (dir, simfile, manning) = model_dir();
        let mut calibration = Calibration::new(&simfile, &manning, "manning")
            .unwrap()
            .with_history(dir.path());

        let mut engine = |_: &Path| -> Result<()> { Ok(()) };
        let mut suggester = RandomSuggester::new(Some(5));
        let summary = calibration
            .run_trials(1, 2, &mut suggester, Some(&mut engine))
            .unwrap();

        assert_eq!(summary.failed, vec![1, 2]);
    }

    #[test]
    fn test_trial_numbers_at_upper_limit() {
        let (_dir, simfile, manning) = model_dir();
        let mut calibration = Calibration::new(&simfile, &manning, "manning").unwrap();
        let mut suggester = RandomSuggester::new(Some(6));

        assert!(
            calibration
                .run_trials(u32::MAX, 2, &mut suggester, None)
                .is_err()
        );
        assert!(!calibration.simfile().to_string_lossy().contains("_trial_"));

        let summary = calibration
            .run_trials(u32::MAX, 1, &mut suggester, None)
            .unwrap();
        assert_eq!(summary.completed[0].trial_no, u32::MAX);
    }

    #[test]
    fn test_new_with_unreadable_manning_file() {
        let dir = tempdir().unwrap();
        let err = Calibration::new(
            &dir.path().join("sim.m21fm"),
            &dir.path().join("missing.nc"),
            "manning",
        );
        assert!(err.is_err());
    }
}
