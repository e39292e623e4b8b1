//! Files produced for each calibration trial.
//!
//! Trial `n` derives its file names from the previous trial's files by swapping the
//! `_trial_<n-1>` marker in the file stem for `_trial_<n>`, or appending `_trial_<n>` when the
//! stem has no marker yet.
use crate::io::netcdf::{read_field, write_field};
use crate::pfs::{PfsDocument, PfsValue};
use crate::zones::Zone;
use anyhow::{Context, Result};
use log::info;
use std::path::{Path, PathBuf};

const TRIAL_MARKER: &str = "_trial_";

/// Section of the simulation file holding the roughness map reference
pub const MANNING_SECTION: &str = "HD/BED_RESISTANCE/MANNING_NUMBER";

/// Section of the simulation file holding the time axis
pub const TIME_SECTION: &str = "FemEngineHD/TIME";

/// Item number the engine reads from the roughness file
const MANNING_ITEM_NUMBER: i64 = 1;

// Stem with its trailing trial marker (if any) set to `trial_no`
fn trial_stem(stem: &str, trial_no: u32) -> String {
    if let Some(pos) = stem.rfind(TRIAL_MARKER) {
        let digits = &stem[pos + TRIAL_MARKER.len()..];
        if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
            return format!("{}{}{}", &stem[..pos], TRIAL_MARKER, trial_no);
        }
    }
    format!("{}{}{}", stem, TRIAL_MARKER, trial_no)
}

/// Path of the file for trial `trial_no`, derived from `path`.
///
/// Only the file stem changes; the directory and extension are kept.
pub fn trial_path(path: &Path, trial_no: u32) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut file_name = trial_stem(&stem, trial_no);
    if let Some(ext) = path.extension() {
        file_name.push('.');
        file_name.push_str(&ext.to_string_lossy());
    }
    path.with_file_name(file_name)
}

/// Number of time steps the simulation file asks the engine to run
pub fn read_num_timesteps(simfile: &Path) -> Result<u64> {
    let pfs = PfsDocument::read(simfile)?;
    let steps = pfs
        .section(TIME_SECTION)
        .and_then(|time| time.get_int("number_of_time_steps"))
        .with_context(|| format!("Failed to read number of time steps from {:?}", simfile))?;
    u64::try_from(steps)
        .with_context(|| format!("Negative number of time steps in {:?}: {}", simfile, steps))
}

/// Write the roughness field for trial `trial_no` with each zone set to its new value.
///
/// Returns the path of the new file.
pub fn create_new_manning_file(
    trial_no: u32,
    manning_file: &Path,
    item_name: &str,
    zones: &[Zone],
    new_values: &[f64],
) -> Result<PathBuf> {
    let mut field = read_field(manning_file, item_name)?;
    field.assign_zones(zones, new_values)?;

    let new_manning_file = trial_path(manning_file, trial_no);
    write_field(&new_manning_file, &field).context("Failed to write new manning file")?;

    info!("Wrote {:?}", new_manning_file);
    Ok(new_manning_file)
}

/// Write the simulation file for trial `trial_no`, pointing it at `manning_file`.
///
/// Returns the path of the new file.
pub fn create_new_simfile(
    trial_no: u32,
    simfile: &Path,
    manning_file: &Path,
    item_name: &str,
) -> Result<PathBuf> {
    let mut pfs = PfsDocument::read(simfile)?;

    let manning_path = std::path::absolute(manning_file)
        .with_context(|| format!("Could not resolve {:?}", manning_file))?;
    let section = pfs
        .section_mut(MANNING_SECTION)
        .context("Error updating simfile")?;
    section.set_keyword("file_name", PfsValue::File(manning_path));
    section.set_keyword("item_number", PfsValue::Int(MANNING_ITEM_NUMBER));
    section.set_keyword("item_name", PfsValue::Str(item_name.to_string()));

    let new_simfile = trial_path(simfile, trial_no);
    pfs.write(&new_simfile)
        .context("Failed to write new simulation file")?;

    info!("Wrote {:?}", new_simfile);
    Ok(new_simfile)
}
