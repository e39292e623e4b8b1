use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const SETTINGS_FILE_NAME: &str = "manning_tune.toml";

/// Placeholder in `engine_command` replaced by the simulation file path
pub const SIMFILE_PLACEHOLDER: &str = "{simfile}";

// Program settings read from manning_tune.toml
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct Settings {
    pub log_level: String,
    /// Shell command starting the engine, e.g. `FemEngineHD.exe "{simfile}"`
    pub engine_command: String,
    /// Name of the roughness variable in the field file
    pub item_name: String,
    pub seed: Option<u64>,
    pub output_dir: PathBuf,
    pub plot: PlotSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            log_level: "info".to_string(),
            engine_command: format!("FemEngineHD \"{SIMFILE_PLACEHOLDER}\""),
            item_name: "manning".to_string(),
            seed: None,
            output_dir: PathBuf::from("."),
            plot: PlotSettings::default(),
        }
    }
}

// Map layout for the zone plot
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct PlotSettings {
    pub dpi: u32,
    /// Figure size in inches (width, height)
    pub figure_size: (f64, f64),
    /// Longitude range shown (min, max)
    pub lon_range: (f64, f64),
    /// Latitude range shown (min, max)
    pub lat_range: (f64, f64),
    /// Longitude gridlines (start, stop, step), stop exclusive
    pub lon_ticks: (f64, f64, f64),
    /// Latitude gridlines (start, stop, step), stop exclusive
    pub lat_ticks: (f64, f64, f64),
}

impl Default for PlotSettings {
    fn default() -> Self {
        PlotSettings {
            dpi: 300,
            figure_size: (11.0, 8.5),
            lon_range: (-3.0, 9.2),
            lat_range: (49.2, 56.3),
            lon_ticks: (-2.0, 10.0, 2.0),
            lat_ticks: (50.0, 57.0, 1.0),
        }
    }
}

impl Settings {
    /// Read settings from `path`, falling back to defaults if the file doesn't exist
    pub fn load_from_path(path: &Path) -> Result<Settings> {
        if !path.is_file() {
            return Ok(Settings::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {:?}", path))?;
        toml::from_str(&content)
            .with_context(|| format!("Could not parse settings file: {:?}", path))
    }

    /// Fill the engine command template for a given simulation file
    pub fn engine_command_for(&self, simfile: &Path) -> String {
        self.engine_command
            .replace(SIMFILE_PLACEHOLDER, &simfile.display().to_string())
    }
}
