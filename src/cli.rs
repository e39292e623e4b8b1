use crate::calibrate::Calibration;
use crate::config::{SETTINGS_FILE_NAME, Settings};
use crate::io::csv::TRIAL_HISTORY_FILE_NAME;
use crate::io::netcdf::read_field;
use crate::plot::plot_zones;
use crate::process::SystemProcessTable;
use crate::runner::SimulationRunner;
use crate::suggest::RandomSuggester;
use crate::trial::read_num_timesteps;
use crate::zones::find_zones;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// Run hydrodynamic simulations and tune Manning roughness zones
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Settings file
    #[arg(short, long, default_value = SETTINGS_FILE_NAME)]
    pub settings: PathBuf,

    /// Name of the roughness variable in field files
    #[arg(long)]
    pub item_name: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the engine on a simulation file, showing progress
    Run {
        simfile: PathBuf,
        /// Shell command to run instead of the configured engine command
        #[arg(long)]
        command: Option<String>,
    },
    /// List the roughness zones of a field file
    Zones { manning_file: PathBuf },
    /// Run calibration trials on a simulation file and its roughness field
    Calibrate {
        simfile: PathBuf,
        manning_file: PathBuf,
        /// Number of trials to run
        #[arg(short, long, default_value_t = 1)]
        trials: u32,
        /// Number of the first trial
        #[arg(long, default_value_t = 1)]
        first: u32,
        /// Seed for value suggestions
        #[arg(long)]
        seed: Option<u64>,
        /// Only write the trial files, don't run the engine
        #[arg(long)]
        no_run: bool,
    },
    /// Draw a map of the roughness zones
    Plot {
        manning_file: PathBuf,
        /// Image file to write
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

impl Args {
    /// Settings with command line overrides applied
    pub fn load_settings(&self) -> Result<Settings> {
        let mut settings = Settings::load_from_path(&self.settings)?;
        if let Some(item_name) = &self.item_name {
            settings.item_name = item_name.clone();
        }
        if let Commands::Calibrate { seed: Some(seed), .. } = &self.command {
            settings.seed = Some(*seed);
        }
        Ok(settings)
    }
}

pub fn get_args() -> Args {
    Args::parse()
}

/// Execute the chosen command
pub fn execute(command: Commands, settings: &Settings, interrupt: Arc<AtomicBool>) -> Result<()> {
    match command {
        Commands::Run { simfile, command } => {
            let command = command.unwrap_or_else(|| settings.engine_command_for(&simfile));
            let timesteps = read_num_timesteps(&simfile)?;
            let mut runner = SimulationRunner::new(interrupt, Box::new(SystemProcessTable::new()));
            runner.run(&command, timesteps)
        }
        Commands::Zones { manning_file } => print_zones(&manning_file, settings),
        Commands::Calibrate {
            simfile,
            manning_file,
            trials,
            first,
            no_run,
            ..
        } => {
            std::fs::create_dir_all(&settings.output_dir).with_context(|| {
                format!("Failed to create output directory: {:?}", settings.output_dir)
            })?;
            let history = settings.output_dir.join(TRIAL_HISTORY_FILE_NAME);
            let mut calibration = Calibration::new(&simfile, &manning_file, &settings.item_name)?
                .with_history(&history);
            let mut suggester = RandomSuggester::new(settings.seed);

            let summary = if no_run {
                calibration.run_trials(first, trials, &mut suggester, None)?
            } else {
                let mut runner =
                    SimulationRunner::new(interrupt, Box::new(SystemProcessTable::new()));
                let mut engine = |simfile: &Path| -> Result<()> {
                    let timesteps = read_num_timesteps(simfile)?;
                    runner.run(&settings.engine_command_for(simfile), timesteps)
                };
                calibration.run_trials(first, trials, &mut suggester, Some(&mut engine))?
            };

            println!("\nTrial summary:");
            for outcome in &summary.completed {
                println!(
                    "  Trial {}: {:?} ({})",
                    outcome.trial_no,
                    outcome.status,
                    outcome.simfile.display()
                );
            }
            for trial_no in &summary.failed {
                println!("  Trial {}: failed", trial_no);
            }
            info!("Trial history written to {:?}", history);
            Ok(())
        }
        Commands::Plot {
            manning_file,
            output,
        } => {
            let field = read_field(&manning_file, &settings.item_name)?;
            plot_zones(&field, &settings.plot, output.as_deref())?;
            Ok(())
        }
    }
}

fn print_zones(manning_file: &Path, settings: &Settings) -> Result<()> {
    let field = read_field(manning_file, &settings.item_name)?;
    let zones = find_zones(&field);

    println!("{} zones in {}", zones.len(), manning_file.display());
    println!("  {:>5}  {:>12}  {:>8}", "zone", "value", "cells");
    for (i, zone) in zones.iter().enumerate() {
        println!("  {:>5}  {:>12.4}  {:>8}", i, zone.value, zone.indices.len());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_calibrate() {
        let args = Args::try_parse_from([
            "manning_tune",
            "--item-name",
            "roughness",
            "calibrate",
            "sim.m21fm",
            "manning.nc",
            "--trials",
            "5",
            "--seed",
            "9",
            "--no-run",
        ])
        .unwrap();

        match &args.command {
            Commands::Calibrate {
                trials,
                first,
                no_run,
                ..
            } => {
                assert_eq!(*trials, 5);
                assert_eq!(*first, 1);
                assert!(*no_run);
            }
            other => panic!("unexpected command {:?}", other),
        }

        let settings = Args {
            settings: PathBuf::from("does/not/exist.toml"),
            ..args
        }
        .load_settings()
        .unwrap();
        assert_eq!(settings.item_name, "roughness");
        assert_eq!(settings.seed, Some(9));
    }

    #[test]
    fn test_parse_run_with_command() {
        let args =
            Args::try_parse_from(["manning_tune", "run", "sim.m21fm", "--command", "echo hi"])
                .unwrap();
        assert!(matches!(
            args.command,
            Commands::Run { command: Some(ref c), .. } if c == "echo hi"
        ));
        assert_eq!(args.settings, PathBuf::from(SETTINGS_FILE_NAME));
    }
}
