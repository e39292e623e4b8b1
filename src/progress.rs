use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use log::warn;

/// Substring marking an engine output line that carries the current time step
pub const TIME_STEP_MARKER: &str = "Time step:";

/// Something that can be told the run advanced by a number of time steps
pub trait Progress {
    fn advance(&mut self, steps: u64);
}

impl Progress for ProgressBar {
    fn advance(&mut self, steps: u64) {
        self.inc(steps);
    }
}

/// Discards all progress updates
pub struct NoProgress;

impl Progress for NoProgress {
    fn advance(&mut self, _steps: u64) {}
}

const BAR_TEMPLATE: &str =
    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} steps ({eta})";

// Console bar for an engine run of `total` time steps
pub fn simulation_progress_bar(total: u64) -> Result<ProgressBar> {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template(BAR_TEMPLATE)?
            .progress_chars("#>-"),
    );
    Ok(pb)
}

/// What a single line of engine output did to the progress count
#[derive(Debug, Clone, PartialEq)]
pub enum LineOutcome {
    /// No time step marker on the line
    Ignored,
    /// Counter moved forward by this many steps
    Advanced(u64),
    /// Marker found but the step was not beyond the highest seen
    Unchanged,
    /// Marker found but the value after it is not an integer
    Unparseable(String),
}

/// Turns engine output lines into progress deltas
#[derive(Debug, Default)]
pub struct ProgressTracker {
    last_step: u64,
}

impl ProgressTracker {
    pub fn new() -> Self {
        ProgressTracker::default()
    }

    /// Highest time step reported so far
    pub fn last_step(&self) -> u64 {
        self.last_step
    }

    /// Classify a line and update the highest step seen
    pub fn observe(&mut self, line: &str) -> LineOutcome {
        if !line.contains(TIME_STEP_MARKER) {
            return LineOutcome::Ignored;
        }

        // The step is the text between the first and second colon
        let field = line.split(':').nth(1).unwrap_or_default().trim();
        match field.parse::<u64>() {
            Ok(step) if step > self.last_step => {
                let delta = step - self.last_step;
                self.last_step = step;
                LineOutcome::Advanced(delta)
            }
            Ok(_) => LineOutcome::Unchanged,
            Err(e) => LineOutcome::Unparseable(e.to_string()),
        }
    }

    /// Observe a line and forward any advance to `progress`
    pub fn feed(&mut self, line: &str, progress: &mut dyn Progress) -> LineOutcome {
        let outcome = self.observe(line);
        match &outcome {
            LineOutcome::Advanced(delta) => progress.advance(*delta),
            LineOutcome::Unparseable(reason) => {
                warn!(
                    "Failed to parse timestep from line: {} ({})",
                    line.trim(),
                    reason
                );
            }
            LineOutcome::Ignored | LineOutcome::Unchanged => {}
        }
        outcome
    }
}
