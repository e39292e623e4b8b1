use crate::zones::Zone;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Lowest Manning value suggested for a zone
pub const MANNING_LOW: f64 = 0.001;

/// Highest Manning value suggested for a zone
pub const MANNING_HIGH: f64 = 81.101;

/// Spacing of the grid of suggested values
pub const MANNING_STEP: f64 = 0.01;

/// Source of parameter values for a trial
pub trait Suggester {
    /// A value in `[low, high]` of the form `low + k * step`
    fn suggest_float(&mut self, name: &str, low: f64, high: f64, step: f64) -> f64;
}

/// Uniform random search over the value grid
pub struct RandomSuggester {
    rng: StdRng,
}

impl RandomSuggester {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        RandomSuggester { rng }
    }
}

/// Number of grid steps between `low` and `high`
fn grid_steps(low: f64, high: f64, step: f64) -> u64 {
    // Nudge so that an exact multiple isn't lost to rounding
    ((high - low) / step + 1e-9).floor().max(0.0) as u64
}

/// Value `k` steps above `low`, rounded to remove accumulated error
fn grid_value(low: f64, step: f64, k: u64) -> f64 {
    let value = low + k as f64 * step;
    (value * 1e9).round() / 1e9
}

impl Suggester for RandomSuggester {
    fn suggest_float(&mut self, _name: &str, low: f64, high: f64, step: f64) -> f64 {
        let k = self.rng.gen_range(0..=grid_steps(low, high, step));
        grid_value(low, step, k)
    }
}

/// Label under which the value for a zone is suggested
pub fn zone_label(index: usize) -> String {
    format!("Manning zone {}", index)
}

/// One suggested Manning value per zone, in zone order
pub fn suggest_new_manning(suggester: &mut dyn Suggester, zones: &[Zone]) -> Vec<f64> {
    (0..zones.len())
        .map(|i| suggester.suggest_float(&zone_label(i), MANNING_LOW, MANNING_HIGH, MANNING_STEP))
        .collect()
}
