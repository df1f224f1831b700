use serde::{Deserialize, Serialize};

use crate::postprocess::Profile;

/// Spacing of the auto-generated dimensionless time grid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeScale {
    /// Uniform in √τ. Default: early transients are sharp and this spends
    /// more points where the solution changes fastest.
    Sqrt,
    Linear,
}

impl Default for TimeScale {
    fn default() -> Self {
        TimeScale::Sqrt
    }
}

/// Per-run knobs, with a hand-written `Default` impl so every default value
/// is visible in one place.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RunOptions {
    /// Simulation end time \[s\]; `None` means `2 * medium.contact_time`.
    pub t_end: Option<f64>,
    /// Auto-generate the evaluation time grid instead of requiring the
    /// caller to supply one.
    pub autotime: bool,
    pub timescale: TimeScale,
    /// Number of evaluation points when `autotime` is set.
    pub n_out: usize,
    pub rel_tol: f64,
    pub abs_tol: f64,
    /// Step-count budget handed to the integrator; exceeding it raises
    /// `MigrationError::BudgetExceeded` rather than running forever on a
    /// pathologically stiff configuration.
    pub max_steps: usize,
    /// Target total mesh cell count.
    pub n_cells: usize,
    /// Minimum cell count per layer.
    pub n_cells_min: usize,
    /// A caller-supplied time grid \[s\], used when `autotime` is false.
    pub t_eval: Option<Vec<f64>>,
    /// Initial cell-concentration profile, interpolated onto the new mesh;
    /// used by `resume`/`contact` to seed a continuation run.
    #[serde(skip)]
    pub prev_profile: Option<Profile>,
    pub name: String,
    pub description: String,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            t_end: None,
            autotime: true,
            timescale: TimeScale::default(),
            n_out: 1000,
            rel_tol: 1e-6,
            abs_tol: 1e-6,
            max_steps: 200_000,
            n_cells: 600,
            n_cells_min: 20,
            t_eval: None,
            prev_profile: None,
            name: String::new(),
            description: String::new(),
        }
    }
}
