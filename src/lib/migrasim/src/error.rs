use serde::{Deserialize, Serialize};

/// Fatal errors raised while building or running a migration simulation.
///
/// A run either completes and returns a `MigrationResult`, or fails with one
/// of these and returns nothing — no partial state is ever handed back.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    /// Non-positive l/D/K, empty multilayer, negative concentration, or a
    /// non-positive food volume.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The integrator reported non-convergence, step-size collapse, or NaN.
    #[error("integrator failed to converge: {0}")]
    IntegratorFailure(String),

    /// A wall-clock or step-count budget was exceeded mid-integration.
    #[error("solver budget exceeded: {0}")]
    BudgetExceeded(String),

    /// `add`/`resume`/`contact` called on results with incompatible spatial
    /// or temporal support.
    #[error("cannot compose results: {0}")]
    CompositionError(String),
}

/// Non-fatal conditions, surfaced alongside a successful result rather than
/// aborting the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningKind {
    /// A user-supplied time grid was not monotone, missing 0, or missing
    /// the target contact time; it was normalized.
    InconsistentGrid,
    /// A resumed profile's spatial support did not cover the new mesh;
    /// endpoint values were clamped instead of extrapolated.
    ProfileMismatch,
}

/// A single warning message paired with its kind.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

/// Append-only buffer of warnings raised during a run, mirrored to `tracing`
/// as each one is pushed so they show up in logs even if the caller never
/// inspects the buffer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Warnings(Vec<Warning>);

impl Warnings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, kind: WarningKind, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!(kind = ?kind, "{message}");
        self.0.push(Warning { kind, message });
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_slice(&self) -> &[Warning] {
        &self.0
    }

    pub fn extend(&mut self, other: Warnings) {
        self.0.extend(other.0);
    }
}
