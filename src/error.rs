//! Precondition failures raised by the simulation core.

/// Errors returned when a caller violates an input precondition.
///
/// These are never recovered internally: numeric degeneracies are clamped
/// instead, and physical shortfalls are reported through KPIs.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SimError {
    #[error("series length mismatch: pv has {pv} samples, base load has {base_load}")]
    SeriesLengthMismatch { pv: usize, base_load: usize },
    #[error("available power must be >= 0, got {0} kW")]
    NegativeAvailable(f64),
    #[error("step size must be a positive number of seconds, got {0}")]
    InvalidStepSize(f64),
    #[error("forecast must cover {expected} days of 24 hourly samples: {detail}")]
    ForecastShape { expected: usize, detail: String },
}
