use thiserror::Error;
use trajectory_grid::GridError;

#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FingerprintError {
    #[error("Cannot fingerprint or attack when no points are provided")]
    NoPointsProvided,

    #[error("{name} must lie in [0, 1], got {value}")]
    InvalidRatio { name: &'static str, value: f64 },

    #[error("Cannot attribute a leak without candidate parties")]
    NoParties,

    #[error("collusion needs at least {required} copies, got {provided}")]
    NotEnoughColluders { required: usize, provided: usize },

    #[error("trajectory lengths differ: expected {expected}, got {found}")]
    LengthMismatch { expected: usize, found: usize },

    #[error("invalid evaluation setup: {0}")]
    InvalidEvaluation(&'static str),

    #[error(transparent)]
    Grid(#[from] GridError),
}

pub(crate) fn check_ratio(name: &'static str, value: f64) -> Result<f64, FingerprintError> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(FingerprintError::InvalidRatio { name, value })
    }
}
