//! Probabilistic fingerprinting of grid trajectories, the attacks a leaking
//! party may run on its copy, and attribution of a leak back to a party.

pub mod error;
pub use error::FingerprintError;

pub mod candidates;
pub use candidates::*;

pub mod correlation;
pub use correlation::*;

pub mod sampling;
pub use sampling::*;

pub mod fingerprint;
pub use fingerprint::*;

pub mod attack;
pub use attack::*;

pub mod detection;
pub use detection::*;

pub mod evaluation;
pub use evaluation::*;

pub mod utility;
