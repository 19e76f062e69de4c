pub mod cell;
pub use cell::*;

pub mod config;
pub use config::*;

pub mod trajectory;
pub use trajectory::*;

pub mod error;
pub use error::*;

pub type Timestamp = f64;
