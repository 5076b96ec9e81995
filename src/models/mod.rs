//! Data Models
//!
//! Configuration structures shared by the services and the binary.

pub mod settings;

pub use settings::*;
