//! Infrastructure adapters and runtime bootstrap.

pub mod assets;
pub mod download;
pub mod error;
pub mod telemetry;
