//! Infrastructure adapters and runtime bootstrap.

pub mod error;
pub mod telemetry;
pub mod timing;
