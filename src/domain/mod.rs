//! Domain layer types.

pub mod entities;
pub mod notify_props;
pub mod types;
