//! Application services: notification fan-out, email digests and the busy flag.

pub mod batching;
pub mod busy;
pub mod error;
pub mod notifications;
pub mod repos;
