//! Mention detection, notification fan-out and a coherent local cache layer
//! for a team chat server.
//!
//! Storage, directories and the cluster bus are consumed through the traits in
//! [`application::repos`]; everything else lives here.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
pub(crate) mod util;
