//! Subcommand implementations.

pub mod config;
pub mod mount;
pub mod mounts;
