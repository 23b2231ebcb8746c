//! Command implementations for the broker CLI.

pub mod config;
pub mod simulate;
