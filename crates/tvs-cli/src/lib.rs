//! Command-line front end for interference study imports.

pub mod commands;
pub mod config;
pub mod logging;
pub mod types;
