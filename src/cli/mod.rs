//! CLI module for the aspset510 library
//!
//! This module is only available when the "cli" feature is enabled.

mod browse;
#[path = "main.rs"]
mod main_impl;

pub use main_impl::{main, Cli, Command};
