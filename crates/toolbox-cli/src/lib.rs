//! k8s diagnostics toolbox CLI library.
//!
//! Argument parsing, tool descriptions and the handlers that print results.

pub mod cli;
pub mod commands;
pub mod desc;
