//! Lumen core - logging, command-line and collection utilities shared by every Lumen crate.

pub mod cli;
pub mod collections;
pub mod log;
