//! CLI plumbing for the `rvn` binary

pub mod commands;
