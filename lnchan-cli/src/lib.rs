//! The `lnchan` command line surface over a channel snapshot

pub mod commands;
pub mod format;
pub mod snapshot;
