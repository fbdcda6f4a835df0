//! Command handlers for the relay CLI.

pub mod serve;

pub use serve::ServeCommand;
