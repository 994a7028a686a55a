//! Shared infrastructure: terminal output and package locks

pub mod lock;
pub mod output;
