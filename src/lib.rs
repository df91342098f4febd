//! procgraph library

pub mod cli;
mod client;
mod config;
mod local_logger;
pub mod logger;
mod prelude;
mod process;
mod snapshot;

pub use local_logger::clean_logger;
