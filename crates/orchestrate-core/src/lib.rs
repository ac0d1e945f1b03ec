pub mod builder;
pub mod cancel;
pub mod cluster;
pub mod component;
pub mod config;
pub mod error;
pub mod io;
pub mod orchestrator;
pub mod paths;
pub mod plan;
pub mod publisher;
pub mod tool;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use error::{OrchestrateError, Result};
