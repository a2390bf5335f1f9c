//! Data model, canonical digesting, error taxonomy, and boundary traits
//! shared by every other crate in the workspace.

pub mod boundary;
pub mod config;
pub mod digest;
pub mod error;
pub mod model;

pub use config::EngineConfig;
pub use error::{ErrorKind, LoglensError, Result};
