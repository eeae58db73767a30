//! # embedding-types
//!
//! Shared configuration for the local embedding workspace.
//!
//! Every other crate reads its knobs (database path, model cache directory,
//! model version, dimensionality, batch size) from [`Settings`].

pub mod config;
pub mod error;

pub use config::Settings;
pub use error::ConfigError;
