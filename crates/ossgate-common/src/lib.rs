//! ossgate Common - Shared configuration and error types
//!
//! This crate holds the configuration model loaded by the binaries and the
//! errors raised while loading or validating it.

pub mod config;
pub mod error;

pub use config::{AccountConfig, Config, LoggingConfig, UploadDefaults, VerifierConfig};
pub use error::{Error, Result};
