//! Relay Common - Configuration, validation and logging shared by the chat relay.
//!
//! This crate provides:
//! - Configuration types and loading (JSON file + environment overrides)
//! - Configuration validation
//! - Logging setup

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod logging;
pub mod validation;

pub use config::{
    Config, ObservabilityConfig, PurgeConfig, ServerConfig, StoreConfig, UpstreamConfig,
};
pub use logging::{init_logging, LogFormat};
pub use validation::{Validate, ValidationError, ValidationResult};
