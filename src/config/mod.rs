// src/config/mod.rs

//! Configuration loading and validation for runwarden.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk (`loader.rs`).
//! - Validate basic invariants like positive intervals and unique names (`validate.rs`).

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{load_and_validate, load_from_path, load_from_str};
pub use model::{ConfigFile, PluginConfig, RawConfigFile, ServiceSection, SubmitterConfig};
pub use validate::validate_config;
