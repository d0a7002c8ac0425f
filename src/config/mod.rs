//! Configuration loading, parsing, and validation for anatprep.
//!
//! This module handles all aspects of configuration:
//! - Schema definitions in [`schema`]
//! - File discovery and loading in [`loader`]
//! - Deep merging in [`merger`]
//! - Validation in [`validator`]
//! - Variable interpolation in [`interpolation`]
//!
//! # Example
//!
//! ```
//! use anatprep::config::{load_merged_config, validate};
//! use tempfile::TempDir;
//! use std::fs;
//!
//! let temp = TempDir::new().unwrap();
//! let config_dir = temp.path().join(".anatprep");
//! fs::create_dir_all(&config_dir).unwrap();
//! fs::write(config_dir.join("config.yml"), "settings:\n  nprocs: 4").unwrap();
//!
//! let config = load_merged_config(temp.path()).unwrap();
//! validate(&config).unwrap();
//! assert_eq!(config.settings.nprocs, Some(4));
//! ```
//!
//! # Configuration File Locations
//!
//! anatprep discovers and merges configuration in this order:
//! 1. Project config (`.anatprep/config.yml`)
//! 2. Local overrides (`.anatprep/config.local.yml`)
//!
//! An explicit `--config` file replaces discovery.

pub mod interpolation;
pub mod loader;
pub mod merger;
pub mod schema;
pub mod validator;

// Schema re-exports
pub use schema::{default_tools, AnatprepConfig, CiftiDensity, ReconMethod, RunSettings, Settings};

// Loader re-exports
pub use loader::{
    find_project_root, load_config, load_config_file, load_config_value, load_merged_config,
    parse_config, ConfigPaths, CONFIG_DIR,
};

// Merger re-exports
pub use merger::{layer_configs, overlay};

// Validator re-exports
pub use validator::{validate, validate_config, ValidationError};

// Interpolation re-exports
pub use interpolation::{
    extract_variables, has_interpolation, parse_interpolation, resolve_string,
    resolve_string_with_default, InterpolationContext, Segment,
};
