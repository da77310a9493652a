//! Configuration system for AKF.
//!
//! Provides TOML-based configuration with:
//! - Guest agent settings (`[agent]`): bind address, broker port, launch timeout
//! - Host-side connection settings (`[client]`): retry cadence and deadline
//! - Extra capability workers (`[capabilities.<Name>]`) launched as commands
//! - Config file layering (user config dir + project-local `akf.toml`)

pub mod discovery;
pub mod error;
pub mod types;

pub use discovery::{
    ConfigSource, Layer, LoadedConfig, load_config, load_config_file, load_config_with_options, user_config_dir,
    user_config_path,
};
pub use error::{ConfigError, Result};
pub use types::*;
