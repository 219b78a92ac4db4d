//! # Configuration Module
//!
//! Handles loading kestrel configuration from `kestrel.toml`. The configuration
//! is built once per invocation and passed by reference to the components that
//! need it; there is no global instance.
//!
//! ## Config File Location
//!
//! 1. If `KESTREL_CONFIG` environment variable is set, load from that path
//! 2. Otherwise, load from `kestrel.toml` in the current directory
//!
//! A missing `kestrel.toml` yields the defaults. A missing file named explicitly
//! is an error.
//!
//! ## Configuration Structure
//!
//! ```toml
//! grep = "*.spec.rs"
//! reporter = "spec"
//! paths = ["specs", "tests/specs"]
//! focus = "^Stack"
//! skip = "slow"
//! fail_on_empty = true
//! color = "never"
//! ```
//!
//! Command line options override the file.

use serde::Deserialize;
use std::{
    io::{self, Read},
    path::{Path, PathBuf},
};
use tracing::*;

use crate::{Error, Result};

/// Environment variable name for specifying the config file path.
pub const KESTREL_CONFIG_ENV: &str = "KESTREL_CONFIG";

const DEFAULT_CONFIG_FILE: &str = "kestrel.toml";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, strum::EnumString, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Color {
    #[default]
    Auto,
    Always,
    Never,
}

/// kestrel's configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Glob matched against base names of files under `paths`.
    pub grep: String,
    /// Name of the reporter to use.
    pub reporter: String,
    /// Root paths scanned for spec files.
    pub paths: Vec<PathBuf>,
    /// Only run tests whose full title matches this regular expression.
    pub focus: Option<String>,
    /// Skip tests whose full title matches this regular expression.
    pub skip: Option<String>,
    /// Treat a run without any test as a failure.
    pub fail_on_empty: bool,
    pub color: Color,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            grep: "*.spec.rs".to_string(),
            reporter: "dot".to_string(),
            paths: vec![PathBuf::from("specs")],
            focus: None,
            skip: None,
            fail_on_empty: false,
            color: Color::Auto,
        }
    }
}

impl Config {
    /// Load kestrel configuration from path. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Config> {
        let mut file = match std::fs::File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("{} not found, using default configuration", path.display());
                return Ok(Config::default());
            }
            Err(e) => {
                return Err(Error::LoadConfig(format!(
                    "failed to open {}: {e}",
                    path.display()
                )))
            }
        };

        let mut buf = String::new();
        file.read_to_string(&mut buf)
            .map_err(|e| Error::LoadConfig(e.to_string()))?;

        let cfg: Config = toml::from_str(&buf).map_err(|e| {
            Error::LoadConfig(format!(
                "failed to deserialize {} into kestrel::Config: {e}",
                path.display()
            ))
        })?;

        debug!("{} was successfully loaded: {cfg:#?}", path.display());

        Ok(cfg)
    }

    /// Load configuration from a file the user named explicitly.
    pub fn load_explicit(path: &Path) -> Result<Config> {
        if !path.exists() {
            return Err(Error::LoadConfig(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        Config::load_from(path)
    }

    /// Load kestrel configuration.
    ///
    /// Loading order:
    /// 1. If `KESTREL_CONFIG` env var is set, load from that path
    /// 2. Otherwise, load from `kestrel.toml` in the current directory
    pub fn load() -> Result<Config> {
        let _ = dotenv::dotenv();

        match std::env::var(KESTREL_CONFIG_ENV) {
            Ok(path) => {
                debug!("loading config from {KESTREL_CONFIG_ENV}={path:?}");
                Config::load_explicit(Path::new(&path))
            }
            Err(_) => Config::load_from(Path::new(DEFAULT_CONFIG_FILE)),
        }
    }
}
