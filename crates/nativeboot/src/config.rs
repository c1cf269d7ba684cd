//! Loader configuration
//!
//! The ordered module list, the quiet allow-list, and the filesystem
//! locations the loader uses. Usually read from a TOML file shipped with the
//! application:
//!
//! ```toml
//! quiet = ["libgnustl_shared"]
//!
//! [[modules]]
//! name = "libgnustl_shared"
//! required = false
//!
//! [[modules]]
//! name = "libqi"
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

/// Errors that can occur while reading a loader configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read config file
    #[error("Failed to read loader config: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse TOML
    #[error("Failed to parse loader config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Validation error
    #[error("Invalid loader config: {0}")]
    Validation(String),
}

/// One native module in the load sequence
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModuleSpec {
    /// Logical module name, e.g. "libqi"
    pub name: String,

    /// A failed required module aborts the sequence; an optional one is
    /// skipped over
    #[serde(default = "default_required")]
    pub required: bool,
}

fn default_required() -> bool {
    true
}

impl ModuleSpec {
    pub fn required(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: true,
        }
    }

    pub fn optional(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            required: false,
        }
    }
}

/// Loader configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Modules whose unresolved failure is logged at debug instead of warn
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub quiet: Vec<String>,

    /// Where embedded artifacts are extracted (defaults to the system temp dir)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temp_dir: Option<PathBuf>,

    /// Directories searched before the host's default library search
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub search_paths: Vec<PathBuf>,

    /// Modules in load order, most foundational first
    #[serde(default)]
    pub modules: Vec<ModuleSpec>,
}

impl LoaderConfig {
    /// Create an empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a configuration file
    ///
    /// # Arguments
    /// * `path` - Path to the TOML file
    ///
    /// # Returns
    /// * `Ok(LoaderConfig)` - Parsed configuration
    /// * `Err(ConfigError)` - Read, parse, or validation failure
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        text.parse()
    }

    /// Append a required module
    pub fn module(mut self, name: impl Into<String>) -> Self {
        self.modules.push(ModuleSpec::required(name));
        self
    }

    /// Append a best-effort module
    pub fn optional_module(mut self, name: impl Into<String>) -> Self {
        self.modules.push(ModuleSpec::optional(name));
        self
    }

    /// Add a name to the quiet allow-list
    pub fn quiet(mut self, name: impl Into<String>) -> Self {
        self.quiet.push(name.into());
        self
    }

    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    pub fn search_path(mut self, dir: impl Into<PathBuf>) -> Self {
        self.search_paths.push(dir.into());
        self
    }

    /// Whether an unresolved failure of `module` should stay out of warnings
    pub fn is_quiet(&self, module: &str) -> bool {
        self.quiet.iter().any(|q| q == module)
    }

    /// Extraction directory in effect
    pub fn extraction_dir(&self) -> PathBuf {
        self.temp_dir.clone().unwrap_or_else(std::env::temp_dir)
    }

    /// Check module names: non-empty, no path separators, no duplicates
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for spec in &self.modules {
            validate_module_name(&spec.name)?;
            if !seen.insert(spec.name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "module listed twice: {}",
                    spec.name
                )));
            }
        }
        Ok(())
    }
}

impl FromStr for LoaderConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: LoaderConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}

/// A module name becomes a file name and a bundle path, so it must be a
/// single plain path component.
pub fn validate_module_name(name: &str) -> Result<(), ConfigError> {
    if name.is_empty() {
        return Err(ConfigError::Validation("empty module name".to_string()));
    }
    if name.contains(['/', '\\', '\0']) || name == "." || name == ".." {
        return Err(ConfigError::Validation(format!(
            "module name is not a plain file name: {:?}",
            name
        )));
    }
    Ok(())
}
