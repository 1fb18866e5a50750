//! Embedding configuration loaded from `liaison.toml`

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::logging::{self, LogConfig};

/// File name searched for by `EmbedConfig::discover`
pub const CONFIG_FILE: &str = "liaison.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmbedConfig {
    #[serde(default)]
    pub interpreter: InterpreterConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterpreterConfig {
    /// Name of the module `run` executes in
    #[serde(default = "default_main_module")]
    pub main_module: String,

    /// Directories `import` searches for script modules
    #[serde(default)]
    pub search_paths: Vec<PathBuf>,

    #[serde(default = "default_script_extension")]
    pub script_extension: String,

    #[serde(default = "default_max_call_depth")]
    pub max_call_depth: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,

    #[serde(default)]
    pub json: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,

    #[serde(default)]
    pub spans: bool,

    #[serde(default)]
    pub timings: bool,

    /// Install a subscriber when an `Interpreter` is built from this config
    #[serde(default)]
    pub install: bool,
}

impl Default for InterpreterConfig {
    fn default() -> Self {
        Self {
            main_module: default_main_module(),
            search_paths: Vec::new(),
            script_extension: default_script_extension(),
            max_call_depth: default_max_call_depth(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            json: false,
            file: None,
            spans: false,
            timings: false,
            install: false,
        }
    }
}

fn default_main_module() -> String { "__main__".to_string() }
fn default_script_extension() -> String { "py".to_string() }
fn default_max_call_depth() -> usize { 200 }
fn default_level() -> String { "info".to_string() }

impl EmbedConfig {
    /// Load configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::parse(&content)
    }

    /// Parse configuration from TOML string
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.interpreter.main_module.is_empty() {
            return Err(Error::Config("main_module must not be empty".to_string()));
        }
        if self.interpreter.max_call_depth == 0 {
            return Err(Error::Config("max_call_depth must be at least 1".to_string()));
        }
        if logging::parse_level(&self.logging.level).is_none() {
            return Err(Error::Config(format!(
                "unknown log level '{}'",
                self.logging.level
            )));
        }
        Ok(())
    }

    /// Find and load `liaison.toml` from the current directory or its parents
    pub fn discover() -> Self {
        let mut current = std::env::current_dir().ok();

        while let Some(dir) = current {
            let config_path = dir.join(CONFIG_FILE);
            if config_path.exists() {
                if let Ok(config) = Self::load(&config_path) {
                    return config;
                }
            }
            current = dir.parent().map(|p| p.to_path_buf());
        }

        Self::default()
    }

    /// Logging settings in the form `logging::init_with_config` takes
    pub fn to_log_config(&self) -> LogConfig {
        LogConfig {
            level: logging::parse_level(&self.logging.level).unwrap_or(tracing::Level::INFO),
            file: self.logging.file.as_ref().map(PathBuf::from),
            json: self.logging.json,
            spans: self.logging.spans,
            timings: self.logging.timings,
        }
    }

    /// Generate default configuration file content
    pub fn generate_default() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate config"))
    }
}
