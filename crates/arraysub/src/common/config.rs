use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::common::error::ArraySubError;
use crate::submit::concurrency::is_valid_safety_factor;
use crate::submit::scheduler::IndexMode;

pub const DEFAULT_CONCURRENCY: u32 = 100;
pub const DEFAULT_MAX_CHUNK_SIZE: u64 = 1000;
pub const DEFAULT_SAFETY_FACTOR: f64 = 0.8;
/// CPUs per task assumed when the job template does not declare `--cpus-per-task`.
pub const DEFAULT_UNITS_PER_TASK: u64 = 4;
pub const DEFAULT_MAX_BISECT_DEPTH: u32 = 24;
pub const DEFAULT_OFFSET_VARIABLE: &str = "ARRAYSUB_OFFSET";

/// Defaults of the controller, loaded from a TOML file.
/// Command line options take precedence over the values stored here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControllerConfig {
    pub default_concurrency: u32,
    pub max_chunk_size: u64,
    pub safety_factor: f64,
    pub fallback_units_per_task: u64,
    pub max_bisect_depth: u32,
    pub offset_variable: String,
    pub index_mode: IndexMode,
    pub submission_log: Option<PathBuf>,
    pub partition: Option<String>,
    pub template: Option<PathBuf>,
    pub job_name: Option<String>,
    pub sbatch_args: Vec<String>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            default_concurrency: DEFAULT_CONCURRENCY,
            max_chunk_size: DEFAULT_MAX_CHUNK_SIZE,
            safety_factor: DEFAULT_SAFETY_FACTOR,
            fallback_units_per_task: DEFAULT_UNITS_PER_TASK,
            max_bisect_depth: DEFAULT_MAX_BISECT_DEPTH,
            offset_variable: DEFAULT_OFFSET_VARIABLE.to_string(),
            index_mode: IndexMode::default(),
            submission_log: None,
            partition: None,
            template: None,
            job_name: None,
            sbatch_args: vec![],
        }
    }
}

impl ControllerConfig {
    pub fn parse(content: &str) -> crate::Result<Self> {
        let config: ControllerConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> crate::Result<()> {
        let invalid = |message: &str| Err(ArraySubError::ConfigError(message.to_string()));
        if self.default_concurrency == 0 {
            return invalid("`default_concurrency` has to be at least 1");
        }
        if self.max_chunk_size == 0 {
            return invalid("`max_chunk_size` has to be at least 1");
        }
        if !is_valid_safety_factor(self.safety_factor) {
            return invalid("`safety_factor` has to be a positive number");
        }
        if self.fallback_units_per_task == 0 {
            return invalid("`fallback_units_per_task` has to be at least 1");
        }
        if self.offset_variable.is_empty()
            || !self
                .offset_variable
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return invalid("`offset_variable` has to be a valid environment variable name");
        }
        Ok(())
    }
}

pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("arraysub").join("config.toml"))
}

/// Loads the configuration from `path`, or from the default location if no path was given.
/// A missing file at the default location is not an error.
pub fn load_config(path: Option<&Path>) -> crate::Result<ControllerConfig> {
    let (path, explicit) = match path {
        Some(path) => (path.to_path_buf(), true),
        None => match default_config_path() {
            Some(path) => (path, false),
            None => return Ok(ControllerConfig::default()),
        },
    };

    match std::fs::read_to_string(&path) {
        Ok(content) => {
            log::debug!("Loading configuration from {}", path.display());
            ControllerConfig::parse(&content).map_err(|error| {
                ArraySubError::ConfigError(format!("{}: {error}", path.display()))
            })
        }
        Err(error) if !explicit && error.kind() == std::io::ErrorKind::NotFound => {
            Ok(ControllerConfig::default())
        }
        Err(error) => Err(ArraySubError::ConfigError(format!(
            "Cannot read configuration file {}: {error}",
            path.display()
        ))),
    }
}
