//! Bootstrap configuration loading and root folder resolution
//!
//! Two sources feed the bootstrap configuration:
//! 1. **TOML file** (`<config_dir>/exintel/exintel.toml`), optional
//! 2. **Environment / CLI** overrides applied by the caller
//!
//! A missing or unreadable TOML file is never fatal: a warning is logged and
//! compiled defaults are used.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "EXINTEL_ROOT_FOLDER";

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "exintel.db";

/// Screenshot blob directory inside the root folder
pub const SCREENSHOTS_DIR_NAME: &str = "screenshots";

/// Bootstrap configuration loaded from TOML
///
/// Every field is optional in the file; missing fields take the compiled
/// defaults below.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Root folder holding the database and screenshot blobs
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// HTTP listen address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// xAI API key (environment `XAI_API_KEY` takes priority)
    #[serde(default)]
    pub xai_api_key: Option<String>,

    /// Base URL of the OpenAI-compatible completion API
    #[serde(default = "default_xai_base_url")]
    pub xai_base_url: String,

    /// Model used for screenshot classification
    #[serde(default = "default_vision_model")]
    pub vision_model: String,

    /// Model used for the feature-status sweep
    #[serde(default = "default_text_model")]
    pub text_model: String,

    /// Bearer secret for the externally triggered sweep
    #[serde(default)]
    pub cron_secret: Option<String>,

    /// Delay between model calls in batch classification
    #[serde(default = "default_classify_delay_ms")]
    pub classify_delay_ms: u64,

    /// Delay between exchanges in the suggestion sweep
    #[serde(default = "default_sweep_delay_ms")]
    pub sweep_delay_ms: u64,

    /// Upper bound on uploaded spreadsheet size
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Reviewer name recorded on resolved suggestions when the request names none
    #[serde(default = "default_reviewer")]
    pub reviewer: String,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            bind_address: default_bind_address(),
            logging: LoggingConfig::default(),
            xai_api_key: None,
            xai_base_url: default_xai_base_url(),
            vision_model: default_vision_model(),
            text_model: default_text_model(),
            cron_secret: None,
            classify_delay_ms: default_classify_delay_ms(),
            sweep_delay_ms: default_sweep_delay_ms(),
            max_upload_bytes: default_max_upload_bytes(),
            reviewer: default_reviewer(),
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1:5740".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_xai_base_url() -> String {
    "https://api.x.ai/v1".to_string()
}

fn default_vision_model() -> String {
    "grok-2-vision-1212".to_string()
}

fn default_text_model() -> String {
    "grok-3-mini".to_string()
}

fn default_classify_delay_ms() -> u64 {
    1000
}

fn default_sweep_delay_ms() -> u64 {
    2000
}

fn default_max_upload_bytes() -> usize {
    20 * 1024 * 1024
}

fn default_reviewer() -> String {
    "admin".to_string()
}

/// Default TOML location: `<config_dir>/exintel/exintel.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("exintel").join("exintel.toml"))
}

/// Parse TOML configuration text
pub fn parse_toml_config(content: &str) -> Result<TomlConfig> {
    toml::from_str(content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
}

/// Load TOML configuration with graceful degradation
///
/// Missing file ⇒ defaults. Unreadable or malformed file ⇒ warning + defaults.
pub fn load_toml_config(path: &Path) -> TomlConfig {
    if !path.exists() {
        info!("No config file at {}, using defaults", path.display());
        return TomlConfig::default();
    }

    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!("Failed to read config file {}: {} (using defaults)", path.display(), e);
            return TomlConfig::default();
        }
    };

    match parse_toml_config(&content) {
        Ok(config) => {
            info!("Loaded config from {}", path.display());
            config
        }
        Err(e) => {
            warn!("{} in {} (using defaults)", e, path.display());
            TomlConfig::default()
        }
    }
}

/// Compiled fallback values for the current platform
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub log_level: String,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        let root_folder = dirs::data_local_dir()
            .map(|d| d.join("exintel"))
            .unwrap_or_else(|| PathBuf::from("./exintel_data"));

        Self {
            root_folder,
            log_level: default_log_level(),
        }
    }
}

/// Root folder resolution
///
/// Priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable `EXINTEL_ROOT_FOLDER`
/// 3. TOML `root_folder`
/// 4. OS-dependent compiled default
#[derive(Debug, Clone)]
pub struct RootFolderResolver {
    module_name: String,
    cli_arg: Option<PathBuf>,
    toml_value: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(module_name: &str) -> Self {
        Self {
            module_name: module_name.to_string(),
            cli_arg: None,
            toml_value: None,
        }
    }

    pub fn with_cli_arg(mut self, path: Option<PathBuf>) -> Self {
        self.cli_arg = path;
        self
    }

    pub fn with_toml(mut self, config: &TomlConfig) -> Self {
        self.toml_value = config.root_folder.clone();
        self
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            info!("[{}] Root folder from command line: {}", self.module_name, path.display());
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                info!("[{}] Root folder from {}: {}", self.module_name, ROOT_FOLDER_ENV, path);
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &self.toml_value {
            info!("[{}] Root folder from TOML: {}", self.module_name, path.display());
            return path.clone();
        }

        let defaults = CompiledDefaults::for_current_platform();
        info!(
            "[{}] Root folder from compiled default: {}",
            self.module_name,
            defaults.root_folder.display()
        );
        defaults.root_folder
    }
}

/// Creates the root folder layout on first run
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    /// Create the root folder and the screenshot directory if missing
    pub fn ensure_directory_exists(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root_folder)?;
        std::fs::create_dir_all(self.screenshots_path())?;
        Ok(())
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE_NAME)
    }

    pub fn screenshots_path(&self) -> PathBuf {
        self.root_folder.join(SCREENSHOTS_DIR_NAME)
    }
}

/// Pick a secret from environment first, then TOML
///
/// Returns the value and the name of the winning source. Multiple sources are
/// reported with a warning since the lower-priority one is silently shadowed.
pub fn resolve_secret(
    label: &str,
    env_var: &str,
    toml_value: Option<&str>,
) -> Option<(String, &'static str)> {
    let env_value = std::env::var(env_var)
        .ok()
        .filter(|v| !v.trim().is_empty());
    let toml_value = toml_value
        .map(str::to_string)
        .filter(|v| !v.trim().is_empty());

    if env_value.is_some() && toml_value.is_some() {
        warn!(
            "{} found in both environment ({}) and TOML. Using environment.",
            label, env_var
        );
    }

    env_value
        .map(|v| (v, "environment"))
        .or_else(|| toml_value.map(|v| (v, "TOML")))
}
