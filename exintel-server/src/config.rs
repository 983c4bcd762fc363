//! Runtime configuration for exintel-server
//!
//! Built once at startup from the bootstrap TOML plus environment secrets,
//! then shared read-only through `AppState`.

use exintel_common::config::{resolve_secret, TomlConfig};
use std::time::Duration;
use tracing::{info, warn};

/// Environment variable holding the xAI API key
pub const XAI_API_KEY_ENV: &str = "XAI_API_KEY";

/// Environment variable holding the sweep trigger secret
pub const CRON_SECRET_ENV: &str = "EXINTEL_CRON_SECRET";

/// Service settings resolved at startup
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub xai_api_key: Option<String>,
    pub xai_base_url: String,
    pub vision_model: String,
    pub text_model: String,
    pub cron_secret: Option<String>,
    /// Pause between model calls in batch classification
    pub classify_delay: Duration,
    /// Pause between exchanges in the suggestion sweep
    pub sweep_delay: Duration,
    pub max_upload_bytes: usize,
    /// Reviewer recorded when a resolve request names none
    pub reviewer: String,
}

impl ServiceConfig {
    /// Resolve secrets (environment over TOML) and copy the tunables
    pub fn from_toml(toml: &TomlConfig) -> Self {
        let xai_api_key = match resolve_secret(
            "xAI API key",
            XAI_API_KEY_ENV,
            toml.xai_api_key.as_deref(),
        ) {
            Some((key, source)) => {
                info!("xAI API key loaded from {}", source);
                Some(key)
            }
            None => {
                warn!("xAI API key not configured; classification and sweep endpoints are disabled");
                None
            }
        };

        let cron_secret = match resolve_secret(
            "cron secret",
            CRON_SECRET_ENV,
            toml.cron_secret.as_deref(),
        ) {
            Some((secret, source)) => {
                info!("Cron secret loaded from {}", source);
                Some(secret)
            }
            None => None,
        };

        Self {
            xai_api_key,
            xai_base_url: toml.xai_base_url.clone(),
            vision_model: toml.vision_model.clone(),
            text_model: toml.text_model.clone(),
            cron_secret,
            classify_delay: exintel_common::time::millis_to_duration(toml.classify_delay_ms),
            sweep_delay: exintel_common::time::millis_to_duration(toml.sweep_delay_ms),
            max_upload_bytes: toml.max_upload_bytes,
            reviewer: toml.reviewer.clone(),
        }
    }
}

impl Default for ServiceConfig {
    /// TOML defaults with no secrets; tests start from here
    fn default() -> Self {
        let toml = TomlConfig::default();
        Self {
            xai_api_key: None,
            xai_base_url: toml.xai_base_url,
            vision_model: toml.vision_model,
            text_model: toml.text_model,
            cron_secret: None,
            classify_delay: Duration::ZERO,
            sweep_delay: Duration::ZERO,
            max_upload_bytes: toml.max_upload_bytes,
            reviewer: toml.reviewer,
        }
    }
}
