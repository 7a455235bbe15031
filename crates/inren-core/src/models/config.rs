//! Configuration structures for recognition, naming and export.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use super::fields::FieldConfig;
use crate::error::ValidationError;

/// Bounds for [`AppConfig::max_concurrent`].
pub const MIN_CONCURRENT: usize = 1;
pub const MAX_CONCURRENT: usize = 10;

/// Environment variable that overrides the stored API key.
pub const API_KEY_ENV: &str = "INREN_API_KEY";

/// Main configuration for the inren pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InrenConfig {
    /// Remote model access.
    pub api: AppConfig,

    /// File naming template.
    pub naming: NamingConfig,

    /// Document rasterization.
    pub render: RenderConfig,

    /// Export settings.
    pub export: ExportConfig,
}

/// Remote recognition API configuration.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Chat completions endpoint or API root.
    pub api_endpoint: String,

    /// Bearer token.
    pub api_key: String,

    /// Model identifier.
    pub model: String,

    /// Maximum simultaneous recognition calls (1 - 10).
    pub max_concurrent: usize,

    /// Extra request parameters as a JSON object, merged into every request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_params: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            api_key: String::new(),
            model: "gpt-4o-mini".to_string(),
            max_concurrent: 3,
            custom_params: None,
        }
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_endpoint", &self.api_endpoint)
            .field("api_key", &if self.api_key.is_empty() { "" } else { "***" })
            .field("model", &self.model)
            .field("max_concurrent", &self.max_concurrent)
            .field("custom_params", &self.custom_params)
            .finish()
    }
}

impl AppConfig {
    /// Whether an API key has been provided at all.
    pub fn is_configured(&self) -> bool {
        !self.api_key.trim().is_empty()
    }

    /// Check every field and report all issues at once.
    pub fn validate(&self) -> Result<(), ValidationError> {
        let mut issues = self.connection_issues();

        if let Some(raw) = self.custom_params.as_deref().filter(|p| !p.trim().is_empty()) {
            if serde_json::from_str::<Value>(raw).is_err() {
                issues.push("custom parameters must be valid JSON".to_string());
            }
        }

        into_result(issues)
    }

    /// Check the settings a recognition call depends on.
    ///
    /// Custom parameters are not checked here; malformed ones are ignored at
    /// request time.
    pub fn validate_connection(&self) -> Result<(), ValidationError> {
        into_result(self.connection_issues())
    }

    fn connection_issues(&self) -> Vec<String> {
        let mut issues = Vec::new();

        if !self.api_endpoint.trim().starts_with("http") {
            issues.push("API endpoint must be an http(s) URL".to_string());
        }

        if self.api_key.trim().is_empty() {
            issues.push("API key must not be empty".to_string());
        }

        if self.model.trim().is_empty() {
            issues.push("model name must not be empty".to_string());
        }

        if !(MIN_CONCURRENT..=MAX_CONCURRENT).contains(&self.max_concurrent) {
            issues.push(format!(
                "max concurrent requests must be between {} and {}",
                MIN_CONCURRENT, MAX_CONCURRENT
            ));
        }

        issues
    }

    /// Effective API root derived from the configured endpoint.
    pub fn base_url(&self) -> String {
        normalize_base_url(&self.api_endpoint)
    }

    /// Custom parameters as a JSON object.
    ///
    /// Malformed or non-object input is logged and treated as empty.
    pub fn custom_params_map(&self) -> Map<String, Value> {
        let Some(raw) = self.custom_params.as_deref().map(str::trim) else {
            return Map::new();
        };
        if raw.is_empty() {
            return Map::new();
        }

        match serde_json::from_str::<Value>(raw) {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                warn!("Ignoring custom parameters: expected a JSON object, got {}", other);
                Map::new()
            }
            Err(e) => {
                warn!("Ignoring custom parameters: {}", e);
                Map::new()
            }
        }
    }

    /// Apply the API key from the environment, if set.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(key) = std::env::var(API_KEY_ENV) {
            if !key.trim().is_empty() {
                self.api_key = key;
            }
        }
        self
    }
}

fn into_result(issues: Vec<String>) -> Result<(), ValidationError> {
    if issues.is_empty() {
        Ok(())
    } else {
        Err(ValidationError { issues })
    }
}

/// Normalize an endpoint to the API root.
///
/// Trailing slashes and a `/chat/completions` suffix are removed, then `/v1`
/// is appended unless already present.
pub fn normalize_base_url(url: &str) -> String {
    let mut endpoint = url.trim().trim_end_matches('/');

    if let Some(stripped) = endpoint.strip_suffix("/chat/completions") {
        endpoint = stripped;
    }

    let endpoint = endpoint.trim_end_matches('/');

    if endpoint.ends_with("/v1") {
        endpoint.to_string()
    } else {
        format!("{}/v1", endpoint)
    }
}

/// File naming configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NamingConfig {
    /// Field selection and order.
    pub fields: Vec<FieldConfig>,

    /// String placed between field values.
    pub separator: String,
}

impl Default for NamingConfig {
    fn default() -> Self {
        Self {
            fields: FieldConfig::defaults(),
            separator: "_".to_string(),
        }
    }
}

/// Rasterization configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Scale used for the image sent to the model.
    pub recognition_scale: f32,

    /// Scale used for previews.
    pub preview_scale: f32,

    /// Maximum image dimension (longer side) in pixels.
    pub max_image_size: u32,

    /// JPEG quality (1 - 100).
    pub jpeg_quality: u8,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            recognition_scale: 2.0,
            preview_scale: 1.0,
            max_image_size: 2048,
            jpeg_quality: 80,
        }
    }
}

/// Export configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Default archive file name.
    pub archive_name: String,

    /// Default output directory.
    pub output_dir: PathBuf,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            archive_name: "invoices.zip".to_string(),
            output_dir: PathBuf::from("."),
        }
    }
}

impl InrenConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        std::fs::write(path, content)
    }
}
