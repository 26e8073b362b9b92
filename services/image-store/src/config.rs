use serde::Deserialize;
use thiserror::Error;

/// Errors that can occur while validating configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Missing required configuration: {0}")]
    MissingRequired(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },
}

/// Main configuration for the image store service
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Service configuration
    #[serde(default)]
    pub service: ServiceConfig,
    /// Storage layout and limits
    #[serde(default)]
    pub store: StoreConfig,
    /// HTTP API configuration
    #[serde(default)]
    pub api: ApiConfig,
}

/// Service-level configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Service name for logging
    #[serde(default = "default_service_name")]
    pub name: String,
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Expose Prometheus metrics
    #[serde(default = "default_true")]
    pub metrics_enabled: bool,
    /// Metrics port
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

/// Where images live and how many may be admitted
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Active-image directory
    #[serde(default = "default_image_dir")]
    pub image_dir: String,
    /// Holding directory for soft-deleted images
    #[serde(default = "default_delete_dir")]
    pub delete_dir: String,
    /// Base path joined with image ids in client-facing references
    #[serde(default = "default_image_base_path")]
    pub image_base_path: String,
    /// Maximum decoded upload size in bytes (0 or negative = unbounded)
    #[serde(default = "default_max_data_size")]
    pub max_data_size: i64,
    /// Maximum active image count (0 or negative = unbounded)
    #[serde(default = "default_max_images")]
    pub max_images: i64,
    /// Retention ceiling for the holding directory, owned by an external sweep
    #[serde(default = "default_max_deleted_images")]
    pub max_deleted_images: i64,
}

/// HTTP API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    /// API listen address
    #[serde(default = "default_api_host")]
    pub host: String,
    /// API listen port
    #[serde(default = "default_api_port")]
    pub port: u16,
    /// Path prefix all image routes are mounted under
    #[serde(default)]
    pub prefix: String,
    /// Enable CORS
    #[serde(default = "default_true")]
    pub cors_enabled: bool,
    /// Allowed CORS origins
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

/// Raw bytes allowed past the encoded size ceiling
const UPLOAD_BODY_SLACK: u64 = 4096;

// Default value functions
fn default_service_name() -> String {
    "image-store".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_true() -> bool {
    true
}

fn default_image_dir() -> String {
    "../images".to_string()
}

fn default_delete_dir() -> String {
    "../images/delete".to_string()
}

fn default_image_base_path() -> String {
    "../../images".to_string()
}

fn default_max_data_size() -> i64 {
    10 * 1024 * 1024 // 10MB
}

fn default_max_images() -> i64 {
    100
}

fn default_max_deleted_images() -> i64 {
    500
}

fn default_api_host() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    8080
}

impl Config {
    /// Load configuration from config files and environment
    pub fn load() -> anyhow::Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/image-store").required(false))
            .add_source(config::File::with_name("/etc/imageman/image-store").required(false))
            // IMAGE_STORE__STORE__MAX_IMAGES -> store.max_images
            .add_source(
                config::Environment::with_prefix("IMAGE_STORE")
                    .separator("__")
                    .list_separator(",")
                    .with_list_parse_key("api.cors_origins")
                    .try_parsing(true),
            );

        Self::build(builder)
    }

    /// Load configuration from TOML text, without files or environment
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::from_str(content, config::FileFormat::Toml));

        Self::build(builder)
    }

    fn build(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> anyhow::Result<Self> {
        let config: Config = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.store.image_dir.trim().is_empty() {
            return Err(ConfigError::MissingRequired("store.image_dir".to_string()));
        }
        if self.store.delete_dir.trim().is_empty() {
            return Err(ConfigError::MissingRequired("store.delete_dir".to_string()));
        }
        if self.store.image_dir == self.store.delete_dir {
            return Err(ConfigError::InvalidValue {
                key: "store.delete_dir".to_string(),
                message: "must differ from store.image_dir".to_string(),
            });
        }
        if !self.api.prefix.is_empty() && !self.api.prefix.starts_with('/') {
            return Err(ConfigError::InvalidValue {
                key: "api.prefix".to_string(),
                message: "must be empty or start with '/'".to_string(),
            });
        }
        Ok(())
    }

    /// Largest accepted request body for uploads, `None` when unbounded.
    ///
    /// Covers the base64 encoding of `max_data_size` bytes with a line break
    /// pair every 64 characters, plus fixed slack. Saturates instead of
    /// overflowing for very large ceilings.
    pub fn upload_body_limit(&self) -> Option<usize> {
        if self.store.max_data_size <= 0 {
            return None;
        }
        let decoded = self.store.max_data_size as u64;
        let encoded = decoded.div_ceil(3).saturating_mul(4);
        let limit = encoded
            .saturating_add(encoded / 32)
            .saturating_add(UPLOAD_BODY_SLACK);
        Some(usize::try_from(limit).unwrap_or(usize::MAX))
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
            metrics_enabled: true,
            metrics_port: default_metrics_port(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            image_dir: default_image_dir(),
            delete_dir: default_delete_dir(),
            image_base_path: default_image_base_path(),
            max_data_size: default_max_data_size(),
            max_images: default_max_images(),
            max_deleted_images: default_max_deleted_images(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
            prefix: String::new(),
            cors_enabled: true,
            cors_origins: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = Config::default();
        assert_eq!(config.store.image_dir, "../images");
        assert_eq!(config.store.delete_dir, "../images/delete");
        assert_eq!(config.store.max_data_size, 10 * 1024 * 1024);
        assert_eq!(config.store.max_images, 100);
        assert_eq!(config.store.max_deleted_images, 500);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_toml_overrides_and_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [store]
            image_dir = "/srv/images"
            delete_dir = "/srv/deleted"
            max_images = -1

            [api]
            prefix = "/cgi-bin/imageman.cgi"
            "#,
        )
        .unwrap();

        assert_eq!(config.store.image_dir, "/srv/images");
        assert_eq!(config.store.max_images, -1);
        assert_eq!(config.store.image_base_path, "../../images");
        assert_eq!(config.api.prefix, "/cgi-bin/imageman.cgi");
        assert_eq!(config.api.port, 8080);
        assert_eq!(config.service.log_level, "info");
    }

    #[test]
    fn test_validate_rejects_shared_directories() {
        let mut config = Config::default();
        config.store.delete_dir = config.store.image_dir.clone();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { .. })
        ));

        let mut config = Config::default();
        config.api.prefix = "images".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_upload_body_limit() {
        let mut config = Config::default();
        config.store.max_data_size = 3000;
        assert_eq!(config.upload_body_limit(), Some(4000 + 125 + 4096));

        config.store.max_data_size = 0;
        assert_eq!(config.upload_body_limit(), None);
        config.store.max_data_size = -5;
        assert_eq!(config.upload_body_limit(), None);
    }

    #[test]
    fn test_upload_body_limit_saturates() {
        let mut config = Config::default();
        config.store.max_data_size = i64::MAX;

        let limit = config.upload_body_limit().unwrap();
        assert!(limit as u64 >= (i64::MAX as u64).min(usize::MAX as u64));
    }

    #[test]
    fn test_upload_body_limit_fits_wrapped_base64() {
        use base64::engine::general_purpose::STANDARD;
        use base64::Engine;

        let mut config = Config::default();
        config.store.max_data_size = 300_000;
        let limit = config.upload_body_limit().unwrap();

        let encoded = STANDARD.encode(vec![0u8; 300_000]);
        for width in [64, 76] {
            let wrapped = encoded
                .as_bytes()
                .chunks(width)
                .map(|line| std::str::from_utf8(line).unwrap())
                .collect::<Vec<_>>()
                .join("\r\n");
            assert!(wrapped.len() + 2 <= limit, "width {} exceeds limit", width);
        }
    }
}
