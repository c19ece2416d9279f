//! Configuration Loader
//!
//! Environment-aware configuration loading. Handles YAML file discovery,
//! environment detection, environment-section merging and variable expansion.

use super::error::{ConfigResult, ConfigurationError};
use super::StageSyncConfig;
use serde_yaml::Value as YamlValue;
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

const ENVIRONMENT_SECTIONS: &[&str] = &["development", "test", "production"];

pub struct ConfigManager {
    config: StageSyncConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration, falling back to built-in defaults when no file exists
    pub fn load_or_default(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        match Self::load_from_directory(config_dir) {
            Err(ConfigurationError::ConfigFileNotFound { searched_paths }) => {
                warn!(
                    searched_paths = ?searched_paths,
                    "No configuration file found, using built-in defaults"
                );
                let environment = Self::detect_environment();
                let mut config = StageSyncConfig::default();
                Self::apply_environment_overrides(&mut config);
                config.validate()?;
                Ok(Arc::new(ConfigManager {
                    config,
                    environment,
                    config_directory: Self::default_config_directory(),
                }))
            }
            other => other,
        }
    }

    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = Self::detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load configuration from a specific directory with explicit environment.
    /// Useful for testing without modifying global environment variables.
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory = config_dir.unwrap_or_else(Self::default_config_directory);

        debug!(
            "Loading configuration for environment '{}' from directory: {}",
            environment,
            config_directory.display()
        );

        let mut config = Self::load_and_merge_config(&config_directory, environment)?;
        Self::expand_environment_variables(&mut config);
        Self::apply_environment_overrides(&mut config);
        config.validate()?;

        let manager = ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        };

        debug!(
            "Configuration loaded: {}",
            serde_json::to_string_pretty(&manager.debug_config())
                .unwrap_or_else(|_| "[serialization error]".to_string())
        );
        info!(
            environment = %environment,
            lock_ttl_seconds = manager.config.coordination.lock_ttl_seconds,
            wait_for_stage2 = manager.config.orchestration.wait_for_stage2,
            queue = %manager.config.queue.queue_name,
            "⚙️ Configuration loaded successfully"
        );

        Ok(Arc::new(manager))
    }

    /// Build a manager around an in-memory configuration
    pub fn from_config(config: StageSyncConfig, environment: &str) -> ConfigResult<Arc<Self>> {
        config.validate()?;
        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory: Self::default_config_directory(),
        }))
    }

    pub fn config(&self) -> &StageSyncConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    /// Configuration as JSON with sensitive fields masked
    pub fn debug_config(&self) -> serde_json::Value {
        let mut config_json = serde_json::json!(self.config);
        Self::sanitize_json_recursive(&mut config_json, &["password", "secret", "token"]);
        if let Some(url) = config_json.pointer_mut("/database/url") {
            let masked = url.as_str().map(Self::mask_url_credentials);
            if let Some(masked) = masked {
                *url = serde_json::Value::String(masked);
            }
        }
        config_json
    }

    fn detect_environment() -> String {
        env::var("STAGESYNC_ENV")
            .or_else(|_| env::var("APP_ENV"))
            .unwrap_or_else(|_| "development".to_string())
            .to_lowercase()
    }

    fn default_config_directory() -> PathBuf {
        env::var("STAGESYNC_CONFIG_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config"))
    }

    fn find_config_file(config_directory: &Path) -> ConfigResult<PathBuf> {
        let mut searched_paths = Vec::new();

        for name in ["stagesync-config.yaml", "stagesync-config.yml"] {
            let config_path = config_directory.join(name);
            searched_paths.push(config_path.clone());

            if config_path.is_file() {
                debug!("Found configuration file: {}", config_path.display());
                return Ok(config_path);
            }
        }

        Err(ConfigurationError::config_file_not_found(searched_paths))
    }

    fn read_config_file_safely(path: &Path) -> ConfigResult<String> {
        const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

        let metadata = std::fs::metadata(path)
            .map_err(|e| ConfigurationError::file_read_error(path.display().to_string(), e))?;

        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigurationError::invalid_value(
                "file_size",
                metadata.len().to_string(),
                "configuration file exceeds 1MB",
            ));
        }

        std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::file_read_error(path.display().to_string(), e))
    }

    fn load_and_merge_config(
        config_directory: &Path,
        environment: &str,
    ) -> ConfigResult<StageSyncConfig> {
        let config_file = Self::find_config_file(config_directory)?;
        let yaml_content = Self::read_config_file_safely(&config_file)?;

        let mut yaml_data: YamlValue = serde_yaml::from_str(&yaml_content)
            .map_err(|e| ConfigurationError::invalid_yaml(config_file.display().to_string(), e))?;

        if let Some(env_overrides) = yaml_data
            .get(YamlValue::String(environment.to_string()))
            .cloned()
        {
            debug!("Applying environment-specific overrides for: {}", environment);
            Self::merge_yaml_values(&mut yaml_data, env_overrides);
        }

        if let YamlValue::Mapping(ref mut map) = yaml_data {
            for section in ENVIRONMENT_SECTIONS {
                map.remove(YamlValue::String((*section).to_string()));
            }
        }

        serde_yaml::from_value(yaml_data).map_err(|e| {
            ConfigurationError::invalid_yaml(
                config_file.display().to_string(),
                format!("Failed to deserialize configuration: {e}"),
            )
        })
    }

    /// Recursively merge YAML values (environment overrides into base config)
    fn merge_yaml_values(base: &mut YamlValue, override_value: YamlValue) {
        match (&mut *base, override_value) {
            (YamlValue::Mapping(base_map), YamlValue::Mapping(override_map)) => {
                for (key, value) in override_map {
                    if let Some(existing_value) = base_map.get_mut(&key) {
                        Self::merge_yaml_values(existing_value, value);
                    } else {
                        base_map.insert(key, value);
                    }
                }
            }
            (base_ref, override_val) => {
                *base_ref = override_val;
            }
        }
    }

    /// Expand a `${VAR}` database URL from the environment
    fn expand_environment_variables(config: &mut StageSyncConfig) {
        let Some(url) = config.database.url.as_deref() else {
            return;
        };
        if !(url.starts_with("${") && url.ends_with('}')) {
            return;
        }

        let var_name = url[2..url.len() - 1].to_string();
        match env::var(&var_name) {
            Ok(env_value) => {
                debug!("Expanding environment variable {} in database URL", var_name);
                config.database.url = Some(env_value);
            }
            Err(_) => {
                warn!(
                    "Environment variable {} not found, clearing database URL",
                    var_name
                );
                config.database.url = None;
            }
        }
    }

    /// `DATABASE_URL` always wins over file configuration
    fn apply_environment_overrides(config: &mut StageSyncConfig) {
        if let Ok(url) = env::var("DATABASE_URL") {
            if !url.is_empty() {
                config.database.url = Some(url);
            }
        }
    }

    fn sanitize_json_recursive(value: &mut serde_json::Value, sensitive_patterns: &[&str]) {
        match value {
            serde_json::Value::Object(map) => {
                for (key, val) in map.iter_mut() {
                    let key_lower = key.to_lowercase();
                    if sensitive_patterns
                        .iter()
                        .any(|pattern| key_lower.contains(pattern))
                    {
                        *val = serde_json::Value::String("[MASKED]".to_string());
                    } else {
                        Self::sanitize_json_recursive(val, sensitive_patterns);
                    }
                }
            }
            serde_json::Value::Array(items) => {
                for item in items {
                    Self::sanitize_json_recursive(item, sensitive_patterns);
                }
            }
            _ => {}
        }
    }

    fn mask_url_credentials(url: &str) -> String {
        match (url.find("://"), url.rfind('@')) {
            (Some(scheme_end), Some(at)) if at > scheme_end => {
                format!("{}://***@{}", &url[..scheme_end], &url[at + 1..])
            }
            _ => url.to_string(),
        }
    }
}
