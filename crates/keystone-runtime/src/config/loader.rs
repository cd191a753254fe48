//! Configuration loader using figment.
//!
//! # Feature Flags
//!
//! - `toml-config` *(default)*: enables `keystone.toml` / `config.toml`
//! - `yaml-config`: enables `keystone.yaml` / `keystone.yml` / `config.yaml` / `config.yml`
//!
//! When both are enabled, both formats are searched and merged.
//!
//! # Configuration Priority (lowest to highest)
//!
//! 1. Built-in defaults
//! 2. Base configurations passed to [`ConfigLoader::merge`]
//! 3. Main config file (`keystone.toml` / `keystone.yaml`)
//! 4. Profile-specific file next to it (`keystone.{profile}.toml`)
//! 5. Environment variables (`KEYSTONE_*`)
//! 6. Overrides passed to [`ConfigLoader::set`]
//!
//! # Environment Variable Mapping
//!
//! `KEYSTONE_` prefix, `__` as the nesting separator:
//!
//! - `KEYSTONE_LOGGING__LEVEL=debug` → `logging.level = "debug"`
//! - `KEYSTONE_KERNEL__HOOK_TIMEOUT_MS=5000` → `kernel.hook_timeout_ms = 5000`
//! - `KEYSTONE_PLUGINS__AUDIT__RETENTION=50` → `plugins.audit.retention = 50`
//!
//! ```rust,ignore
//! let config = ConfigLoader::new()
//!     .profile("production")
//!     .set("kernel.hook_timeout_ms", 10_000)
//!     .load()?;
//! ```

use std::path::{Path, PathBuf};

use figment::Figment;
#[cfg(any(feature = "yaml-config", feature = "toml-config"))]
use figment::providers::Format;
#[cfg(feature = "toml-config")]
use figment::providers::Toml;
#[cfg(feature = "yaml-config")]
use figment::providers::Yaml;
use figment::providers::{Env, Serialized};
use serde::Serialize;
use tracing::{debug, info, trace, warn};

use super::error::{ConfigError, ConfigResult};
use super::schema::KeystoneConfig;
use super::validation::validate_config;

/// Environment variable selecting the active [`Profile`].
pub const PROFILE_ENV: &str = "KEYSTONE_PROFILE";

const ENV_PREFIX: &str = "KEYSTONE_";

/// Configuration profile for environment-specific settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Profile {
    #[default]
    Development,
    Production,
    Custom(String),
}

impl Profile {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Development => "development",
            Self::Production => "production",
            Self::Custom(name) => name,
        }
    }

    /// Reads `KEYSTONE_PROFILE`, defaulting to [`Profile::Development`].
    pub fn from_env() -> Self {
        std::env::var(PROFILE_ENV)
            .map(|p| Self::from(p.as_str()))
            .unwrap_or_default()
    }
}

impl From<&str> for Profile {
    fn from(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "production" | "prod" => Self::Production,
            "development" | "dev" => Self::Development,
            other => Self::Custom(other.to_string()),
        }
    }
}

impl std::fmt::Display for Profile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration loader with figment-based multi-source support.
pub struct ConfigLoader {
    /// Programmatic base layers, below any file.
    base: Figment,
    /// Programmatic overrides, above environment variables.
    overrides: Figment,
    profile: Profile,
    search_paths: Vec<PathBuf>,
    load_env: bool,
    /// Specific config file to load (disables the search).
    config_file: Option<PathBuf>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            base: Figment::new(),
            overrides: Figment::new(),
            profile: Profile::from_env(),
            search_paths: Vec::new(),
            load_env: true,
            config_file: None,
        }
    }

    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.profile = Profile::from(profile.into().as_str());
        self
    }

    /// Adds a search path for configuration files.
    ///
    /// Without any, the current directory and `<user config dir>/keystone`
    /// are searched.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.search_paths.push(path.as_ref().to_path_buf());
        self
    }

    pub fn with_current_dir(self) -> Self {
        match std::env::current_dir() {
            Ok(cwd) => self.search_path(cwd),
            Err(_) => self,
        }
    }

    pub fn with_user_config_dir(self) -> Self {
        match dirs::config_dir() {
            Some(config_dir) => self.search_path(config_dir.join("keystone")),
            None => self,
        }
    }

    /// Loads exactly this file instead of searching.
    pub fn file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_file = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn with_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    pub fn without_env(mut self) -> Self {
        self.load_env = false;
        self
    }

    /// Layers a whole configuration over the built-in defaults.
    ///
    /// Files and environment variables still take precedence.
    pub fn merge(mut self, config: KeystoneConfig) -> Self {
        self.base = self.base.merge(Serialized::defaults(config));
        self
    }

    /// Overrides a single dotted key after every other source.
    ///
    /// ```rust,ignore
    /// ConfigLoader::new().set("logging.level", "debug")
    /// ```
    pub fn set<V: Serialize>(mut self, key: &str, value: V) -> Self {
        self.overrides = self.overrides.merge(Serialized::default(key, value));
        self
    }

    /// Loads, extracts and validates the configuration.
    pub fn load(self) -> ConfigResult<KeystoneConfig> {
        let profile = self.profile.clone();
        let figment = self.build_figment()?;

        let config: KeystoneConfig = figment.extract()?;
        validate_config(&config)?;

        debug!(
            profile       = %profile,
            logging_level = %config.logging.level,
            plugins       = config.plugins.len(),
            "Configuration loaded successfully"
        );

        Ok(config)
    }

    fn build_figment(mut self) -> ConfigResult<Figment> {
        let mut figment = Figment::from(Serialized::defaults(KeystoneConfig::default()));
        figment = figment.merge(std::mem::take(&mut self.base));

        if let Some(path) = self.config_file.take() {
            if !path.exists() {
                return Err(ConfigError::FileNotFound(path));
            }
            info!(path = %path.display(), "Loading configuration file");
            figment = Self::merge_config_file(figment, &path)?;
        } else {
            figment = self.load_config_files(figment);
        }

        if self.load_env {
            trace!("Loading environment variables with {ENV_PREFIX} prefix");
            figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        }

        Ok(figment.merge(self.overrides))
    }

    /// Merges a single file, dispatching on its extension.
    fn merge_config_file(figment: Figment, path: &Path) -> ConfigResult<Figment> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");
        match ext {
            #[cfg(feature = "toml-config")]
            "toml" => Ok(figment.merge(Toml::file(path))),
            #[cfg(feature = "yaml-config")]
            "yaml" | "yml" => Ok(figment.merge(Yaml::file(path))),
            _ => Err(ConfigError::UnsupportedFormat(ext.to_string())),
        }
    }

    fn resolve_search_paths(&self) -> Vec<PathBuf> {
        if !self.search_paths.is_empty() {
            return self.search_paths.clone();
        }
        let mut paths = Vec::new();
        if let Ok(cwd) = std::env::current_dir() {
            paths.push(cwd);
        }
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("keystone"));
        }
        paths
    }

    /// Searches `search_paths × base_names` for the first base file of one
    /// format and merges it, followed by its profile variant if present.
    #[cfg(any(feature = "toml-config", feature = "yaml-config"))]
    fn load_format_files<F>(
        &self,
        mut figment: Figment,
        search_paths: &[PathBuf],
        base_names: &[&str],
        merge_fn: F,
    ) -> (Figment, bool)
    where
        F: Fn(Figment, &Path) -> Figment,
    {
        for search_path in search_paths {
            for base_name in base_names {
                let base_path = search_path.join(base_name);
                if !base_path.exists() {
                    continue;
                }
                info!(path = %base_path.display(), "Loading configuration file");
                figment = merge_fn(figment, &base_path);

                if let Some((stem, ext)) = base_name.rsplit_once('.') {
                    let profile_path =
                        search_path.join(format!("{stem}.{}.{ext}", self.profile.as_str()));
                    if profile_path.exists() {
                        debug!(path = %profile_path.display(), "Loading profile-specific config");
                        figment = merge_fn(figment, &profile_path);
                    }
                }
                return (figment, true);
            }
        }
        (figment, false)
    }

    #[allow(unused_mut)]
    fn load_config_files(&self, mut figment: Figment) -> Figment {
        let search_paths = self.resolve_search_paths();
        let mut found = false;

        #[cfg(feature = "toml-config")]
        {
            let (f, ok) = self.load_format_files(
                figment,
                &search_paths,
                &["keystone.toml", "config.toml"],
                |fig, path| fig.merge(Toml::file(path)),
            );
            figment = f;
            found |= ok;
        }

        #[cfg(feature = "yaml-config")]
        {
            let (f, ok) = self.load_format_files(
                figment,
                &search_paths,
                &["keystone.yaml", "keystone.yml", "config.yaml", "config.yml"],
                |fig, path| fig.merge(Yaml::file(path)),
            );
            figment = f;
            found |= ok;
        }

        if !found {
            warn!(paths = ?search_paths, "No configuration file found, using defaults");
        }
        figment
    }
}

/// Loads configuration from the default locations.
pub fn load_config() -> ConfigResult<KeystoneConfig> {
    ConfigLoader::new().load()
}

/// Loads configuration from `path` plus environment variables.
pub fn load_config_from_file<P: AsRef<Path>>(path: P) -> ConfigResult<KeystoneConfig> {
    ConfigLoader::new().file(path).load()
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "keystone-config-{name}-{}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_defaults_when_nothing_found() {
        let dir = scratch_dir("empty");
        let config = ConfigLoader::new()
            .search_path(&dir)
            .without_env()
            .load()
            .unwrap();

        assert_eq!(config.logging.level.as_str(), "info");
        assert!(config.plugins.is_empty());
    }

    #[test]
    fn test_profile_parsing() {
        assert_eq!(Profile::from("prod"), Profile::Production);
        assert_eq!(Profile::from("Development"), Profile::Development);
        assert_eq!(Profile::from("staging"), Profile::Custom("staging".into()));
        assert_eq!(Profile::Production.to_string(), "production");
    }

    #[test]
    fn test_missing_explicit_file() {
        let dir = scratch_dir("missing");
        let err = ConfigLoader::new()
            .file(dir.join("nope.toml"))
            .without_env()
            .load()
            .unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = scratch_dir("ini");
        let path = dir.join("keystone.ini");
        std::fs::write(&path, "level=debug").unwrap();

        let err = ConfigLoader::new().file(&path).without_env().load().unwrap_err();
        assert!(matches!(err, ConfigError::UnsupportedFormat(ref ext) if ext == "ini"));
    }

    #[test]
    fn test_merge_is_a_base_layer() {
        let dir = scratch_dir("merge");
        let mut base = KeystoneConfig::default();
        base.kernel.shutdown_on_bootstrap_failure = false;

        let config = ConfigLoader::new()
            .search_path(&dir)
            .without_env()
            .merge(base)
            .load()
            .unwrap();
        assert!(!config.kernel.shutdown_on_bootstrap_failure);
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn test_file_then_profile_then_overrides() {
        let dir = scratch_dir("layers");
        std::fs::write(
            dir.join("keystone.toml"),
            r#"
[logging]
level = "warn"

[kernel]
hook_timeout_ms = 100

[plugins.audit]
retention = 5
"#,
        )
        .unwrap();
        std::fs::write(
            dir.join("keystone.staging.toml"),
            "[logging]\nlevel = \"debug\"\n",
        )
        .unwrap();

        let config = ConfigLoader::new()
            .search_path(&dir)
            .profile("staging")
            .without_env()
            .set("kernel.hook_timeout_ms", 900)
            .load()
            .unwrap();

        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.kernel.hook_timeout_ms, Some(900));
        assert_eq!(config.plugins["audit"]["retention"], 5);
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn test_invalid_file_fails_validation() {
        let dir = scratch_dir("invalid");
        let path = dir.join("keystone.toml");
        std::fs::write(&path, "[kernel]\nhook_timeout_ms = 0\n").unwrap();

        let err = load_config_from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
    }

    #[cfg(feature = "toml-config")]
    #[test]
    fn test_malformed_file_is_parse_error() {
        let dir = scratch_dir("malformed");
        let path = dir.join("keystone.toml");
        std::fs::write(&path, "[logging]\nlevel = \"loud\"\n").unwrap();

        let err = ConfigLoader::new().file(&path).without_env().load().unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
