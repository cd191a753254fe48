//! Configuration validation utilities.

use keystone_kernel::PluginDescriptor;

use super::error::{ConfigError, ConfigResult};
use super::schema::{KernelSettings, KeystoneConfig, LogOutput, LoggingConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &KeystoneConfig) -> ConfigResult<()> {
    validate_logging_config(&config.logging)?;
    validate_kernel_settings(&config.kernel)?;
    validate_plugin_sections(config)?;
    Ok(())
}

fn validate_logging_config(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::validation(
            "logging.output = \"file\" requires logging.file_path",
        ));
    }

    if let Some(target) = logging.filters.keys().find(|t| t.trim().is_empty()) {
        return Err(ConfigError::validation(format!(
            "Log filter target cannot be blank: {target:?}"
        )));
    }

    Ok(())
}

fn validate_kernel_settings(kernel: &KernelSettings) -> ConfigResult<()> {
    if kernel.hook_timeout_ms == Some(0) {
        return Err(ConfigError::validation(
            "kernel.hook_timeout_ms must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_plugin_sections(config: &KeystoneConfig) -> ConfigResult<()> {
    let mut ids: Vec<&String> = config.plugins.keys().collect();
    ids.sort();

    match ids.into_iter().find(|id| !PluginDescriptor::is_valid_id(id)) {
        Some(id) => Err(ConfigError::InvalidPluginId(id.clone())),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LogLevel;

    #[test]
    fn test_validate_default_config() {
        assert!(validate_config(&KeystoneConfig::default()).is_ok());
    }

    #[test]
    fn test_file_output_needs_path() {
        let mut config = KeystoneConfig::default();
        config.logging.output = LogOutput::File;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::Validation { .. })
        ));

        config.logging.file_path = Some("keystone.log".into());
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_blank_filter_target() {
        let mut config = KeystoneConfig::default();
        config.logging.filters.insert(" ".into(), LogLevel::Debug);
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_zero_hook_timeout() {
        let mut config = KeystoneConfig::default();
        config.kernel.hook_timeout_ms = Some(0);
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_invalid_plugin_section_key() {
        let mut config = KeystoneConfig::default();
        config.plugins.insert("audit".into(), serde_json::json!({}));
        config.plugins.insert("bad:id".into(), serde_json::json!({}));

        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidPluginId(ref id) if id == "bad:id"));
    }
}
