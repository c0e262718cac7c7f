use crate::config::{Config, ServerConfig};
use crate::error::{Error, Result};
use std::collections::HashSet;

/// Validates a single server configuration
pub fn validate_server_config(config: &ServerConfig) -> Result<()> {
    if config.id.trim().is_empty() {
        return Err(Error::ConfigInvalid("Server has empty id".to_string()));
    }

    if config.command.is_empty() {
        return Err(Error::ConfigInvalid(format!(
            "Server '{}' has empty command",
            config.id
        )));
    }

    if config.port == 0 {
        return Err(Error::ConfigInvalid(format!(
            "Server '{}' has port 0; a concrete listening port is required for probing",
            config.id
        )));
    }

    if !config.health_endpoint.starts_with('/') {
        return Err(Error::ConfigInvalid(format!(
            "Server '{}' health endpoint '{}' must start with '/'",
            config.id, config.health_endpoint
        )));
    }

    if config.probe_interval_secs == Some(0) {
        return Err(Error::ConfigInvalid(format!(
            "Server '{}' has a zero probe interval",
            config.id
        )));
    }

    Ok(())
}

/// Validates a list of server configurations
pub fn validate_server_configs(configs: &[ServerConfig]) -> Result<()> {
    let mut seen_ids = HashSet::new();
    let mut seen_ports = HashSet::new();

    for config in configs {
        validate_server_config(config)?;

        if !seen_ids.insert(config.id.as_str()) {
            return Err(Error::ConfigInvalid(format!(
                "Duplicate server id '{}'",
                config.id
            )));
        }

        if !seen_ports.insert(config.port) {
            return Err(Error::ConfigInvalid(format!(
                "Server '{}' reuses port {} already assigned to another server",
                config.id, config.port
            )));
        }
    }

    Ok(())
}

/// Full configuration validation
pub fn validate_config(config: &Config) -> Result<()> {
    validate_server_configs(&config.servers)?;

    if config.monitor.probe_interval_secs == 0 {
        return Err(Error::ConfigInvalid(
            "Probe interval must be non-zero".to_string(),
        ));
    }

    if config.monitor.probe_timeout_secs == 0 {
        return Err(Error::ConfigInvalid(
            "Probe timeout must be non-zero".to_string(),
        ));
    }

    if config.restart.base_delay_secs == 0 {
        return Err(Error::ConfigInvalid(
            "Restart base delay must be non-zero".to_string(),
        ));
    }

    Ok(())
}
