//! Configuration loading from disk and the environment.

use std::fs;
use std::net::SocketAddr;
use std::path::Path;

use crate::config::schema::HarnessConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Environment variable replacing the debug service port.
pub const PORT_ENV: &str = "PORT";
/// Environment variable delaying startup, in seconds.
pub const STARTUP_DELAY_ENV: &str = "STARTUP_DELAY";

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("{name}: invalid value {value:?}")]
    Env { name: &'static str, value: String },

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<HarnessConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: HarnessConfig = toml::from_str(&content)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Resolve the effective configuration: file (or defaults), then environment.
pub fn resolve_config(path: Option<&Path>) -> Result<HarnessConfig, ConfigError> {
    let mut config = match path {
        Some(path) => load_config(path)?,
        None => HarnessConfig::default(),
    };

    apply_env_overrides(&mut config, |name| std::env::var(name).ok())?;
    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Apply `PORT` and `STARTUP_DELAY` overrides.
///
/// The lookup is injected so tests don't have to mutate the process environment.
pub fn apply_env_overrides<F>(config: &mut HarnessConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(value) = lookup(PORT_ENV) {
        let port: u16 = value.trim().parse().map_err(|_| ConfigError::Env {
            name: PORT_ENV,
            value: value.clone(),
        })?;
        let mut addr: SocketAddr = config.debug.bind_address.parse().map_err(|_| {
            ConfigError::Validation(vec![ValidationError::InvalidAddress {
                field: "debug.bind_address",
                value: config.debug.bind_address.clone(),
            }])
        })?;
        addr.set_port(port);
        config.debug.bind_address = addr.to_string();
    }

    if let Some(value) = lookup(STARTUP_DELAY_ENV) {
        config.startup_delay_secs = value.trim().parse().map_err(|_| ConfigError::Env {
            name: STARTUP_DELAY_ENV,
            value: value.clone(),
        })?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn port_env_replaces_debug_port_only() {
        let mut config = HarnessConfig::default();
        apply_env_overrides(&mut config, |name| {
            (name == PORT_ENV).then(|| "9000".to_string())
        })
        .unwrap();

        assert_eq!(config.debug.bind_address, "0.0.0.0:9000");
        assert_eq!(config.control.bind_address, "0.0.0.0:5800");
    }

    #[test]
    fn startup_delay_env_is_parsed() {
        let mut config = HarnessConfig::default();
        apply_env_overrides(&mut config, |name| {
            (name == STARTUP_DELAY_ENV).then(|| "3".to_string())
        })
        .unwrap();
        assert_eq!(config.startup_delay_secs, 3);
    }

    #[test]
    fn bad_port_env_is_rejected() {
        let mut config = HarnessConfig::default();
        let err = apply_env_overrides(&mut config, |name| {
            (name == PORT_ENV).then(|| "eighty".to_string())
        })
        .unwrap_err();
        assert!(matches!(err, ConfigError::Env { name: PORT_ENV, .. }));
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = load_config(Path::new("/nonexistent/harness.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
