//! Configuration validation for the chat relay.
//!
//! Each config section implements [`Validate`]; [`Config::validate`] runs them
//! all and collects every failure.

use thiserror::Error;

use crate::config::{
    Config, ObservabilityConfig, PurgeConfig, ServerConfig, StoreConfig, UpstreamConfig,
};
use crate::logging::{parse_level, LogFormat};

/// Configuration validation error.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid port for {field}: must be between 1 and 65535")]
    InvalidPort { field: String },

    #[error("Missing required field: {field}")]
    MissingField { field: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Trait for validatable configuration sections.
pub trait Validate {
    /// Validate this configuration section.
    fn validate(&self) -> ValidationResult<()>;
}

impl Config {
    /// Validate the entire configuration.
    pub fn validate(&self) -> ValidationResult<()> {
        let results = [
            self.server.validate(),
            self.store.validate(),
            self.upstream.validate(),
            self.purge.validate(),
            self.observability.validate(),
        ];

        let mut errors: Vec<ValidationError> =
            results.into_iter().filter_map(Result::err).collect();

        if self.upstream.token.as_deref().map_or(true, str::is_empty) {
            tracing::warn!("upstream.token is not set; requests will be sent without credentials");
        }

        if errors.is_empty() {
            Ok(())
        } else if errors.len() == 1 {
            Err(errors.remove(0))
        } else {
            Err(ValidationError::Multiple(errors))
        }
    }
}

impl Validate for ServerConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.port == 0 {
            return Err(ValidationError::InvalidPort {
                field: "server.port".into(),
            });
        }
        if self.host.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "server.host".into(),
            });
        }
        Ok(())
    }
}

impl Validate for StoreConfig {
    fn validate(&self) -> ValidationResult<()> {
        match self.backend.as_str() {
            "memory" => Ok(()),
            "redis" => {
                if self.host.trim().is_empty() {
                    return Err(ValidationError::MissingField {
                        field: "store.host".into(),
                    });
                }
                if self.port == 0 {
                    return Err(ValidationError::InvalidPort {
                        field: "store.port".into(),
                    });
                }
                if self.database < 0 {
                    return Err(ValidationError::InvalidValue {
                        field: "store.database".into(),
                        reason: "must not be negative".into(),
                    });
                }
                Ok(())
            }
            other => Err(ValidationError::InvalidValue {
                field: "store.backend".into(),
                reason: format!("unknown backend '{other}', expected 'redis' or 'memory'"),
            }),
        }
    }
}

impl Validate for UpstreamConfig {
    fn validate(&self) -> ValidationResult<()> {
        let parsed = url::Url::parse(&self.url).map_err(|e| ValidationError::InvalidValue {
            field: "upstream.url".into(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ValidationError::InvalidValue {
                field: "upstream.url".into(),
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            });
        }
        if self.model.trim().is_empty() {
            return Err(ValidationError::MissingField {
                field: "upstream.model".into(),
            });
        }
        if self.timeout_secs == 0 {
            return Err(ValidationError::InvalidValue {
                field: "upstream.timeout_secs".into(),
                reason: "must be greater than 0".into(),
            });
        }
        Ok(())
    }
}

impl Validate for PurgeConfig {
    fn validate(&self) -> ValidationResult<()> {
        if self.interval_secs == 0 {
            return Err(ValidationError::InvalidValue {
                field: "purge.interval_secs".into(),
                reason: "must be greater than 0".into(),
            });
        }
        Ok(())
    }
}

impl Validate for ObservabilityConfig {
    fn validate(&self) -> ValidationResult<()> {
        parse_level(&self.log_level).map_err(|reason| ValidationError::InvalidValue {
            field: "observability.log_level".into(),
            reason,
        })?;
        self.log_format
            .parse::<LogFormat>()
            .map_err(|reason| ValidationError::InvalidValue {
                field: "observability.log_format".into(),
                reason,
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_memory_backend_skips_redis_checks() {
        let store = StoreConfig {
            backend: "memory".into(),
            port: 0,
            ..Default::default()
        };
        assert!(store.validate().is_ok());
    }

    #[test]
    fn test_unknown_backend() {
        let store = StoreConfig {
            backend: "memcached".into(),
            ..Default::default()
        };
        let err = store.validate().unwrap_err();
        assert!(err.to_string().contains("memcached"));
    }

    #[test]
    fn test_upstream_url_must_be_http() {
        let upstream = UpstreamConfig {
            url: "ftp://example.com/chat".into(),
            ..Default::default()
        };
        assert!(matches!(
            upstream.validate(),
            Err(ValidationError::InvalidValue { .. })
        ));

        let upstream = UpstreamConfig {
            url: "not a url".into(),
            ..Default::default()
        };
        assert!(upstream.validate().is_err());
    }

    #[test]
    fn test_zero_purge_interval_rejected() {
        let purge = PurgeConfig { interval_secs: 0 };
        assert!(purge.validate().is_err());
    }

    #[test]
    fn test_log_level_checked() {
        let observability = ObservabilityConfig {
            log_level: "chatty".into(),
            ..Default::default()
        };
        let err = observability.validate().unwrap_err();
        assert!(err.to_string().contains("observability.log_level"));
    }

    #[test]
    fn test_multiple_errors_collected() {
        let mut config = Config::default();
        config.server.port = 0;
        config.purge.interval_secs = 0;
        config.observability.log_format = "xml".into();

        match config.validate() {
            Err(ValidationError::Multiple(errors)) => assert_eq!(errors.len(), 3),
            other => panic!("expected multiple errors, got {other:?}"),
        }
    }
}
