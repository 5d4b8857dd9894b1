// SPDX-FileCopyrightText: 2026 Haggle Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as minimum channel capacities and non-zero timeouts.

use crate::diagnostic::ConfigError;
use crate::model::HaggleConfig;

/// Smallest mailbox/buffer capacity that keeps the actors from deadlocking
/// under a normal burst of admissions.
const MIN_CAPACITY: usize = 16;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &HaggleConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.session.send_timeout_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "session.send_timeout_secs must be at least 1".to_string(),
        });
    }

    if config.session.mailbox_capacity < MIN_CAPACITY {
        errors.push(ConfigError::Validation {
            message: format!(
                "session.mailbox_capacity must be at least {MIN_CAPACITY}, got {}",
                config.session.mailbox_capacity
            ),
        });
    }

    if config.push.stream_buffer < MIN_CAPACITY {
        errors.push(ConfigError::Validation {
            message: format!(
                "push.stream_buffer must be at least {MIN_CAPACITY}, got {}",
                config.push.stream_buffer
            ),
        });
    }

    if config.roster.mailbox_capacity < MIN_CAPACITY {
        errors.push(ConfigError::Validation {
            message: format!(
                "roster.mailbox_capacity must be at least {MIN_CAPACITY}, got {}",
                config.roster.mailbox_capacity
            ),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let config = HaggleConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn zero_send_timeout_fails_validation() {
        let mut config = HaggleConfig::default();
        config.session.send_timeout_secs = 0;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("send_timeout_secs"))));
    }

    #[test]
    fn tiny_mailbox_fails_validation() {
        let mut config = HaggleConfig::default();
        config.session.mailbox_capacity = 2;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("session.mailbox_capacity"))));
    }

    #[test]
    fn tiny_stream_buffer_fails_validation() {
        let mut config = HaggleConfig::default();
        config.push.stream_buffer = 1;
        let errors = validate_config(&config).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains("push.stream_buffer"))));
    }

    #[test]
    fn all_errors_collected_not_fail_fast() {
        let mut config = HaggleConfig::default();
        config.session.send_timeout_secs = 0;
        config.session.mailbox_capacity = 1;
        config.push.stream_buffer = 1;
        config.roster.mailbox_capacity = 1;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 4, "every violation should be reported");
    }

    #[test]
    fn valid_custom_config_passes() {
        let mut config = HaggleConfig::default();
        config.session.send_timeout_secs = 5;
        config.session.mailbox_capacity = 64;
        config.push.stream_buffer = 64;
        config.roster.mailbox_capacity = 32;
        assert!(validate_config(&config).is_ok());
    }
}
