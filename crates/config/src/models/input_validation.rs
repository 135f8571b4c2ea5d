use crate::validation::ConfigValidator;
use serde::{Deserialize, Serialize};

/// Inbound message hygiene settings for the validation stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputValidationConfig {
    pub enable_validation: bool,
    pub require_correlation_id: bool,
    pub max_message_age_days: u32,
    pub fail_on_validator_exception: bool,
    pub block_sql_injection: bool,
    pub block_nosql_injection: bool,
    pub block_command_injection: bool,
    pub block_path_traversal: bool,
    pub block_ldap_injection: bool,
    pub block_html_content: bool,
    pub allow_control_characters: bool,
    pub allow_null_bytes: bool,
    pub max_string_length: usize,
    pub max_message_size_bytes: usize,
    pub max_object_depth: usize,
}

impl Default for InputValidationConfig {
    fn default() -> Self {
        Self {
            enable_validation: true,
            require_correlation_id: true,
            max_message_age_days: 7,
            fail_on_validator_exception: true,
            block_sql_injection: true,
            block_nosql_injection: true,
            block_command_injection: true,
            block_path_traversal: true,
            block_ldap_injection: true,
            block_html_content: true,
            allow_control_characters: false,
            allow_null_bytes: false,
            max_string_length: 10_000,
            max_message_size_bytes: 1024 * 1024,
            max_object_depth: 10,
        }
    }
}

impl ConfigValidator for InputValidationConfig {
    fn validate(&self) -> crate::ConfigResult<()> {
        if self.max_message_age_days == 0 {
            return Err(crate::ConfigError::Validation(
                "input_validation.max_message_age_days must be greater than 0".to_string(),
            ));
        }
        if self.max_string_length == 0 || self.max_message_size_bytes == 0 {
            return Err(crate::ConfigError::Validation(
                "input_validation size limits must be greater than 0".to_string(),
            ));
        }
        if self.max_object_depth == 0 {
            return Err(crate::ConfigError::Validation(
                "input_validation.max_object_depth must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = InputValidationConfig::default();
        assert!(config.enable_validation);
        assert!(config.require_correlation_id);
        assert_eq!(config.max_message_age_days, 7);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: InputValidationConfig =
            toml::from_str("require_correlation_id = false").expect("parse");
        assert!(!config.require_correlation_id);
        assert_eq!(config.max_string_length, 10_000);
    }

    #[test]
    fn test_zero_age_rejected() {
        let config = InputValidationConfig {
            max_message_age_days: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
