//! Admin API configuration

use serde::Deserialize;

use super::error::ValidationError;

const MIN_TOKEN_LEN: usize = 32;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AdminConfig {
    /// Bearer token for `/api/admin/*`. Admin routes are disabled when unset.
    pub token: Option<String>,
}

impl AdminConfig {
    pub fn is_enabled(&self) -> bool {
        self.token.is_some()
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        match &self.token {
            Some(token) if token.len() < MIN_TOKEN_LEN => Err(ValidationError::AdminTokenTooShort),
            _ => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unset_token_disables_admin() {
        let config = AdminConfig::default();
        assert!(!config.is_enabled());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_short_token_rejected() {
        let config = AdminConfig {
            token: Some("hunter2".to_string()),
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::AdminTokenTooShort)
        ));
    }

    #[test]
    fn test_long_token_accepted() {
        let config = AdminConfig {
            token: Some("a".repeat(40)),
        };
        assert!(config.validate().is_ok());
    }
}
