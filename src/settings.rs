// Settings client: API tokens and proxy configuration
//
// Both are opaque backend state. This module only validates input, forwards
// it, and reports the result as a toast.

use crate::api::{ApiError, Backend, TokenName};
use crate::toast::NotificationQueue;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettingsError {
    Validation(String),
    Api(ApiError),
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation(msg) => write!(f, "Invalid input: {}", msg),
            Self::Api(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for SettingsError {}

impl From<ApiError> for SettingsError {
    fn from(err: ApiError) -> Self {
        Self::Api(err)
    }
}

/// Token state as shown in the settings list
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenStatus {
    pub name: TokenName,
    pub is_set: bool,
    pub value: Option<String>,
}

impl TokenStatus {
    /// Value with everything but the last four characters hidden
    pub fn masked(&self) -> String {
        match &self.value {
            None => "(not set)".to_string(),
            Some(value) => {
                let chars: Vec<char> = value.chars().collect();
                let visible = chars.len().min(4);
                let hidden = chars.len() - visible;
                let tail: String = chars[hidden..].iter().collect();
                format!("{}{}", "*".repeat(hidden.min(12)), tail)
            }
        }
    }
}

#[derive(Clone)]
pub struct Settings {
    backend: Arc<dyn Backend>,
    toasts: NotificationQueue,
}

impl Settings {
    pub fn new(backend: Arc<dyn Backend>, toasts: NotificationQueue) -> Self {
        Self { backend, toasts }
    }

    pub async fn token(&self, name: TokenName) -> Result<TokenStatus, SettingsError> {
        let value = self.backend.get_token(name).await?;
        Ok(TokenStatus {
            name,
            is_set: value.is_some(),
            value,
        })
    }

    /// Status of every known token; failures are reported per token
    pub async fn tokens(&self) -> Vec<Result<TokenStatus, SettingsError>> {
        let mut statuses = Vec::with_capacity(TokenName::ALL.len());
        for name in TokenName::ALL {
            statuses.push(self.token(name).await);
        }
        statuses
    }

    pub async fn set_token(&self, name: TokenName, token: &str) -> Result<String, SettingsError> {
        let token = token.trim();
        let label = name.as_str().to_uppercase();
        if token.is_empty() {
            self.toasts
                .error("Missing Token", format!("Please enter a {} API token", label));
            return Err(SettingsError::Validation("token is empty".into()));
        }

        match self.backend.set_token(name, token).await {
            Ok(message) => {
                tracing::info!("{} token saved", name);
                self.toasts
                    .success("Token Saved", format!("{} API token saved", label));
                Ok(message)
            }
            Err(e) => {
                tracing::warn!("Saving {} token failed: {}", name, e);
                self.toasts.error(
                    "Error",
                    e.user_message(&format!("Failed to save {} API token", label)),
                );
                Err(e.into())
            }
        }
    }

    pub async fn proxy_config(&self) -> Result<serde_json::Value, SettingsError> {
        Ok(self.backend.get_proxy_config().await?)
    }

    /// Save the proxy config; it must be a JSON object
    pub async fn set_proxy_config(
        &self,
        config: &serde_json::Value,
    ) -> Result<String, SettingsError> {
        if !config.is_object() {
            self.toasts
                .error("Invalid Configuration", "Proxy configuration must be a JSON object");
            return Err(SettingsError::Validation(
                "proxy config must be an object".into(),
            ));
        }

        match self.backend.set_proxy_config(config).await {
            Ok(message) => {
                self.toasts
                    .success("Proxy Saved", "Proxy configuration saved");
                Ok(message)
            }
            Err(e) => {
                self.toasts
                    .error("Error", e.user_message("Failed to save proxy configuration"));
                Err(e.into())
            }
        }
    }
}
