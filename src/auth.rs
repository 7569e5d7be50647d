//! Shared-secret auth gate

use anyhow::{Context, Result};
use axum::http::{HeaderMap, HeaderName};

use crate::config::AuthConfig;
use crate::error::GatewayError;

/// Admits a request only when the configured header carries the exact token
#[derive(Debug, Clone)]
pub struct AuthGate {
    header: HeaderName,
    token: String,
}

impl AuthGate {
    pub fn new(header: &str, token: impl Into<String>) -> Result<Self> {
        let header = HeaderName::from_bytes(header.as_bytes())
            .with_context(|| format!("Invalid auth header name: {:?}", header))?;
        Ok(Self {
            header,
            token: token.into(),
        })
    }

    pub fn from_config(config: &AuthConfig) -> Result<Self> {
        Self::new(&config.header, config.token.clone())
    }

    /// Byte-exact comparison of the first header value against the token.
    /// A missing header never matches.
    pub fn admits(&self, headers: &HeaderMap) -> bool {
        headers
            .get(&self.header)
            .map(|value| value.as_bytes() == self.token.as_bytes())
            .unwrap_or(false)
    }

    pub fn check(&self, headers: &HeaderMap) -> Result<(), GatewayError> {
        if self.admits(headers) {
            Ok(())
        } else {
            Err(GatewayError::Unauthorized)
        }
    }
}
