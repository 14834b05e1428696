//! Configuration types for the EWS client.

use crate::error::EwsError;
use crate::fanout::default_concurrency;
use crate::session::{
    compile_patterns, default_endpoints, Credential, Endpoint, Session, DEFAULT_DISCOVERY_PATTERN,
};
use crate::version::ExchangeVersion;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration for the EWS client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Account used for every request
    pub credentials: CredentialsConfig,

    /// Candidate endpoint URLs, in preference order.
    /// Empty means the Office 365 defaults plus ones derived from the
    /// account's domain.
    pub endpoints: Vec<String>,

    /// Candidate versions, in preference order. Empty means the default
    /// list.
    pub versions: Vec<String>,

    /// Mailbox to impersonate (ExchangeImpersonation header)
    pub impersonate_as: Option<String>,

    /// Raw `Authorization` value from an external OAuth2 flow; replaces
    /// basic auth when set
    pub auth_header: Option<String>,

    /// HTTP settings
    pub transport: TransportConfig,

    /// Glob patterns marking an endpoint as discovery-only
    pub discovery_patterns: Vec<String>,

    /// Concurrent negotiation settings
    pub fanout: FanoutConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            credentials: CredentialsConfig::default(),
            endpoints: Vec::new(),
            versions: Vec::new(),
            impersonate_as: None,
            auth_header: None,
            transport: TransportConfig::default(),
            discovery_patterns: vec![DEFAULT_DISCOVERY_PATTERN.to_string()],
            fanout: FanoutConfig::default(),
        }
    }
}

impl ClientConfig {
    /// Versions to negotiate, in order.
    pub fn parsed_versions(&self) -> Result<Vec<ExchangeVersion>, EwsError> {
        if self.versions.is_empty() {
            return Ok(ExchangeVersion::DEFAULT_ORDER.to_vec());
        }
        self.versions.iter().map(|v| v.parse()).collect()
    }

    /// Build the credential, applying `auth_header` if present.
    pub fn credential(&self) -> Result<Credential, EwsError> {
        let credential = Credential::new(
            self.credentials.username.clone(),
            self.credentials.password.clone(),
        )?;
        Ok(match self.auth_header.as_deref().map(str::trim) {
            Some(header) if !header.is_empty() => {
                let token = header.strip_prefix("Bearer ").unwrap_or(header).trim();
                credential.with_bearer_token(token)
            }
            _ => credential,
        })
    }

    /// Validate and produce the immutable session.
    pub fn into_session(self) -> Result<Session, EwsError> {
        let credential = self.credential()?;
        let versions = self.parsed_versions()?;
        let patterns = compile_patterns(&self.discovery_patterns)?;

        let raw_endpoints = if self.endpoints.is_empty() {
            default_endpoints(credential.domain())
        } else {
            self.endpoints
        };
        let endpoints = raw_endpoints
            .iter()
            .map(|raw| Endpoint::parse(raw, &patterns))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Session::new(credential, endpoints, versions)?.impersonating(self.impersonate_as))
    }
}

/// Account credentials.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    /// Principal, usually an SMTP address
    pub username: String,

    /// Secret
    pub password: String,
}

impl std::fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// HTTP transport settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// Per-attempt timeout (seconds)
    pub timeout_secs: u64,

    /// Verify server certificates
    pub verify_tls: bool,

    /// User-Agent header
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            verify_tls: true,
            user_agent: format!("ews-soap-client/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl TransportConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Concurrent negotiation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FanoutConfig {
    /// Maximum negotiations in flight at once
    pub max_concurrency: usize,
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_concurrency(),
        }
    }
}
