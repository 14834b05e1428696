//! Negotiation session context: credential, candidate endpoints and versions.
//!
//! A `Session` is built once and shared read-only by every negotiation that
//! uses it.

use crate::error::EwsError;
use crate::operation::OperationClass;
use crate::version::ExchangeVersion;
use glob::Pattern;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use url::Url;

/// Default endpoint pattern marking discovery-only (Autodiscover) services.
pub const DEFAULT_DISCOVERY_PATTERN: &str = "*autodiscover*";

/// Well-known Office 365 endpoints tried before any domain-derived ones.
pub const OFFICE365_ENDPOINTS: [&str; 3] = [
    "https://outlook.office365.com/autodiscover/autodiscover.svc",
    "https://outlook.office365.com/EWS/Exchange.asmx",
    "https://autodiscover-s.outlook.com/autodiscover/autodiscover.svc",
];

/// Principal and secret attached to every attempt.
#[derive(Clone)]
pub struct Credential {
    username: String,
    password: String,
    bearer_token: Option<String>,
    domain: Option<String>,
}

impl Credential {
    /// Create a credential from a principal identifier and its secret.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Result<Self, EwsError> {
        let username = username.into();
        if username.trim().is_empty() {
            return Err(EwsError::InvalidCredential(
                "a username is required".to_string(),
            ));
        }
        let domain = username
            .split_once('@')
            .map(|(_, d)| d.to_string())
            .filter(|d| !d.is_empty());
        Ok(Self {
            username,
            password: password.into(),
            bearer_token: None,
            domain,
        })
    }

    /// Use a pre-acquired OAuth2 bearer token instead of basic auth.
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }

    pub fn bearer_token(&self) -> Option<&str> {
        self.bearer_token.as_deref()
    }

    /// Substring after `@` in the username, if any.
    pub fn domain(&self) -> Option<&str> {
        self.domain.as_deref()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &self.username)
            .field("password", &"***")
            .field("bearer_token", &self.bearer_token.as_ref().map(|_| "***"))
            .field("domain", &self.domain)
            .finish()
    }
}

/// Which kind of service an endpoint hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointClass {
    /// Autodiscover service, only carries discovery operations
    Discovery,
    /// EWS service, only carries data operations
    Service,
}

/// One candidate service location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    url: Url,
    class: EndpointClass,
}

impl Endpoint {
    /// Parse an endpoint and classify it against the discovery patterns.
    pub fn parse(raw: &str, discovery_patterns: &[Pattern]) -> Result<Self, EwsError> {
        let url = Url::parse(raw.trim())
            .map_err(|e| EwsError::InvalidEndpoint(format!("{}: {}", raw, e)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(EwsError::InvalidEndpoint(format!(
                "{}: unsupported scheme '{}'",
                raw,
                url.scheme()
            )));
        }
        let class = if discovery_patterns.iter().any(|p| p.matches(url.as_str())) {
            EndpointClass::Discovery
        } else {
            EndpointClass::Service
        };
        Ok(Self { url, class })
    }

    /// Create an endpoint with an explicit class.
    pub fn with_class(url: Url, class: EndpointClass) -> Self {
        Self { url, class }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn as_str(&self) -> &str {
        self.url.as_str()
    }

    pub fn class(&self) -> EndpointClass {
        self.class
    }

    /// Whether an operation of the given class may be sent here.
    pub fn accepts(&self, operation: OperationClass) -> bool {
        matches!(
            (self.class, operation),
            (EndpointClass::Discovery, OperationClass::Discovery)
                | (EndpointClass::Service, OperationClass::Data)
        )
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

/// Compile discovery glob patterns.
pub fn compile_patterns(patterns: &[String]) -> Result<Vec<Pattern>, EwsError> {
    patterns
        .iter()
        .map(|p| {
            Pattern::new(p)
                .map_err(|e| EwsError::Config(format!("invalid discovery pattern '{}': {}", p, e)))
        })
        .collect()
}

/// Default candidate endpoints, optionally extended with ones derived from
/// the credential's domain.
pub fn default_endpoints(domain: Option<&str>) -> Vec<String> {
    let mut endpoints: Vec<String> = OFFICE365_ENDPOINTS.iter().map(|s| s.to_string()).collect();
    if let Some(domain) = domain {
        endpoints.push(format!("https://{}/autodiscover/autodiscover.svc", domain));
        endpoints.push(format!(
            "https://autodiscover.{}/autodiscover/autodiscover.svc",
            domain
        ));
    }
    endpoints
}

/// Immutable context for negotiations.
#[derive(Debug, Clone)]
pub struct Session {
    credential: Credential,
    endpoints: Vec<Endpoint>,
    versions: Vec<ExchangeVersion>,
    impersonate_as: Option<String>,
}

impl Session {
    pub fn new(
        credential: Credential,
        endpoints: Vec<Endpoint>,
        versions: Vec<ExchangeVersion>,
    ) -> Result<Self, EwsError> {
        if endpoints.is_empty() {
            return Err(EwsError::Config("at least one endpoint is required".to_string()));
        }
        if versions.is_empty() {
            return Err(EwsError::Config("at least one version is required".to_string()));
        }
        Ok(Self {
            credential,
            endpoints,
            versions,
            impersonate_as: None,
        })
    }

    /// Act on behalf of another mailbox (ExchangeImpersonation header).
    pub fn impersonating(mut self, smtp_address: Option<String>) -> Self {
        self.impersonate_as = smtp_address.filter(|s| !s.is_empty());
        self
    }

    pub fn credential(&self) -> &Credential {
        &self.credential
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    pub fn versions(&self) -> &[ExchangeVersion] {
        &self.versions
    }

    pub fn impersonate_as(&self) -> Option<&str> {
        self.impersonate_as.as_deref()
    }
}

/// Cooperative cancellation flag, checked before each attempt.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
