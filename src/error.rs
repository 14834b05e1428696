//! Error types for the EWS SOAP client.
//!
//! Per-attempt failures (`TransportError`, `RecoverableKind`, `FatalKind`) are
//! plain values recorded by the negotiator. Only `EwsError` is propagated to
//! callers.

use crate::version::ExchangeVersion;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// EWS client errors.
#[derive(Error, Debug)]
pub enum EwsError {
    #[error("Invalid Exchange version: {0}")]
    InvalidVersion(String),

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("XML parsing error: {0}")]
    XmlParse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Negotiation cancelled after {} attempt(s)", .attempts.len())]
    Cancelled { attempts: Vec<AttemptRecord> },

    #[error("Task failed: {0}")]
    TaskFailed(String),

    #[error(transparent)]
    Negotiation(#[from] NegotiationFailed),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EwsError {
    /// Build an `InvalidArgument` error for a value outside a known set.
    pub fn unknown_value(provided: &str, known: &[&str]) -> Self {
        Self::InvalidArgument(format!(
            "'{}' is not one of: {}",
            provided,
            known.join(", ")
        ))
    }
}

/// Cause tag of a transport-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportErrorKind {
    /// Connection refused, DNS failure, TLS handshake failure
    Connection,
    /// Per-attempt timeout elapsed
    Timeout,
    /// Malformed HTTP exchange or unusable HTTP status
    Protocol,
    /// Response body was empty or not parseable XML
    EmptyOrMalformed,
    /// Anything else
    Unknown,
}

impl TransportErrorKind {
    /// Get the string code for this kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connection => "CONNECTION",
            Self::Timeout => "TIMEOUT",
            Self::Protocol => "PROTOCOL",
            Self::EmptyOrMalformed => "EMPTY_OR_MALFORMED",
            Self::Unknown => "UNKNOWN",
        }
    }
}

/// A failed network round trip for one candidate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind.as_str(), self.message)
    }
}

/// Server-reported errors after which the next candidate may succeed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecoverableKind {
    /// `ErrorAccessDenied`
    AccessDenied,
    /// `ErrorInvalidIdMalformed` with the id formats named in the message
    MalformedIdentifier { from: String, to: String },
    /// Another recognised status code
    OtherKnownCode { code: String },
}

impl RecoverableKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccessDenied => "ACCESS_DENIED",
            Self::MalformedIdentifier { .. } => "MALFORMED_IDENTIFIER",
            Self::OtherKnownCode { .. } => "OTHER_KNOWN_CODE",
        }
    }
}

/// Server-reported errors that do not match any recoverable sentinel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FatalKind {
    /// SOAP fault (`faultcode` / `faultstring`)
    Fault { code: Option<String> },
    /// Unrecognised status code, or no status signal at all
    UnknownCode { code: Option<String> },
}

impl FatalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fault { .. } => "FAULT",
            Self::UnknownCode { .. } => "UNKNOWN_CODE",
        }
    }
}

/// Payload-free summary of a single attempt's outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttemptOutcome {
    Succeeded,
    Recoverable {
        kind: RecoverableKind,
        message: Option<String>,
    },
    Fatal {
        kind: FatalKind,
        message: Option<String>,
    },
    Transport(TransportError),
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Succeeded => write!(f, "success"),
            Self::Recoverable { kind, message } => {
                write!(f, "recoverable [{}]", kind.as_str())?;
                match kind {
                    RecoverableKind::MalformedIdentifier { from, to } => {
                        write!(f, " {} -> {}", from, to)?
                    }
                    RecoverableKind::OtherKnownCode { code } => write!(f, " {}", code)?,
                    RecoverableKind::AccessDenied => {}
                }
                if let Some(m) = message {
                    write!(f, ": {}", m)?;
                }
                Ok(())
            }
            Self::Fatal { kind, message } => {
                write!(f, "fatal [{}]", kind.as_str())?;
                match kind {
                    FatalKind::Fault { code: Some(c) } | FatalKind::UnknownCode { code: Some(c) } => {
                        write!(f, " {}", c)?
                    }
                    _ => {}
                }
                if let Some(m) = message {
                    write!(f, ": {}", m)?;
                }
                Ok(())
            }
            Self::Transport(e) => write!(f, "transport {}", e),
        }
    }
}

/// One (version, endpoint) attempt made during a negotiation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    /// 1-based position in the negotiation
    pub index: usize,
    pub version: ExchangeVersion,
    pub endpoint: String,
    pub outcome: AttemptOutcome,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
}

/// Every candidate was tried and none succeeded.
#[derive(Error, Debug, Clone)]
pub struct NegotiationFailed {
    operation: String,
    attempts: Vec<AttemptRecord>,
}

impl NegotiationFailed {
    pub fn new(operation: impl Into<String>, attempts: Vec<AttemptRecord>) -> Self {
        Self {
            operation: operation.into(),
            attempts,
        }
    }

    /// Name of the operation that was being negotiated.
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Every attempt in the order it was made.
    pub fn attempts(&self) -> &[AttemptRecord] {
        &self.attempts
    }

    /// Source and destination id formats if any attempt reported a
    /// malformed identifier that needs conversion.
    pub fn malformed_identifier_hint(&self) -> Option<(&str, &str)> {
        self.attempts.iter().find_map(|a| match &a.outcome {
            AttemptOutcome::Recoverable {
                kind: RecoverableKind::MalformedIdentifier { from, to },
                ..
            } => Some((from.as_str(), to.as_str())),
            _ => None,
        })
    }

    fn count(&self, pred: impl Fn(&AttemptOutcome) -> bool) -> usize {
        self.attempts.iter().filter(|a| pred(&a.outcome)).count()
    }
}

impl fmt::Display for NegotiationFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let recoverable = self.count(|o| matches!(o, AttemptOutcome::Recoverable { .. }));
        let fatal = self.count(|o| matches!(o, AttemptOutcome::Fatal { .. }));
        let transport = self.count(|o| matches!(o, AttemptOutcome::Transport(_)));
        write!(
            f,
            "{} failed on all {} candidate(s) ({} recoverable, {} fatal, {} transport)",
            self.operation,
            self.attempts.len(),
            recoverable,
            fatal,
            transport
        )?;
        for a in &self.attempts {
            write!(
                f,
                "\n  #{} {} @ {}: {}",
                a.index,
                a.version.as_str(),
                a.endpoint,
                a.outcome
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(index: usize, outcome: AttemptOutcome) -> AttemptRecord {
        AttemptRecord {
            index,
            version: ExchangeVersion::Exchange2016,
            endpoint: format!("https://e{}.example.com/EWS/Exchange.asmx", index),
            outcome,
            started_at: Utc::now(),
            elapsed: Duration::from_millis(5),
        }
    }

    #[test]
    fn test_kind_codes() {
        assert_eq!(TransportErrorKind::Timeout.as_str(), "TIMEOUT");
        assert_eq!(RecoverableKind::AccessDenied.as_str(), "ACCESS_DENIED");
        assert_eq!(FatalKind::Fault { code: None }.as_str(), "FAULT");
    }

    #[test]
    fn test_malformed_identifier_hint() {
        let failed = NegotiationFailed::new(
            "GetItem",
            vec![
                record(
                    1,
                    AttemptOutcome::Transport(TransportError::new(
                        TransportErrorKind::Connection,
                        "refused",
                    )),
                ),
                record(
                    2,
                    AttemptOutcome::Recoverable {
                        kind: RecoverableKind::MalformedIdentifier {
                            from: "EwsLegacyId".to_string(),
                            to: "EwsId".to_string(),
                        },
                        message: None,
                    },
                ),
            ],
        );
        assert_eq!(failed.malformed_identifier_hint(), Some(("EwsLegacyId", "EwsId")));
    }

    #[test]
    fn test_negotiation_failed_display() {
        let failed = NegotiationFailed::new(
            "ResolveNames",
            vec![
                record(
                    1,
                    AttemptOutcome::Recoverable {
                        kind: RecoverableKind::AccessDenied,
                        message: Some("denied".to_string()),
                    },
                ),
                record(
                    2,
                    AttemptOutcome::Fatal {
                        kind: FatalKind::UnknownCode { code: None },
                        message: None,
                    },
                ),
            ],
        );
        let text = failed.to_string();
        assert!(text.starts_with("ResolveNames failed on all 2 candidate(s)"));
        assert!(text.contains("1 recoverable, 1 fatal, 0 transport"));
        assert!(text.contains("ACCESS_DENIED"));
        assert!(failed.malformed_identifier_hint().is_none());
    }
}
