//! EWS SOAP client
//!
//! Talks to Exchange Web Services and Autodiscover without knowing in
//! advance which server version or endpoint will answer. Every request is
//! negotiated across the configured candidate versions and endpoints until
//! one succeeds, and the response is normalized into snake_case JSON.
//!
//! # Features
//!
//! - Version-major negotiation with a full per-attempt audit trail
//! - Response classification (success, recoverable, fatal, transport)
//! - Key normalization with depth-independent result extraction
//! - Discovery/data endpoint routing via glob patterns
//! - Bounded concurrent fan-out of independent operations
//! - Automatic id conversion when the server rejects an id's format
//!
//! # Example
//!
//! ```ignore
//! use ews_soap_client::{ClientConfig, EwsClient};
//!
//! let config: ClientConfig = serde_yaml::from_str(&yaml)?;
//! let client = EwsClient::from_config(config)?;
//! let rules = client.get_inbox_rules(None).await?;
//! ```

pub mod classifier;
pub mod client;
pub mod config;
pub mod envelope;
pub mod error;
pub mod fanout;
pub mod negotiator;
pub mod normalizer;
pub mod operation;
pub mod operations;
pub mod parser;
pub mod session;
pub mod transport;
pub mod version;

pub use client::EwsClient;
pub use config::ClientConfig;
pub use error::{AttemptOutcome, AttemptRecord, EwsError, NegotiationFailed};
pub use negotiator::{Negotiated, Negotiator};
pub use operation::{Operation, OperationClass, OperationContext};
pub use session::{CancelToken, Credential, Endpoint, Session};
pub use transport::{HttpTransport, Transport};
pub use version::ExchangeVersion;
