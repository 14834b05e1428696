//! Version and endpoint negotiation.
//!
//! Every operation is tried against the cross product of configured versions
//! and endpoints, version-major: all endpoints are tried at the preferred
//! version before falling back to the next one. The first successful
//! response wins. Every other outcome (recoverable, fatal or transport) is
//! recorded and the next candidate is tried.
//!
//! Attempts are strictly sequential and each one is bounded by the
//! configured timeout, so a negotiation takes at most
//! `timeout * eligible candidates`.

use crate::classifier::{self, ResponseOutcome};
use crate::envelope::{self, Dialect, Envelope};
use crate::error::{AttemptRecord, EwsError, NegotiationFailed};
use crate::normalizer::normalize;
use crate::operation::{Operation, OperationClass, OperationContext};
use crate::session::{CancelToken, Endpoint, Session};
use crate::transport::Transport;
use crate::version::ExchangeVersion;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Default per-attempt timeout.
pub const DEFAULT_ATTEMPT_TIMEOUT: Duration = Duration::from_secs(30);

/// Successful negotiation result.
#[derive(Debug, Clone, Serialize)]
pub struct Negotiated {
    /// Normalized response payload
    pub result: Value,
    /// Version the server accepted
    pub version: ExchangeVersion,
    /// Endpoint that answered
    pub endpoint: String,
    /// Every attempt made, the successful one last
    pub attempts: Vec<AttemptRecord>,
}

/// Drives operations across the session's candidate list.
#[derive(Clone)]
pub struct Negotiator {
    session: Arc<Session>,
    transport: Arc<dyn Transport>,
    timeout: Duration,
}

impl Negotiator {
    pub fn new(session: Arc<Session>, transport: Arc<dyn Transport>) -> Self {
        Self {
            session,
            transport,
            timeout: DEFAULT_ATTEMPT_TIMEOUT,
        }
    }

    /// Override the per-attempt timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Upper bound on wall-clock time for one negotiation of `class`.
    pub fn worst_case_duration(&self, class: OperationClass) -> Duration {
        let eligible = self.eligible_endpoints(class).count() * self.session.versions().len();
        u32::try_from(eligible)
            .ok()
            .and_then(|n| self.timeout.checked_mul(n))
            .unwrap_or(Duration::MAX)
    }

    fn eligible_endpoints(&self, class: OperationClass) -> impl Iterator<Item = &Endpoint> {
        self.session
            .endpoints()
            .iter()
            .filter(move |endpoint| endpoint.accepts(class))
    }

    /// Negotiate a single operation.
    ///
    /// Returns the first successful, normalized response. Fails with
    /// `EwsError::Negotiation` when every candidate has been tried, or with
    /// `EwsError::Cancelled` when `cancel` fires between attempts.
    pub async fn negotiate(
        &self,
        operation: &dyn Operation,
        cancel: &CancelToken,
    ) -> Result<Negotiated, EwsError> {
        let class = operation.class();
        let ctx = OperationContext {
            principal: self.session.credential().username(),
        };
        let body = operation.render_body(&ctx);
        let mut attempts: Vec<AttemptRecord> = Vec::new();

        for &version in self.session.versions() {
            for endpoint in self.session.endpoints() {
                if !endpoint.accepts(class) {
                    debug!(
                        operation = operation.name(),
                        endpoint = %endpoint,
                        "Skipping endpoint of the wrong class"
                    );
                    continue;
                }

                if cancel.is_cancelled() {
                    for record in &attempts {
                        info!(
                            operation = operation.name(),
                            version = %record.version,
                            endpoint = %record.endpoint,
                            attempt = record.index,
                            outcome = %record.outcome,
                            "Attempt before cancellation"
                        );
                    }
                    info!(
                        operation = operation.name(),
                        attempts = attempts.len(),
                        "Negotiation cancelled"
                    );
                    return Err(EwsError::Cancelled { attempts });
                }

                let index = attempts.len() + 1;
                let envelope = self.envelope_for(operation, class, version, endpoint, &body);

                debug!(
                    operation = operation.name(),
                    version = %version,
                    endpoint = %endpoint,
                    attempt = index,
                    "Sending request"
                );

                let started_at = Utc::now();
                let start = Instant::now();
                let outcome = match self
                    .transport
                    .send(endpoint, &envelope, self.session.credential(), self.timeout)
                    .await
                {
                    Ok(raw) => classifier::classify(&raw),
                    Err(e) => ResponseOutcome::Transport(e),
                };
                let elapsed = start.elapsed();

                attempts.push(AttemptRecord {
                    index,
                    version,
                    endpoint: endpoint.as_str().to_string(),
                    outcome: outcome.summary(),
                    started_at,
                    elapsed,
                });

                match outcome {
                    ResponseOutcome::Success(tree) => {
                        info!(
                            operation = operation.name(),
                            version = %version,
                            endpoint = %endpoint,
                            attempt = index,
                            elapsed_ms = elapsed.as_millis() as u64,
                            "Operation succeeded"
                        );
                        return Ok(Negotiated {
                            result: normalize(&tree, operation.result_key()),
                            version,
                            endpoint: endpoint.as_str().to_string(),
                            attempts,
                        });
                    }
                    ResponseOutcome::Recoverable { .. } | ResponseOutcome::Transport(_) => {
                        if let Some(record) = attempts.last() {
                            warn!(
                                operation = operation.name(),
                                version = %version,
                                endpoint = %endpoint,
                                attempt = index,
                                outcome = %record.outcome,
                                "Attempt failed, trying next candidate"
                            );
                        }
                    }
                    ResponseOutcome::Fatal { .. } => {
                        if let Some(record) = attempts.last() {
                            error!(
                                operation = operation.name(),
                                version = %version,
                                endpoint = %endpoint,
                                attempt = index,
                                outcome = %record.outcome,
                                "Attempt returned a fatal response, trying next candidate"
                            );
                        }
                    }
                }
            }
        }

        let failure = NegotiationFailed::new(operation.name(), attempts);
        error!(
            operation = operation.name(),
            attempts = failure.attempts().len(),
            "All candidates exhausted"
        );
        Err(EwsError::Negotiation(failure))
    }

    fn envelope_for(
        &self,
        operation: &dyn Operation,
        class: OperationClass,
        version: ExchangeVersion,
        endpoint: &Endpoint,
        body: &str,
    ) -> Envelope {
        let dialect = match class {
            OperationClass::Data => Dialect::Service {
                impersonate_as: self.session.impersonate_as(),
            },
            OperationClass::Discovery => Dialect::Autodiscover {
                action: operation.name(),
                to: endpoint.as_str(),
            },
        };
        envelope::build_with(version, dialect, body)
    }
}

impl std::fmt::Debug for Negotiator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Negotiator")
            .field("session", &self.session)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
