//! High-level EWS client.
//!
//! One async method per supported operation, each returning the normalized
//! response. All methods share a single session and transport.

use crate::config::ClientConfig;
use crate::error::EwsError;
use crate::fanout;
use crate::negotiator::{Negotiated, Negotiator};
use crate::operation::Operation;
use crate::operations::{
    ConvertId, DeleteItem, GetInboxRules, GetItem, GetSearchableMailboxes, GetUserSettings,
    ResolveNames, SearchMailboxes,
};
use crate::session::{CancelToken, Session};
use crate::transport::{HttpTransport, Transport};
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

/// EWS client bound to one account.
#[derive(Debug, Clone)]
pub struct EwsClient {
    negotiator: Arc<Negotiator>,
    max_concurrency: usize,
    cancel: CancelToken,
}

impl EwsClient {
    /// Create a client over an arbitrary transport.
    pub fn new(session: Session, transport: Arc<dyn Transport>) -> Self {
        Self {
            negotiator: Arc::new(Negotiator::new(Arc::new(session), transport)),
            max_concurrency: fanout::default_concurrency(),
            cancel: CancelToken::new(),
        }
    }

    /// Create a client over HTTP from configuration.
    pub fn from_config(config: ClientConfig) -> Result<Self, EwsError> {
        let transport = HttpTransport::new(&config.transport)?;
        let timeout = config.transport.timeout();
        let max_concurrency = config.fanout.max_concurrency;
        let session = config.into_session()?;

        info!(
            username = session.credential().username(),
            endpoints = session.endpoints().len(),
            versions = session.versions().len(),
            impersonating = session.impersonate_as().is_some(),
            "EWS client configured"
        );

        let negotiator = Negotiator::new(Arc::new(session), Arc::new(transport)).with_timeout(timeout);
        Ok(Self {
            negotiator: Arc::new(negotiator),
            max_concurrency,
            cancel: CancelToken::new(),
        })
    }

    /// Use `cancel` for every subsequent call.
    pub fn with_cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn negotiator(&self) -> &Negotiator {
        &self.negotiator
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Run any operation and return the full negotiation record.
    pub async fn execute(&self, operation: &dyn Operation) -> Result<Negotiated, EwsError> {
        self.negotiator.negotiate(operation, &self.cancel).await
    }

    /// Run independent operations concurrently, one result per operation.
    pub async fn execute_all(
        &self,
        operations: Vec<Arc<dyn Operation>>,
    ) -> Vec<Result<Negotiated, EwsError>> {
        fanout::run_all(
            Arc::clone(&self.negotiator),
            operations,
            self.max_concurrency,
            self.cancel.clone(),
        )
        .await
    }

    async fn run(&self, operation: &dyn Operation) -> Result<Value, EwsError> {
        Ok(self.execute(operation).await?.result)
    }

    /// Mailbox that requests act on.
    fn mailbox(&self) -> &str {
        let session = self.negotiator.session();
        session
            .impersonate_as()
            .unwrap_or_else(|| session.credential().username())
    }

    pub async fn get_user_settings(&self, user: Option<String>) -> Result<Value, EwsError> {
        self.run(&GetUserSettings::new(user)).await
    }

    pub async fn resolve_names(&self, user: Option<String>) -> Result<Value, EwsError> {
        self.run(&ResolveNames::new(user)).await
    }

    pub async fn get_searchable_mailboxes(
        &self,
        search_filter: Option<String>,
        expand_group_membership: bool,
    ) -> Result<Value, EwsError> {
        self.run(&GetSearchableMailboxes::new(search_filter, expand_group_membership))
            .await
    }

    pub async fn search_mailboxes(
        &self,
        query: &str,
        reference_ids: Vec<String>,
        scope: &str,
    ) -> Result<Value, EwsError> {
        self.run(&SearchMailboxes::new(query, reference_ids, scope)?).await
    }

    pub async fn get_inbox_rules(&self, user: Option<String>) -> Result<Value, EwsError> {
        self.run(&GetInboxRules::new(user)).await
    }

    pub async fn convert_id(
        &self,
        item_id: &str,
        source_format: &str,
        destination_format: &str,
    ) -> Result<Value, EwsError> {
        self.run(&ConvertId::new(self.mailbox(), item_id, source_format, destination_format)?)
            .await
    }

    pub async fn delete_item(&self, item_ids: Vec<String>, delete_type: &str) -> Result<Value, EwsError> {
        self.run(&DeleteItem::new(item_ids, delete_type)?).await
    }

    /// Retrieve an item.
    ///
    /// When every candidate rejects the id as being in the wrong format, the
    /// id is converted to the format the server asked for and the request is
    /// retried once.
    pub async fn get_item(&self, item: GetItem) -> Result<Value, EwsError> {
        let failure = match self.execute(&item).await {
            Ok(negotiated) => return Ok(negotiated.result),
            Err(EwsError::Negotiation(failure)) => failure,
            Err(e) => return Err(e),
        };

        let Some((from, to)) = failure
            .malformed_identifier_hint()
            .map(|(from, to)| (from.to_string(), to.to_string()))
        else {
            return Err(EwsError::Negotiation(failure));
        };

        warn!(
            item_id = item.item_id(),
            from = %from,
            to = %to,
            "Item id rejected as malformed, converting"
        );

        let converted = self.convert_id(item.item_id(), &from, &to).await?;
        let Some(new_id) = first_string(&converted) else {
            warn!(item_id = item.item_id(), "ConvertId returned no id");
            return Err(EwsError::Negotiation(failure));
        };

        self.run(&item.with_item_id(new_id)).await
    }
}

fn first_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => items.iter().find_map(first_string),
        _ => None,
    }
}
