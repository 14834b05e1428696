//! Concrete EWS and Autodiscover operations.

use crate::error::EwsError;
use crate::operation::{Operation, OperationClass, OperationContext};
use crate::parser::AUTODISCOVER_NS;
use quick_xml::escape::escape;

pub const BASE_SHAPES: [&str; 3] = ["IdOnly", "Default", "AllProperties"];
pub const BODY_TYPES: [&str; 3] = ["Best", "HTML", "Text"];
pub const SEARCH_SCOPES: [&str; 3] = ["All", "PrimaryOnly", "ArchiveOnly"];
pub const DELETE_TYPES: [&str; 3] = ["HardDelete", "SoftDelete", "MoveToDeletedItems"];
pub const ID_FORMATS: [&str; 6] = [
    "EntryId",
    "EwsId",
    "EwsLegacyId",
    "HexEntryId",
    "OwaId",
    "StoreId",
];

/// Settings requested by `GetUserSettings`.
pub const USER_SETTINGS: [&str; 10] = [
    "InternalEwsUrl",
    "ExternalEwsUrl",
    "UserDisplayName",
    "UserDN",
    "UserDeploymentId",
    "InternalMailboxServer",
    "MailboxDN",
    "ActiveDirectoryServer",
    "CasVersion",
    "EwsSupportedSchemas",
];

fn choice(value: &str, known: &[&'static str]) -> Result<&'static str, EwsError> {
    known
        .iter()
        .copied()
        .find(|k| *k == value)
        .ok_or_else(|| EwsError::unknown_value(value, known))
}

/// Retrieves Autodiscover settings for a user.
#[derive(Debug, Clone, Default)]
pub struct GetUserSettings {
    user: Option<String>,
}

impl GetUserSettings {
    /// Settings for `user`, or for the authenticated principal when `None`.
    pub fn new(user: Option<String>) -> Self {
        Self { user }
    }
}

impl Operation for GetUserSettings {
    fn name(&self) -> &str {
        "GetUserSettings"
    }

    fn class(&self) -> OperationClass {
        OperationClass::Discovery
    }

    fn render_body(&self, ctx: &OperationContext<'_>) -> String {
        let user = self.user.as_deref().unwrap_or(ctx.principal);
        let settings: String = USER_SETTINGS
            .iter()
            .map(|s| format!("<a:Setting>{}</a:Setting>", s))
            .collect();
        format!(
            "<a:GetUserSettingsRequestMessage xmlns:a=\"{}\"><a:Request><a:Users><a:User>\
             <a:Mailbox>{}</a:Mailbox></a:User></a:Users><a:RequestedSettings>{}\
             </a:RequestedSettings></a:Request></a:GetUserSettingsRequestMessage>",
            AUTODISCOVER_NS,
            escape(user),
            settings
        )
    }

    fn result_key(&self) -> Option<&str> {
        Some("UserSettings")
    }
}

/// Resolves a name or address against the directory.
#[derive(Debug, Clone, Default)]
pub struct ResolveNames {
    user: Option<String>,
}

impl ResolveNames {
    pub fn new(user: Option<String>) -> Self {
        Self { user }
    }
}

impl Operation for ResolveNames {
    fn name(&self) -> &str {
        "ResolveNames"
    }

    fn render_body(&self, ctx: &OperationContext<'_>) -> String {
        let user = self.user.as_deref().unwrap_or(ctx.principal);
        format!(
            "<m:ResolveNames ReturnFullContactData=\"true\"><m:UnresolvedEntry>{}</m:UnresolvedEntry></m:ResolveNames>",
            escape(user)
        )
    }

    fn result_key(&self) -> Option<&str> {
        Some("ResolutionSet")
    }
}

/// Lists mailboxes the principal is allowed to search.
#[derive(Debug, Clone)]
pub struct GetSearchableMailboxes {
    search_filter: Option<String>,
    expand_group_membership: bool,
}

impl GetSearchableMailboxes {
    pub fn new(search_filter: Option<String>, expand_group_membership: bool) -> Self {
        Self {
            search_filter,
            expand_group_membership,
        }
    }
}

impl Default for GetSearchableMailboxes {
    fn default() -> Self {
        Self::new(None, true)
    }
}

impl Operation for GetSearchableMailboxes {
    fn name(&self) -> &str {
        "GetSearchableMailboxes"
    }

    fn render_body(&self, _ctx: &OperationContext<'_>) -> String {
        let filter = match self.search_filter.as_deref() {
            Some(f) => format!("<m:SearchFilter>{}</m:SearchFilter>", escape(f)),
            None => "<m:SearchFilter/>".to_string(),
        };
        format!(
            "<m:GetSearchableMailboxes>{}<m:ExpandGroupMembership>{}</m:ExpandGroupMembership></m:GetSearchableMailboxes>",
            filter, self.expand_group_membership
        )
    }

    fn result_key(&self) -> Option<&str> {
        Some("SearchableMailbox")
    }
}

/// Searches one or more mailboxes with an AQS query (preview results only).
#[derive(Debug, Clone)]
pub struct SearchMailboxes {
    query: String,
    reference_ids: Vec<String>,
    scope: &'static str,
}

impl SearchMailboxes {
    pub fn new(query: impl Into<String>, reference_ids: Vec<String>, scope: &str) -> Result<Self, EwsError> {
        if reference_ids.is_empty() {
            return Err(EwsError::InvalidArgument(
                "at least one mailbox reference id is required".to_string(),
            ));
        }
        Ok(Self {
            query: query.into(),
            reference_ids,
            scope: choice(scope, &SEARCH_SCOPES)?,
        })
    }
}

impl Operation for SearchMailboxes {
    fn name(&self) -> &str {
        "SearchMailboxes"
    }

    fn render_body(&self, _ctx: &OperationContext<'_>) -> String {
        let scopes: String = self
            .reference_ids
            .iter()
            .map(|id| {
                format!(
                    "<t:MailboxSearchScope><t:Mailbox>{}</t:Mailbox><t:SearchScope>{}</t:SearchScope></t:MailboxSearchScope>",
                    escape(id.as_str()),
                    self.scope
                )
            })
            .collect();
        format!(
            "<m:SearchMailboxes><m:SearchQueries><t:MailboxQuery><t:Query>{}</t:Query>\
             <t:MailboxSearchScopes>{}</t:MailboxSearchScopes></t:MailboxQuery></m:SearchQueries>\
             <m:ResultType>PreviewOnly</m:ResultType></m:SearchMailboxes>",
            escape(self.query.as_str()),
            scopes
        )
    }

    fn result_key(&self) -> Option<&str> {
        Some("SearchPreviewItem")
    }
}

/// Retrieves the inbox rules of a mailbox.
#[derive(Debug, Clone, Default)]
pub struct GetInboxRules {
    user: Option<String>,
}

impl GetInboxRules {
    pub fn new(user: Option<String>) -> Self {
        Self { user }
    }
}

impl Operation for GetInboxRules {
    fn name(&self) -> &str {
        "GetInboxRules"
    }

    fn render_body(&self, ctx: &OperationContext<'_>) -> String {
        let user = self.user.as_deref().unwrap_or(ctx.principal);
        format!(
            "<m:GetInboxRules><m:MailboxSmtpAddress>{}</m:MailboxSmtpAddress></m:GetInboxRules>",
            escape(user)
        )
    }

    fn result_key(&self) -> Option<&str> {
        Some("GetInboxRulesResponse")
    }
}

/// Retrieves one item by id.
#[derive(Debug, Clone)]
pub struct GetItem {
    item_id: String,
    change_key: Option<String>,
    base_shape: &'static str,
    body_type: &'static str,
    include_mime_content: bool,
}

impl GetItem {
    /// All properties, best body type, MIME content included.
    pub fn new(item_id: impl Into<String>, change_key: Option<String>) -> Self {
        Self {
            item_id: item_id.into(),
            change_key,
            base_shape: "AllProperties",
            body_type: "Best",
            include_mime_content: true,
        }
    }

    pub fn with_shape(mut self, base_shape: &str, body_type: &str, include_mime_content: bool) -> Result<Self, EwsError> {
        self.base_shape = choice(base_shape, &BASE_SHAPES)?;
        self.body_type = choice(body_type, &BODY_TYPES)?;
        self.include_mime_content = include_mime_content;
        Ok(self)
    }

    pub fn item_id(&self) -> &str {
        &self.item_id
    }

    /// Same request for a different id; the change key is dropped since it
    /// belongs to the old id.
    pub fn with_item_id(mut self, item_id: impl Into<String>) -> Self {
        self.item_id = item_id.into();
        self.change_key = None;
        self
    }
}

impl Operation for GetItem {
    fn name(&self) -> &str {
        "GetItem"
    }

    fn render_body(&self, _ctx: &OperationContext<'_>) -> String {
        let item_id = match self.change_key.as_deref() {
            Some(ck) => format!(
                "<t:ItemId Id=\"{}\" ChangeKey=\"{}\"/>",
                escape(self.item_id.as_str()),
                escape(ck)
            ),
            None => format!("<t:ItemId Id=\"{}\"/>", escape(self.item_id.as_str())),
        };
        format!(
            "<m:GetItem><m:ItemShape><t:BaseShape>{}</t:BaseShape>\
             <t:IncludeMimeContent>{}</t:IncludeMimeContent><t:BodyType>{}</t:BodyType>\
             </m:ItemShape><m:ItemIds>{}</m:ItemIds></m:GetItem>",
            self.base_shape, self.include_mime_content, self.body_type, item_id
        )
    }

    fn result_key(&self) -> Option<&str> {
        Some("Items")
    }
}

/// Converts an item id between formats.
#[derive(Debug, Clone)]
pub struct ConvertId {
    mailbox: String,
    item_id: String,
    source_format: &'static str,
    destination_format: &'static str,
}

impl ConvertId {
    pub fn new(
        mailbox: impl Into<String>,
        item_id: impl Into<String>,
        source_format: &str,
        destination_format: &str,
    ) -> Result<Self, EwsError> {
        Ok(Self {
            mailbox: mailbox.into(),
            item_id: item_id.into(),
            source_format: choice(source_format, &ID_FORMATS)?,
            destination_format: choice(destination_format, &ID_FORMATS)?,
        })
    }
}

impl Operation for ConvertId {
    fn name(&self) -> &str {
        "ConvertId"
    }

    fn render_body(&self, _ctx: &OperationContext<'_>) -> String {
        format!(
            "<m:ConvertId DestinationFormat=\"{}\"><m:SourceIds>\
             <t:AlternateId Format=\"{}\" Id=\"{}\" Mailbox=\"{}\"/></m:SourceIds></m:ConvertId>",
            self.destination_format,
            self.source_format,
            escape(self.item_id.as_str()),
            escape(self.mailbox.as_str())
        )
    }

    fn result_key(&self) -> Option<&str> {
        Some("@Id")
    }
}

/// Deletes items from the store.
#[derive(Debug, Clone)]
pub struct DeleteItem {
    item_ids: Vec<String>,
    delete_type: &'static str,
}

impl DeleteItem {
    pub fn new(item_ids: Vec<String>, delete_type: &str) -> Result<Self, EwsError> {
        if item_ids.is_empty() {
            return Err(EwsError::InvalidArgument("at least one item id is required".to_string()));
        }
        Ok(Self {
            item_ids,
            delete_type: choice(delete_type, &DELETE_TYPES)?,
        })
    }
}

impl Operation for DeleteItem {
    fn name(&self) -> &str {
        "DeleteItem"
    }

    fn render_body(&self, _ctx: &OperationContext<'_>) -> String {
        let ids: String = self
            .item_ids
            .iter()
            .map(|id| format!("<t:ItemId Id=\"{}\"/>", escape(id.as_str())))
            .collect();
        format!(
            "<m:DeleteItem DeleteType=\"{}\"><m:ItemIds>{}</m:ItemIds></m:DeleteItem>",
            self.delete_type, ids
        )
    }
}
