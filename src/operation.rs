//! The capability every EWS call implements.
//!
//! An operation only renders its body fragment and names the repeated element
//! it wants back. Envelopes, endpoint choice and version choice are handled
//! by the negotiator.

/// Whether an operation locates the service or acts against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationClass {
    /// Autodiscover operation, only sent to discovery endpoints
    Discovery,
    /// Regular EWS operation, never sent to discovery endpoints
    Data,
}

/// Values an operation may need while rendering its body.
#[derive(Debug, Clone, Copy)]
pub struct OperationContext<'a> {
    /// Authenticated principal, used as the default mailbox
    pub principal: &'a str,
}

/// A single EWS or Autodiscover request type.
pub trait Operation: Send + Sync {
    /// Element name of the request, e.g. `GetItem`.
    fn name(&self) -> &str;

    fn class(&self) -> OperationClass {
        OperationClass::Data
    }

    /// Body fragment placed inside `soap:Body`.
    fn render_body(&self, ctx: &OperationContext<'_>) -> String;

    /// Repeated element to extract from the response, wherever it is nested.
    fn result_key(&self) -> Option<&str> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Ping;

    impl Operation for Ping {
        fn name(&self) -> &str {
            "Ping"
        }

        fn render_body(&self, ctx: &OperationContext<'_>) -> String {
            format!("<m:Ping>{}</m:Ping>", ctx.principal)
        }
    }

    #[test]
    fn test_defaults() {
        let op = Ping;
        assert_eq!(op.class(), OperationClass::Data);
        assert!(op.result_key().is_none());
        let ctx = OperationContext { principal: "a@b.com" };
        assert_eq!(op.render_body(&ctx), "<m:Ping>a@b.com</m:Ping>");
    }
}
