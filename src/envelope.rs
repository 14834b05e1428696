//! SOAP envelope construction.
//!
//! Rendering is pure: identical inputs always produce identical bytes.

use crate::parser::{AUTODISCOVER_NS, MESSAGES_NS, SOAP_11_NS, TYPES_NS};
use crate::version::ExchangeVersion;
use quick_xml::escape::escape;

/// WS-Addressing namespace used by Autodiscover headers.
pub const WSA_NS: &str = "http://www.w3.org/2005/08/addressing";
pub const XSI_NS: &str = "http://www.w3.org/2001/XMLSchema-instance";

const AUTODISCOVER_ACTION_PREFIX: &str =
    "http://schemas.microsoft.com/exchange/2010/Autodiscover/Autodiscover/";

/// Header layout for one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect<'a> {
    /// EWS data operation, optionally impersonating another mailbox
    Service { impersonate_as: Option<&'a str> },
    /// Autodiscover operation addressed to an endpoint
    Autodiscover { action: &'a str, to: &'a str },
}

/// A rendered request for one (version, endpoint) attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    version: ExchangeVersion,
    xml: String,
}

impl Envelope {
    pub fn version(&self) -> ExchangeVersion {
        self.version
    }

    pub fn as_str(&self) -> &str {
        &self.xml
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.xml.into_bytes()
    }
}

/// Render an EWS data-operation envelope.
pub fn build(version: ExchangeVersion, body: &str, impersonate_as: Option<&str>) -> Envelope {
    build_with(version, Dialect::Service { impersonate_as }, body)
}

/// Render an envelope in the given dialect around an opaque body fragment.
pub fn build_with(version: ExchangeVersion, dialect: Dialect<'_>, body: &str) -> Envelope {
    let xml = match dialect {
        Dialect::Service { impersonate_as } => {
            let impersonation = impersonate_as
                .map(|smtp| {
                    format!(
                        "<t:ExchangeImpersonation><t:ConnectingSID><t:PrimarySmtpAddress>{}\
                         </t:PrimarySmtpAddress></t:ConnectingSID></t:ExchangeImpersonation>",
                        escape(smtp)
                    )
                })
                .unwrap_or_default();
            format!(
                r#"<?xml version="1.0" encoding="utf-8"?>
<soap:Envelope xmlns:soap="{soap}" xmlns:m="{m}" xmlns:t="{t}" xmlns:xsi="{xsi}">
  <soap:Header><t:RequestServerVersion Version="{version}"/>{impersonation}</soap:Header>
  <soap:Body>{body}</soap:Body>
</soap:Envelope>"#,
                soap = SOAP_11_NS,
                m = MESSAGES_NS,
                t = TYPES_NS,
                xsi = XSI_NS,
                version = version.wire_name(),
                impersonation = impersonation,
                body = body,
            )
        }
        Dialect::Autodiscover { action, to } => format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<soap:Envelope xmlns:soap="{soap}" xmlns:a="{a}" xmlns:wsa="{wsa}" xmlns:xsi="{xsi}">
  <soap:Header><a:RequestedServerVersion>{version}</a:RequestedServerVersion><wsa:Action>{prefix}{action}</wsa:Action><wsa:To>{to}</wsa:To></soap:Header>
  <soap:Body>{body}</soap:Body>
</soap:Envelope>"#,
            soap = SOAP_11_NS,
            a = AUTODISCOVER_NS,
            wsa = WSA_NS,
            xsi = XSI_NS,
            version = version.wire_name(),
            prefix = AUTODISCOVER_ACTION_PREFIX,
            action = escape(action),
            to = escape(to),
            body = body,
        ),
    };

    Envelope { version, xml }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_is_pure() {
        for v in ExchangeVersion::ALL {
            let a = build(v, "<m:GetItem/>", Some("boss@company.com"));
            let b = build(v, "<m:GetItem/>", Some("boss@company.com"));
            assert_eq!(a.as_str().as_bytes(), b.as_str().as_bytes());
            assert_eq!(a.version(), v);
        }
    }

    #[test]
    fn test_service_header() {
        let env = build(ExchangeVersion::Exchange2013Sp1, "<m:GetItem/>", None);
        assert!(env.as_str().contains(r#"<t:RequestServerVersion Version="Exchange2013_SP1"/>"#));
        assert!(!env.as_str().contains("ExchangeImpersonation"));
        assert!(env.as_str().contains("<soap:Body><m:GetItem/></soap:Body>"));
    }

    #[test]
    fn test_impersonation_marker() {
        let env = build(ExchangeVersion::Office365, "<m:GetItem/>", Some("boss@company.com"));
        assert!(env.as_str().contains(r#"Version="Exchange2016""#));
        assert!(env
            .as_str()
            .contains("<t:PrimarySmtpAddress>boss@company.com</t:PrimarySmtpAddress>"));
    }

    #[test]
    fn test_autodiscover_header() {
        let env = build_with(
            ExchangeVersion::Exchange2010,
            Dialect::Autodiscover {
                action: "GetUserSettings",
                to: "https://autodiscover.company.com/autodiscover/autodiscover.svc",
            },
            "<a:GetUserSettingsRequestMessage/>",
        );
        let xml = env.as_str();
        assert!(xml.contains("<a:RequestedServerVersion>Exchange2010</a:RequestedServerVersion>"));
        assert!(xml.contains("Autodiscover/Autodiscover/GetUserSettings</wsa:Action>"));
        assert!(xml.contains("<wsa:To>https://autodiscover.company.com/autodiscover/autodiscover.svc</wsa:To>"));
    }

    #[test]
    fn test_envelope_is_well_formed() {
        let env = build(ExchangeVersion::Exchange2016, "<m:ResolveNames/>", Some("a&b@c.com"));
        let tree = crate::parser::parse_xml(env.as_str().as_bytes()).unwrap();
        assert!(tree.get("Envelope").is_some());
    }
}
