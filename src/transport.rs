//! HTTP transport for SOAP attempts.
//!
//! One `send` call is exactly one network round trip. Failures come back as
//! `TransportError` values so the negotiator can record them and move on.

use crate::classifier::StatusSignals;
use crate::config::TransportConfig;
use crate::envelope::Envelope;
use crate::error::{EwsError, TransportError, TransportErrorKind};
use crate::parser::parse_xml;
use crate::session::{Credential, Endpoint};
use async_trait::async_trait;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

/// Content type for SOAP 1.1 requests.
pub const SOAP_CONTENT_TYPE: &str = "text/xml; charset=utf-8";

/// Performs a single request/response exchange with one endpoint.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        endpoint: &Endpoint,
        envelope: &Envelope,
        credential: &Credential,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError>;
}

/// reqwest-backed transport.
///
/// The underlying client pools connections and is cheap to clone.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
}

impl HttpTransport {
    pub fn new(config: &TransportConfig) -> Result<Self, EwsError> {
        let client = Client::builder()
            .danger_accept_invalid_certs(!config.verify_tls)
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| EwsError::Config(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Wrap an existing reqwest client.
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        endpoint: &Endpoint,
        envelope: &Envelope,
        credential: &Credential,
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        let mut request = self
            .client
            .post(endpoint.url().clone())
            .timeout(timeout)
            .header(CONTENT_TYPE, HeaderValue::from_static(SOAP_CONTENT_TYPE))
            .body(envelope.as_str().to_owned());

        request = match credential.bearer_token() {
            Some(token) => request.bearer_auth(token),
            None => request.basic_auth(credential.username(), Some(credential.password())),
        };

        let response = request.send().await.map_err(from_request_error)?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(from_request_error)?;

        debug!(
            endpoint = %endpoint,
            status = status.as_u16(),
            body_len = bytes.len(),
            "Received SOAP response"
        );

        if !status.is_success() {
            check_error_body(status, &bytes)?;
        }

        Ok(bytes.to_vec())
    }
}

/// Decide whether a non-2xx body is worth classifying.
///
/// EWS sends SOAP faults and error responses with HTTP 500, so a body that
/// parses and carries a status code is passed on. Anything else (an empty
/// body, an IIS error page, a proxy's HTML) becomes a `Protocol` error that
/// keeps the HTTP status.
pub fn check_error_body(status: reqwest::StatusCode, body: &[u8]) -> Result<(), TransportError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(TransportError::new(
            TransportErrorKind::Protocol,
            format!("HTTP {} with empty body", status),
        ));
    }
    match parse_xml(body) {
        Ok(tree) if StatusSignals::extract(&tree).has_status() => Ok(()),
        Ok(_) => Err(TransportError::new(
            TransportErrorKind::Protocol,
            format!("HTTP {} without a SOAP status", status),
        )),
        Err(e) => Err(TransportError::new(
            TransportErrorKind::Protocol,
            format!("HTTP {} with unparseable body: {}", status, e),
        )),
    }
}

/// Map a reqwest failure to its cause tag.
pub fn from_request_error(error: reqwest::Error) -> TransportError {
    let kind = if error.is_timeout() {
        TransportErrorKind::Timeout
    } else if error.is_connect() {
        TransportErrorKind::Connection
    } else if error.is_request() || error.is_body() || error.is_decode() || error.is_redirect() {
        TransportErrorKind::Protocol
    } else {
        TransportErrorKind::Unknown
    };
    TransportError::new(kind, error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{compile_patterns, DEFAULT_DISCOVERY_PATTERN};
    use crate::version::ExchangeVersion;
    use std::net::SocketAddr;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    fn endpoint(addr: SocketAddr) -> Endpoint {
        let patterns = compile_patterns(&[DEFAULT_DISCOVERY_PATTERN.to_string()]).unwrap();
        Endpoint::parse(&format!("http://{}/EWS/Exchange.asmx", addr), &patterns).unwrap()
    }

    async fn send_to(addr: SocketAddr, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        let envelope = crate::envelope::build(ExchangeVersion::Exchange2016, "<m:GetItem/>", None);
        let credential = Credential::new("a@b.com", "x").unwrap();
        let transport = HttpTransport::new(&TransportConfig::default()).unwrap();
        transport
            .send(&endpoint(addr), &envelope, &credential, timeout)
            .await
    }

    /// Read one request (headers plus Content-Length body).
    async fn read_request(stream: &mut TcpStream) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let headers = String::from_utf8_lossy(&buf[..end]).to_ascii_lowercase();
            let length = headers
                .lines()
                .find_map(|l| l.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + length {
                return;
            }
        }
    }

    /// Serve a single canned HTTP response.
    async fn serve_once(response: String) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            read_request(&mut stream).await;
            stream.write_all(response.as_bytes()).await.unwrap();
            stream.shutdown().await.ok();
        });
        addr
    }

    fn http(status_line: &str, content_type: &str, body: &str) -> String {
        format!(
            "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status_line,
            content_type,
            body.len(),
            body
        )
    }

    #[test]
    fn test_http_transport_builds() {
        let transport = HttpTransport::new(&TransportConfig::default());
        assert!(transport.is_ok());
    }

    #[test]
    fn test_check_error_body() {
        let unauthorized = reqwest::StatusCode::UNAUTHORIZED;
        let err = check_error_body(unauthorized, b"").unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::Protocol);
        assert!(err.message.contains("401"));

        let err = check_error_body(unauthorized, b"<html><body>Denied</body></html>").unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::Protocol);
        assert!(err.message.contains("401"));

        let fault = b"<Envelope><Body><Fault><faultcode>s:Server</faultcode></Fault></Body></Envelope>";
        assert!(check_error_body(reqwest::StatusCode::INTERNAL_SERVER_ERROR, fault).is_ok());
    }

    #[tokio::test]
    async fn test_timeout_is_classified() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            // Accept and hold the connection without ever answering.
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(30)).await;
            drop(stream);
        });

        let err = send_to(addr, Duration::from_millis(200)).await.unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::Timeout);
    }

    #[tokio::test]
    async fn test_connection_refused_is_classified() {
        let addr = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap()
        };

        let err = send_to(addr, Duration::from_secs(5)).await.unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::Connection);
    }

    #[tokio::test]
    async fn test_empty_error_response_is_protocol() {
        let addr = serve_once(http("500 Internal Server Error", "text/xml", "")).await;

        let err = send_to(addr, Duration::from_secs(5)).await.unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::Protocol);
        assert!(err.message.contains("500"));
    }

    #[tokio::test]
    async fn test_error_page_keeps_http_status() {
        let page = "<!DOCTYPE html PUBLIC \"-//W3C//DTD XHTML 1.0 Strict//EN\" \
                    \"http://www.w3.org/TR/xhtml1/DTD/xhtml1-strict.dtd\">\
                    <html><body><h1>401 - Unauthorized</h1></body></html>";
        let addr = serve_once(http("401 Unauthorized", "text/html", page)).await;

        let err = send_to(addr, Duration::from_secs(5)).await.unwrap_err();
        assert_eq!(err.kind, TransportErrorKind::Protocol);
        assert!(err.message.contains("401"));
    }

    #[tokio::test]
    async fn test_soap_fault_body_is_returned() {
        let body = "<s:Envelope xmlns:s=\"http://schemas.xmlsoap.org/soap/envelope/\"><s:Body><s:Fault>\
                    <faultcode>s:Client</faultcode><faultstring>Bad request</faultstring>\
                    </s:Fault></s:Body></s:Envelope>";
        let addr = serve_once(http("500 Internal Server Error", "text/xml", body)).await;

        let raw = send_to(addr, Duration::from_secs(5)).await.unwrap();
        assert_eq!(raw, body.as_bytes());
    }
}
