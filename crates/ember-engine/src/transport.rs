//! Network transport capability.
//!
//! A [`Transport`] performs one request/response exchange with the remote
//! blockchain API. It is owned by the live connection and released as a unit
//! with it. Both GraphQL and JSON-RPC endpoints are served over HTTP POST with
//! JSON bodies, so one [`HttpTransport`] covers both [`ConnectionKind`]s.
//!
//! [`ConnectionKind`]: ember_core::models::ConnectionKind

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use ember_core::models::NetworkConfig;
use reqwest::Url;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use crate::errors::TransportError;

/// Maximum number of response body characters kept in a status error.
const MAX_ERROR_BODY: usize = 256;

/// One live request/response channel to a blockchain API endpoint.
///
/// Concurrent `send` calls are allowed; ordering between them is not
/// guaranteed and callers that need it must serialize.
#[async_trait]
pub trait Transport: Send + Sync {
    /// The configuration this transport was built from.
    fn config(&self) -> &NetworkConfig;

    /// Send one request body and wait for the response body.
    async fn send(&self, request: Bytes) -> Result<Bytes, TransportError>;

    /// Release the transport. Subsequent sends fail with
    /// [`TransportError::Closed`].
    async fn shutdown(&self) {}
}

/// Constructs transports for a network configuration.
///
/// This is the only fallible step of a network switch.
#[async_trait]
pub trait TransportFactory: Send + Sync {
    /// Open a transport for `config`.
    async fn connect(&self, config: &NetworkConfig) -> Result<Arc<dyn Transport>, TransportError>;
}

/// HTTP POST JSON transport.
pub struct HttpTransport {
    config: NetworkConfig,
    endpoint: Url,
    client: reqwest::Client,
    closed: AtomicBool,
}

impl HttpTransport {
    /// Build a transport for `config`. The request timeout comes from the
    /// configuration.
    pub fn new(config: NetworkConfig) -> Result<Self, TransportError> {
        let endpoint =
            Url::parse(&config.endpoint).map_err(|e| TransportError::InvalidEndpoint {
                endpoint: config.endpoint.clone(),
                message: e.to_string(),
            })?;
        if !matches!(endpoint.scheme(), "http" | "https") {
            return Err(TransportError::InvalidEndpoint {
                endpoint: config.endpoint.clone(),
                message: format!("unsupported scheme '{}'", endpoint.scheme()),
            });
        }
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;
        Ok(Self {
            config,
            endpoint,
            client,
            closed: AtomicBool::new(false),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    fn config(&self) -> &NetworkConfig {
        &self.config
    }

    async fn send(&self, request: Bytes) -> Result<Bytes, TransportError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(TransportError::Closed);
        }

        let response = self
            .client
            .post(self.endpoint.clone())
            .header(CONTENT_TYPE, "application/json")
            .body(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let mut message = response.text().await.unwrap_or_default();
            if message.len() > MAX_ERROR_BODY {
                let cut = (0..=MAX_ERROR_BODY)
                    .rev()
                    .find(|i| message.is_char_boundary(*i))
                    .unwrap_or(0);
                message.truncate(cut);
            }
            return Err(TransportError::Status {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.bytes().await?)
    }

    async fn shutdown(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!(network = %self.config.name, "http transport closed");
        }
    }
}

/// Factory producing [`HttpTransport`]s.
#[derive(Clone, Copy, Debug, Default)]
pub struct HttpTransportFactory;

#[async_trait]
impl TransportFactory for HttpTransportFactory {
    async fn connect(&self, config: &NetworkConfig) -> Result<Arc<dyn Transport>, TransportError> {
        let transport = HttpTransport::new(config.clone())?;
        debug!(
            network = %config.name,
            kind = %config.kind,
            endpoint = %config.endpoint,
            "http transport opened"
        );
        Ok(Arc::new(transport))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn local(server: &MockServer) -> NetworkConfig {
        NetworkConfig::graphql("Local", format!("{}/graphql", server.uri()), 5_000)
    }

    #[tokio::test]
    async fn posts_json_and_returns_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graphql"))
            .and(header("content-type", "application/json"))
            .and(body_string(r#"{"query":"{info{version}}"}"#))
            .respond_with(ResponseTemplate::new(200).set_body_string(r#"{"data":{}}"#))
            .expect(1)
            .mount(&server)
            .await;

        let transport = HttpTransportFactory.connect(&local(&server)).await.unwrap();
        let response = transport
            .send(Bytes::from_static(br#"{"query":"{info{version}}"}"#))
            .await
            .unwrap();
        assert_eq!(&response[..], br#"{"data":{}}"#);
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("overloaded"))
            .mount(&server)
            .await;

        let transport = HttpTransport::new(local(&server)).unwrap();
        let err = transport.send(Bytes::from_static(b"{}")).await.unwrap_err();
        assert_matches!(err, TransportError::Status { status: 503, ref message } if message == "overloaded");
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn send_after_shutdown_fails() {
        let server = MockServer::start().await;
        let transport = HttpTransport::new(local(&server)).unwrap();
        transport.shutdown().await;
        assert_matches!(
            transport.send(Bytes::from_static(b"{}")).await,
            Err(TransportError::Closed)
        );
    }

    #[tokio::test]
    async fn rejects_bad_endpoints() {
        let config = NetworkConfig::jrpc("Bad", "not a url", 1_000);
        let err = HttpTransportFactory.connect(&config).await.err();
        assert_matches!(err, Some(TransportError::InvalidEndpoint { .. }));

        let config = NetworkConfig::jrpc("Ftp", "ftp://example.com/rpc", 1_000);
        let err = HttpTransport::new(config).err();
        assert_matches!(err, Some(TransportError::InvalidEndpoint { .. }));
    }

    #[test]
    fn keeps_config() {
        let config = NetworkConfig::jrpc("Rpc", "https://rpc.example.com", 2_000);
        let transport = HttpTransport::new(config.clone()).unwrap();
        assert_eq!(transport.config(), &config);
    }
}
