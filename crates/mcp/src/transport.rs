//! The HTTP seam between the client and the network.
//!
//! Production uses `ReqwestTransport`; tests script the trait with queued
//! replies. The transport reports failures in a classified form so the
//! client's retry policy does not need to know about `reqwest` internals.

use std::error::Error as _;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::protocol::{RpcRequest, RpcResponse};

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum TransportFailure {
    #[error("connection refused")]
    ConnectionRefused,
    #[error("request timed out")]
    Timeout,
    #[error("name resolution failed")]
    NameResolution,
    #[error("http status {0}")]
    Status(u16),
    #[error("transport failure: {0}")]
    Other(String),
}

impl TransportFailure {
    /// Retry only network-shaped failures and server-side statuses.
    /// Client-side statuses (other than rate limiting) and malformed
    /// bodies are final.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::ConnectionRefused | Self::Timeout | Self::NameResolution => true,
            Self::Status(status) => *status == 429 || (500..600).contains(status),
            Self::Other(_) => false,
        }
    }
}

#[async_trait]
pub trait RpcTransport: Send + Sync {
    async fn post(
        &self,
        endpoint: &str,
        request: &RpcRequest,
    ) -> Result<RpcResponse, TransportFailure>;
}

pub struct ReqwestTransport {
    http: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("opsbot/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl RpcTransport for ReqwestTransport {
    async fn post(
        &self,
        endpoint: &str,
        request: &RpcRequest,
    ) -> Result<RpcResponse, TransportFailure> {
        let response = self
            .http
            .post(endpoint)
            .json(request)
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportFailure::Status(status.as_u16()));
        }

        response
            .json::<RpcResponse>()
            .await
            .map_err(|error| TransportFailure::Other(format!("invalid response body: {error}")))
    }
}

fn classify_reqwest_error(error: reqwest::Error) -> TransportFailure {
    if error.is_timeout() {
        return TransportFailure::Timeout;
    }

    if error.is_connect() {
        let mut source = error.source();
        while let Some(current) = source {
            if let Some(io_error) = current.downcast_ref::<std::io::Error>() {
                return match io_error.kind() {
                    std::io::ErrorKind::ConnectionRefused => TransportFailure::ConnectionRefused,
                    std::io::ErrorKind::TimedOut => TransportFailure::Timeout,
                    _ => TransportFailure::ConnectionRefused,
                };
            }
            source = current.source();
        }

        // Hyper surfaces resolver failures as connect errors without an
        // io::Error in the chain.
        let text = error.to_string();
        if text.contains("dns") || text.contains("resolve") {
            return TransportFailure::NameResolution;
        }
        return TransportFailure::ConnectionRefused;
    }

    TransportFailure::Other(error.to_string())
}

#[cfg(test)]
mod tests {
    use super::TransportFailure;

    #[test]
    fn network_failures_and_server_statuses_are_retryable() {
        assert!(TransportFailure::ConnectionRefused.is_retryable());
        assert!(TransportFailure::Timeout.is_retryable());
        assert!(TransportFailure::NameResolution.is_retryable());
        assert!(TransportFailure::Status(500).is_retryable());
        assert!(TransportFailure::Status(503).is_retryable());
        assert!(TransportFailure::Status(429).is_retryable());
    }

    #[test]
    fn client_statuses_and_malformed_bodies_are_final() {
        assert!(!TransportFailure::Status(404).is_retryable());
        assert!(!TransportFailure::Status(400).is_retryable());
        assert!(!TransportFailure::Other("invalid response body".to_owned()).is_retryable());
    }
}
