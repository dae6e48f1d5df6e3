//! Contains the HTTP remote that executes operations against the product API.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};

use crate::error::RequestError;
use crate::operation::Operation;

/// The HTTP client flavor used to issue requests.
///
/// Both variants send identical requests and classify responses the same way.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// A shared client with keep-alive connection pooling, suited for high concurrency.
    #[default]
    Pooled,
    /// Opens a fresh connection per request and logs connection activity, suited for debugging.
    Simple,
}

/// A remote product API reachable over HTTP.
#[derive(Debug, Clone)]
pub struct HttpRemote {
    /// Base URL of the target, without trailing slash.
    remote: String,
    client: Client,
    transport: Transport,
}

impl HttpRemote {
    /// Creates a remote for the given base URL.
    pub fn new(
        remote: impl Into<String>,
        transport: Transport,
        timeout: Duration,
    ) -> reqwest::Result<Self> {
        let builder = Client::builder()
            .user_agent(concat!("loadtest/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout);

        let builder = match transport {
            Transport::Pooled => builder.tcp_nodelay(true),
            Transport::Simple => builder
                .pool_max_idle_per_host(0)
                .http1_only()
                .connection_verbose(true),
        };

        let remote: String = remote.into();
        let remote = remote.trim_end_matches('/').to_owned();
        Ok(Self {
            remote,
            client: builder.build()?,
            transport,
        })
    }

    pub fn transport(&self) -> Transport {
        self.transport
    }

    /// Returns the full URL for a path on the remote.
    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.remote)
    }

    /// Sends the request for an operation and returns the response status.
    ///
    /// The response body is drained so the connection can be reused.
    pub async fn send(&self, operation: &Operation) -> Result<StatusCode, RequestError> {
        let url = self.url(&operation.path());
        let mut request = self.client.request(operation.method(), &url);
        if let Operation::CreateProduct(details) = operation {
            request = request.json(details);
        }

        let response = request.send().await?;
        let status = response.status();
        response.bytes().await?;

        tracing::trace!(%url, %status, "received response");
        Ok(status)
    }

    /// Sends the request for an operation and classifies the response.
    pub async fn execute(&self, operation: &Operation, strict: bool) -> Result<(), RequestError> {
        let status = self.send(operation).await?;
        if operation.expectation().accepts(status, strict) {
            Ok(())
        } else {
            Err(RequestError::UnexpectedStatus(status))
        }
    }

    /// Probes the health endpoint once and returns an error unless it reports success.
    pub async fn healthcheck(&self) -> anyhow::Result<()> {
        let url = self.url("/health");

        tracing::debug!("sending healthcheck request to {}", url);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            anyhow::bail!("Bad Status: {}", response.status());
        }

        tracing::info!("OK");
        Ok(())
    }
}
