use super::message::{ENDPOINT_MESSAGE, Message};
use crate::config::ClusterConfig;

use anyhow::Result;
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Addressable process in the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// Replica server by physical id.
    Server(u32),
    /// Router by listening port.
    Router(u16),
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server(id) => write!(f, "server {}", id),
            Self::Router(port) => write!(f, "router :{}", port),
        }
    }
}

/// Request/reply channel to a peer.
///
/// A returned `Err` always means "peer unreachable or too slow"; callers treat it as
/// a reason to fall back, never as fatal.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    async fn send(&self, target: Endpoint, message: &Message, timeout: Duration) -> Result<Message>;
}

/// JSON-over-HTTP transport used by the real processes.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    config: Arc<ClusterConfig>,
}

impl HttpTransport {
    pub fn new(config: Arc<ClusterConfig>) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn url(&self, target: Endpoint) -> Result<String> {
        let base = match target {
            Endpoint::Server(id) => self.config.server_url(id)?,
            Endpoint::Router(port) => self.config.router_url(port),
        };
        Ok(format!("{}{}", base, ENDPOINT_MESSAGE))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, target: Endpoint, message: &Message, timeout: Duration) -> Result<Message> {
        let response = self
            .client
            .post(self.url(target)?)
            .json(message)
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("{} unreachable: {}", target, e))?;

        // Failures are still answered with an `error` message; only an undecodable
        // body counts as a transport failure.
        let status = response.status();
        response.json::<Message>().await.map_err(|e| {
            anyhow::anyhow!(
                "{} answered {} with status {} and no message: {}",
                target,
                message.method(),
                status,
                e
            )
        })
    }
}

/// Probes `ports` in order with `hello` and returns the first router that answers.
pub async fn discover_router<T: Transport + ?Sized>(
    transport: &T,
    ports: &[u16],
    timeout: Duration,
) -> Option<u16> {
    for &port in ports {
        match transport.send(Endpoint::Router(port), &Message::Hello, timeout).await {
            Ok(Message::Hello) => {
                tracing::info!("Found router on port {}", port);
                return Some(port);
            }
            Ok(other) => {
                tracing::debug!("Port {} answered {} to hello", port, other.method());
            }
            Err(e) => {
                tracing::debug!("No router on port {}: {}", port, e);
            }
        }
    }
    None
}
