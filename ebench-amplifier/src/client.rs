//! HTTP connection to the proxy's RPC surface.

use async_trait::async_trait;
use ebench_core::{Domain, Operation, OperationError, OperationResult, ProxyConfig, WorkItem};
use reqwest::{Client, Method, Response, Url};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use crate::connection::{Connector, ProxyConnection};
use crate::error::{AmplifierError, PoolError};

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    kind: String,
    message: String,
}

/// Opens [`HttpConnection`]s against one proxy endpoint
#[derive(Debug, Clone)]
pub struct HttpConnector {
    base_url: String,
}

impl HttpConnector {
    /// Resolve the proxy endpoint. An unresolvable endpoint is fatal.
    pub async fn resolve(config: &ProxyConfig) -> Result<Self, AmplifierError> {
        let (base_url, authority) = base_url(&config.endpoint, config.insecure);

        let resolved = tokio::net::lookup_host(authority.as_str())
            .await
            .map_err(|e| AmplifierError::Resolve {
                endpoint: config.endpoint.clone(),
                reason: e.to_string(),
            })?
            .next();
        if resolved.is_none() {
            return Err(AmplifierError::Resolve {
                endpoint: config.endpoint.clone(),
                reason: "no addresses".to_string(),
            });
        }

        Ok(Self { base_url })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

/// Split an endpoint into a base URL and a `host:port` authority.
///
/// Bare `host:port` endpoints use plain HTTP when `insecure`, else HTTPS.
fn base_url(endpoint: &str, insecure: bool) -> (String, String) {
    let trimmed = endpoint.trim_end_matches('/');
    let (scheme, rest) = match trimmed.split_once("://") {
        Some((scheme, rest)) => (scheme.to_string(), rest),
        None => ((if insecure { "http" } else { "https" }).to_string(), trimmed),
    };
    let authority = rest.split('/').next().unwrap_or(rest);
    let authority = if authority.contains(':') {
        authority.to_string()
    } else if scheme == "https" {
        format!("{}:443", authority)
    } else {
        format!("{}:80", authority)
    };
    (format!("{}://{}", scheme, rest), authority)
}

/// `{base}/v1/{domain}[/{id}]`, with the id encoded as a single segment
fn rpc_url(base_url: &str, domain: Domain, id: Option<&str>) -> Result<Url, OperationError> {
    let mut url = Url::parse(base_url).map_err(|e| OperationError::Transport(e.to_string()))?;
    {
        let mut segments = url
            .path_segments_mut()
            .map_err(|_| OperationError::Transport(format!("{} cannot be a base URL", base_url)))?;
        segments.pop_if_empty().push("v1").push(domain.as_str());
        if let Some(id) = id {
            segments.push(id);
        }
    }
    Ok(url)
}

#[async_trait]
impl Connector for HttpConnector {
    type Connection = HttpConnection;

    async fn connect(&self, index: usize) -> Result<HttpConnection, PoolError> {
        let client = Client::builder()
            .pool_max_idle_per_host(1)
            .no_proxy()
            .build()
            .map_err(|e| PoolError::Connect { index, reason: e.to_string() })?;

        // Probe so a dead endpoint fails pool construction rather than the run.
        let live = format!("{}/live", self.base_url);
        client
            .get(&live)
            .send()
            .await
            .and_then(Response::error_for_status)
            .map_err(|e| PoolError::Connect { index, reason: e.to_string() })?;

        debug!(index, url = %self.base_url, "Connection opened");
        Ok(HttpConnection { index, client, base_url: self.base_url.clone() })
    }
}

/// One keep-alive HTTP connection
#[derive(Debug)]
pub struct HttpConnection {
    index: usize,
    client: Client,
    base_url: String,
}

impl HttpConnection {
    pub fn index(&self) -> usize {
        self.index
    }

    pub async fn call(&self, operation: &Operation) -> Result<Option<Value>, OperationError> {
        let domain = operation.domain();
        let request = match operation {
            Operation::Create { document, .. } => self
                .client
                .request(Method::POST, rpc_url(&self.base_url, domain, None)?)
                .json(document),
            Operation::Get { id, .. } => self
                .client
                .request(Method::GET, rpc_url(&self.base_url, domain, Some(id))?),
            Operation::Upsert { document, .. } => self
                .client
                .request(Method::PUT, rpc_url(&self.base_url, domain, None)?)
                .json(document),
        };

        let response = request
            .send()
            .await
            .map_err(|e| OperationError::Transport(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            let value: Value = response
                .json()
                .await
                .map_err(|e| OperationError::Transport(e.to_string()))?;
            return Ok(Some(value));
        }

        let text = response
            .text()
            .await
            .map_err(|e| OperationError::Transport(e.to_string()))?;
        Err(match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => OperationError::from_wire(&body.error.kind, body.error.message),
            Err(_) => OperationError::Transport(format!("proxy returned {}: {}", status, text)),
        })
    }
}

#[async_trait]
impl ProxyConnection for HttpConnection {
    async fn execute(&mut self, item: &WorkItem) -> OperationResult {
        self.call(&item.operation).await.into()
    }
}
