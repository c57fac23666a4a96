//! HTTP clients for a remote node.
//!
//! `HttpIndexClient` and `HttpUnitClient` implement the same traits as the
//! in-process services, so a `RoutingClient` works unchanged against a node
//! started with the `autoscaling-node` binary. Non-2xx answers carry an
//! `ErrorResponse` and are turned back into the typed error.

use crate::api::{IndexApi, UnitApi, UnitResolver};
use crate::client::router::RoutingClient;
use crate::config::RouterConfig;
use crate::error::{Result, StoreError};
use crate::index::protocol::{
    AddressResponse, CreatePartitionRequest, ENDPOINT_PARTITIONS, ENDPOINT_SIBLINGS,
    ENDPOINT_SPAWN, ENDPOINT_TARGET, PartitionsResponse, RegisterSiblingRequest,
};
use crate::protocol::{AckResponse, ErrorResponse};
use crate::types::{
    BatchAck, Entity, InsertAck, OpId, PartitionAddress, PartitionKey, ScanRange, SortKey,
    SyntheticBatch, UnitStatus,
};
use crate::unit::protocol::{
    ENDPOINT_BATCH, ENDPOINT_ENTITY, ENDPOINT_INSERT, ENDPOINT_SCAN, ENDPOINT_SIZE,
    ENDPOINT_STATUS, EntityResponse, InsertRequest, ScanResponse, SizeResponse,
};

use async_trait::async_trait;
use reqwest::{Method, StatusCode, Url};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_millis(2000);
const REQUEST_ATTEMPTS: usize = 3;

/// Default node address when `INDEX_URL` is not set.
pub const DEFAULT_INDEX_URL: &str = "http://127.0.0.1:6000";

#[derive(Clone)]
struct HttpTransport {
    http_client: reqwest::Client,
    base_url: Url,
}

impl HttpTransport {
    fn new(base_url: &str) -> Result<Self> {
        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| StoreError::Internal(format!("invalid node url {}: {}", base_url, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(StoreError::Internal(format!("invalid node url {}", base_url)));
        }
        // Nodes are addressed directly, never through HTTP_PROXY
        let http_client = reqwest::Client::builder()
            .no_proxy()
            .build()
            .map_err(|e| StoreError::Internal(format!("http client: {}", e)))?;
        Ok(Self {
            http_client,
            base_url,
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::Internal(format!("invalid node url {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn index_url(&self, tail: &[&str]) -> Result<Url> {
        let mut segments: Vec<&str> = ENDPOINT_PARTITIONS
            .split('/')
            .filter(|segment| !segment.is_empty())
            .collect();
        segments.extend_from_slice(tail);
        self.url(&segments)
    }

    /// Sends a request, retrying with backoff only when it provably never
    /// reached the node (connect failures, or timeouts for reads).
    async fn send<B: Serialize + Sync>(
        &self,
        method: Method,
        url: Url,
        body: Option<&B>,
    ) -> Result<reqwest::Response> {
        let mut delay_ms = 150u64;

        for attempt in 0..REQUEST_ATTEMPTS {
            let mut request = self
                .http_client
                .request(method.clone(), url.clone())
                .timeout(REQUEST_TIMEOUT);
            if let Some(body) = body {
                request = request.json(body);
            }

            match request.send().await {
                Ok(resp) => return Ok(resp),
                Err(e) => {
                    let resend = e.is_connect() || (method == Method::GET && e.is_timeout());
                    if !resend || attempt + 1 == REQUEST_ATTEMPTS {
                        return Err(StoreError::PartitionUnreachable(format!("{}: {}", url, e)));
                    }
                    tracing::warn!("Request to {} failed (attempt {}): {}", url, attempt + 1, e);
                    let jitter = rand::random::<u64>() % 50;
                    tokio::time::sleep(Duration::from_millis(delay_ms + jitter)).await;
                    delay_ms = (delay_ms * 2).min(1200);
                }
            }
        }

        Err(StoreError::PartitionUnreachable(format!(
            "{}: retry attempts exhausted",
            url
        )))
    }

    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T> {
        let resp = self.send::<()>(Method::GET, url, None).await?;
        decode(resp).await
    }

    async fn post<B: Serialize + Sync, T: DeserializeOwned>(&self, url: Url, body: &B) -> Result<T> {
        let resp = self.send(Method::POST, url, Some(body)).await?;
        decode(resp).await
    }
}

async fn decode<T: DeserializeOwned>(resp: reqwest::Response) -> Result<T> {
    if resp.status().is_success() {
        return Ok(resp.json::<T>().await?);
    }
    Err(error_from(resp).await)
}

async fn error_from(resp: reqwest::Response) -> StoreError {
    let status = resp.status();
    let url = resp.url().clone();
    let body = match resp.bytes().await {
        Ok(body) => body,
        Err(e) => return StoreError::from(e),
    };

    match serde_json::from_slice::<ErrorResponse>(&body) {
        Ok(error) => error.into(),
        Err(_) if status.is_server_error() => {
            StoreError::PartitionUnreachable(format!("{} returned {}", url, status))
        }
        Err(_) => StoreError::Internal(format!("{} returned {}", url, status)),
    }
}

/// Index service of a remote node.
pub struct HttpIndexClient {
    transport: HttpTransport,
}

impl HttpIndexClient {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            transport: HttpTransport::new(base_url)?,
        })
    }
}

#[async_trait]
impl IndexApi for HttpIndexClient {
    async fn create_partition(&self, pk: &PartitionKey) -> Result<PartitionAddress> {
        let url = self.transport.index_url(&[])?;
        let resp: AddressResponse = self
            .transport
            .post(url, &CreatePartitionRequest { pk: pk.clone() })
            .await?;
        Ok(resp.address)
    }

    async fn register_sibling(&self, pk: &PartitionKey, address: PartitionAddress) -> Result<()> {
        let url = self.transport.index_url(&[pk.as_ref(), ENDPOINT_SIBLINGS])?;
        let ack: AckResponse = self
            .transport
            .post(url, &RegisterSiblingRequest { address })
            .await?;
        if ack.success {
            Ok(())
        } else {
            Err(StoreError::Internal(format!("sibling registration for {} refused", pk)))
        }
    }

    async fn spawn_sibling(&self, pk: &PartitionKey) -> Result<PartitionAddress> {
        let url = self.transport.index_url(&[pk.as_ref(), ENDPOINT_SPAWN])?;
        let resp = self.transport.send::<()>(Method::POST, url, None).await?;
        let resp: AddressResponse = decode(resp).await?;
        Ok(resp.address)
    }

    async fn resolve_write_target(&self, pk: &PartitionKey) -> Result<PartitionAddress> {
        let url = self.transport.index_url(&[pk.as_ref(), ENDPOINT_TARGET])?;
        let resp: AddressResponse = self.transport.get(url).await?;
        Ok(resp.address)
    }

    async fn resolve_all_partitions(&self, pk: &PartitionKey) -> Result<Vec<PartitionAddress>> {
        let url = self.transport.index_url(&[pk.as_ref()])?;
        let resp: PartitionsResponse = self.transport.get(url).await?;
        Ok(resp.addresses)
    }
}

/// One storage unit hosted by a remote node.
pub struct HttpUnitClient {
    transport: HttpTransport,
    address: PartitionAddress,
}

impl HttpUnitClient {
    fn unit_url(&self, tail: &[&str]) -> Result<Url> {
        let mut segments = vec!["unit", self.address.as_ref()];
        segments.extend_from_slice(tail);
        self.transport.url(&segments)
    }
}

#[async_trait]
impl UnitApi for HttpUnitClient {
    fn address(&self) -> &PartitionAddress {
        &self.address
    }

    async fn insert(&self, op_id: OpId, sk: SortKey, value: serde_json::Value) -> Result<InsertAck> {
        let url = self.unit_url(&[ENDPOINT_INSERT])?;
        self.transport
            .post(url, &InsertRequest { op_id, sk, value })
            .await
    }

    async fn insert_batch(&self, batch: SyntheticBatch) -> Result<BatchAck> {
        let url = self.unit_url(&[ENDPOINT_BATCH])?;
        self.transport.post(url, &batch).await
    }

    async fn size(&self) -> Result<u64> {
        let url = self.unit_url(&[ENDPOINT_SIZE])?;
        let resp: SizeResponse = self.transport.get(url).await?;
        Ok(resp.size)
    }

    async fn get(&self, sk: &SortKey) -> Result<Option<serde_json::Value>> {
        let url = self.unit_url(&[ENDPOINT_ENTITY, sk.as_ref()])?;
        let resp = self.transport.send::<()>(Method::GET, url, None).await?;
        if resp.status() == StatusCode::NOT_FOUND {
            // 404 is a missing key (EntityResponse), a missing unit
            // (ErrorResponse) or a route the node does not serve.
            let url = resp.url().clone();
            let body = resp.bytes().await?;
            if let Ok(error) = serde_json::from_slice::<ErrorResponse>(&body) {
                return Err(error.into());
            }
            return match serde_json::from_slice::<EntityResponse>(&body) {
                Ok(entity) => Ok(entity.value),
                Err(_) => Err(StoreError::Internal(format!("{} returned 404", url))),
            };
        }
        let resp: EntityResponse = decode(resp).await?;
        Ok(resp.value)
    }

    async fn delete(&self, sk: &SortKey) -> Result<Option<serde_json::Value>> {
        let url = self.unit_url(&[ENDPOINT_ENTITY, sk.as_ref()])?;
        let resp = self.transport.send::<()>(Method::DELETE, url, None).await?;
        let resp: EntityResponse = decode(resp).await?;
        Ok(resp.value)
    }

    async fn scan(&self, range: ScanRange) -> Result<Vec<Entity>> {
        let mut url = self.unit_url(&[ENDPOINT_SCAN])?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(start) = &range.start {
                query.append_pair("start", start.as_ref());
            }
            if let Some(end) = &range.end {
                query.append_pair("end", end.as_ref());
            }
            if let Some(limit) = range.limit {
                query.append_pair("limit", &limit.to_string());
            }
        }
        let resp: ScanResponse = self.transport.get(url).await?;
        Ok(resp.entities)
    }

    async fn status(&self) -> Result<UnitStatus> {
        let url = self.unit_url(&[ENDPOINT_STATUS])?;
        self.transport.get(url).await
    }
}

/// Resolves addresses to units hosted by the same remote node.
pub struct HttpUnitResolver {
    transport: HttpTransport,
}

impl HttpUnitResolver {
    pub fn new(base_url: &str) -> Result<Self> {
        Ok(Self {
            transport: HttpTransport::new(base_url)?,
        })
    }
}

impl UnitResolver for HttpUnitResolver {
    fn resolve(&self, address: &PartitionAddress) -> Result<Arc<dyn UnitApi>> {
        Ok(Arc::new(HttpUnitClient {
            transport: self.transport.clone(),
            address: address.clone(),
        }))
    }
}

/// Routing client talking to the node at `base_url`.
pub fn connect(base_url: &str, config: RouterConfig) -> Result<RoutingClient> {
    let index = Arc::new(HttpIndexClient::new(base_url)?);
    let resolver = Arc::new(HttpUnitResolver::new(base_url)?);
    tracing::info!("Routing client connected to {}", base_url);
    Ok(RoutingClient::new(index, resolver, config))
}

/// Like [`connect`], with the node taken from `INDEX_URL` and the settings
/// from the `ROUTER_*` variables.
pub fn connect_from_env() -> Result<RoutingClient> {
    let base_url = std::env::var("INDEX_URL").unwrap_or_else(|_| DEFAULT_INDEX_URL.to_string());
    connect(&base_url, RouterConfig::from_env())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_urls_escape_keys() {
        let transport = HttpTransport::new("http://127.0.0.1:6000/").unwrap();

        let url = transport.index_url(&["pk with/slash", ENDPOINT_TARGET]).unwrap();
        assert_eq!(
            url.as_str(),
            "http://127.0.0.1:6000/index/partitions/pk%20with%2Fslash/target"
        );
    }

    #[test]
    fn test_unit_url() {
        let resolver = HttpUnitResolver::new("http://localhost:6000").unwrap();
        let unit = HttpUnitClient {
            transport: resolver.transport.clone(),
            address: PartitionAddress::from("abc"),
        };

        let url = unit.unit_url(&[ENDPOINT_SIZE]).unwrap();
        assert_eq!(url.as_str(), "http://localhost:6000/unit/abc/size");
    }

    #[test]
    fn test_rejects_invalid_base_url() {
        assert!(HttpIndexClient::new("not a url").is_err());
    }
}
