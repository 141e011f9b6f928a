//! HTTP JSON-RPC [`LogSource`] backed by `reqwest`.
//!
//! Performs exactly one request per call. Retrying is the fetcher's job;
//! this layer only classifies failures, so throttling surfaces as
//! [`SourceError::Throttled`] whether it arrives as HTTP 429, a JSON-RPC
//! error code, or a provider message.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::trace;

use fundindex_core::source::{LogSource, SourceError};
use fundindex_core::types::{parse_hex_u64, LogQuery, RawLog};

/// A JSON-RPC 2.0 request.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub method: String,
    pub params: Vec<Value>,
    pub id: u64,
}

impl JsonRpcRequest {
    pub fn new(id: u64, method: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            jsonrpc: "2.0",
            method: method.into(),
            params,
            id,
        }
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
}

/// A JSON-RPC 2.0 response.
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// The result value, or the classified RPC error.
    pub fn into_result(self) -> Result<Value, SourceError> {
        match self.error {
            Some(err) => Err(SourceError::from_rpc(err.code, err.message)),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// `eth_getLogs` filter object for `query`.
pub fn log_filter(query: &LogQuery) -> Value {
    let mut filter = json!({
        "fromBlock": format!("0x{:x}", query.from_block),
        "toBlock": format!("0x{:x}", query.to_block),
    });
    match query.addresses.as_slice() {
        [] => {}
        [one] => filter["address"] = json!(one),
        many => filter["address"] = json!(many),
    }
    if !query.topics.is_empty() {
        filter["topics"] = json!([query.topics]);
    }
    filter
}

/// Log source talking to a single JSON-RPC endpoint over HTTP.
pub struct HttpLogSource {
    url: String,
    http: reqwest::Client,
    next_id: AtomicU64,
}

impl HttpLogSource {
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Result<Self, SourceError> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| SourceError::Transport(format!("building HTTP client: {e}")))?;
        Ok(Self {
            url: url.into(),
            http,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn request<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Vec<Value>,
    ) -> Result<T, SourceError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let req = JsonRpcRequest::new(id, method, params);
        trace!(method, id, "rpc request");

        let resp = self
            .http
            .post(&self.url)
            .json(&req)
            .send()
            .await
            .map_err(|e| SourceError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(SourceError::from_http(status.as_u16(), body));
        }

        let body: JsonRpcResponse = resp
            .json()
            .await
            .map_err(|e| SourceError::Decode(format!("{method} response: {e}")))?;
        let value = body.into_result()?;
        serde_json::from_value(value).map_err(|e| SourceError::Decode(format!("{method} result: {e}")))
    }
}

#[async_trait]
impl LogSource for HttpLogSource {
    async fn head_block_number(&self) -> Result<u64, SourceError> {
        let hex: String = self.request("eth_blockNumber", vec![]).await?;
        parse_hex_u64(&hex).ok_or_else(|| SourceError::Decode(format!("bad block number {hex}")))
    }

    async fn get_logs(&self, query: &LogQuery) -> Result<Vec<RawLog>, SourceError> {
        self.request("eth_getLogs", vec![log_filter(query)]).await
    }

    async fn call(&self, to: &str, data: &str) -> Result<String, SourceError> {
        self.request("eth_call", vec![json!({ "to": to, "data": data }), json!("latest")])
            .await
    }
}
