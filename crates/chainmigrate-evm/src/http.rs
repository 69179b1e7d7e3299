//! [`ChainRpc`] over HTTP JSON-RPC, backed by `reqwest`.
//!
//! Transport faults (connection errors, HTTP 429 and 5xx) are retried with
//! the bounded backoff from [`RetryPolicy`]. JSON-RPC error objects are
//! returned immediately.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use chainmigrate_core::chain::{parse_hex_u64, ChainRpc, LogFilter, RawLog};
use chainmigrate_core::error::MigratorError;
use chainmigrate_core::retry::{RetryConfig, RetryPolicy};

#[derive(Debug, Clone)]
pub struct HttpRpcConfig {
    pub retry: RetryConfig,
    pub request_timeout: Duration,
}

impl Default for HttpRpcConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest<'a> {
    jsonrpc: &'static str,
    id: u64,
    method: &'a str,
    params: Value,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<JsonRpcErrorObject>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcErrorObject {
    code: i64,
    message: String,
}

enum CallError {
    /// Worth retrying.
    Transport(String),
    Fatal(String),
}

impl CallError {
    fn message(self) -> String {
        match self {
            Self::Transport(m) | Self::Fatal(m) => m,
        }
    }
}

pub struct HttpChainRpc {
    url: String,
    http: reqwest::Client,
    retry: RetryPolicy,
    next_id: AtomicU64,
}

impl HttpChainRpc {
    pub fn new(url: impl Into<String>, config: HttpRpcConfig) -> Result<Self, MigratorError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| MigratorError::Rpc(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            url: url.into(),
            http,
            retry: RetryPolicy::new(config.retry),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn send_once(&self, req: &JsonRpcRequest<'_>) -> Result<Value, CallError> {
        let resp = self
            .http
            .post(&self.url)
            .json(req)
            .send()
            .await
            .map_err(|e| CallError::Transport(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            let msg = format!("HTTP {}: {body}", status.as_u16());
            return Err(if status.is_server_error() || status.as_u16() == 429 {
                CallError::Transport(msg)
            } else {
                CallError::Fatal(msg)
            });
        }

        let body: JsonRpcResponse = resp
            .json()
            .await
            .map_err(|e| CallError::Transport(e.to_string()))?;
        into_result(body).map_err(CallError::Fatal)
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, MigratorError> {
        let req = JsonRpcRequest {
            jsonrpc: "2.0",
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            method,
            params,
        };

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match self.send_once(&req).await {
                Ok(value) => return Ok(value),
                Err(CallError::Transport(e)) => match self.retry.next_delay(attempt) {
                    Some(delay) => {
                        tracing::warn!(
                            method,
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %e,
                            "retrying RPC request"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    None => {
                        tracing::error!(method, attempt, error = %e, "RPC retries exhausted");
                        return Err(MigratorError::Rpc(format!("{method}: {e}")));
                    }
                },
                Err(e) => return Err(MigratorError::Rpc(format!("{method}: {}", e.message()))),
            }
        }
    }
}

fn into_result(resp: JsonRpcResponse) -> Result<Value, String> {
    if let Some(err) = resp.error {
        return Err(format!("JSON-RPC error {}: {}", err.code, err.message));
    }
    resp.result.ok_or_else(|| "response has neither result nor error".to_string())
}

fn get_logs_params(contract: &str, from: u64, to: u64, filter: &LogFilter) -> Value {
    json!([{
        "address": contract,
        "fromBlock": format!("0x{from:x}"),
        "toBlock": format!("0x{to:x}"),
        "topics": [filter.topic0],
    }])
}

fn call_params(to: &str, calldata: &[u8]) -> Value {
    json!([{ "to": to, "data": format!("0x{}", hex::encode(calldata)) }, "latest"])
}

fn as_hex_str(value: &Value, method: &str) -> Result<String, MigratorError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| MigratorError::Rpc(format!("{method}: expected hex string, got {value}")))
}

#[async_trait]
impl ChainRpc for HttpChainRpc {
    async fn current_height(&self) -> Result<u64, MigratorError> {
        let v = self.request("eth_blockNumber", json!([])).await?;
        parse_hex_u64(&as_hex_str(&v, "eth_blockNumber")?)
    }

    async fn event_logs(
        &self,
        contract: &str,
        from: u64,
        to: u64,
        filter: &LogFilter,
    ) -> Result<Vec<RawLog>, MigratorError> {
        let v = self
            .request("eth_getLogs", get_logs_params(contract, from, to, filter))
            .await?;
        serde_json::from_value(v).map_err(|e| MigratorError::Decode(format!("eth_getLogs: {e}")))
    }

    async fn call(&self, to: &str, calldata: &[u8]) -> Result<Vec<u8>, MigratorError> {
        let v = self.request("eth_call", call_params(to, calldata)).await?;
        let s = as_hex_str(&v, "eth_call")?;
        hex::decode(s.strip_prefix("0x").unwrap_or(&s))
            .map_err(|e| MigratorError::Decode(format!("eth_call: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_logs_request_shape() {
        let filter = LogFilter { topic0: "0xabc".into() };
        let params = get_logs_params("0xc0", 100, 599, &filter);
        assert_eq!(
            params,
            json!([{ "address": "0xc0", "fromBlock": "0x64", "toBlock": "0x257", "topics": ["0xabc"] }])
        );
    }

    #[test]
    fn call_request_shape() {
        let params = call_params("0xc0", &[0x31, 0x3c, 0xe5, 0x67]);
        assert_eq!(params, json!([{ "to": "0xc0", "data": "0x313ce567" }, "latest"]));
    }

    #[test]
    fn error_object_wins() {
        let resp: JsonRpcResponse = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32005,"message":"query returned more than 10000 results"}}"#,
        )
        .unwrap();
        let err = into_result(resp).unwrap_err();
        assert!(err.contains("-32005"));
    }

    #[test]
    fn logs_payload_parses() {
        let resp: JsonRpcResponse = serde_json::from_str(
            r#"{"jsonrpc":"2.0","id":1,"result":[{"address":"0xc0","topics":["0x01"],"data":"0x",
               "blockNumber":"0x10","blockHash":"0xbb","transactionHash":"0xaa","logIndex":"0x2","removed":false}]}"#,
        )
        .unwrap();
        let logs: Vec<RawLog> = serde_json::from_value(into_result(resp).unwrap()).unwrap();
        assert_eq!(logs[0].block_number_u64().unwrap(), 16);
        assert_eq!(logs[0].log_index_u32().unwrap(), 2);
        assert!(!logs[0].is_removed());
    }

    #[test]
    fn client_builds() {
        let rpc = HttpChainRpc::new("http://127.0.0.1:8545", HttpRpcConfig::default()).unwrap();
        assert_eq!(rpc.url(), "http://127.0.0.1:8545");
    }
}
