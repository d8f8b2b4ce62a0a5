//! JSON-RPC client for Soroban RPC endpoints

use super::types::{
    GetTransactionParams, HealthStatus, JsonRpcRequest, JsonRpcResponse, SendTransactionParams,
    SendTransactionResponse, TransactionHash, TransactionRecord,
};
use super::NetworkClient;
use crate::config::RpcConfig;
use crate::error::{QueryError, TrackerError, TrackerResult};
use crate::tx::SignedTransaction;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, trace};

/// HTTP client for a single Soroban RPC endpoint
pub struct RpcClient {
    http: reqwest::Client,
    url: String,
    next_id: AtomicU64,
}

impl RpcClient {
    /// Create a new RPC client
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> TrackerResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| TrackerError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            url: url.into(),
            next_id: AtomicU64::new(1),
        })
    }

    pub fn from_config(config: &RpcConfig) -> TrackerResult<Self> {
        Self::new(config.url.clone(), config.request_timeout())
    }

    async fn call<P, R>(&self, method: &str, params: Option<P>) -> Result<R, QueryError>
    where
        P: Serialize + Send,
        R: DeserializeOwned,
    {
        self.call_optional(method, params).await?.ok_or_else(|| {
            QueryError::Decode(format!("{} response has neither result nor error", method))
        })
    }

    /// Issue a call whose result may legitimately be absent or `null`
    async fn call_optional<P, R>(
        &self,
        method: &str,
        params: Option<P>,
    ) -> Result<Option<R>, QueryError>
    where
        P: Serialize + Send,
        R: DeserializeOwned,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::new(id, method, params);

        trace!("RPC request {} #{} to {}", method, id, self.url);

        let response = self
            .http
            .post(&self.url)
            .json(&request)
            .send()
            .await
            .map_err(|e| QueryError::Transport(e.to_string()))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| QueryError::Transport(e.to_string()))?;

        match serde_json::from_slice::<JsonRpcResponse<R>>(&body) {
            Ok(envelope) => envelope.into_optional(),
            // Gateways answer with HTML or empty bodies while the node is unreachable
            Err(_) if is_unavailable(status) => Err(QueryError::Transport(format!(
                "HTTP {} from {}",
                status, self.url
            ))),
            Err(e) => {
                debug!("Undecodable {} response (HTTP {}): {}", method, status, e);
                Err(QueryError::Decode(e.to_string()))
            }
        }
    }
}

fn is_unavailable(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

#[async_trait]
impl NetworkClient for RpcClient {
    async fn send_transaction(
        &self,
        tx: &SignedTransaction,
    ) -> Result<SendTransactionResponse, QueryError> {
        self.call(
            "sendTransaction",
            Some(SendTransactionParams {
                transaction: tx.as_xdr(),
            }),
        )
        .await
    }

    async fn get_transaction(
        &self,
        hash: &TransactionHash,
    ) -> Result<TransactionRecord, QueryError> {
        let record = self
            .call_optional(
                "getTransaction",
                Some(GetTransactionParams {
                    hash: hash.as_str(),
                }),
            )
            .await?;

        // Nodes that have not indexed the hash yet may answer with an empty result
        Ok(record.unwrap_or_else(|| {
            trace!("Empty getTransaction result for {}", hash);
            TransactionRecord::pending()
        }))
    }

    async fn health(&self) -> Result<HealthStatus, QueryError> {
        self.call::<(), _>("getHealth", None).await
    }
}
