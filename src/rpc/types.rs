//! JSON-RPC wire types for the Soroban RPC methods the tracker uses

use crate::error::{QueryError, TrackerError, TrackerResult};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Error code the network reports while a submitted transaction is not yet indexed
pub const NOT_FOUND_CODE: i64 = -32602;

/// Hex-encoded 32 byte transaction hash
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TransactionHash(String);

impl TransactionHash {
    pub fn parse(value: &str) -> TrackerResult<Self> {
        let bytes = hex::decode(value.trim()).map_err(|e| {
            TrackerError::SubmissionRejected(format!("invalid transaction hash {:?}: {}", value, e))
        })?;
        if bytes.len() != 32 {
            return Err(TrackerError::SubmissionRejected(format!(
                "invalid transaction hash {:?}: expected 32 bytes, got {}",
                value,
                bytes.len()
            )));
        }
        Ok(Self(hex::encode(bytes)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TransactionHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for TransactionHash {
    type Error = TrackerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TransactionHash> for String {
    fn from(hash: TransactionHash) -> Self {
        hash.0
    }
}

#[derive(Debug, Serialize)]
pub struct JsonRpcRequest<'a, P> {
    pub jsonrpc: &'static str,
    pub id: u64,
    pub method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<P>,
}

impl<'a, P> JsonRpcRequest<'a, P> {
    pub fn new(id: u64, method: &'a str, params: Option<P>) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method,
            params,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcResponse<R> {
    pub result: Option<R>,
    pub error: Option<JsonRpcError>,
}

impl<R> JsonRpcResponse<R> {
    /// Collapse the envelope into the result or a classified query error
    pub fn into_result(self) -> Result<R, QueryError> {
        self.into_optional()?
            .ok_or_else(|| QueryError::Decode("response has neither result nor error".to_string()))
    }

    /// Like `into_result`, but an absent or `null` result is `Ok(None)`
    pub fn into_optional(self) -> Result<Option<R>, QueryError> {
        match self.error {
            Some(error) => Err(error.classify()),
            None => Ok(self.result),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    /// Some gateways omit the code and only send a message
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn classify(self) -> QueryError {
        if self.code == NOT_FOUND_CODE || self.message.contains("not found") {
            QueryError::NotFound {
                code: self.code,
                message: self.message,
            }
        } else {
            QueryError::Rpc {
                code: self.code,
                message: self.message,
            }
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SendTransactionParams<'a> {
    pub transaction: &'a str,
}

#[derive(Debug, Serialize)]
pub struct GetTransactionParams<'a> {
    pub hash: &'a str,
}

/// Status of a `sendTransaction` call, not of the transaction's execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SendStatus {
    Pending,
    Duplicate,
    TryAgainLater,
    Error,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendTransactionResponse {
    pub status: SendStatus,
    pub hash: String,
    #[serde(default)]
    pub latest_ledger: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_result_xdr: Option<String>,
}

/// Execution status of a submitted transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TransactionStatus {
    Success,
    Failed,
    /// `NOT_FOUND` or any status the network adds later; treated as pending
    Other(String),
}

/// A record without a status is not final yet
impl Default for TransactionStatus {
    fn default() -> Self {
        TransactionStatus::Other(String::new())
    }
}

impl From<String> for TransactionStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "SUCCESS" => TransactionStatus::Success,
            "FAILED" => TransactionStatus::Failed,
            _ => TransactionStatus::Other(value),
        }
    }
}

impl From<TransactionStatus> for String {
    fn from(status: TransactionStatus) -> Self {
        match status {
            TransactionStatus::Success => "SUCCESS".to_string(),
            TransactionStatus::Failed => "FAILED".to_string(),
            TransactionStatus::Other(s) => s,
        }
    }
}

/// Record returned by `getTransaction`.
///
/// Only the fields the tracker interprets are typed; everything else the
/// network reports is kept in `extra` so failures can be diagnosed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    #[serde(default)]
    pub status: TransactionStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_xdr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub envelope_xdr: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result_meta_xdr: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl TransactionRecord {
    pub fn with_status(status: TransactionStatus) -> Self {
        Self {
            status,
            ledger: None,
            result_xdr: None,
            envelope_xdr: None,
            result_meta_xdr: None,
            extra: Map::new(),
        }
    }

    /// Stand-in for an empty `getTransaction` result
    pub fn pending() -> Self {
        Self::with_status(TransactionStatus::default())
    }

    /// Result payload of a successful transaction, if the network returned one
    pub fn result_payload(&self) -> Option<ResultPayload> {
        self.result_xdr
            .as_ref()
            .filter(|xdr| !xdr.is_empty())
            .map(|xdr| ResultPayload {
                result_xdr: xdr.clone(),
                ledger: self.ledger,
            })
    }
}

/// Structured result surfaced to the caller on success
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultPayload {
    pub result_xdr: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ledger: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub latest_ledger: Option<u64>,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const HASH: &str = "7c1b0d6dc1ee7d2b8f3b5e5d0d7ab9f0a6b5d4c3b2a1908f7e6d5c4b3a291807";

    #[test]
    fn test_hash_parse() {
        let hash = TransactionHash::parse(&HASH.to_uppercase()).unwrap();
        assert_eq!(hash.as_str(), HASH);

        assert!(TransactionHash::parse("abcd").is_err());
        assert!(TransactionHash::parse("zz").is_err());
    }

    #[test]
    fn test_not_found_by_code() {
        let response: JsonRpcResponse<TransactionRecord> = serde_json::from_value(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "error": { "code": -32602, "message": "invalid parameters" }
        }))
        .unwrap();

        let err = response.into_result().unwrap_err();
        assert!(matches!(err, QueryError::NotFound { code: -32602, .. }));
        assert!(err.is_transient());
    }

    #[test]
    fn test_not_found_by_message() {
        let response: JsonRpcResponse<TransactionRecord> = serde_json::from_value(json!({
            "error": { "code": -32000, "message": "transaction not found" }
        }))
        .unwrap();

        assert!(response.into_result().unwrap_err().is_transient());
    }

    #[test]
    fn test_other_rpc_error_is_fatal() {
        let response: JsonRpcResponse<TransactionRecord> = serde_json::from_value(json!({
            "error": { "code": -32600, "message": "invalid request" }
        }))
        .unwrap();

        let err = response.into_result().unwrap_err();
        assert_eq!(
            err,
            QueryError::Rpc {
                code: -32600,
                message: "invalid request".to_string()
            }
        );
        assert!(!err.is_transient());
    }

    #[test]
    fn test_not_found_without_code() {
        let response: JsonRpcResponse<TransactionRecord> = serde_json::from_value(json!({
            "error": { "message": "transaction not found" }
        }))
        .unwrap();

        let err = response.into_result().unwrap_err();
        assert!(matches!(err, QueryError::NotFound { code: 0, .. }));
        assert!(err.is_transient());
    }

    #[test]
    fn test_empty_envelope() {
        let response: JsonRpcResponse<TransactionRecord> =
            serde_json::from_value(json!({ "jsonrpc": "2.0", "id": 3 })).unwrap();
        assert!(matches!(
            response.into_result(),
            Err(QueryError::Decode(_))
        ));

        for body in [json!({ "id": 3 }), json!({ "id": 3, "result": null })] {
            let response: JsonRpcResponse<TransactionRecord> =
                serde_json::from_value(body).unwrap();
            assert_eq!(response.into_optional().unwrap(), None);
        }
    }

    #[test]
    fn test_record_without_status_is_pending() {
        let record: TransactionRecord =
            serde_json::from_value(json!({ "latestLedger": 5 })).unwrap();
        assert_eq!(record.status, TransactionStatus::default());
        assert_eq!(record.extra["latestLedger"], json!(5));
    }

    #[test]
    fn test_record_statuses() {
        let success: TransactionRecord = serde_json::from_value(json!({
            "status": "SUCCESS",
            "ledger": 1234,
            "createdAt": "1700000000",
            "resultXdr": "AAAAAAAAAGQAAAAAAAAAAQAAAAAAAAAYAAAAAAAAAAA=",
            "applicationOrder": 1
        }))
        .unwrap();
        assert_eq!(success.status, TransactionStatus::Success);
        assert_eq!(success.extra["applicationOrder"], json!(1));

        let payload = success.result_payload().unwrap();
        assert_eq!(payload.ledger, Some(1234));

        let pending: TransactionRecord =
            serde_json::from_value(json!({ "status": "NOT_FOUND", "latestLedger": 99 })).unwrap();
        assert_eq!(
            pending.status,
            TransactionStatus::Other("NOT_FOUND".to_string())
        );
        assert!(pending.result_payload().is_none());
    }

    #[test]
    fn test_send_response() {
        let response: SendTransactionResponse = serde_json::from_value(json!({
            "status": "TRY_AGAIN_LATER",
            "hash": HASH,
            "latestLedger": 45075181,
            "latestLedgerCloseTime": "1709760932"
        }))
        .unwrap();
        assert_eq!(response.status, SendStatus::TryAgainLater);

        let unknown: SendTransactionResponse =
            serde_json::from_value(json!({ "status": "QUEUED", "hash": HASH })).unwrap();
        assert_eq!(unknown.status, SendStatus::Unknown);
    }
}
