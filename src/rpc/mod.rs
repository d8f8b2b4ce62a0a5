//! RPC module - network access for submission and confirmation
//!
//! This module provides:
//! - The `NetworkClient` seam the tracker talks to
//! - A JSON-RPC 2.0 client over HTTP for Soroban RPC endpoints
//! - Wire types with explicit transient/fatal error classification

pub mod client;
pub mod types;

pub use client::RpcClient;
pub use types::{
    HealthStatus, ResultPayload, SendStatus, SendTransactionResponse, TransactionHash,
    TransactionRecord, TransactionStatus,
};

use crate::error::QueryError;
use crate::tx::SignedTransaction;

use async_trait::async_trait;

/// Remote network endpoints used by the tracker
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NetworkClient: Send + Sync {
    /// Submit a signed transaction. Called exactly once per tracked submission.
    async fn send_transaction(
        &self,
        tx: &SignedTransaction,
    ) -> Result<SendTransactionResponse, QueryError>;

    /// Query the current status of a submitted transaction
    async fn get_transaction(&self, hash: &TransactionHash)
        -> Result<TransactionRecord, QueryError>;

    /// Check that the network endpoint is up
    async fn health(&self) -> Result<HealthStatus, QueryError>;
}
