//! Soroban transaction tracker
//!
//! Takes a user-authorized but unconfirmed transaction, submits it once to a
//! Soroban RPC endpoint and polls `getTransaction` until the network reports
//! a final status or the polling budget runs out.

pub mod api;
pub mod config;
pub mod error;
pub mod metrics;
pub mod rpc;
pub mod tx;

pub use error::{QueryError, SignerError, TrackerError, TrackerResult};
pub use rpc::{NetworkClient, RpcClient, TransactionHash};
pub use tx::{
    BusyFlag, CommandSigner, ConfirmationOutcome, PollingConfig, Signer, SubmissionTracker,
    UnsignedEnvelope, UnsignedTransaction,
};
