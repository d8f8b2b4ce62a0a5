//! Submission tracker: sign, submit once, poll until the network resolves
//!
//! One `submit()` call walks `Signing -> Submitting -> Polling` and ends in
//! exactly one `ConfirmationOutcome`. Only confirmation polling is retried;
//! the signed transaction is sent to the network a single time.

use super::envelope::{SignedTransaction, UnsignedTransaction};
use super::signer::Signer;
use crate::error::{QueryError, TrackerError, TrackerResult};
use crate::metrics;
use crate::rpc::{
    NetworkClient, ResultPayload, SendStatus, SendTransactionResponse, TransactionHash,
    TransactionRecord, TransactionStatus,
};

use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, error, info, warn};

/// Confirmation polling cadence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollingConfig {
    /// Number of status queries before giving up
    pub max_attempts: u32,
    /// Delay before each status query
    pub interval: Duration,
}

impl PollingConfig {
    /// Longest time a submission can spend in polling, saturating at `Duration::MAX`
    pub fn budget(&self) -> Duration {
        self.interval
            .checked_mul(self.max_attempts)
            .unwrap_or(Duration::MAX)
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            max_attempts: 30,
            interval: Duration::from_secs(2),
        }
    }
}

/// Caller-observable "submission in flight" indicator.
///
/// Clones share state. Only the tracker raises and clears it.
#[derive(Debug, Clone, Default)]
pub struct BusyFlag(Arc<AtomicBool>);

impl BusyFlag {
    pub fn is_busy(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn raise(&self) -> BusyGuard {
        self.0.store(true, Ordering::SeqCst);
        metrics::set_busy(true);
        BusyGuard { flag: self.clone() }
    }
}

/// Clears the busy flag when dropped, including during unwinding
struct BusyGuard {
    flag: BusyFlag,
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.flag.0.store(false, Ordering::SeqCst);
        metrics::set_busy(false);
    }
}

/// Network acknowledgement of an accepted submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionHandle {
    pub hash: TransactionHash,
    pub status: SendStatus,
    pub latest_ledger: Option<u64>,
}

impl SubmissionHandle {
    fn from_response(response: SendTransactionResponse) -> TrackerResult<Self> {
        match response.status {
            SendStatus::Error => {
                return Err(TrackerError::SubmissionRejected(match response.error_result_xdr {
                    Some(xdr) => format!("network returned ERROR, result: {}", xdr),
                    None => "network returned ERROR".to_string(),
                }))
            }
            SendStatus::TryAgainLater => {
                return Err(TrackerError::SubmissionRejected(
                    "network is congested (TRY_AGAIN_LATER)".to_string(),
                ))
            }
            SendStatus::Unknown => {
                warn!("Unrecognized sendTransaction status, tracking {} anyway", response.hash);
            }
            SendStatus::Pending | SendStatus::Duplicate => {}
        }

        Ok(Self {
            hash: TransactionHash::parse(&response.hash)?,
            status: response.status,
            latest_ledger: response.latest_ledger,
        })
    }
}

/// Terminal result of one `submit()` call
#[derive(Debug, Clone, PartialEq)]
pub enum ConfirmationOutcome {
    /// Finalized favorably; `None` when the network returned no result payload
    Success(Option<ResultPayload>),
    /// Finalized unfavorably
    Failed {
        hash: TransactionHash,
        record: TransactionRecord,
    },
    /// No final status within the polling budget
    TimedOut {
        hash: TransactionHash,
        waited: Duration,
    },
    /// Failed before or during submission, or a fatal query error while polling
    SubmitError(TrackerError),
}

impl ConfirmationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, ConfirmationOutcome::Success(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ConfirmationOutcome::Success(_) => "success",
            ConfirmationOutcome::Failed { .. } => "failed",
            ConfirmationOutcome::TimedOut { .. } => "timed_out",
            ConfirmationOutcome::SubmitError(_) => "submit_error",
        }
    }

    /// Cause reported through `on_error`; `None` for success
    pub fn error(&self) -> Option<TrackerError> {
        match self {
            ConfirmationOutcome::Success(_) => None,
            ConfirmationOutcome::Failed { hash, record } => Some(TrackerError::ExecutionFailed {
                hash: hash.to_string(),
                detail: serde_json::to_string(record).unwrap_or_else(|_| format!("{:?}", record)),
            }),
            ConfirmationOutcome::TimedOut { hash, waited } => {
                Some(TrackerError::timeout(hash.as_str(), *waited))
            }
            ConfirmationOutcome::SubmitError(e) => Some(e.clone()),
        }
    }
}

pub type SuccessCallback = Box<dyn Fn(Option<&ResultPayload>) + Send + Sync>;
pub type ErrorCallback = Box<dyn Fn(&TrackerError) + Send + Sync>;

/// Tracks one transaction at a time from signing to finalization.
///
/// Callers must not call `submit()` again while `is_busy()` is true; overlapping
/// calls are neither queued nor rejected.
pub struct SubmissionTracker {
    signer: Arc<dyn Signer>,
    network: Arc<dyn NetworkClient>,
    polling: PollingConfig,
    busy: BusyFlag,
    on_success: Option<SuccessCallback>,
    on_error: Option<ErrorCallback>,
}

impl SubmissionTracker {
    pub fn new(
        signer: Arc<dyn Signer>,
        network: Arc<dyn NetworkClient>,
        polling: PollingConfig,
    ) -> Self {
        Self {
            signer,
            network,
            polling,
            busy: BusyFlag::default(),
            on_success: None,
            on_error: None,
        }
    }

    /// Called once with the result payload when a submission finalizes favorably
    pub fn on_success<F>(mut self, callback: F) -> Self
    where
        F: Fn(Option<&ResultPayload>) + Send + Sync + 'static,
    {
        self.on_success = Some(Box::new(callback));
        self
    }

    /// Called once with the cause of any non-success outcome
    pub fn on_error<F>(mut self, callback: F) -> Self
    where
        F: Fn(&TrackerError) + Send + Sync + 'static,
    {
        self.on_error = Some(Box::new(callback));
        self
    }

    /// Report busy state through an existing flag
    pub fn with_busy_flag(mut self, flag: BusyFlag) -> Self {
        self.busy = flag;
        self
    }

    pub fn is_busy(&self) -> bool {
        self.busy.is_busy()
    }

    /// Handle for observing the busy state from elsewhere
    pub fn busy_flag(&self) -> BusyFlag {
        self.busy.clone()
    }

    pub fn polling(&self) -> PollingConfig {
        self.polling
    }

    /// Sign, submit and confirm one transaction.
    ///
    /// Never fails and never panics on its own account: every failure,
    /// including a panic inside signing, submission or polling, becomes the
    /// returned outcome. The busy flag is cleared before this returns.
    pub async fn submit<T>(&self, tx: &T) -> ConfirmationOutcome
    where
        T: UnsignedTransaction + ?Sized,
    {
        if self.busy.is_busy() {
            warn!("submit() called while another submission is in flight");
        }
        let _busy = self.busy.raise();
        let started = Instant::now();

        let outcome = match AssertUnwindSafe(self.run(tx)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                error!("Submission pipeline panicked: {}", message);
                ConfirmationOutcome::SubmitError(TrackerError::Internal(format!(
                    "submission pipeline panicked: {}",
                    message
                )))
            }
        };

        metrics::record_outcome(outcome.kind(), started.elapsed().as_secs_f64());
        self.notify(&outcome);

        outcome
    }

    async fn run<T>(&self, tx: &T) -> ConfirmationOutcome
    where
        T: UnsignedTransaction + ?Sized,
    {
        match self.sign_and_send(tx).await {
            Ok(handle) => self.confirm(&handle).await,
            Err(e) => {
                error!("Submission failed: {}", e);
                ConfirmationOutcome::SubmitError(e)
            }
        }
    }

    async fn sign_and_send<T>(&self, tx: &T) -> TrackerResult<SubmissionHandle>
    where
        T: UnsignedTransaction + ?Sized,
    {
        let unsigned = tx.to_xdr();

        let signed_xdr = self
            .signer
            .sign(&unsigned)
            .await
            .map_err(|e| TrackerError::SignerRejected(e.to_string()))?;
        let signed = SignedTransaction::from_xdr(signed_xdr)?;

        let response = self
            .network
            .send_transaction(&signed)
            .await
            .map_err(|e| TrackerError::SubmissionRejected(e.to_string()))?;
        metrics::record_submission();

        let handle = SubmissionHandle::from_response(response)?;
        info!(
            "Transaction submitted: {} (status {:?}, latest ledger {:?})",
            handle.hash, handle.status, handle.latest_ledger
        );

        Ok(handle)
    }

    async fn confirm(&self, handle: &SubmissionHandle) -> ConfirmationOutcome {
        let hash = &handle.hash;
        let max_attempts = self.polling.max_attempts;

        for attempt in 1..=max_attempts {
            sleep(self.polling.interval).await;

            match self.network.get_transaction(hash).await {
                Err(e) if e.is_transient() => {
                    debug!(
                        "Transaction {} not visible yet (attempt {}/{}): {}",
                        hash, attempt, max_attempts, e
                    );
                    metrics::record_poll(match e {
                        QueryError::NotFound { .. } => "not_found",
                        _ => "transport",
                    });
                }
                Err(e) => {
                    error!("Fatal error while polling {}: {}", hash, e);
                    metrics::record_poll("fatal");
                    return ConfirmationOutcome::SubmitError(fatal_query(hash, e));
                }
                Ok(record) => match record.status {
                    TransactionStatus::Success => {
                        metrics::record_poll("final");
                        info!(
                            "Transaction {} succeeded in ledger {:?} (attempt {})",
                            hash, record.ledger, attempt
                        );
                        return ConfirmationOutcome::Success(record.result_payload());
                    }
                    TransactionStatus::Failed => {
                        metrics::record_poll("final");
                        warn!("Transaction {} failed in ledger {:?}", hash, record.ledger);
                        return ConfirmationOutcome::Failed {
                            hash: hash.clone(),
                            record,
                        };
                    }
                    TransactionStatus::Other(ref status) => {
                        debug!(
                            "Transaction {} is {} (attempt {}/{})",
                            hash, status, attempt, max_attempts
                        );
                        metrics::record_poll("pending");
                    }
                },
            }
        }

        let waited = self.polling.budget();
        warn!("Gave up on transaction {} after {:?}", hash, waited);
        ConfirmationOutcome::TimedOut {
            hash: hash.clone(),
            waited,
        }
    }

    fn notify(&self, outcome: &ConfirmationOutcome) {
        let delivered = std::panic::catch_unwind(AssertUnwindSafe(|| match outcome {
            ConfirmationOutcome::Success(payload) => {
                if let Some(callback) = &self.on_success {
                    callback(payload.as_ref());
                }
            }
            _ => {
                if let (Some(callback), Some(cause)) = (&self.on_error, outcome.error()) {
                    callback(&cause);
                }
            }
        }));

        if let Err(panic) = delivered {
            error!("Outcome callback panicked: {}", panic_message(panic.as_ref()));
        }
    }
}

fn fatal_query(hash: &TransactionHash, e: QueryError) -> TrackerError {
    let code = e.code();
    let message = match e {
        QueryError::Rpc { message, .. } => message,
        other => other.to_string(),
    };
    TrackerError::FatalQuery {
        hash: hash.to_string(),
        code,
        message,
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
