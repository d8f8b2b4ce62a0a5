//! Transaction submission module: signing, single submission and confirmation polling

mod envelope;
mod signer;
mod tracker;

pub use envelope::{SignedTransaction, UnsignedEnvelope, UnsignedTransaction};
pub use signer::{CommandSigner, Signer};
pub use tracker::{
    BusyFlag, ConfirmationOutcome, ErrorCallback, PollingConfig, SubmissionHandle,
    SubmissionTracker, SuccessCallback,
};

#[cfg(test)]
pub use signer::MockSigner;
