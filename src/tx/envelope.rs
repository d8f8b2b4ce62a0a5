//! Transaction envelopes as the tracker sees them

use crate::error::{TrackerError, TrackerResult};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

/// A constructed but not yet authorized transaction.
///
/// Call builders produce these; the tracker only needs the transport form.
pub trait UnsignedTransaction: Send + Sync {
    /// Base64 XDR transaction envelope
    fn to_xdr(&self) -> String;
}

/// Unsigned envelope already held in its transport form
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedEnvelope(pub String);

impl UnsignedEnvelope {
    pub fn new(xdr: impl Into<String>) -> Self {
        Self(xdr.into().trim().to_string())
    }
}

impl UnsignedTransaction for UnsignedEnvelope {
    fn to_xdr(&self) -> String {
        self.0.clone()
    }
}

/// Signed envelope ready for `sendTransaction`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
    xdr: String,
}

impl SignedTransaction {
    /// Build a submittable transaction from a signer's output
    pub fn from_xdr(xdr: impl AsRef<str>) -> TrackerResult<Self> {
        let xdr = xdr.as_ref().trim();
        if xdr.is_empty() {
            return Err(TrackerError::MalformedTransaction(
                "signer returned an empty envelope".to_string(),
            ));
        }

        let decoded = STANDARD.decode(xdr).map_err(|e| {
            TrackerError::MalformedTransaction(format!("signed envelope is not base64 XDR: {}", e))
        })?;
        // XDR is 4-byte aligned
        if decoded.len() % 4 != 0 {
            return Err(TrackerError::MalformedTransaction(format!(
                "signed envelope length {} is not XDR aligned",
                decoded.len()
            )));
        }

        Ok(Self {
            xdr: xdr.to_string(),
        })
    }

    pub fn as_xdr(&self) -> &str {
        &self.xdr
    }
}
