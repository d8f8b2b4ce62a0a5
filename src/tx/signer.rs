//! Transaction signing through an external program

use crate::config::SignerConfig;
use crate::error::SignerError;

use async_trait::async_trait;
use std::io::ErrorKind;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

/// Holder of signing authority
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Signer: Send + Sync {
    /// Sign a base64 XDR envelope, returning the signed envelope
    async fn sign(&self, unsigned_xdr: &str) -> Result<String, SignerError>;
}

/// Signs by piping the envelope through a command such as `stellar tx sign`
pub struct CommandSigner {
    program: String,
    args: Vec<String>,
    network_passphrase: String,
    timeout: Duration,
}

impl CommandSigner {
    pub fn new(
        program: impl Into<String>,
        args: Vec<String>,
        network_passphrase: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            program: program.into(),
            args,
            network_passphrase: network_passphrase.into(),
            timeout,
        }
    }

    pub fn from_config(config: &SignerConfig, network_passphrase: &str) -> Self {
        Self::new(
            config.command.clone(),
            config.args.clone(),
            network_passphrase,
            Duration::from_secs(config.timeout_secs),
        )
    }

    async fn run(&self, unsigned_xdr: &str) -> Result<String, SignerError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .env("STELLAR_NETWORK_PASSPHRASE", &self.network_passphrase)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SignerError::Unavailable(format!("{}: {}", self.program, e)))?;

        if let Some(mut stdin) = child.stdin.take() {
            // A signer may exit without reading its input; its exit status decides
            if let Err(e) = stdin.write_all(unsigned_xdr.as_bytes()).await {
                if e.kind() != ErrorKind::BrokenPipe {
                    return Err(SignerError::Unavailable(e.to_string()));
                }
            }
            // Close stdin so the signer sees EOF
            drop(stdin);
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| SignerError::Unavailable(e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            let reason = if stderr.is_empty() {
                format!("{} exited with {}", self.program, output.status)
            } else {
                stderr
            };
            return Err(SignerError::Rejected(reason));
        }

        let signed = String::from_utf8(output.stdout)
            .map_err(|e| SignerError::Rejected(format!("signer output is not UTF-8: {}", e)))?;

        Ok(signed.trim().to_string())
    }
}

#[async_trait]
impl Signer for CommandSigner {
    async fn sign(&self, unsigned_xdr: &str) -> Result<String, SignerError> {
        debug!("Requesting signature from {}", self.program);

        match timeout(self.timeout, self.run(unsigned_xdr)).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "Signer {} did not answer within {:?}",
                    self.program, self.timeout
                );
                Err(SignerError::Unavailable(format!(
                    "no response after {} seconds",
                    self.timeout.as_secs()
                )))
            }
        }
    }
}
