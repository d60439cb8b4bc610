//! Transaction Submitter
//!
//! Sends signed transactions over RPC or as a private bundle and polls for
//! confirmation. Nothing here retries: a resend of an intent that may have
//! landed risks executing it twice.

use base64::Engine;
use solana_sdk::signature::Signature;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, info, warn};

use super::errors::{diagnostic, ExecutionError, ExecutionResult};
use super::jito::{BundleSender, MAX_BUNDLE_SIZE};
use super::tx_builder::SignedTransaction;
use crate::config::ExecutionConfig;
use crate::network::{ChainRpc, SignatureState};

/// Transaction submitter
pub struct TransactionSubmitter {
    rpc: Arc<dyn ChainRpc>,
    bundles: Arc<dyn BundleSender>,
    confirmation_timeout: Duration,
    poll_interval: Duration,
}

impl TransactionSubmitter {
    pub fn new(
        rpc: Arc<dyn ChainRpc>,
        bundles: Arc<dyn BundleSender>,
        config: &ExecutionConfig,
    ) -> Self {
        Self {
            rpc,
            bundles,
            confirmation_timeout: config.confirmation_timeout(),
            poll_interval: config.confirmation_poll_interval(),
        }
    }

    /// Submits once over RPC. Endpoint errors are surfaced verbatim.
    pub async fn send(&self, transaction: &SignedTransaction) -> ExecutionResult<Signature> {
        let signature = self
            .rpc
            .send_transaction(transaction.transaction())
            .await
            .map_err(|e| ExecutionError::SubmissionFailed(diagnostic(&e)))?;

        info!("Transaction submitted: {}", signature);
        Ok(signature)
    }

    /// Submits all transactions as one bundle, in order. Returns the bundle id.
    pub async fn send_bundle(&self, transactions: &[SignedTransaction]) -> ExecutionResult<String> {
        if transactions.is_empty() || transactions.len() > MAX_BUNDLE_SIZE {
            return Err(ExecutionError::BuildFailed(format!(
                "bundle must hold 1 to {} transactions, got {}",
                MAX_BUNDLE_SIZE,
                transactions.len()
            )));
        }

        let encoded = transactions
            .iter()
            .map(|tx| {
                bincode::serialize(tx.transaction())
                    .map(|bytes| base64::engine::general_purpose::STANDARD.encode(bytes))
                    .map_err(|e| ExecutionError::BuildFailed(format!("serialize: {}", e)))
            })
            .collect::<ExecutionResult<Vec<_>>>()?;

        self.bundles
            .send_bundle(encoded)
            .await
            .map_err(|e| ExecutionError::SubmissionFailed(diagnostic(&e)))
    }

    /// Polls signature status until confirmed, failed on chain, or the
    /// confirmation timeout elapses. Transient status errors keep polling.
    pub async fn confirm(&self, signature: &Signature) -> ExecutionResult<()> {
        let start = Instant::now();

        loop {
            match self.rpc.signature_status(signature).await {
                Ok(SignatureState::Confirmed) => {
                    info!("Transaction {} confirmed in {:?}", signature, start.elapsed());
                    return Ok(());
                }
                Ok(SignatureState::Failed(reason)) => {
                    return Err(ExecutionError::SubmissionFailed(format!(
                        "transaction {} failed on chain: {}",
                        signature, reason
                    )));
                }
                Ok(SignatureState::Pending) => {
                    debug!("Transaction {} pending", signature);
                }
                Err(e) => {
                    warn!("Error checking status: {:#}", e);
                }
            }

            if start.elapsed() + self.poll_interval > self.confirmation_timeout {
                warn!("Confirmation of {} timed out after {:?}", signature, start.elapsed());
                return Err(ExecutionError::ConfirmationTimeout { signature: *signature });
            }
            sleep(self.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use async_trait::async_trait;
    use solana_sdk::{hash::Hash, pubkey::Pubkey, transaction::VersionedTransaction};
    use std::sync::Mutex;

    struct ScriptedRpc {
        statuses: Mutex<Vec<SignatureState>>,
        send_error: Option<String>,
    }

    #[async_trait]
    impl ChainRpc for ScriptedRpc {
        async fn get_balance(&self, _address: &Pubkey) -> Result<u64> {
            Ok(0)
        }
        async fn latest_blockhash(&self) -> Result<Hash> {
            Ok(Hash::default())
        }
        async fn account_exists(&self, _address: &Pubkey) -> Result<bool> {
            Ok(false)
        }
        async fn account_data(&self, _address: &Pubkey) -> Result<Option<Vec<u8>>> {
            Ok(None)
        }
        async fn token_balance(&self, _token_account: &Pubkey) -> Result<u64> {
            Ok(0)
        }
        async fn mint_decimals(&self, _mint: &Pubkey) -> Result<u8> {
            Ok(9)
        }
        async fn send_transaction(&self, tx: &VersionedTransaction) -> Result<Signature> {
            match &self.send_error {
                Some(message) => Err(anyhow::anyhow!(message.clone())),
                None => Ok(tx.signatures[0]),
            }
        }
        async fn signature_status(&self, _signature: &Signature) -> Result<SignatureState> {
            let mut statuses = self.statuses.lock().unwrap();
            Ok(if statuses.len() > 1 { statuses.remove(0) } else { statuses[0].clone() })
        }
    }

    struct NoBundles;

    #[async_trait]
    impl BundleSender for NoBundles {
        async fn send_bundle(&self, _encoded: Vec<String>) -> Result<String> {
            anyhow::bail!("bundles disabled")
        }
    }

    fn submitter(statuses: Vec<SignatureState>, send_error: Option<&str>) -> TransactionSubmitter {
        let rpc = Arc::new(ScriptedRpc {
            statuses: Mutex::new(statuses),
            send_error: send_error.map(str::to_string),
        });
        let config = ExecutionConfig { confirmation_timeout_secs: 2, ..ExecutionConfig::default() };
        TransactionSubmitter::new(rpc, Arc::new(NoBundles), &config)
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirm_after_pending() {
        let submitter = submitter(
            vec![SignatureState::Pending, SignatureState::Pending, SignatureState::Confirmed],
            None,
        );
        assert!(submitter.confirm(&Signature::default()).await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_confirm_timeout_returns_signature() {
        let submitter = submitter(vec![SignatureState::Pending], None);
        let sig = Signature::new_unique();
        let err = submitter.confirm(&sig).await.unwrap_err();
        assert_eq!(err, ExecutionError::ConfirmationTimeout { signature: sig });
    }

    #[tokio::test(start_paused = true)]
    async fn test_on_chain_failure_is_not_soft() {
        let submitter = submitter(vec![SignatureState::Failed("InstructionError(2)".into())], None);
        let err = submitter.confirm(&Signature::default()).await.unwrap_err();
        assert!(!err.is_soft());
        assert!(err.to_string().contains("InstructionError(2)"));
    }

    #[tokio::test]
    async fn test_bundle_error_is_submission_failure() {
        let submitter = submitter(vec![SignatureState::Pending], None);
        let signed = SignedTransaction::from_wallet(VersionedTransaction {
            signatures: vec![Signature::new_unique()],
            message: solana_sdk::message::VersionedMessage::Legacy(solana_sdk::message::Message::new(
                &[solana_sdk::system_instruction::transfer(&Pubkey::new_unique(), &Pubkey::new_unique(), 1)],
                None,
            )),
        })
        .unwrap();
        let err = submitter.send_bundle(&[signed]).await.unwrap_err();
        assert_eq!(err, ExecutionError::SubmissionFailed("bundles disabled".into()));
    }

    #[tokio::test]
    async fn test_bundle_size_checked() {
        let submitter = submitter(vec![SignatureState::Pending], None);
        assert!(matches!(
            submitter.send_bundle(&[]).await,
            Err(ExecutionError::BuildFailed(_))
        ));
    }
}
