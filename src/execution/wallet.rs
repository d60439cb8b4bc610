//! Wallet Capability Adapter
//!
//! Custody backends differ in what they can do. Some sign locally, some only
//! sign-and-send, and some are reachable only through an external app handoff.
//! A `WalletSession` resolves one backend per operation in fixed preference
//! order and hands out a `SigningProvider` that enforces the capability set.

use anyhow::Result;
use async_trait::async_trait;
use solana_sdk::{
    instruction::Instruction,
    pubkey::Pubkey,
    signature::{Keypair, Signature},
    signer::Signer,
    transaction::VersionedTransaction,
};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::errors::{diagnostic, ExecutionError, ExecutionResult};
use super::tx_builder::{compose, decode_opaque, SignedTransaction, UnsignedTransaction};
use crate::network::ChainRpc;

/// Wallet-standard code for a user-declined request
pub const USER_REJECTED_CODE: i64 = 4001;

/// Flow a caller must use when the resolved wallet cannot sign locally
pub const EXTERNAL_HANDOFF_FLOW: &str = "external wallet app handoff";

/// Which kind of custody backend a handle wraps
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderTag {
    /// Wallet-standard connection
    Standard,
    /// Reachable only through an external app, no local provider
    ExternalApp,
    /// Embedded or local keypair custody
    Embedded,
}

impl ProviderTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderTag::Standard => "standard",
            ProviderTag::ExternalApp => "external_app",
            ProviderTag::Embedded => "embedded",
        }
    }
}

impl fmt::Display for ProviderTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    SignAndSend,
    SignMessage,
    SignBase64,
}

impl Capability {
    fn bit(self) -> u8 {
        match self {
            Capability::SignAndSend => 1,
            Capability::SignMessage => 1 << 1,
            Capability::SignBase64 => 1 << 2,
        }
    }
}

/// Explicit capability set of a custody backend
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities(u8);

impl Capabilities {
    pub fn none() -> Self {
        Self(0)
    }

    pub fn all() -> Self {
        Self::none()
            .with(Capability::SignAndSend)
            .with(Capability::SignMessage)
            .with(Capability::SignBase64)
    }

    pub fn with(self, capability: Capability) -> Self {
        Self(self.0 | capability.bit())
    }

    pub fn contains(&self, capability: Capability) -> bool {
        self.0 & capability.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }
}

/// Structured failure a backend reports, e.g. a wallet-standard error
#[derive(Debug, Clone, thiserror::Error)]
#[error("wallet error {code}: {message}")]
pub struct WalletError {
    pub code: i64,
    pub message: String,
}

impl WalletError {
    pub fn user_rejected(message: impl Into<String>) -> Self {
        Self { code: USER_REJECTED_CODE, message: message.into() }
    }

    /// Code 4001, or a wallet that reports cancellation under another code
    pub fn is_user_rejection(&self) -> bool {
        if self.code == USER_REJECTED_CODE {
            return true;
        }
        let message = self.message.to_lowercase();
        ["reject", "cancel", "denied", "declined"]
            .iter()
            .any(|word| message.contains(word))
    }
}

/// A custody backend. Defaults report the capability as unsupported.
#[async_trait]
pub trait CustodyBackend: Send + Sync {
    fn tag(&self) -> ProviderTag;

    fn address(&self) -> Pubkey;

    fn capabilities(&self) -> Capabilities;

    /// Signs serialized message bytes
    async fn sign_message(&self, _message: &[u8]) -> Result<Signature> {
        anyhow::bail!("{} wallet cannot sign messages", self.tag())
    }

    /// Signs and submits; the backend owns the submission
    async fn sign_and_send(&self, _transaction: VersionedTransaction) -> Result<Signature> {
        anyhow::bail!("{} wallet cannot sign and send", self.tag())
    }
}

/// Local keypair custody
pub struct KeypairBackend {
    keypair: Keypair,
    tag: ProviderTag,
    rpc: Option<Arc<dyn ChainRpc>>,
}

impl KeypairBackend {
    pub fn new(keypair: Keypair) -> Self {
        Self { keypair, tag: ProviderTag::Embedded, rpc: None }
    }

    /// Presents this keypair under a different provider tag
    pub fn with_tag(mut self, tag: ProviderTag) -> Self {
        self.tag = tag;
        self
    }

    /// Enables sign-and-send through the given RPC
    pub fn with_rpc(mut self, rpc: Arc<dyn ChainRpc>) -> Self {
        self.rpc = Some(rpc);
        self
    }
}

#[async_trait]
impl CustodyBackend for KeypairBackend {
    fn tag(&self) -> ProviderTag {
        self.tag
    }

    fn address(&self) -> Pubkey {
        self.keypair.pubkey()
    }

    fn capabilities(&self) -> Capabilities {
        let caps = Capabilities::none()
            .with(Capability::SignMessage)
            .with(Capability::SignBase64);
        if self.rpc.is_some() {
            caps.with(Capability::SignAndSend)
        } else {
            caps
        }
    }

    async fn sign_message(&self, message: &[u8]) -> Result<Signature> {
        Ok(self.keypair.sign_message(message))
    }

    async fn sign_and_send(&self, mut transaction: VersionedTransaction) -> Result<Signature> {
        let Some(rpc) = &self.rpc else {
            anyhow::bail!("keypair wallet has no RPC for sign-and-send");
        };
        let message = transaction.message.serialize();
        let required = transaction.message.header().num_required_signatures as usize;
        let index = transaction
            .message
            .static_account_keys()
            .iter()
            .take(required)
            .position(|key| *key == self.keypair.pubkey())
            .ok_or_else(|| anyhow::anyhow!("{} is not a required signer", self.keypair.pubkey()))?;
        let slot = transaction
            .signatures
            .get_mut(index)
            .ok_or_else(|| anyhow::anyhow!("transaction has no signature slot {}", index))?;
        *slot = self.keypair.sign_message(&message);
        rpc.send_transaction(&transaction).await
    }
}

/// Wallet known only by address; signing happens in another app
pub struct ExternalAppWallet {
    address: Pubkey,
}

impl ExternalAppWallet {
    pub fn new(address: Pubkey) -> Self {
        Self { address }
    }
}

#[async_trait]
impl CustodyBackend for ExternalAppWallet {
    fn tag(&self) -> ProviderTag {
        ProviderTag::ExternalApp
    }

    fn address(&self) -> Pubkey {
        self.address
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::none()
    }
}

/// Available custody backends for one user
#[derive(Clone, Default)]
pub struct WalletSession {
    standard: Option<Arc<dyn CustodyBackend>>,
    external_app: Option<Arc<dyn CustodyBackend>>,
    embedded: Option<Arc<dyn CustodyBackend>>,
    signing_timeout: Duration,
}

impl WalletSession {
    pub fn new(signing_timeout: Duration) -> Self {
        Self { signing_timeout, ..Default::default() }
    }

    pub fn with_standard(mut self, backend: Arc<dyn CustodyBackend>) -> Self {
        self.standard = Some(backend);
        self
    }

    pub fn with_external_app(mut self, backend: Arc<dyn CustodyBackend>) -> Self {
        self.external_app = Some(backend);
        self
    }

    pub fn with_embedded(mut self, backend: Arc<dyn CustodyBackend>) -> Self {
        self.embedded = Some(backend);
        self
    }

    /// First available backend: standard, then external app, then embedded
    pub fn resolve(&self) -> ExecutionResult<WalletHandle> {
        let backend = self
            .standard
            .as_ref()
            .or(self.external_app.as_ref())
            .or(self.embedded.as_ref())
            .ok_or(ExecutionError::WalletNotConnected)?;

        let handle = WalletHandle {
            tag: backend.tag(),
            address: backend.address(),
            capabilities: backend.capabilities(),
            backend: backend.clone(),
            signing_timeout: self.signing_timeout,
        };
        debug!("Resolved {} wallet {}", handle.tag, handle.address);
        Ok(handle)
    }
}

/// Resolved wallet for one operation
#[derive(Clone)]
pub struct WalletHandle {
    tag: ProviderTag,
    address: Pubkey,
    capabilities: Capabilities,
    backend: Arc<dyn CustodyBackend>,
    signing_timeout: Duration,
}

impl fmt::Debug for WalletHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WalletHandle")
            .field("tag", &self.tag)
            .field("address", &self.address)
            .field("capabilities", &self.capabilities)
            .finish()
    }
}

impl WalletHandle {
    pub fn tag(&self) -> ProviderTag {
        self.tag
    }

    pub fn address(&self) -> Pubkey {
        self.address
    }

    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Local signing provider, or a capability error naming the handoff flow
    pub fn provider(&self) -> ExecutionResult<SigningProvider> {
        if self.tag == ProviderTag::ExternalApp || self.capabilities.is_empty() {
            return Err(ExecutionError::CapabilityUnavailable {
                provider: self.tag.to_string(),
                alternate_flow: EXTERNAL_HANDOFF_FLOW.to_string(),
            });
        }

        Ok(SigningProvider {
            tag: self.tag,
            address: self.address,
            capabilities: self.capabilities,
            backend: self.backend.clone(),
            signing_timeout: self.signing_timeout,
        })
    }
}

/// Signs or signs-and-sends through one resolved backend. Every backend call
/// is bounded by the signing timeout.
pub struct SigningProvider {
    tag: ProviderTag,
    address: Pubkey,
    capabilities: Capabilities,
    backend: Arc<dyn CustodyBackend>,
    signing_timeout: Duration,
}

impl SigningProvider {
    pub fn address(&self) -> Pubkey {
        self.address
    }

    pub fn can(&self, capability: Capability) -> bool {
        self.capabilities.contains(capability)
    }

    fn require(&self, capability: Capability, alternate_flow: &str) -> ExecutionResult<()> {
        if self.can(capability) {
            Ok(())
        } else {
            Err(ExecutionError::CapabilityUnavailable {
                provider: self.tag.to_string(),
                alternate_flow: alternate_flow.to_string(),
            })
        }
    }

    async fn bounded<T>(
        &self,
        fut: impl std::future::Future<Output = Result<T>>,
    ) -> ExecutionResult<T> {
        match tokio::time::timeout(self.signing_timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(classify_signing_failure(&e)),
            Err(_) => {
                warn!("Wallet approval timed out after {:?}", self.signing_timeout);
                Err(ExecutionError::SigningTimeout)
            }
        }
    }

    /// Adds this wallet's signature. Slots already filled, such as an
    /// ephemeral mint signer's, are kept.
    pub async fn sign_transaction(
        &self,
        mut transaction: UnsignedTransaction,
    ) -> ExecutionResult<SignedTransaction> {
        self.require(Capability::SignMessage, "sign-and-send")?;

        let message = transaction.message_bytes();
        let signature = self.bounded(self.backend.sign_message(&message)).await?;
        transaction.apply_signature(&self.address, signature)?;
        transaction.into_signed()
    }

    /// Signs and submits in one backend call when supported, otherwise signs
    /// locally and submits through `rpc`
    pub async fn sign_and_send(
        &self,
        transaction: UnsignedTransaction,
        rpc: &dyn ChainRpc,
    ) -> ExecutionResult<Signature> {
        if self.can(Capability::SignAndSend) {
            let tx = transaction.to_versioned();
            return self.bounded(self.backend.sign_and_send(tx)).await;
        }

        let signed = self.sign_transaction(transaction).await?;
        rpc.send_transaction(signed.transaction())
            .await
            .map_err(|e| ExecutionError::SubmissionFailed(diagnostic(&e)))
    }

    /// Compiles instructions with this wallet as fee payer, then signs
    pub async fn sign_instructions(
        &self,
        instructions: &[Instruction],
        rpc: &dyn ChainRpc,
    ) -> ExecutionResult<SignedTransaction> {
        let blockhash = rpc
            .latest_blockhash()
            .await
            .map_err(|e| ExecutionError::BuildFailed(diagnostic(&e)))?;
        let transaction = compose(instructions, &self.address, blockhash, None)?;
        self.sign_transaction(transaction).await
    }

    /// Decodes an opaque base64 transaction and signs it
    pub async fn sign_base64(&self, payload: &str) -> ExecutionResult<SignedTransaction> {
        self.require(Capability::SignBase64, "native transaction signing")?;
        let transaction = decode_opaque(payload)?;
        self.sign_transaction(transaction).await
    }
}

/// Maps a backend failure to user cancellation or a technical failure.
/// Only a structured `WalletError` can signal rejection; wording from RPC
/// or transport layers never does.
pub fn classify_signing_failure(err: &anyhow::Error) -> ExecutionError {
    let rejected = err
        .chain()
        .filter_map(|cause| cause.downcast_ref::<WalletError>())
        .any(WalletError::is_user_rejection);

    if rejected {
        ExecutionError::UserRejectedSignature
    } else {
        ExecutionError::SubmissionFailed(diagnostic(err))
    }
}
