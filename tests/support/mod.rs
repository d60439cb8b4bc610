//! Recording test doubles for the pipeline ports
//!
//! Every double appends the name of each call to one shared log so tests can
//! assert both which collaborators were touched and in what order.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use base64::Engine;
use solana_sdk::{
    hash::Hash,
    message::{v0, Message, VersionedMessage},
    pubkey::Pubkey,
    signature::{Keypair, Signature},
    signer::Signer,
    system_instruction,
    transaction::{Transaction, VersionedTransaction},
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use sol_trade_pipeline::config::ExecutionConfig;
use sol_trade_pipeline::execution::jito::BundleSender;
use sol_trade_pipeline::execution::jupiter::SwapAggregator;
use sol_trade_pipeline::execution::raydium::MigrationIndex;
use sol_trade_pipeline::execution::tensor::{AssetProof, EncodedTransaction, ListingParams, NftMarketplace};
use sol_trade_pipeline::execution::tx_builder::TxFormat;
use sol_trade_pipeline::execution::wallet::{
    Capabilities, Capability, CustodyBackend, KeypairBackend, ProviderTag, WalletError,
};
use sol_trade_pipeline::execution::WalletSession;
use sol_trade_pipeline::network::{ChainRpc, SignatureState};
use sol_trade_pipeline::orchestrator::{TradeOrchestrator, Venues};
use sol_trade_pipeline::utils::types::{Asset, Quote, Venue};

pub type CallLog = Arc<Mutex<Vec<String>>>;

fn record(log: &CallLog, call: impl Into<String>) {
    log.lock().unwrap().push(call.into());
}

/// Cluster double with scripted balances and signature statuses
pub struct FakeRpc {
    log: CallLog,
    pub balance: AtomicU64,
    pub token_balance: AtomicU64,
    pub decimals: Mutex<u8>,
    pub existing: Mutex<HashSet<Pubkey>>,
    pub accounts: Mutex<HashMap<Pubkey, Vec<u8>>>,
    pub status: Mutex<SignatureState>,
    pub sent: Mutex<Vec<VersionedTransaction>>,
    pub send_error: Mutex<Option<String>>,
}

impl FakeRpc {
    fn new(log: CallLog) -> Self {
        Self {
            log,
            balance: AtomicU64::new(10_000_000_000),
            token_balance: AtomicU64::new(0),
            decimals: Mutex::new(6),
            existing: Mutex::new(HashSet::new()),
            accounts: Mutex::new(HashMap::new()),
            status: Mutex::new(SignatureState::Confirmed),
            sent: Mutex::new(Vec::new()),
            send_error: Mutex::new(None),
        }
    }

    pub fn set_balance(&self, lamports: u64) {
        self.balance.store(lamports, Ordering::SeqCst);
    }

    pub fn set_status(&self, status: SignatureState) {
        *self.status.lock().unwrap() = status;
    }

    pub fn mark_existing(&self, address: Pubkey) {
        self.existing.lock().unwrap().insert(address);
    }

    pub fn set_account(&self, address: Pubkey, data: Vec<u8>) {
        self.accounts.lock().unwrap().insert(address, data);
    }

    pub fn sent(&self) -> Vec<VersionedTransaction> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChainRpc for FakeRpc {
    async fn get_balance(&self, _address: &Pubkey) -> Result<u64> {
        record(&self.log, "get_balance");
        Ok(self.balance.load(Ordering::SeqCst))
    }

    async fn latest_blockhash(&self) -> Result<Hash> {
        record(&self.log, "latest_blockhash");
        Ok(Hash::new_unique())
    }

    async fn account_exists(&self, address: &Pubkey) -> Result<bool> {
        record(&self.log, "account_exists");
        Ok(self.existing.lock().unwrap().contains(address)
            || self.accounts.lock().unwrap().contains_key(address))
    }

    async fn account_data(&self, address: &Pubkey) -> Result<Option<Vec<u8>>> {
        record(&self.log, "account_data");
        Ok(self.accounts.lock().unwrap().get(address).cloned())
    }

    async fn token_balance(&self, _token_account: &Pubkey) -> Result<u64> {
        record(&self.log, "token_balance");
        Ok(self.token_balance.load(Ordering::SeqCst))
    }

    async fn mint_decimals(&self, _mint: &Pubkey) -> Result<u8> {
        record(&self.log, "mint_decimals");
        Ok(*self.decimals.lock().unwrap())
    }

    async fn send_transaction(&self, transaction: &VersionedTransaction) -> Result<Signature> {
        record(&self.log, "send_transaction");
        if let Some(message) = self.send_error.lock().unwrap().clone() {
            anyhow::bail!(message);
        }
        self.sent.lock().unwrap().push(transaction.clone());
        Ok(transaction.signatures[0])
    }

    async fn signature_status(&self, _signature: &Signature) -> Result<SignatureState> {
        record(&self.log, "signature_status");
        Ok(self.status.lock().unwrap().clone())
    }
}

/// Builds an unsigned v0 transaction paid by `payer`, base64 encoded
pub fn opaque_v0_payload(payer: &Pubkey) -> String {
    let instruction = system_instruction::transfer(payer, &Pubkey::new_unique(), 1_000);
    let message = v0::Message::try_compile(payer, &[instruction], &[], Hash::new_unique()).unwrap();
    let tx = VersionedTransaction {
        signatures: vec![Signature::default()],
        message: VersionedMessage::V0(message),
    };
    base64::engine::general_purpose::STANDARD.encode(bincode::serialize(&tx).unwrap())
}

/// Unsigned transaction bytes of the given format paid by `payer`
pub fn encoded_step(payer: &Pubkey, blockhash: Hash, format: TxFormat) -> EncodedTransaction {
    let instruction = system_instruction::transfer(payer, &Pubkey::new_unique(), 1);
    let tx = match format {
        TxFormat::Legacy => {
            let message = Message::new_with_blockhash(&[instruction], Some(payer), &blockhash);
            VersionedTransaction::from(Transaction::new_unsigned(message))
        }
        TxFormat::Versioned => {
            let message = v0::Message::try_compile(payer, &[instruction], &[], blockhash).unwrap();
            VersionedTransaction {
                signatures: vec![Signature::default()],
                message: VersionedMessage::V0(message),
            }
        }
    };
    EncodedTransaction { format, bytes: bincode::serialize(&tx).unwrap() }
}

/// Aggregator or general-liquidity double returning a fixed output amount
pub struct FakeAggregator {
    log: CallLog,
    name: &'static str,
    venue: Venue,
    pub out_amount: AtomicU64,
    pub fail_quote: AtomicBool,
    pub compute_unit_price: Mutex<Option<Option<u64>>>,
}

impl FakeAggregator {
    fn new(log: CallLog, name: &'static str, venue: Venue) -> Self {
        Self {
            log,
            name,
            venue,
            out_amount: AtomicU64::new(20_000_000),
            fail_quote: AtomicBool::new(false),
            compute_unit_price: Mutex::new(None),
        }
    }
}

#[async_trait]
impl SwapAggregator for FakeAggregator {
    async fn quote(&self, input: &Asset, output: &Asset, amount: u64, _slippage_bps: u16) -> Result<Quote> {
        record(&self.log, format!("{}.quote", self.name));
        if self.fail_quote.load(Ordering::SeqCst) {
            anyhow::bail!("No routes found for the input and output mints");
        }
        let out_amount = self.out_amount.load(Ordering::SeqCst);
        Ok(Quote {
            input: input.clone(),
            output: output.clone(),
            in_amount: amount,
            out_amount,
            min_out_amount: out_amount - out_amount / 200,
            price_impact_pct: 0.01,
            venue: self.venue,
            route: serde_json::json!({ "routePlan": [] }),
            expires_at: Instant::now() + Duration::from_secs(30),
        })
    }

    async fn build_swap_transaction(
        &self,
        _quote: &Quote,
        payer: &Pubkey,
        compute_unit_price: Option<u64>,
    ) -> Result<String> {
        record(&self.log, format!("{}.build_swap_transaction", self.name));
        *self.compute_unit_price.lock().unwrap() = Some(compute_unit_price);
        Ok(opaque_v0_payload(payer))
    }
}

pub struct FakeMigrations {
    log: CallLog,
    pub migrated: AtomicBool,
}

#[async_trait]
impl MigrationIndex for FakeMigrations {
    async fn is_migrated(&self, _mint: &Pubkey) -> Result<bool> {
        record(&self.log, "is_migrated");
        Ok(self.migrated.load(Ordering::SeqCst))
    }
}

/// Marketplace double. Listing returns `steps` transactions alternating
/// legacy and versioned, paid by the seller.
pub struct FakeMarketplace {
    log: CallLog,
    pub steps: AtomicU64,
    pub proof_error: Mutex<Option<String>>,
}

impl FakeMarketplace {
    fn build_steps(&self, params: &ListingParams) -> Vec<EncodedTransaction> {
        (0..self.steps.load(Ordering::SeqCst))
            .map(|i| {
                let format = if i % 2 == 0 { TxFormat::Legacy } else { TxFormat::Versioned };
                encoded_step(&params.seller, params.blockhash, format)
            })
            .collect()
    }
}

#[async_trait]
impl NftMarketplace for FakeMarketplace {
    async fn list_transactions(&self, params: &ListingParams) -> Result<Vec<EncodedTransaction>> {
        record(&self.log, "list_transactions");
        Ok(self.build_steps(params))
    }

    async fn asset_proof(&self, _asset_id: &Pubkey) -> Result<AssetProof> {
        record(&self.log, "asset_proof");
        if let Some(message) = self.proof_error.lock().unwrap().clone() {
            anyhow::bail!(message);
        }
        Ok(AssetProof {
            tree_id: "tree".into(),
            root: "root".into(),
            leaf: "leaf".into(),
            node_index: 16_384,
            proof: vec!["a".into(), "b".into()],
        })
    }

    async fn compressed_listing_transactions(
        &self,
        params: &ListingParams,
        _proof: &AssetProof,
    ) -> Result<Vec<EncodedTransaction>> {
        record(&self.log, "compressed_listing_transactions");
        Ok(self.build_steps(params))
    }
}

pub struct FakeBundles {
    log: CallLog,
    pub bundles: Mutex<Vec<Vec<String>>>,
}

impl FakeBundles {
    /// Decoded transactions of the last bundle sent
    pub fn last_bundle(&self) -> Vec<VersionedTransaction> {
        self.bundles
            .lock()
            .unwrap()
            .last()
            .cloned()
            .unwrap_or_default()
            .iter()
            .map(|encoded| {
                let bytes = base64::engine::general_purpose::STANDARD.decode(encoded).unwrap();
                bincode::deserialize(&bytes).unwrap()
            })
            .collect()
    }
}

#[async_trait]
impl BundleSender for FakeBundles {
    async fn send_bundle(&self, encoded_transactions: Vec<String>) -> Result<String> {
        record(&self.log, "send_bundle");
        self.bundles.lock().unwrap().push(encoded_transactions);
        Ok("bundle-1".to_string())
    }
}

/// Backend whose user declines every request
pub struct RejectingBackend {
    pub address: Pubkey,
}

#[async_trait]
impl CustodyBackend for RejectingBackend {
    fn tag(&self) -> ProviderTag {
        ProviderTag::Standard
    }

    fn address(&self) -> Pubkey {
        self.address
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::none().with(Capability::SignMessage)
    }

    async fn sign_message(&self, _message: &[u8]) -> Result<Signature> {
        Err(WalletError::user_rejected("User rejected the request.").into())
    }
}

/// Browser-style wallet that can only sign and send in one request. The
/// signed transaction goes to the cluster double unless the user declines.
pub struct SendingBackend {
    inner: KeypairBackend,
    pub reject: bool,
}

impl SendingBackend {
    pub fn new(keypair: Keypair, rpc: Arc<FakeRpc>) -> Self {
        Self { inner: KeypairBackend::new(keypair).with_rpc(rpc), reject: false }
    }

    pub fn declining(mut self) -> Self {
        self.reject = true;
        self
    }
}

#[async_trait]
impl CustodyBackend for SendingBackend {
    fn tag(&self) -> ProviderTag {
        ProviderTag::Standard
    }

    fn address(&self) -> Pubkey {
        self.inner.address()
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::none().with(Capability::SignAndSend)
    }

    async fn sign_and_send(&self, transaction: VersionedTransaction) -> Result<Signature> {
        if self.reject {
            return Err(WalletError::user_rejected("User rejected the request.").into());
        }
        self.inner.sign_and_send(transaction).await
    }
}

/// Every double wired to one call log
pub struct Harness {
    pub log: CallLog,
    pub rpc: Arc<FakeRpc>,
    pub aggregator: Arc<FakeAggregator>,
    pub liquidity: Arc<FakeAggregator>,
    pub migrations: Arc<FakeMigrations>,
    pub marketplace: Arc<FakeMarketplace>,
    pub bundles: Arc<FakeBundles>,
    secret: Vec<u8>,
}

impl Harness {
    pub fn new() -> Self {
        let log: CallLog = Arc::new(Mutex::new(Vec::new()));
        Self {
            rpc: Arc::new(FakeRpc::new(log.clone())),
            aggregator: Arc::new(FakeAggregator::new(log.clone(), "aggregator", Venue::Aggregator)),
            liquidity: Arc::new(FakeAggregator::new(log.clone(), "liquidity", Venue::GeneralLiquidity)),
            migrations: Arc::new(FakeMigrations { log: log.clone(), migrated: AtomicBool::new(false) }),
            marketplace: Arc::new(FakeMarketplace {
                log: log.clone(),
                steps: AtomicU64::new(1),
                proof_error: Mutex::new(None),
            }),
            bundles: Arc::new(FakeBundles { log: log.clone(), bundles: Mutex::new(Vec::new()) }),
            secret: Keypair::new().to_bytes().to_vec(),
            log,
        }
    }

    pub fn keypair(&self) -> Keypair {
        Keypair::from_bytes(&self.secret).unwrap()
    }

    pub fn wallet(&self) -> Pubkey {
        self.keypair().pubkey()
    }

    pub fn settings() -> ExecutionConfig {
        ExecutionConfig {
            confirmation_timeout_secs: 2,
            confirmation_poll_ms: 100,
            ..ExecutionConfig::default()
        }
    }

    /// Session holding the harness keypair as the embedded wallet
    pub fn session(&self) -> WalletSession {
        WalletSession::new(Duration::from_secs(5)).with_embedded(Arc::new(KeypairBackend::new(self.keypair())))
    }

    /// Session whose only wallet signs and sends in one step
    pub fn sending_session(&self, backend: SendingBackend) -> WalletSession {
        WalletSession::new(Duration::from_secs(5)).with_standard(Arc::new(backend))
    }

    pub fn orchestrator(&self) -> TradeOrchestrator {
        self.orchestrator_with(self.session(), Self::settings())
    }

    pub fn orchestrator_with(&self, wallets: WalletSession, settings: ExecutionConfig) -> TradeOrchestrator {
        let venues = Venues {
            aggregator: self.aggregator.clone(),
            general_liquidity: self.liquidity.clone(),
            migrations: self.migrations.clone(),
            marketplace: self.marketplace.clone(),
            bundles: self.bundles.clone(),
        };
        TradeOrchestrator::new(self.rpc.clone(), wallets, venues, settings, 500)
    }

    pub fn calls(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn clear_calls(&self) {
        self.log.lock().unwrap().clear();
    }
}
