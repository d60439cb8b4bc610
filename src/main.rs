//! Solana Trade Pipeline CLI
//!
//! Runs one user action end to end:
//! - native transfers and aggregated swaps
//! - bonding-curve buy, sell and token launch
//! - NFT listing, standard or compressed

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use solana_sdk::pubkey::Pubkey;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};

use sol_trade_pipeline::config::AppConfig;
use sol_trade_pipeline::execution::wallet::{ExternalAppWallet, KeypairBackend};
use sol_trade_pipeline::execution::{FeeMode, WalletSession};
use sol_trade_pipeline::network::{ChainRpc, RpcManager};
use sol_trade_pipeline::orchestrator::{
    CallContext, ExecutionReceipt, ListingRequest, TokenLaunch, TradeOrchestrator, TradeTarget,
};
use sol_trade_pipeline::telemetry::{init_logging, init_metrics};
use sol_trade_pipeline::utils::helpers::load_keypair_from_env_or_file;
use sol_trade_pipeline::utils::types::Asset;

/// Solana trade pipeline - build, sign and submit one action
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Fee mode: priority or jito
    #[arg(long, default_value = "priority")]
    fee_mode: FeeMode,

    /// Fee tier label; the configured default when omitted
    #[arg(long)]
    fee_tier: Option<String>,

    /// Override log level
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send SOL
    Transfer {
        #[arg(long)]
        to: Pubkey,
        /// Amount in SOL
        #[arg(long)]
        amount: Decimal,
    },
    /// Swap through the aggregator
    Swap {
        #[arg(long)]
        input_mint: Pubkey,
        #[arg(long)]
        output_mint: Pubkey,
        /// Amount of the input asset in display units
        #[arg(long)]
        amount: Decimal,
    },
    /// Buy a bonding-curve token with SOL
    Buy {
        #[arg(long)]
        mint: Pubkey,
        /// SOL to spend
        #[arg(long)]
        sol: Decimal,
    },
    /// Sell a bonding-curve token for SOL
    Sell {
        #[arg(long)]
        mint: Pubkey,
        /// Token amount in display units
        #[arg(long)]
        amount: Decimal,
    },
    /// Create a token on a fresh bonding curve
    Launch {
        #[arg(long)]
        name: String,
        #[arg(long)]
        symbol: String,
        /// Uploaded metadata JSON
        #[arg(long)]
        uri: String,
        /// SOL spent on the first buy
        #[arg(long, default_value = "0")]
        initial_buy: Decimal,
    },
    /// List an NFT for sale
    List {
        #[arg(long)]
        asset: Pubkey,
        /// Price in SOL
        #[arg(long)]
        price: Decimal,
        /// Listing duration in days
        #[arg(long)]
        days: Option<u64>,
        /// Asset is compressed
        #[arg(long)]
        compressed: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = AppConfig::load(&args.config)?;
    if let Some(level) = args.log_level.clone() {
        config.telemetry.log_level = level;
    }

    // held until exit so the file writer flushes
    let _log_guard = init_logging(&config.telemetry)?;
    info!("Starting Solana trade pipeline v{}", env!("CARGO_PKG_VERSION"));

    if config.telemetry.enable_metrics {
        init_metrics(config.telemetry.metrics_port)?;
    }

    let rpc: Arc<dyn ChainRpc> = Arc::new(RpcManager::new(&config.rpc)?);
    let wallets = build_wallet_session(&config, rpc.clone())?;
    let orchestrator = TradeOrchestrator::from_config(&config, rpc.clone(), wallets)?;

    let cancel = Arc::new(AtomicBool::new(false));
    let flag = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; cancelling unless signing has begun");
            flag.store(true, Ordering::SeqCst);
        }
    });

    let mut ctx = CallContext::new().with_cancel(cancel);
    if let Some(tier) = args.fee_tier.clone() {
        ctx = ctx.with_fee_tier(tier);
    }

    run(&orchestrator, rpc.as_ref(), args, &ctx).await
}

fn build_wallet_session(config: &AppConfig, rpc: Arc<dyn ChainRpc>) -> Result<WalletSession> {
    let mut session = WalletSession::new(config.execution.signing_timeout());

    if let Some(address) = &config.wallet.external_app_address {
        let address: Pubkey = address
            .parse()
            .with_context(|| format!("Invalid external wallet address: {}", address))?;
        session = session.with_external_app(Arc::new(ExternalAppWallet::new(address)));
    }

    match load_keypair_from_env_or_file(
        config.wallet.keypair_env.as_deref(),
        PathBuf::from(&config.wallet.keypair_path).as_path(),
    ) {
        Ok(keypair) => {
            session = session.with_embedded(Arc::new(KeypairBackend::new(keypair).with_rpc(rpc)));
        }
        Err(e) if config.wallet.external_app_address.is_some() => {
            warn!("No local keypair ({:#}); only the external wallet is available", e);
        }
        Err(e) => return Err(e),
    }

    Ok(session)
}

async fn asset_for(rpc: &dyn ChainRpc, mint: Pubkey) -> Result<Asset> {
    if mint == Asset::native_sol().mint {
        return Ok(Asset::native_sol());
    }
    let decimals = rpc
        .mint_decimals(&mint)
        .await
        .with_context(|| format!("Failed to read decimals for {}", mint))?;
    let asset = Asset::new(mint, decimals, mint.to_string());
    anyhow::ensure!(asset.is_representable(), "{} uses {} decimals, which is not supported", mint, decimals);
    Ok(asset)
}

fn lamports(sol: Decimal) -> Result<u64> {
    Asset::native_sol()
        .to_base_units(sol)
        .with_context(|| format!("{} SOL is not a representable amount", sol))
}

async fn run(
    orchestrator: &TradeOrchestrator,
    rpc: &dyn ChainRpc,
    args: Args,
    ctx: &CallContext,
) -> Result<()> {
    let mode = args.fee_mode;

    match args.command {
        Command::Transfer { to, amount } => {
            let receipt = orchestrator
                .execute_trade(mode, TradeTarget::Transfer(to), lamports(amount)?, ctx)
                .await?;
            print_receipt(&receipt);
        }
        Command::Swap { input_mint, output_mint, amount } => {
            let input = asset_for(rpc, input_mint).await?;
            let output = asset_for(rpc, output_mint).await?;
            let raw = input
                .to_base_units(amount)
                .with_context(|| format!("{} is not a representable amount of {}", amount, input))?;

            let strategy = orchestrator.fee_strategy(mode, ctx)?;
            let swap = orchestrator.execute_swap(input, output, raw, strategy, ctx).await?;
            println!("Swapped {} for {}", swap.realized_input, swap.realized_output);
            print_receipt(&swap.receipt);
        }
        Command::Buy { mint, sol } => {
            let strategy = orchestrator.fee_strategy(mode, ctx)?;
            let swap = orchestrator.buy_token(mint, lamports(sol)?, strategy, ctx).await?;
            println!("Bought {} tokens for {} SOL", swap.realized_output, swap.realized_input);
            print_receipt(&swap.receipt);
        }
        Command::Sell { mint, amount } => {
            let token = asset_for(rpc, mint).await?;
            let raw = token
                .to_base_units(amount)
                .with_context(|| format!("{} is not a representable token amount", amount))?;

            let strategy = orchestrator.fee_strategy(mode, ctx)?;
            let swap = orchestrator.sell_token(mint, raw, strategy, ctx).await?;
            println!("Sold {} tokens for {} SOL", swap.realized_input, swap.realized_output);
            print_receipt(&swap.receipt);
        }
        Command::Launch { name, symbol, uri, initial_buy } => {
            let launch = TokenLaunch {
                name,
                symbol,
                metadata_uri: uri,
                initial_buy_lamports: lamports(initial_buy)?,
            };
            let strategy = orchestrator.fee_strategy(mode, ctx)?;
            let launched = orchestrator.launch_token(launch, strategy, ctx).await?;
            println!("Launched mint {}", launched.mint);
            print_receipt(&launched.receipt);
        }
        Command::List { asset, price, days, compressed } => {
            let request = ListingRequest {
                asset_id: asset,
                compressed,
                price_lamports: lamports(price)?,
                duration_days: days,
            };
            let receipt = orchestrator.list_asset(request, ctx).await?;
            print_receipt(&receipt);
        }
    }

    Ok(())
}

fn print_receipt(receipt: &ExecutionReceipt) {
    for signature in &receipt.signatures {
        println!("Signature: {}", signature);
    }
    if let Some(bundle) = &receipt.bundle_id {
        println!("Bundle: {}", bundle);
    }
    if receipt.is_confirmed() {
        println!("Status: confirmed");
    } else {
        println!("Status: submitted, not yet confirmed; check the signature before retrying");
    }
}
