//! Pump.fun bonding-curve program
//!
//! Account layouts, constant-product pricing and the `create` / `buy` /
//! `sell` instruction builders. All amounts are base units; intermediate
//! products use u128.

use anyhow::{Context, Result};
use borsh::{BorshDeserialize, BorshSerialize};
use solana_sdk::{
    instruction::{AccountMeta, Instruction},
    pubkey,
    pubkey::Pubkey,
    system_program, sysvar,
};
use spl_associated_token_account::get_associated_token_address;

use crate::network::ChainRpc;

pub const PROGRAM_ID: Pubkey = pubkey!("6EF8rrecthR5Dkzon8Nwu78hRvfCKubJ14M5uBEwF6P");
pub const METADATA_PROGRAM_ID: Pubkey = pubkey!("metaqbxxUerdq28cj1RbAWkYQm3ybzjb6a8bt518x1s");

/// Decimals of every token the program mints
pub const TOKEN_DECIMALS: u8 = 6;

const BUY_DISCRIMINATOR: [u8; 8] = [102, 6, 61, 18, 1, 218, 235, 234];
const SELL_DISCRIMINATOR: [u8; 8] = [51, 230, 133, 164, 1, 127, 131, 173];
const CREATE_DISCRIMINATOR: [u8; 8] = [24, 30, 200, 40, 5, 28, 7, 119];

const ACCOUNT_DISCRIMINATOR_LEN: usize = 8;
const BPS_DENOMINATOR: u128 = 10_000;

/// Program-wide configuration account
#[derive(Debug, Clone, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct GlobalState {
    pub initialized: bool,
    pub authority: [u8; 32],
    pub fee_recipient: [u8; 32],
    pub initial_virtual_token_reserves: u64,
    pub initial_virtual_sol_reserves: u64,
    pub initial_real_token_reserves: u64,
    pub token_total_supply: u64,
    pub fee_basis_points: u64,
}

impl GlobalState {
    pub fn fee_recipient(&self) -> Pubkey {
        Pubkey::new_from_array(self.fee_recipient)
    }

    /// Tokens received for `sol_in` lamports as the first buy on a fresh curve
    pub fn initial_buy_tokens(&self, sol_in: u64) -> u64 {
        constant_product_buy(
            self.initial_virtual_sol_reserves,
            self.initial_virtual_token_reserves,
            self.initial_real_token_reserves,
            sol_in,
        )
    }
}

/// Per-token curve reserves
#[derive(Debug, Clone, PartialEq, Eq, BorshDeserialize, BorshSerialize)]
pub struct BondingCurveState {
    pub virtual_token_reserves: u64,
    pub virtual_sol_reserves: u64,
    pub real_token_reserves: u64,
    pub real_sol_reserves: u64,
    pub token_total_supply: u64,
    pub complete: bool,
}

impl BondingCurveState {
    /// Tokens received for `sol_in` lamports
    pub fn buy_tokens(&self, sol_in: u64) -> u64 {
        if self.complete {
            return 0;
        }
        constant_product_buy(
            self.virtual_sol_reserves,
            self.virtual_token_reserves,
            self.real_token_reserves,
            sol_in,
        )
    }

    /// Lamports received for `tokens`, net of the protocol fee
    pub fn sell_lamports(&self, tokens: u64, fee_basis_points: u64) -> u64 {
        if self.complete || tokens == 0 {
            return 0;
        }
        let tokens = tokens as u128;
        let gross = tokens * self.virtual_sol_reserves as u128
            / (self.virtual_token_reserves as u128 + tokens);
        let fee = gross * fee_basis_points as u128 / BPS_DENOMINATOR;
        (gross - fee) as u64
    }
}

fn constant_product_buy(virtual_sol: u64, virtual_token: u64, real_token: u64, sol_in: u64) -> u64 {
    if sol_in == 0 || virtual_sol == 0 {
        return 0;
    }
    let product = virtual_sol as u128 * virtual_token as u128;
    let new_sol = virtual_sol as u128 + sol_in as u128;
    let new_token = product / new_sol + 1;
    let out = (virtual_token as u128).saturating_sub(new_token);
    out.min(real_token as u128) as u64
}

/// Upper bound on lamports spent: amount plus slippage
pub fn with_buy_slippage(amount: u64, slippage_bps: u16) -> u64 {
    let amount = amount as u128;
    (amount + amount * slippage_bps as u128 / BPS_DENOMINATOR).min(u64::MAX as u128) as u64
}

/// Lower bound on lamports received: amount minus slippage
pub fn with_sell_slippage(amount: u64, slippage_bps: u16) -> u64 {
    let amount = amount as u128;
    amount.saturating_sub(amount * slippage_bps as u128 / BPS_DENOMINATOR) as u64
}

pub fn global_address() -> Pubkey {
    Pubkey::find_program_address(&[b"global"], &PROGRAM_ID).0
}

pub fn bonding_curve_address(mint: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(&[b"bonding-curve", mint.as_ref()], &PROGRAM_ID).0
}

pub fn mint_authority_address() -> Pubkey {
    Pubkey::find_program_address(&[b"mint-authority"], &PROGRAM_ID).0
}

pub fn event_authority_address() -> Pubkey {
    Pubkey::find_program_address(&[b"__event_authority"], &PROGRAM_ID).0
}

pub fn metadata_address(mint: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(
        &[b"metadata", METADATA_PROGRAM_ID.as_ref(), mint.as_ref()],
        &METADATA_PROGRAM_ID,
    )
    .0
}

fn decode_account<T: BorshDeserialize>(data: &[u8], name: &str) -> Result<T> {
    let mut body = data
        .get(ACCOUNT_DISCRIMINATOR_LEN..)
        .with_context(|| format!("{} account is too short", name))?;
    T::deserialize(&mut body).with_context(|| format!("Failed to decode {} account", name))
}

pub fn decode_global(data: &[u8]) -> Result<GlobalState> {
    decode_account(data, "global")
}

pub fn decode_bonding_curve(data: &[u8]) -> Result<BondingCurveState> {
    decode_account(data, "bonding curve")
}

pub async fn fetch_global(rpc: &dyn ChainRpc) -> Result<GlobalState> {
    let data = rpc
        .account_data(&global_address())
        .await?
        .context("Pump.fun global account not found")?;
    decode_global(&data)
}

/// `None` when the mint has no curve
pub async fn fetch_bonding_curve(rpc: &dyn ChainRpc, mint: &Pubkey) -> Result<Option<BondingCurveState>> {
    rpc.account_data(&bonding_curve_address(mint))
        .await?
        .map(|data| decode_bonding_curve(&data))
        .transpose()
}

#[derive(BorshSerialize)]
struct TradeArgs {
    amount: u64,
    sol_limit: u64,
}

#[derive(BorshSerialize)]
struct CreateArgs<'a> {
    name: &'a str,
    symbol: &'a str,
    uri: &'a str,
}

fn instruction_data<T: BorshSerialize>(discriminator: [u8; 8], args: &T) -> Result<Vec<u8>> {
    let mut data = discriminator.to_vec();
    data.extend(borsh::to_vec(args).context("Failed to encode instruction arguments")?);
    Ok(data)
}

/// Buys exactly `token_amount`, spending at most `max_sol_cost` lamports
pub fn buy_instruction(
    payer: &Pubkey,
    mint: &Pubkey,
    fee_recipient: &Pubkey,
    token_amount: u64,
    max_sol_cost: u64,
) -> Result<Instruction> {
    let bonding_curve = bonding_curve_address(mint);
    Ok(Instruction {
        program_id: PROGRAM_ID,
        accounts: vec![
            AccountMeta::new_readonly(global_address(), false),
            AccountMeta::new(*fee_recipient, false),
            AccountMeta::new_readonly(*mint, false),
            AccountMeta::new(bonding_curve, false),
            AccountMeta::new(get_associated_token_address(&bonding_curve, mint), false),
            AccountMeta::new(get_associated_token_address(payer, mint), false),
            AccountMeta::new(*payer, true),
            AccountMeta::new_readonly(system_program::id(), false),
            AccountMeta::new_readonly(spl_token::id(), false),
            AccountMeta::new_readonly(sysvar::rent::id(), false),
            AccountMeta::new_readonly(event_authority_address(), false),
            AccountMeta::new_readonly(PROGRAM_ID, false),
        ],
        data: instruction_data(BUY_DISCRIMINATOR, &TradeArgs { amount: token_amount, sol_limit: max_sol_cost })?,
    })
}

/// Sells `token_amount`, requiring at least `min_sol_output` lamports back
pub fn sell_instruction(
    payer: &Pubkey,
    mint: &Pubkey,
    fee_recipient: &Pubkey,
    token_amount: u64,
    min_sol_output: u64,
) -> Result<Instruction> {
    let bonding_curve = bonding_curve_address(mint);
    Ok(Instruction {
        program_id: PROGRAM_ID,
        accounts: vec![
            AccountMeta::new_readonly(global_address(), false),
            AccountMeta::new(*fee_recipient, false),
            AccountMeta::new_readonly(*mint, false),
            AccountMeta::new(bonding_curve, false),
            AccountMeta::new(get_associated_token_address(&bonding_curve, mint), false),
            AccountMeta::new(get_associated_token_address(payer, mint), false),
            AccountMeta::new(*payer, true),
            AccountMeta::new_readonly(system_program::id(), false),
            AccountMeta::new_readonly(spl_associated_token_account::id(), false),
            AccountMeta::new_readonly(spl_token::id(), false),
            AccountMeta::new_readonly(event_authority_address(), false),
            AccountMeta::new_readonly(PROGRAM_ID, false),
        ],
        data: instruction_data(SELL_DISCRIMINATOR, &TradeArgs { amount: token_amount, sol_limit: min_sol_output })?,
    })
}

/// Creates a new token and its curve. `mint` must sign.
pub fn create_instruction(
    payer: &Pubkey,
    mint: &Pubkey,
    name: &str,
    symbol: &str,
    uri: &str,
) -> Result<Instruction> {
    let bonding_curve = bonding_curve_address(mint);
    Ok(Instruction {
        program_id: PROGRAM_ID,
        accounts: vec![
            AccountMeta::new(*mint, true),
            AccountMeta::new_readonly(mint_authority_address(), false),
            AccountMeta::new(bonding_curve, false),
            AccountMeta::new(get_associated_token_address(&bonding_curve, mint), false),
            AccountMeta::new_readonly(global_address(), false),
            AccountMeta::new_readonly(METADATA_PROGRAM_ID, false),
            AccountMeta::new(metadata_address(mint), false),
            AccountMeta::new(*payer, true),
            AccountMeta::new_readonly(system_program::id(), false),
            AccountMeta::new_readonly(spl_token::id(), false),
            AccountMeta::new_readonly(spl_associated_token_account::id(), false),
            AccountMeta::new_readonly(sysvar::rent::id(), false),
            AccountMeta::new_readonly(event_authority_address(), false),
            AccountMeta::new_readonly(PROGRAM_ID, false),
        ],
        data: instruction_data(CREATE_DISCRIMINATOR, &CreateArgs { name, symbol, uri })?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn global() -> GlobalState {
        GlobalState {
            initialized: true,
            authority: [1; 32],
            fee_recipient: [2; 32],
            initial_virtual_token_reserves: 1_073_000_000_000_000,
            initial_virtual_sol_reserves: 30_000_000_000,
            initial_real_token_reserves: 793_100_000_000_000,
            token_total_supply: 1_000_000_000_000_000,
            fee_basis_points: 100,
        }
    }

    fn fresh_curve() -> BondingCurveState {
        let g = global();
        BondingCurveState {
            virtual_token_reserves: g.initial_virtual_token_reserves,
            virtual_sol_reserves: g.initial_virtual_sol_reserves,
            real_token_reserves: g.initial_real_token_reserves,
            real_sol_reserves: 0,
            token_total_supply: g.token_total_supply,
            complete: false,
        }
    }

    #[test]
    fn test_buy_price_matches_constant_product() {
        // 1 SOL into 30 SOL x 1.073e15 virtual reserves
        let tokens = fresh_curve().buy_tokens(1_000_000_000);
        let product: u128 = 30_000_000_000u128 * 1_073_000_000_000_000u128;
        let expected = 1_073_000_000_000_000u128 - (product / 31_000_000_000u128 + 1);
        assert_eq!(tokens as u128, expected);
        assert_eq!(global().initial_buy_tokens(1_000_000_000), tokens);
    }

    #[test]
    fn test_buy_capped_by_real_reserves() {
        let mut curve = fresh_curve();
        curve.real_token_reserves = 10;
        assert_eq!(curve.buy_tokens(1_000_000_000), 10);
    }

    #[test]
    fn test_sell_price_deducts_fee() {
        let curve = fresh_curve();
        let gross = curve.sell_lamports(1_000_000_000, 0);
        let net = curve.sell_lamports(1_000_000_000, 100);
        assert_eq!(net, gross - gross / 100);
    }

    #[test]
    fn test_complete_curve_prices_zero() {
        let mut curve = fresh_curve();
        curve.complete = true;
        assert_eq!(curve.buy_tokens(1_000_000_000), 0);
        assert_eq!(curve.sell_lamports(1_000_000, 100), 0);
    }

    #[test]
    fn test_slippage_bounds() {
        assert_eq!(with_buy_slippage(1_000_000, 500), 1_050_000);
        assert_eq!(with_sell_slippage(1_000_000, 500), 950_000);
    }

    #[test]
    fn test_account_decoding_skips_discriminator() {
        let state = global();
        let mut data = vec![0u8; 8];
        data.extend(borsh::to_vec(&state).unwrap());
        data.extend([0u8; 16]);
        assert_eq!(decode_global(&data).unwrap(), state);
        assert!(decode_bonding_curve(&data[..4]).is_err());
    }

    #[test]
    fn test_buy_instruction_layout() {
        let payer = Pubkey::new_unique();
        let mint = Pubkey::new_unique();
        let ix = buy_instruction(&payer, &mint, &global().fee_recipient(), 500, 1_050).unwrap();

        assert_eq!(ix.accounts.len(), 12);
        assert!(ix.accounts[6].is_signer && ix.accounts[6].pubkey == payer);
        assert_eq!(&ix.data[..8], &BUY_DISCRIMINATOR);
        assert_eq!(&ix.data[8..16], &500u64.to_le_bytes());
        assert_eq!(&ix.data[16..24], &1_050u64.to_le_bytes());
    }

    #[test]
    fn test_create_instruction_encodes_strings() {
        let ix = create_instruction(&Pubkey::new_unique(), &Pubkey::new_unique(), "Dog", "DOG", "ipfs://x").unwrap();
        assert!(ix.accounts[0].is_signer);
        assert_eq!(&ix.data[8..12], &3u32.to_le_bytes());
        assert_eq!(&ix.data[12..15], b"Dog");
        // name, symbol and uri each carry a u32 length prefix
        assert_eq!(ix.data.len(), 8 + (4 + 3) + (4 + 3) + (4 + 8));
    }

    #[test]
    fn test_sell_instruction_encodes_min_output() {
        let payer = Pubkey::new_unique();
        let ix = sell_instruction(&payer, &Pubkey::new_unique(), &global().fee_recipient(), 7, 99).unwrap();

        assert_eq!(&ix.data[..8], &SELL_DISCRIMINATOR);
        assert_eq!(&ix.data[8..16], &7u64.to_le_bytes());
        assert_eq!(&ix.data[16..24], &99u64.to_le_bytes());
        assert_eq!(ix.data.len(), 24);
    }

    proptest! {
        #[test]
        fn prop_buy_never_exceeds_reserves(sol_in in 1u64..1_000_000_000_000) {
            let curve = fresh_curve();
            let out = curve.buy_tokens(sol_in);
            prop_assert!(out <= curve.real_token_reserves);
            prop_assert!(out < curve.virtual_token_reserves);
        }

        #[test]
        fn prop_more_sol_never_fewer_tokens(a in 1u64..100_000_000_000, b in 1u64..100_000_000_000) {
            let curve = fresh_curve();
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            prop_assert!(curve.buy_tokens(lo) <= curve.buy_tokens(hi));
        }
    }
}
