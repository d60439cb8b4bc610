//! Transaction Builder
//!
//! Produces unsigned transactions two ways:
//! - decoding an opaque payload composed by a trusted backend or aggregator
//! - compiling a local instruction list with fee payer and blockhash
//!
//! Decoding is an explicit two-branch operation with a typed failure. A
//! payload's format tag always matches the message variant it decodes to.

use base64::Engine;
use solana_sdk::{
    hash::Hash,
    instruction::{AccountMeta, Instruction},
    message::{Message, VersionedMessage},
    pubkey::Pubkey,
    signature::{Keypair, Signature},
    signer::Signer,
    transaction::{Transaction, VersionedTransaction},
};
use spl_associated_token_account::{
    get_associated_token_address, instruction::create_associated_token_account_idempotent,
};
use std::fmt;
use tracing::debug;

use super::errors::{diagnostic, ExecutionError, ExecutionResult};
use super::tensor::{AssetProof, NftMarketplace};
use crate::network::ChainRpc;

/// Wire format of a transaction payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxFormat {
    Legacy,
    Versioned,
}

impl TxFormat {
    pub fn of(message: &VersionedMessage) -> Self {
        match message {
            VersionedMessage::Legacy(_) => TxFormat::Legacy,
            VersionedMessage::V0(_) => TxFormat::Versioned,
        }
    }
}

impl fmt::Display for TxFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TxFormat::Legacy => write!(f, "legacy"),
            TxFormat::Versioned => write!(f, "versioned"),
        }
    }
}

/// A transaction awaiting one or more signatures
#[derive(Debug, Clone)]
pub struct UnsignedTransaction {
    tx: VersionedTransaction,
    format: TxFormat,
}

impl UnsignedTransaction {
    fn new(tx: VersionedTransaction) -> ExecutionResult<Self> {
        let required = tx.message.header().num_required_signatures as usize;
        let key_count = tx.message.static_account_keys().len();
        if required == 0 {
            return Err(ExecutionError::BuildFailed(
                "transaction requires no signers; the fee payer must sign".into(),
            ));
        }
        if key_count == 0 || key_count < required {
            return Err(ExecutionError::BuildFailed(format!(
                "transaction lists {} account keys for {} required signers",
                key_count, required
            )));
        }
        if tx.signatures.len() != required {
            return Err(ExecutionError::BuildFailed(format!(
                "transaction carries {} signature slots for {} required signers",
                tx.signatures.len(),
                required
            )));
        }

        let format = TxFormat::of(&tx.message);
        Ok(Self { tx, format })
    }

    pub fn format(&self) -> TxFormat {
        self.format
    }

    pub fn fee_payer(&self) -> Pubkey {
        // non-empty key list checked on construction
        self.tx.message.static_account_keys()[0]
    }

    pub fn recent_blockhash(&self) -> Hash {
        *self.tx.message.recent_blockhash()
    }

    pub fn message(&self) -> &VersionedMessage {
        &self.tx.message
    }

    pub fn to_versioned(&self) -> VersionedTransaction {
        self.tx.clone()
    }

    /// Serialized message, the bytes every signer signs
    pub fn message_bytes(&self) -> Vec<u8> {
        self.tx.message.serialize()
    }

    /// Accounts that must sign, in signature-slot order
    pub fn required_signers(&self) -> &[Pubkey] {
        let required = self.tx.message.header().num_required_signatures as usize;
        &self.tx.message.static_account_keys()[..required]
    }

    /// Required signers whose slot is still empty
    pub fn missing_signers(&self) -> Vec<Pubkey> {
        self.required_signers()
            .iter()
            .zip(self.tx.signatures.iter())
            .filter(|(_, sig)| **sig == Signature::default())
            .map(|(key, _)| *key)
            .collect()
    }

    /// Places a signature into the slot of `signer`
    pub fn apply_signature(&mut self, signer: &Pubkey, signature: Signature) -> ExecutionResult<()> {
        let index = self
            .required_signers()
            .iter()
            .position(|key| key == signer)
            .ok_or_else(|| {
                ExecutionError::BuildFailed(format!("{} is not a required signer", signer))
            })?;
        self.tx.signatures[index] = signature;
        Ok(())
    }

    /// Instruction list with resolved account metas. `None` when the message
    /// loads accounts from lookup tables, which cannot be resolved offline.
    pub fn instructions(&self) -> Option<Vec<Instruction>> {
        if self
            .tx
            .message
            .address_table_lookups()
            .map_or(false, |lookups| !lookups.is_empty())
        {
            return None;
        }

        let keys = self.tx.message.static_account_keys();
        let header = self.tx.message.header();
        let signed = header.num_required_signatures as usize;
        let readonly_signed = header.num_readonly_signed_accounts as usize;
        let readonly_unsigned = header.num_readonly_unsigned_accounts as usize;
        let is_writable = |i: usize| {
            if i < signed {
                i < signed.saturating_sub(readonly_signed)
            } else {
                i < keys.len().saturating_sub(readonly_unsigned)
            }
        };

        self.tx
            .message
            .instructions()
            .iter()
            .map(|ix| {
                let program_id = *keys.get(ix.program_id_index as usize)?;
                let accounts = ix
                    .accounts
                    .iter()
                    .map(|&index| {
                        let i = index as usize;
                        let pubkey = *keys.get(i)?;
                        Some(if is_writable(i) {
                            AccountMeta::new(pubkey, i < signed)
                        } else {
                            AccountMeta::new_readonly(pubkey, i < signed)
                        })
                    })
                    .collect::<Option<Vec<_>>>()?;
                Some(Instruction { program_id, accounts, data: ix.data.clone() })
            })
            .collect()
    }

    pub fn serialize(&self) -> ExecutionResult<Vec<u8>> {
        bincode::serialize(&self.tx)
            .map_err(|e| ExecutionError::BuildFailed(format!("serialize: {}", e)))
    }

    pub fn to_base64(&self) -> ExecutionResult<String> {
        Ok(base64::engine::general_purpose::STANDARD.encode(self.serialize()?))
    }

    /// Finishes signing. Fails when any required slot is still empty.
    pub fn into_signed(self) -> ExecutionResult<SignedTransaction> {
        let missing = self.missing_signers();
        if !missing.is_empty() {
            return Err(ExecutionError::BuildFailed(format!(
                "missing signatures for {:?}",
                missing
            )));
        }
        Ok(SignedTransaction { tx: self.tx })
    }
}

/// Fully signed transaction, held only between signing and submission
#[derive(Debug, Clone)]
pub struct SignedTransaction {
    tx: VersionedTransaction,
}

impl SignedTransaction {
    /// Wraps a transaction a wallet returned signed
    pub fn from_wallet(tx: VersionedTransaction) -> ExecutionResult<Self> {
        UnsignedTransaction::new(tx)?.into_signed()
    }

    /// Fee payer signature, which identifies the transaction on chain
    pub fn signature(&self) -> Signature {
        self.tx.signatures.first().copied().unwrap_or_default()
    }

    pub fn transaction(&self) -> &VersionedTransaction {
        &self.tx
    }

    pub fn to_base64(&self) -> ExecutionResult<String> {
        let bytes = bincode::serialize(&self.tx)
            .map_err(|e| ExecutionError::BuildFailed(format!("serialize: {}", e)))?;
        Ok(base64::engine::general_purpose::STANDARD.encode(bytes))
    }
}

/// Single-use keypair for a brand-new account such as a token mint.
/// Consumed by [`compose`]; never cloned or stored.
pub struct EphemeralSigner {
    keypair: Keypair,
}

impl EphemeralSigner {
    pub fn generate() -> Self {
        Self { keypair: Keypair::new() }
    }

    pub fn pubkey(&self) -> Pubkey {
        self.keypair.pubkey()
    }
}

impl fmt::Debug for EphemeralSigner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EphemeralSigner").field("pubkey", &self.pubkey()).finish()
    }
}

/// Decodes a base64 payload of unknown format: versioned first, then legacy
pub fn decode_opaque(payload: &str) -> ExecutionResult<UnsignedTransaction> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| ExecutionError::BuildFailed(format!("payload is not base64: {}", e)))?;

    match bincode::deserialize::<VersionedTransaction>(&bytes) {
        Ok(tx) => UnsignedTransaction::new(tx),
        Err(versioned_err) => match bincode::deserialize::<Transaction>(&bytes) {
            Ok(tx) => UnsignedTransaction::new(VersionedTransaction::from(tx)),
            Err(legacy_err) => Err(ExecutionError::BuildFailed(format!(
                "payload is neither versioned ({}) nor legacy ({})",
                versioned_err, legacy_err
            ))),
        },
    }
}

/// Decodes bytes along the path named by `format`, failing on a mismatch
pub fn decode_with_format(bytes: &[u8], format: TxFormat) -> ExecutionResult<UnsignedTransaction> {
    let tx = match format {
        TxFormat::Versioned => bincode::deserialize::<VersionedTransaction>(bytes)
            .map_err(|e| ExecutionError::BuildFailed(format!("versioned decode: {}", e)))?,
        TxFormat::Legacy => {
            if bytes_carry_version_prefix(bytes) {
                return Err(format_mismatch(format, TxFormat::Versioned));
            }
            let legacy = bincode::deserialize::<Transaction>(bytes)
                .map_err(|e| ExecutionError::BuildFailed(format!("legacy decode: {}", e)))?;
            VersionedTransaction::from(legacy)
        }
    };

    let decoded = TxFormat::of(&tx.message);
    if decoded != format {
        return Err(format_mismatch(format, decoded));
    }
    UnsignedTransaction::new(tx)
}

fn format_mismatch(expected: TxFormat, actual: TxFormat) -> ExecutionError {
    ExecutionError::BuildFailed(format!(
        "format tag mismatch: tagged {}, payload is {}",
        expected, actual
    ))
}

/// The first message byte has its high bit set for versioned messages
fn bytes_carry_version_prefix(bytes: &[u8]) -> bool {
    let Some((&count, rest)) = bytes.split_first() else {
        return false;
    };
    // signature count is a short-vec; counts below 128 take one byte
    if count >= 0x80 {
        return false;
    }
    rest.get(count as usize * 64).map_or(false, |b| b & 0x80 != 0)
}

/// Compiles a legacy transaction and partially signs with the ephemeral
/// signer when one is supplied, consuming it
pub fn compose(
    instructions: &[Instruction],
    payer: &Pubkey,
    blockhash: Hash,
    ephemeral: Option<EphemeralSigner>,
) -> ExecutionResult<UnsignedTransaction> {
    if instructions.is_empty() {
        return Err(ExecutionError::BuildFailed("no instructions to compose".into()));
    }

    let message = Message::new_with_blockhash(instructions, Some(payer), &blockhash);
    let mut tx = Transaction::new_unsigned(message);

    if let Some(signer) = ephemeral {
        tx.try_partial_sign(&[&signer.keypair], blockhash)
            .map_err(|e| ExecutionError::BuildFailed(format!("ephemeral signer: {}", e)))?;
        debug!("Partially signed with ephemeral signer {}", signer.pubkey());
    }

    UnsignedTransaction::new(VersionedTransaction::from(tx))
}

/// Adds an idempotent associated-account creation instruction only when the
/// account is absent on chain and not already being created. Returns the
/// associated account address.
pub async fn ensure_associated_account(
    rpc: &dyn ChainRpc,
    instructions: &mut Vec<Instruction>,
    owner: &Pubkey,
    mint: &Pubkey,
    payer: &Pubkey,
) -> ExecutionResult<Pubkey> {
    let ata = get_associated_token_address(owner, mint);

    let exists = rpc
        .account_exists(&ata)
        .await
        .map_err(|e| ExecutionError::BuildFailed(diagnostic(&e)))?;
    if exists {
        debug!("Associated account {} already exists", ata);
        return Ok(ata);
    }

    let create = create_associated_token_account_idempotent(payer, owner, mint, &spl_token::id());
    if !instructions.contains(&create) {
        instructions.push(create);
    }
    Ok(ata)
}

/// Fetches a compressed asset's inclusion proof for immediate use. Proofs go
/// stale as soon as the tree changes, so none is ever cached.
pub async fn fetch_fresh_proof(
    marketplace: &dyn NftMarketplace,
    asset_id: &Pubkey,
) -> ExecutionResult<AssetProof> {
    let proof = marketplace
        .asset_proof(asset_id)
        .await
        .map_err(|e| ExecutionError::ProofUnavailable(diagnostic(&e)))?;

    debug!(
        "Fetched proof for {} in tree {} ({} nodes)",
        asset_id,
        proof.tree_id,
        proof.proof.len()
    );
    Ok(proof)
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::{
        message::v0,
        system_instruction,
    };

    fn transfer_ixs(payer: &Pubkey) -> Vec<Instruction> {
        vec![system_instruction::transfer(payer, &Pubkey::new_unique(), 42)]
    }

    fn v0_bytes(payer: &Pubkey) -> Vec<u8> {
        let message = v0::Message::try_compile(payer, &transfer_ixs(payer), &[], Hash::new_unique()).unwrap();
        let tx = VersionedTransaction {
            signatures: vec![Signature::default()],
            message: VersionedMessage::V0(message),
        };
        bincode::serialize(&tx).unwrap()
    }

    #[test]
    fn test_compose_legacy_round_trip() {
        let payer = Pubkey::new_unique();
        let ixs = transfer_ixs(&payer);
        let tx = compose(&ixs, &payer, Hash::new_unique(), None).unwrap();

        assert_eq!(tx.format(), TxFormat::Legacy);
        assert_eq!(tx.fee_payer(), payer);

        let decoded = decode_with_format(&tx.serialize().unwrap(), TxFormat::Legacy).unwrap();
        assert_eq!(decoded.instructions().unwrap(), ixs);
        assert_eq!(decoded.recent_blockhash(), tx.recent_blockhash());
    }

    #[test]
    fn test_decode_opaque_prefers_versioned() {
        let payer = Pubkey::new_unique();
        let payload = base64::engine::general_purpose::STANDARD.encode(v0_bytes(&payer));

        let tx = decode_opaque(&payload).unwrap();
        assert_eq!(tx.format(), TxFormat::Versioned);
        assert_eq!(tx.fee_payer(), payer);
    }

    #[test]
    fn test_decode_opaque_rejects_garbage() {
        let payload = base64::engine::general_purpose::STANDARD.encode([1u8, 2, 3]);
        assert!(matches!(decode_opaque(&payload), Err(ExecutionError::BuildFailed(_))));
        assert!(matches!(decode_opaque("%%%"), Err(ExecutionError::BuildFailed(_))));
    }

    #[test]
    fn test_format_tag_mismatch_fails_fast() {
        let payer = Pubkey::new_unique();
        let err = decode_with_format(&v0_bytes(&payer), TxFormat::Legacy).unwrap_err();
        assert!(err.to_string().contains("format tag mismatch"));

        let legacy = compose(&transfer_ixs(&payer), &payer, Hash::new_unique(), None).unwrap();
        let err = decode_with_format(&legacy.serialize().unwrap(), TxFormat::Versioned).unwrap_err();
        assert!(err.to_string().contains("format tag mismatch"));
    }

    #[test]
    fn test_ephemeral_signer_partially_signs() {
        let payer = Pubkey::new_unique();
        let mint = EphemeralSigner::generate();
        let mint_key = mint.pubkey();
        let ix = system_instruction::create_account(&payer, &mint_key, 1_000_000, 82, &spl_token::id());

        let tx = compose(&[ix], &payer, Hash::new_unique(), Some(mint)).unwrap();
        assert_eq!(tx.required_signers(), &[payer, mint_key]);
        assert_eq!(tx.missing_signers(), vec![payer]);
    }

    #[test]
    fn test_into_signed_requires_every_slot() {
        let payer = Keypair::new();
        let mut tx = compose(&transfer_ixs(&payer.pubkey()), &payer.pubkey(), Hash::new_unique(), None).unwrap();
        assert!(tx.clone().into_signed().is_err());

        let sig = payer.sign_message(&tx.message_bytes());
        tx.apply_signature(&payer.pubkey(), sig).unwrap();
        let signed = tx.into_signed().unwrap();
        assert_eq!(signed.signature(), sig);
    }

    #[test]
    fn test_unsigned_message_is_rejected() {
        let payer = Pubkey::new_unique();
        let mut message = v0::Message::try_compile(&payer, &transfer_ixs(&payer), &[], Hash::new_unique()).unwrap();
        message.header.num_required_signatures = 0;
        message.header.num_readonly_signed_accounts = 0;
        let tx = VersionedTransaction {
            signatures: vec![],
            message: VersionedMessage::V0(message),
        };

        let payload = base64::engine::general_purpose::STANDARD.encode(bincode::serialize(&tx).unwrap());
        let err = decode_opaque(&payload).unwrap_err();
        assert!(matches!(err, ExecutionError::BuildFailed(_)));
        assert!(err.to_string().contains("fee payer must sign"));

        assert!(matches!(
            SignedTransaction::from_wallet(tx),
            Err(ExecutionError::BuildFailed(_))
        ));
    }
}
