//! Helper functions

use anyhow::{Context, Result};
use solana_sdk::signature::Keypair;
use std::path::Path;

pub fn generate_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

pub fn load_keypair(path: &Path) -> Result<Keypair> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read keypair file: {:?}", path))?;

    parse_keypair(&content).with_context(|| format!("Invalid keypair file: {:?}", path))
}

/// Parses a secret key given as a JSON byte array or a base58 string
pub fn parse_keypair(raw: &str) -> Result<Keypair> {
    let raw = raw.trim();
    let bytes = match serde_json::from_str::<Vec<u8>>(raw) {
        Ok(bytes) => bytes,
        Err(_) => bs58::decode(raw)
            .into_vec()
            .context("Secret key is neither a JSON byte array nor base58")?,
    };

    Keypair::from_bytes(&bytes).map_err(|e| anyhow::anyhow!("Invalid keypair: {}", e))
}

pub fn load_keypair_from_env_or_file(env_var: Option<&str>, file_path: &Path) -> Result<Keypair> {
    if let Some(key_str) = env_var.and_then(|name| std::env::var(name).ok()) {
        return parse_keypair(&key_str).context("Invalid keypair from env");
    }
    load_keypair(file_path)
}

/// Formats lamports as whole SOL for log lines
pub fn format_sol(lamports: u64) -> String {
    format!("{:.9} SOL", lamports as f64 / 1_000_000_000.0)
}
