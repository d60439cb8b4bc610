//! Error taxonomy for the execution pipeline
//!
//! Every public pipeline operation ends in either a success value or one of
//! these variants. Stages map their local failures into the variant owned by
//! that stage and keep the underlying diagnostic text.

use solana_sdk::signature::Signature;
use thiserror::Error;

/// Typed failure of a pipeline operation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    /// No custody backend is available for this operation
    #[error("wallet not connected")]
    WalletNotConnected,

    /// Amount or price was zero
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// Balance does not cover amount plus fee estimate
    #[error("insufficient balance: requires {required} lamports (including fees), wallet has {available}")]
    InsufficientBalance {
        required: u64,
        available: u64,
    },

    /// Venue could not quote the pair, or the quote request failed
    #[error("no route found: {0}")]
    NoRouteFound(String),

    /// Compressed asset inclusion proof could not be fetched
    #[error("asset proof unavailable: {0}")]
    ProofUnavailable(String),

    /// Asset kind cannot be handled by this pipeline
    #[error("unsupported asset type: {0}")]
    UnsupportedAssetType(String),

    /// Transaction could not be composed or decoded
    #[error("transaction build failed: {0}")]
    BuildFailed(String),

    /// The resolved wallet exposes no local signing provider
    #[error("{provider} wallet has no local signing provider; use the {alternate_flow} flow")]
    CapabilityUnavailable {
        provider: String,
        alternate_flow: String,
    },

    /// User declined the signature request
    #[error("signature request was cancelled by the user")]
    UserRejectedSignature,

    /// Wallet approval did not arrive in time; outcome unknown
    #[error("wallet approval timed out; the transaction may still be submitted by the wallet")]
    SigningTimeout,

    /// Caller cancelled before signing began
    #[error("operation cancelled before signing")]
    Cancelled,

    /// Endpoint rejected the transaction or bundle
    #[error("submission failed: {0}")]
    SubmissionFailed(String),

    /// Finality was not observed in time; the transaction may still land
    #[error("confirmation timed out for {signature}; status unknown")]
    ConfirmationTimeout {
        signature: Signature,
    },
}

impl ExecutionError {
    /// Outcome is unknown rather than failed. Callers must not retry these.
    pub fn is_soft(&self) -> bool {
        matches!(
            self,
            ExecutionError::SigningTimeout | ExecutionError::ConfirmationTimeout { .. }
        )
    }

    /// Neutral cancellation, presented to the user without an error tone
    pub fn is_cancellation(&self) -> bool {
        matches!(
            self,
            ExecutionError::UserRejectedSignature | ExecutionError::Cancelled
        )
    }

    /// Short machine-readable label, used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            ExecutionError::WalletNotConnected => "wallet_not_connected",
            ExecutionError::InvalidAmount(_) => "invalid_amount",
            ExecutionError::InsufficientBalance { .. } => "insufficient_balance",
            ExecutionError::NoRouteFound(_) => "no_route_found",
            ExecutionError::ProofUnavailable(_) => "proof_unavailable",
            ExecutionError::UnsupportedAssetType(_) => "unsupported_asset_type",
            ExecutionError::BuildFailed(_) => "build_failed",
            ExecutionError::CapabilityUnavailable { .. } => "capability_unavailable",
            ExecutionError::UserRejectedSignature => "user_rejected_signature",
            ExecutionError::SigningTimeout => "signing_timeout",
            ExecutionError::Cancelled => "cancelled",
            ExecutionError::SubmissionFailed(_) => "submission_failed",
            ExecutionError::ConfirmationTimeout { .. } => "confirmation_timeout",
        }
    }
}

/// Renders an `anyhow` chain into a single diagnostic line
pub(crate) fn diagnostic(err: &anyhow::Error) -> String {
    format!("{:#}", err)
}

pub type ExecutionResult<T> = std::result::Result<T, ExecutionError>;
