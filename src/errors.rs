//! Error taxonomy for budget preparation and transaction delivery.
//!
//! Errors fall into three tiers:
//! - Precondition and simulation errors are fatal, immediate and never
//!   retried.
//! - Transport errors inside the delivery loop are transient: the engine
//!   logs them and consumes one retry attempt.
//! - `RetriesExhausted` is the terminal failure once the attempt budget is
//!   spent.

use solana_client::client_error::ClientError;
use solana_sdk::message::CompileError;
use solana_sdk::signature::Signature;
use solana_sdk::signer::SignerError;
use solana_sdk::transaction::TransactionError;
use thiserror::Error;

/// Transport-level failure from the ledger client boundary.
#[derive(Debug, Error)]
pub enum RpcError {
    /// Underlying RPC client failure (connection reset, timeout, node error
    /// response). Retryable inside the delivery loop.
    #[error("rpc transport error: {0}")]
    Transport(#[from] ClientError),

    /// The node answered but the payload did not parse.
    #[error("malformed rpc response: {0}")]
    MalformedResponse(String),

    /// The instruction list could not be compiled into a message.
    #[error("message compilation failed: {0}")]
    Compile(#[from] CompileError),
}

/// Error type covering the full estimate/prepare/sign/deliver lifecycle.
#[derive(Debug, Error)]
pub enum SendError {
    /// Neither a fee payer nor any signer was supplied.
    #[error("no signers or fee payer provided")]
    MissingFeePayer,

    /// The transaction reached signing without a recent blockhash. The
    /// delivery engine fetches one when unset, so this indicates a caller
    /// bypassing the engine.
    #[error("no recent blockhash attached to transaction")]
    MissingBlockhash,

    /// Simulation succeeded but the node reported no unit usage. Distinct
    /// from zero units; fatal for every downstream user of the estimate.
    #[error("simulation reported no compute unit usage")]
    MissingUnitsConsumed,

    /// The node rejected the dry run. Carries the node's diagnostic log
    /// lines verbatim; never retried.
    #[error("transaction simulation failed: {err}\n  \u{2022} {}", .logs.join("\n  \u{2022} "))]
    Simulation {
        err: TransactionError,
        logs: Vec<String>,
    },

    #[error("signing failed: {0}")]
    Signing(#[from] SignerError),

    #[error("transaction serialization failed: {0}")]
    Serialize(#[from] bincode::Error),

    /// All delivery attempts were consumed without confirmation.
    #[error("transaction failed after {attempts} attempts")]
    RetriesExhausted {
        attempts: u32,
        /// Signature from the last successful submission, if any reached
        /// the node.
        last_signature: Option<Signature>,
    },

    #[error(transparent)]
    Rpc(#[from] RpcError),
}

impl SendError {
    /// Whether the delivery loop may consume this error as one retry
    /// attempt. Everything else is fatal to the whole call.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Rpc(_))
    }

    /// Error category for metrics and log fields.
    pub fn category(&self) -> &'static str {
        match self {
            Self::MissingFeePayer | Self::MissingBlockhash | Self::MissingUnitsConsumed => {
                "precondition"
            }
            Self::Simulation { .. } => "simulation",
            Self::Signing(_) => "signing",
            Self::Serialize(_) => "encoding",
            Self::RetriesExhausted { .. } => "exhausted",
            Self::Rpc(_) => "rpc",
        }
    }
}
