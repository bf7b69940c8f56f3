//! Compute-budget estimation and retrying transaction delivery.
//!
//! The core is the estimate/prepare/sign/submit/poll/retry pipeline:
//! [`estimator`] dry-runs an instruction set to measure compute unit
//! demand, [`budget`] turns the estimate into priority-fee and unit-limit
//! instructions, and [`sender`] drives the signed transaction to
//! confirmation with bounded, linearly-backed-off resubmission of
//! identical bytes. The [`upgrade`] module carries the pure-function
//! collaborators for the Squads-gated program upgrade workflow this crate
//! ships as a binary.

pub mod budget;
pub mod errors;
pub mod estimator;
pub mod rpc;
pub mod sender;
pub mod tx;
pub mod upgrade;
pub mod wallet;

pub use budget::{prepare_compute_budget, ComputeBudget, PrepareDecision, DEFAULT_PRIORITY_FEE};
pub use errors::{RpcError, SendError};
pub use estimator::simulation_compute_units;
pub use rpc::{
    LedgerClient, RawSendConfig, SimulationSnapshot, SolanaLedgerClient, MAX_COMPUTE_UNIT_LIMIT,
};
pub use sender::{
    send_signed, send_transaction, send_with_retry, FnSink, SendOptions, StatusSink, TracingSink,
    TxStatusUpdate, MAX_RETRIES, POLL_INTERVAL_MS, RETRY_INTERVAL_INCREASE_MS, RETRY_INTERVAL_MS,
};
pub use tx::{SignedTransaction, UnsignedTransaction};
pub use wallet::WalletManager;
