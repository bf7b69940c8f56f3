//! Retrying transaction delivery.
//!
//! The engine owns the send/confirm/retry state machine:
//!
//! ```text
//! created -> signed -> sent(sig) -> {retry(sig|None) -> sent(sig)}* -> confirmed
//! ```
//!
//! The transaction is signed once; every resubmission resends the identical
//! wire bytes, so the signature is stable across attempts. Each attempt
//! submits, then polls signature status on a fixed 500 ms step until the
//! attempt's time budget elapses. The budget starts at
//! `max(initial_delay_ms, 500)` and grows by a fixed 200 ms increment per
//! failed attempt; transport errors during submit or poll consume one
//! attempt just like a confirmation timeout. One cooperative task per
//! call, no shared state between concurrent calls, and no cancellation
//! primitive: callers needing early abort race this future against a timer
//! and accept that an abandoned submission may still land.

use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::signature::{Keypair, Signature};
use solana_sdk::signer::Signer;
use solana_transaction_status::TransactionStatus;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::budget::{prepare_compute_budget, ComputeBudget, PrepareDecision, DEFAULT_PRIORITY_FEE};
use crate::errors::SendError;
use crate::rpc::{LedgerClient, RawSendConfig};
use crate::tx::{SignedTransaction, UnsignedTransaction};

/// Maximum delivery attempts before giving up.
pub const MAX_RETRIES: u32 = 15;
/// First attempt's poll time budget in milliseconds.
pub const RETRY_INTERVAL_MS: u64 = 2_000;
/// Budget growth per failed attempt.
pub const RETRY_INTERVAL_INCREASE_MS: u64 = 200;
/// Fixed status poll step inside an attempt.
pub const POLL_INTERVAL_MS: u64 = 500;
/// Floor on the per-attempt budget, to cut submission spam and leave the
/// node time to report a status at all.
pub const MIN_RETRY_INTERVAL_MS: u64 = 500;

/// Lifecycle notification emitted by the delivery engine.
///
/// `Sent` is emitted once overall, on the first successful submission;
/// silent resends are only observable through the bracketing `Retry`
/// events.
#[derive(Debug, Clone)]
pub enum TxStatusUpdate {
    Created,
    Signed,
    Sent {
        signature: Signature,
    },
    /// One attempt consumed; the signature is `None` until a submission
    /// has reached the node.
    Retry {
        signature: Option<Signature>,
    },
    Confirmed {
        result: TransactionStatus,
    },
}

/// Single-subscriber sink for status updates, invoked synchronously in
/// emission order. The caller owns its lifetime.
pub trait StatusSink: Send {
    fn publish(&mut self, update: TxStatusUpdate);
}

/// Adapter so a plain closure can act as a sink.
pub struct FnSink<F: FnMut(TxStatusUpdate) + Send>(pub F);

impl<F: FnMut(TxStatusUpdate) + Send> StatusSink for FnSink<F> {
    fn publish(&mut self, update: TxStatusUpdate) {
        (self.0)(update)
    }
}

/// Default sink: forwards every update to the tracing subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl StatusSink for TracingSink {
    fn publish(&mut self, update: TxStatusUpdate) {
        debug!(status = ?update, "transaction status");
    }
}

/// Per-call delivery configuration. Immutable for the duration of a call.
#[derive(Debug, Clone, Copy)]
pub struct SendOptions {
    pub max_retries: u32,
    pub initial_delay_ms: u64,
    pub commitment: CommitmentConfig,
    pub skip_preflight: bool,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            initial_delay_ms: RETRY_INTERVAL_MS,
            commitment: CommitmentConfig::confirmed(),
            skip_preflight: true,
        }
    }
}

/// Top-level entry: prepare the compute budget (unless the guard says the
/// transaction already carries one), then sign and deliver.
///
/// `budget` defaults to a 10% multiplier buffer here, unlike
/// [`prepare_compute_budget`] which applies no adjustment unless asked;
/// the two defaults are deliberately different.
pub async fn send_transaction(
    client: &dyn LedgerClient,
    mut tx: UnsignedTransaction,
    signers: &[&Keypair],
    priority_fee: u64,
    budget: Option<ComputeBudget>,
    options: &SendOptions,
    sink: &mut dyn StatusSink,
) -> Result<Signature, SendError> {
    let budget = budget.unwrap_or(ComputeBudget::DEFAULT_SEND_BUFFER);

    fill_blockhash_and_payer(client, &mut tx, signers, options.commitment).await?;

    let decision = PrepareDecision::evaluate(&tx, false);
    if decision.should_prepare() {
        let payer = tx.fee_payer.ok_or(SendError::MissingFeePayer)?;
        prepare_compute_budget(
            client,
            &mut tx,
            &payer,
            priority_fee,
            budget,
            options.commitment,
        )
        .await?;
    } else {
        debug!(?decision, "skipping compute budget preparation");
    }

    send_with_retry(client, tx, signers, options, sink).await
}

/// Sign and deliver without budget preparation.
pub async fn send_with_retry(
    client: &dyn LedgerClient,
    mut tx: UnsignedTransaction,
    signers: &[&Keypair],
    options: &SendOptions,
    sink: &mut dyn StatusSink,
) -> Result<Signature, SendError> {
    sink.publish(TxStatusUpdate::Created);

    fill_blockhash_and_payer(client, &mut tx, signers, options.commitment).await?;

    let signed = tx.sign(signers)?;
    sink.publish(TxStatusUpdate::Signed);

    deliver(client, &signed, options, sink).await
}

/// Deliver an already-signed transaction. Budget preparation never applies
/// here ([`PrepareDecision::SkipAlreadySigned`]): signed bytes are
/// immutable and re-signing is never performed.
pub async fn send_signed(
    client: &dyn LedgerClient,
    signed: &SignedTransaction,
    options: &SendOptions,
    sink: &mut dyn StatusSink,
) -> Result<Signature, SendError> {
    sink.publish(TxStatusUpdate::Created);
    sink.publish(TxStatusUpdate::Signed);
    deliver(client, signed, options, sink).await
}

async fn fill_blockhash_and_payer(
    client: &dyn LedgerClient,
    tx: &mut UnsignedTransaction,
    signers: &[&Keypair],
    commitment: CommitmentConfig,
) -> Result<(), SendError> {
    if tx.recent_blockhash.is_none() {
        debug!("no blockhash provided, fetching latest");
        tx.recent_blockhash = Some(client.latest_blockhash(commitment).await?);
    }
    if tx.fee_payer.is_none() {
        let first = signers.first().ok_or(SendError::MissingFeePayer)?;
        tx.fee_payer = Some(first.pubkey());
    }
    Ok(())
}

/// The submit/poll/retry loop shared by every entry point.
async fn deliver(
    client: &dyn LedgerClient,
    signed: &SignedTransaction,
    options: &SendOptions,
    sink: &mut dyn StatusSink,
) -> Result<Signature, SendError> {
    let raw_config = RawSendConfig {
        skip_preflight: options.skip_preflight,
        preflight_commitment: options.commitment.commitment,
        max_node_retries: 0,
    };

    let mut signature: Option<Signature> = None;
    let mut budget_ms = options.initial_delay_ms.max(MIN_RETRY_INTERVAL_MS);
    let mut attempts: u32 = 0;

    while attempts < options.max_retries {
        match attempt_delivery(
            client,
            signed,
            raw_config,
            options.commitment,
            budget_ms,
            &mut signature,
            sink,
        )
        .await
        {
            Ok(Some(confirmed)) => return Ok(confirmed),
            Ok(None) => {
                debug!(
                    attempt = attempts + 1,
                    budget_ms, "confirmation window elapsed"
                );
            }
            Err(err) => {
                if !err.is_retryable() {
                    return Err(err);
                }
                warn!(
                    attempt = attempts + 1,
                    category = err.category(),
                    error = %err,
                    "delivery attempt failed"
                );
            }
        }

        attempts += 1;
        if attempts < options.max_retries {
            sink.publish(TxStatusUpdate::Retry { signature });
            budget_ms += RETRY_INTERVAL_INCREASE_MS;
        }
    }

    Err(SendError::RetriesExhausted {
        attempts: options.max_retries,
        last_signature: signature,
    })
}

/// One attempt: submit the wire bytes, then poll until confirmation or the
/// attempt budget runs out. Returns `Ok(Some(_))` on confirmation,
/// `Ok(None)` on budget expiry; transport errors bubble up to be counted
/// as a consumed attempt.
async fn attempt_delivery(
    client: &dyn LedgerClient,
    signed: &SignedTransaction,
    raw_config: RawSendConfig,
    commitment: CommitmentConfig,
    budget_ms: u64,
    signature: &mut Option<Signature>,
    sink: &mut dyn StatusSink,
) -> Result<Option<Signature>, SendError> {
    let first_send = signature.is_none();
    let sig = client.send_raw(signed.wire_bytes(), raw_config).await?;
    *signature = Some(sig);
    if first_send {
        sink.publish(TxStatusUpdate::Sent { signature: sig });
    }

    // Fixed poll cadence; the budget only bounds how many polls happen
    // before giving up and resubmitting.
    let mut remaining_ms = budget_ms as i64;
    while remaining_ms > 0 {
        sleep(Duration::from_millis(POLL_INTERVAL_MS)).await;
        if let Some(status) = client.signature_status(&sig).await? {
            // "confirmed or better": finalized satisfies a confirmed target
            if status.satisfies_commitment(commitment) {
                sink.publish(TxStatusUpdate::Confirmed { result: status });
                return Ok(Some(sig));
            }
        }
        remaining_ms -= POLL_INTERVAL_MS as i64;
    }
    Ok(None)
}
