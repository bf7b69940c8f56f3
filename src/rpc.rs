//! Narrow ledger-client boundary.
//!
//! Only the four remote operations the engine needs are modeled: simulate,
//! latest-blockhash, submit-raw and get-status. This is deliberately not a
//! general-purpose RPC client; everything else the binary needs (account
//! fetches) goes straight through the underlying [`RpcClient`].

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use serde_json::json;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_rpc_client_api::config::{RpcSendTransactionConfig, RpcSimulateTransactionConfig};
use solana_rpc_client_api::request::RpcRequest;
use solana_sdk::address_lookup_table::AddressLookupTableAccount;
use solana_sdk::commitment_config::{CommitmentConfig, CommitmentLevel};
use solana_sdk::hash::Hash;
use solana_sdk::instruction::Instruction;
use solana_sdk::message::{v0, VersionedMessage};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::{TransactionError, VersionedTransaction};
use solana_transaction_status::{TransactionStatus, UiTransactionEncoding};
use std::str::FromStr;
use std::sync::Arc;

use crate::errors::RpcError;

/// Network-wide per-transaction compute unit cap.
pub const MAX_COMPUTE_UNIT_LIMIT: u32 = 1_400_000;

/// Raw outcome of a dry run. Interpretation (fatal error vs usable
/// estimate) happens in the estimator, not here.
#[derive(Debug, Clone, Default)]
pub struct SimulationSnapshot {
    pub units_consumed: Option<u64>,
    pub err: Option<TransactionError>,
    pub logs: Vec<String>,
}

/// Submission knobs passed through to the node.
#[derive(Debug, Clone, Copy)]
pub struct RawSendConfig {
    pub skip_preflight: bool,
    pub preflight_commitment: CommitmentLevel,
    /// Node-side rebroadcast count. The delivery engine always passes 0:
    /// resubmission is its own job.
    pub max_node_retries: usize,
}

/// The remote operations the engine consumes. Implemented by
/// [`SolanaLedgerClient`] in production and by scripted mocks in tests.
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Dry-run the given instruction list. Signature verification is
    /// disabled and the node substitutes a fresh blockhash, so no real
    /// freshness token is required.
    async fn simulate(
        &self,
        instructions: &[Instruction],
        payer: &Pubkey,
        lookup_tables: &[AddressLookupTableAccount],
        commitment: CommitmentConfig,
    ) -> Result<SimulationSnapshot, RpcError>;

    async fn latest_blockhash(&self, commitment: CommitmentConfig) -> Result<Hash, RpcError>;

    /// Submit pre-signed wire bytes exactly once. No delivery guarantee;
    /// duplicate submissions of identical bytes are expected.
    async fn send_raw(&self, wire: &[u8], config: RawSendConfig) -> Result<Signature, RpcError>;

    async fn signature_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<TransactionStatus>, RpcError>;
}

/// Production implementation over the nonblocking Solana RPC client.
pub struct SolanaLedgerClient {
    rpc: Arc<RpcClient>,
}

impl SolanaLedgerClient {
    pub fn new(url: impl ToString) -> Self {
        Self {
            rpc: Arc::new(RpcClient::new(url.to_string())),
        }
    }

    pub fn from_rpc(rpc: Arc<RpcClient>) -> Self {
        Self { rpc }
    }

    /// The wrapped client, for callers needing operations outside this
    /// boundary (account fetches in the upgrade workflow).
    pub fn rpc(&self) -> &Arc<RpcClient> {
        &self.rpc
    }
}

#[async_trait]
impl LedgerClient for SolanaLedgerClient {
    async fn simulate(
        &self,
        instructions: &[Instruction],
        payer: &Pubkey,
        lookup_tables: &[AddressLookupTableAccount],
        commitment: CommitmentConfig,
    ) -> Result<SimulationSnapshot, RpcError> {
        // Any blockhash compiles here; the node replaces it because
        // replace_recent_blockhash is set.
        let message =
            v0::Message::try_compile(payer, instructions, lookup_tables, Hash::default())?;
        let transaction = VersionedTransaction {
            signatures: vec![Signature::default()],
            message: VersionedMessage::V0(message),
        };

        let response = self
            .rpc
            .simulate_transaction_with_config(
                &transaction,
                RpcSimulateTransactionConfig {
                    sig_verify: false,
                    replace_recent_blockhash: true,
                    commitment: Some(commitment),
                    encoding: Some(UiTransactionEncoding::Base64),
                    ..RpcSimulateTransactionConfig::default()
                },
            )
            .await?;

        let value = response.value;
        Ok(SimulationSnapshot {
            units_consumed: value.units_consumed,
            err: value.err,
            logs: value.logs.unwrap_or_default(),
        })
    }

    async fn latest_blockhash(&self, commitment: CommitmentConfig) -> Result<Hash, RpcError> {
        let (blockhash, _last_valid_block_height) = self
            .rpc
            .get_latest_blockhash_with_commitment(commitment)
            .await?;
        Ok(blockhash)
    }

    async fn send_raw(&self, wire: &[u8], config: RawSendConfig) -> Result<Signature, RpcError> {
        let encoded = BASE64_STANDARD.encode(wire);
        let send_config = RpcSendTransactionConfig {
            skip_preflight: config.skip_preflight,
            preflight_commitment: Some(config.preflight_commitment),
            encoding: Some(UiTransactionEncoding::Base64),
            max_retries: Some(config.max_node_retries),
            min_context_slot: None,
        };

        let signature: String = self
            .rpc
            .send(RpcRequest::SendTransaction, json!([encoded, send_config]))
            .await?;
        Signature::from_str(&signature)
            .map_err(|e| RpcError::MalformedResponse(format!("signature {signature:?}: {e}")))
    }

    async fn signature_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<TransactionStatus>, RpcError> {
        let response = self.rpc.get_signature_statuses(&[*signature]).await?;
        Ok(response.value.into_iter().next().flatten())
    }
}

/// Scripted in-memory client for tests. Records every call so tests can
/// assert call counts, submitted bytes and poll cadence.
pub mod mock {
    use super::*;
    use solana_client::client_error::ClientErrorKind;
    use solana_sdk::transaction::Transaction;
    use solana_transaction_status::TransactionConfirmationStatus;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Deterministic [`LedgerClient`] double.
    ///
    /// Behavior knobs:
    /// - `simulation`: snapshot returned by every `simulate` call.
    /// - `failing_sends`: that many leading `send_raw` calls fail with a
    ///   transport error before submissions start succeeding.
    /// - `confirm_after_status_calls`: `Some(n)` makes the n-th and later
    ///   `signature_status` calls report the confirmed status; `None`
    ///   leaves the transaction forever unconfirmed.
    pub struct MockLedgerClient {
        pub simulation: Mutex<SimulationSnapshot>,
        pub blockhash: Hash,
        pub failing_sends: usize,
        pub confirm_after_status_calls: Option<usize>,
        pub confirmation_status: TransactionConfirmationStatus,
        pub(crate) sent_wires: Mutex<Vec<Vec<u8>>>,
        pub(crate) simulated: Mutex<Vec<Vec<Instruction>>>,
        pub(crate) send_calls: AtomicUsize,
        pub(crate) status_calls: AtomicUsize,
        /// Number of status polls observed before each submission,
        /// recorded at `send_raw` time. Lets tests verify the per-attempt
        /// poll budget growth.
        pub(crate) polls_at_send: Mutex<Vec<usize>>,
    }

    impl Default for MockLedgerClient {
        fn default() -> Self {
            Self {
                simulation: Mutex::new(SimulationSnapshot {
                    units_consumed: Some(10_000),
                    err: None,
                    logs: Vec::new(),
                }),
                blockhash: Hash::new_unique(),
                failing_sends: 0,
                confirm_after_status_calls: None,
                confirmation_status: TransactionConfirmationStatus::Confirmed,
                sent_wires: Mutex::new(Vec::new()),
                simulated: Mutex::new(Vec::new()),
                send_calls: AtomicUsize::new(0),
                status_calls: AtomicUsize::new(0),
                polls_at_send: Mutex::new(Vec::new()),
            }
        }
    }

    impl MockLedgerClient {
        pub fn confirming_after_polls(polls: usize) -> Self {
            Self {
                confirm_after_status_calls: Some(polls),
                ..Self::default()
            }
        }

        pub fn never_confirming() -> Self {
            Self::default()
        }

        pub fn send_call_count(&self) -> usize {
            self.send_calls.load(Ordering::SeqCst)
        }

        pub fn status_call_count(&self) -> usize {
            self.status_calls.load(Ordering::SeqCst)
        }

        pub fn sent_wires(&self) -> Vec<Vec<u8>> {
            self.sent_wires.lock().unwrap().clone()
        }

        pub fn simulated_instruction_lists(&self) -> Vec<Vec<Instruction>> {
            self.simulated.lock().unwrap().clone()
        }

        pub fn polls_before_each_send(&self) -> Vec<usize> {
            self.polls_at_send.lock().unwrap().clone()
        }

        fn confirmed_status(&self) -> TransactionStatus {
            TransactionStatus {
                slot: 1,
                confirmations: Some(10),
                status: Ok(()),
                err: None,
                confirmation_status: Some(self.confirmation_status.clone()),
            }
        }
    }

    #[async_trait]
    impl LedgerClient for MockLedgerClient {
        async fn simulate(
            &self,
            instructions: &[Instruction],
            _payer: &Pubkey,
            _lookup_tables: &[AddressLookupTableAccount],
            _commitment: CommitmentConfig,
        ) -> Result<SimulationSnapshot, RpcError> {
            self.simulated.lock().unwrap().push(instructions.to_vec());
            Ok(self.simulation.lock().unwrap().clone())
        }

        async fn latest_blockhash(&self, _commitment: CommitmentConfig) -> Result<Hash, RpcError> {
            Ok(self.blockhash)
        }

        async fn send_raw(
            &self,
            wire: &[u8],
            _config: RawSendConfig,
        ) -> Result<Signature, RpcError> {
            let call = self.send_calls.fetch_add(1, Ordering::SeqCst);
            self.polls_at_send
                .lock()
                .unwrap()
                .push(self.status_calls.load(Ordering::SeqCst));
            if call < self.failing_sends {
                return Err(RpcError::Transport(
                    ClientErrorKind::Custom("mock transport failure".to_string()).into(),
                ));
            }
            self.sent_wires.lock().unwrap().push(wire.to_vec());

            let transaction: Transaction = bincode::deserialize(wire)
                .map_err(|e| RpcError::MalformedResponse(e.to_string()))?;
            Ok(transaction
                .signatures
                .first()
                .copied()
                .unwrap_or_default())
        }

        async fn signature_status(
            &self,
            _signature: &Signature,
        ) -> Result<Option<TransactionStatus>, RpcError> {
            let call = self.status_calls.fetch_add(1, Ordering::SeqCst) + 1;
            match self.confirm_after_status_calls {
                Some(threshold) if call >= threshold => Ok(Some(self.confirmed_status())),
                _ => Ok(None),
            }
        }
    }
}
