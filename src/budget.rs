//! Compute budget preparation.
//!
//! Appends a priority-fee instruction, estimates unit demand by simulating
//! the resulting instruction list, applies the buffer policy and appends
//! the unit-limit instruction. No retries at this layer: every failure is a
//! fatal precondition error for the caller.

use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::compute_budget::ComputeBudgetInstruction;
use solana_sdk::pubkey::Pubkey;
use tracing::debug;

use crate::errors::SendError;
use crate::estimator::simulation_compute_units;
use crate::rpc::LedgerClient;
use crate::tx::UnsignedTransaction;

/// Minimum priority fee (micro-lamports per compute unit) most fee-aware
/// RPC providers require to treat a transaction as prioritized.
pub const DEFAULT_PRIORITY_FEE: u64 = 10_000;

/// Declarative adjustment over an estimated unit count. Multiplier is
/// applied first (with a floor), then the fixed addend; the order matters
/// with non-integer multipliers and is not commutative.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ComputeBudget {
    pub multiplier: Option<f64>,
    pub fixed: Option<u64>,
}

impl ComputeBudget {
    /// Default buffer at the top-level send entry point: 10% headroom.
    /// Deliberately different from the bare-prepare default of no
    /// adjustment.
    pub const DEFAULT_SEND_BUFFER: Self = Self {
        multiplier: Some(1.1),
        fixed: None,
    };

    /// Apply the policy to an estimate. Absence of both fields means "use
    /// the raw estimate".
    pub fn apply(&self, estimated: u64) -> u64 {
        let mut units = estimated;
        if let Some(multiplier) = self.multiplier {
            units = (units as f64 * multiplier).floor() as u64;
        }
        if let Some(fixed) = self.fixed {
            units = units.saturating_add(fixed);
        }
        units
    }
}

/// Outcome of the idempotence guard: whether a transaction should go
/// through budget preparation at all. Double-preparing a transaction would
/// double-append the fee and limit instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrepareDecision {
    Prepare,
    /// Signed bytes are immutable; preparation would invalidate them.
    SkipAlreadySigned,
    /// The caller already attached compute budget instructions.
    SkipHasBudgetInstructions,
}

impl PrepareDecision {
    pub fn evaluate(tx: &UnsignedTransaction, already_signed: bool) -> Self {
        if already_signed {
            return Self::SkipAlreadySigned;
        }
        if tx.has_compute_budget_instructions() {
            return Self::SkipHasBudgetInstructions;
        }
        Self::Prepare
    }

    pub fn should_prepare(self) -> bool {
        matches!(self, Self::Prepare)
    }
}

/// Mutate the transaction in place with a priority-fee instruction and a
/// simulated unit-limit instruction.
///
/// The estimate runs over the instruction list as it stands after the fee
/// instruction is appended, so the fee instruction's own cost is included.
/// Callers are responsible for the idempotence guard ([`PrepareDecision`]);
/// invoking this twice on the same transaction double-appends directives.
pub async fn prepare_compute_budget(
    client: &dyn LedgerClient,
    tx: &mut UnsignedTransaction,
    payer: &Pubkey,
    priority_fee: u64,
    budget: ComputeBudget,
    commitment: CommitmentConfig,
) -> Result<(), SendError> {
    tx.push(ComputeBudgetInstruction::set_compute_unit_price(
        priority_fee,
    ));

    let estimated =
        simulation_compute_units(client, &tx.instructions, payer, &[], commitment)
            .await?
            .ok_or(SendError::MissingUnitsConsumed)?;

    let final_units = budget.apply(estimated);
    debug!(estimated, final_units, "compute unit estimate");

    tx.push(ComputeBudgetInstruction::set_compute_unit_limit(
        u32::try_from(final_units).unwrap_or(u32::MAX),
    ));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::mock::MockLedgerClient;
    use crate::rpc::SimulationSnapshot;
    use proptest::prelude::*;
    use solana_sdk::signature::Keypair;
    use solana_sdk::signer::Signer;
    use solana_sdk::system_instruction;

    fn transfer_tx(payer: &Pubkey) -> UnsignedTransaction {
        let dest = Pubkey::new_unique();
        UnsignedTransaction::new(vec![system_instruction::transfer(payer, &dest, 1)])
    }

    #[test]
    fn multiplier_applies_floor() {
        let budget = ComputeBudget {
            multiplier: Some(1.1),
            fixed: None,
        };
        assert_eq!(budget.apply(10_000), 11_000);
        assert_eq!(budget.apply(999), 1_098); // floor(999 * 1.1) = floor(1098.9)
    }

    #[test]
    fn fixed_addend_only() {
        let budget = ComputeBudget {
            multiplier: None,
            fixed: Some(1_000),
        };
        assert_eq!(budget.apply(10_000), 11_000);
    }

    #[test]
    fn multiplier_before_fixed() {
        let budget = ComputeBudget {
            multiplier: Some(1.1),
            fixed: Some(1_000),
        };
        // floor(10000 * 1.1) + 1000, not floor((10000 + 1000) * 1.1)
        assert_eq!(budget.apply(10_000), 12_000);
    }

    #[test]
    fn empty_budget_is_identity() {
        assert_eq!(ComputeBudget::default().apply(123_456), 123_456);
    }

    proptest! {
        #[test]
        fn multiplier_only_matches_floor(estimated in 0u64..2_000_000, multiplier in 0.5f64..4.0) {
            let budget = ComputeBudget { multiplier: Some(multiplier), fixed: None };
            prop_assert_eq!(budget.apply(estimated), (estimated as f64 * multiplier).floor() as u64);
        }

        #[test]
        fn fixed_only_is_addition(estimated in 0u64..2_000_000, fixed in 0u64..1_000_000) {
            let budget = ComputeBudget { multiplier: None, fixed: Some(fixed) };
            prop_assert_eq!(budget.apply(estimated), estimated + fixed);
        }
    }

    #[test]
    fn guard_detects_signed_and_budget_instructions() {
        let payer = Keypair::new();
        let tx = transfer_tx(&payer.pubkey());
        assert_eq!(
            PrepareDecision::evaluate(&tx, false),
            PrepareDecision::Prepare
        );
        assert_eq!(
            PrepareDecision::evaluate(&tx, true),
            PrepareDecision::SkipAlreadySigned
        );

        let mut with_budget = tx.clone();
        with_budget.push(ComputeBudgetInstruction::set_compute_unit_price(1));
        assert_eq!(
            PrepareDecision::evaluate(&with_budget, false),
            PrepareDecision::SkipHasBudgetInstructions
        );
        assert!(!PrepareDecision::evaluate(&with_budget, false).should_prepare());
    }

    #[tokio::test]
    async fn appends_fee_then_limit() {
        let client = MockLedgerClient::default();
        let payer = Keypair::new();
        let mut tx = transfer_tx(&payer.pubkey());

        prepare_compute_budget(
            &client,
            &mut tx,
            &payer.pubkey(),
            DEFAULT_PRIORITY_FEE,
            ComputeBudget {
                multiplier: Some(1.1),
                fixed: Some(1_000),
            },
            CommitmentConfig::confirmed(),
        )
        .await
        .unwrap();

        // transfer, then fee, then limit
        assert_eq!(tx.instructions.len(), 3);
        let fee = &tx.instructions[1];
        assert_eq!(fee.program_id, solana_sdk::compute_budget::id());
        assert_eq!(fee.data[0], 3); // set_compute_unit_price discriminator
        assert_eq!(
            u64::from_le_bytes(fee.data[1..9].try_into().unwrap()),
            DEFAULT_PRIORITY_FEE
        );

        let limit = &tx.instructions[2];
        assert_eq!(limit.program_id, solana_sdk::compute_budget::id());
        assert_eq!(limit.data[0], 2); // set_compute_unit_limit discriminator
        // mock estimates 10_000: floor(10000 * 1.1) + 1000 = 12_000
        assert_eq!(
            u32::from_le_bytes(limit.data[1..5].try_into().unwrap()),
            12_000
        );

        // the estimate ran over the list including the fee instruction
        let simulated = client.simulated_instruction_lists();
        assert_eq!(simulated.len(), 1);
        assert_eq!(simulated[0].len(), 3); // probe limit + transfer + fee
    }

    #[tokio::test]
    async fn absent_estimate_fails_fast() {
        let client = MockLedgerClient::default();
        *client.simulation.lock().unwrap() = SimulationSnapshot::default();
        let payer = Keypair::new();
        let mut tx = transfer_tx(&payer.pubkey());

        let err = prepare_compute_budget(
            &client,
            &mut tx,
            &payer.pubkey(),
            DEFAULT_PRIORITY_FEE,
            ComputeBudget::default(),
            CommitmentConfig::confirmed(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, SendError::MissingUnitsConsumed));
    }
}
