//! Compute unit estimation via dry-run simulation.

use solana_sdk::address_lookup_table::AddressLookupTableAccount;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::compute_budget::ComputeBudgetInstruction;
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;

use crate::errors::SendError;
use crate::rpc::{LedgerClient, MAX_COMPUTE_UNIT_LIMIT};

/// Simulate the instruction list and report consumed compute units.
///
/// The probe prepends a unit-limit instruction set to the network maximum
/// so the dry run is never itself unit-constrained; the reported count
/// reflects true demand rather than an artifact of a low cap.
///
/// Returns `Ok(None)` when the node reports no usage even though the call
/// succeeded. Callers must treat that as "unknown", distinct from zero
/// units; every downstream user in this crate treats it as fatal.
///
/// A node-reported execution error is fatal and never retried; the error
/// carries the node's log lines verbatim.
pub async fn simulation_compute_units(
    client: &dyn LedgerClient,
    instructions: &[Instruction],
    payer: &Pubkey,
    lookup_tables: &[AddressLookupTableAccount],
    commitment: CommitmentConfig,
) -> Result<Option<u64>, SendError> {
    let mut probe = Vec::with_capacity(instructions.len() + 1);
    probe.push(ComputeBudgetInstruction::set_compute_unit_limit(
        MAX_COMPUTE_UNIT_LIMIT,
    ));
    probe.extend_from_slice(instructions);

    let snapshot = client
        .simulate(&probe, payer, lookup_tables, commitment)
        .await?;

    if let Some(err) = snapshot.err {
        return Err(SendError::Simulation {
            err,
            logs: snapshot.logs,
        });
    }

    Ok(snapshot.units_consumed)
}
