//! Program upgrade collaborators.
//!
//! Pure functions producing the instructions the delivery engine sends:
//! BPF upgradeable-loader and Anchor IDL upgrade instructions, plus the
//! Squads v4 wrapping (PDA derivation, multisig state decode and the
//! vault-transaction-create instruction). No retry or scheduling logic
//! lives here.

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::message::Message;
use solana_sdk::pubkey::PubkeyError;
use solana_sdk::transaction::Transaction;
use thiserror::Error;

mod loader;
mod squads;

pub use loader::{
    idl_address, idl_upgrade_instruction, program_data_address, program_upgrade_instruction,
    IDL_UPGRADE_DATA,
};
pub use squads::{
    transaction_index_from_account, transaction_pda, vault_pda, vault_transaction_create,
    VaultTransactionArgs, SQUADS_PROGRAM_ID, VAULT_TRANSACTION_CREATE_DISCRIMINATOR,
};

#[derive(Debug, Error)]
pub enum UpgradeError {
    #[error("address derivation failed: {0}")]
    Derivation(#[from] PubkeyError),

    #[error("multisig account data too short: {len} bytes")]
    MalformedMultisigAccount { len: usize },

    #[error("inner message exceeds compact encoding limits: {0}")]
    MessageTooLarge(String),

    #[error("invalid verification transaction: {0}")]
    InvalidVerificationTransaction(String),
}

/// Decode a base64-encoded wire transaction, as handed over by the PDA
/// verification workflow.
pub fn parse_verification_transaction(encoded: &str) -> Result<Transaction, UpgradeError> {
    let bytes = BASE64_STANDARD
        .decode(encoded.trim())
        .map_err(|e| UpgradeError::InvalidVerificationTransaction(e.to_string()))?;
    bincode::deserialize(&bytes)
        .map_err(|e| UpgradeError::InvalidVerificationTransaction(e.to_string()))
}

/// Rebuild a standalone [`Instruction`] from a compiled message entry.
pub fn decompile_instruction(message: &Message, index: usize) -> Option<Instruction> {
    let compiled = message.instructions.get(index)?;
    let program_id = *message.account_keys.get(compiled.program_id_index as usize)?;
    let accounts = compiled
        .accounts
        .iter()
        .map(|&key_index| {
            let key_index = key_index as usize;
            AccountMeta {
                pubkey: message.account_keys[key_index],
                is_signer: message.is_signer(key_index),
                is_writable: message.is_maybe_writable(key_index, None),
            }
        })
        .collect();
    Some(Instruction {
        program_id,
        accounts,
        data: compiled.data.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::hash::Hash;
    use solana_sdk::pubkey::Pubkey;
    use solana_sdk::signature::Keypair;
    use solana_sdk::signer::Signer;
    use solana_sdk::system_instruction;

    #[test]
    fn verification_transaction_round_trips() {
        let payer = Keypair::new();
        let dest = Pubkey::new_unique();
        let instructions = vec![
            system_instruction::transfer(&payer.pubkey(), &dest, 1),
            system_instruction::transfer(&payer.pubkey(), &dest, 2),
        ];
        let tx = Transaction::new_signed_with_payer(
            &instructions,
            Some(&payer.pubkey()),
            &[&payer],
            Hash::new_unique(),
        );
        let encoded = BASE64_STANDARD.encode(bincode::serialize(&tx).unwrap());

        let parsed = parse_verification_transaction(&encoded).unwrap();
        assert_eq!(parsed.message.instructions.len(), 2);

        let second = decompile_instruction(&parsed.message, 1).unwrap();
        assert_eq!(second.program_id, solana_sdk::system_program::id());
        assert_eq!(second.accounts[0].pubkey, payer.pubkey());
        assert!(second.accounts[0].is_signer);
        assert_eq!(second.data, parsed.message.instructions[1].data);
    }

    #[test]
    fn rejects_garbage_verification_payload() {
        assert!(parse_verification_transaction("not base64!!!").is_err());
        let garbage = BASE64_STANDARD.encode([0u8; 3]);
        assert!(parse_verification_transaction(&garbage).is_err());
    }

    #[test]
    fn decompile_out_of_range_is_none() {
        let payer = Pubkey::new_unique();
        let message = Message::new(
            &[system_instruction::transfer(&payer, &Pubkey::new_unique(), 1)],
            Some(&payer),
        );
        assert!(decompile_instruction(&message, 5).is_none());
    }
}
