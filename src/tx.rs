//! Transaction lifecycle types.
//!
//! An [`UnsignedTransaction`] is mutable: the budget preparer appends
//! compute budget instructions to it and the delivery engine fills in the
//! blockhash and fee payer. Signing consumes nothing but produces an
//! immutable [`SignedTransaction`] whose wire bytes are fixed; resubmission
//! always resends those exact bytes, which is why the reported signature is
//! identical across every retry attempt.

use solana_sdk::hash::Hash;
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature};
use solana_sdk::transaction::Transaction;

use crate::errors::SendError;

/// A fee payer, an optional recent blockhash and an ordered instruction
/// list, not yet compiled or signed.
#[derive(Debug, Clone, Default)]
pub struct UnsignedTransaction {
    pub fee_payer: Option<Pubkey>,
    pub recent_blockhash: Option<Hash>,
    pub instructions: Vec<Instruction>,
}

impl UnsignedTransaction {
    pub fn new(instructions: Vec<Instruction>) -> Self {
        Self {
            fee_payer: None,
            recent_blockhash: None,
            instructions,
        }
    }

    pub fn with_fee_payer(mut self, fee_payer: Pubkey) -> Self {
        self.fee_payer = Some(fee_payer);
        self
    }

    pub fn with_recent_blockhash(mut self, recent_blockhash: Hash) -> Self {
        self.recent_blockhash = Some(recent_blockhash);
        self
    }

    /// Append an instruction at the end of the list.
    pub fn push(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    /// True if any instruction already targets the compute budget program.
    pub fn has_compute_budget_instructions(&self) -> bool {
        self.instructions
            .iter()
            .any(|ix| ix.program_id == solana_sdk::compute_budget::id())
    }

    /// Compile into a legacy message and sign with the supplied keypairs.
    ///
    /// An empty signer list is tolerated: the transaction compiles with
    /// placeholder signatures and the node rejects it at submission for
    /// lack of authorization. Fee payer and blockhash must already be set;
    /// the delivery engine guarantees both before calling this.
    pub fn sign(&self, signers: &[&Keypair]) -> Result<SignedTransaction, SendError> {
        let fee_payer = self.fee_payer.ok_or(SendError::MissingFeePayer)?;
        let recent_blockhash = self.recent_blockhash.ok_or(SendError::MissingBlockhash)?;

        let mut transaction = Transaction::new_with_payer(&self.instructions, Some(&fee_payer));
        if signers.is_empty() {
            transaction.message.recent_blockhash = recent_blockhash;
        } else {
            transaction.try_partial_sign(&signers.to_vec(), recent_blockhash)?;
        }

        let wire = bincode::serialize(&transaction)?;
        Ok(SignedTransaction { transaction, wire })
    }
}

/// A compiled transaction with its serialized wire bytes. Immutable;
/// re-signing is never performed.
#[derive(Debug, Clone)]
pub struct SignedTransaction {
    transaction: Transaction,
    wire: Vec<u8>,
}

impl SignedTransaction {
    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    /// Serialized bytes submitted on every delivery attempt.
    pub fn wire_bytes(&self) -> &[u8] {
        &self.wire
    }

    /// The first (fee payer) signature.
    pub fn signature(&self) -> Signature {
        self.transaction
            .signatures
            .first()
            .copied()
            .unwrap_or_default()
    }

    /// True once at least one real signature is attached.
    pub fn is_signed(&self) -> bool {
        self.transaction
            .signatures
            .iter()
            .any(|sig| *sig != Signature::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::compute_budget::ComputeBudgetInstruction;
    use solana_sdk::signer::Signer;
    use solana_sdk::system_instruction;

    fn transfer_tx(payer: &Keypair) -> UnsignedTransaction {
        let dest = Pubkey::new_unique();
        UnsignedTransaction::new(vec![system_instruction::transfer(&payer.pubkey(), &dest, 1)])
    }

    #[test]
    fn sign_requires_fee_payer_and_blockhash() {
        let payer = Keypair::new();
        let tx = transfer_tx(&payer);
        assert!(matches!(
            tx.sign(&[&payer]),
            Err(SendError::MissingFeePayer)
        ));

        let tx = transfer_tx(&payer).with_fee_payer(payer.pubkey());
        assert!(matches!(
            tx.sign(&[&payer]),
            Err(SendError::MissingBlockhash)
        ));
    }

    #[test]
    fn signing_is_byte_deterministic() {
        let payer = Keypair::new();
        let tx = transfer_tx(&payer)
            .with_fee_payer(payer.pubkey())
            .with_recent_blockhash(Hash::new_unique());

        let first = tx.sign(&[&payer]).unwrap();
        let second = tx.sign(&[&payer]).unwrap();
        assert!(first.is_signed());
        assert_eq!(first.wire_bytes(), second.wire_bytes());
        assert_eq!(first.signature(), second.signature());
    }

    #[test]
    fn empty_signer_list_compiles_unsigned() {
        let payer = Keypair::new();
        let tx = transfer_tx(&payer)
            .with_fee_payer(payer.pubkey())
            .with_recent_blockhash(Hash::new_unique());

        let signed = tx.sign(&[]).unwrap();
        assert!(!signed.is_signed());
        assert_eq!(signed.signature(), Signature::default());
    }

    #[test]
    fn detects_compute_budget_instructions() {
        let payer = Keypair::new();
        let mut tx = transfer_tx(&payer);
        assert!(!tx.has_compute_budget_instructions());

        tx.push(ComputeBudgetInstruction::set_compute_unit_limit(200_000));
        assert!(tx.has_compute_budget_instructions());
    }
}
