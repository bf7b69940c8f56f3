//! Squads v4 multisig collaborators: PDA derivation, account state decode
//! and the vault-transaction-create instruction.

use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::message::Message;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::system_program;

use super::UpgradeError;

pub const SQUADS_PROGRAM_ID: Pubkey =
    Pubkey::from_str_const("SQDS4ep65T869zMMBKyuUq6aD6EgTu8psMjkvj52pCf");

/// Anchor discriminator for `vault_transaction_create`.
pub const VAULT_TRANSACTION_CREATE_DISCRIMINATOR: [u8; 8] = [48, 250, 78, 168, 208, 226, 218, 211];

const SEED_PREFIX: &[u8] = b"multisig";
const SEED_VAULT: &[u8] = b"vault";
const SEED_TRANSACTION: &[u8] = b"transaction";

/// Multisig account layout (anchor): 8-byte discriminator, create_key
/// (32), config_authority (32), threshold (u16), time_lock (u32), then
/// transaction_index (u64 LE).
const TRANSACTION_INDEX_OFFSET: usize = 8 + 32 + 32 + 2 + 4;

/// The vault PDA acting as upgrade authority.
pub fn vault_pda(multisig: &Pubkey, vault_index: u8) -> (Pubkey, u8) {
    Pubkey::find_program_address(
        &[SEED_PREFIX, multisig.as_ref(), SEED_VAULT, &[vault_index]],
        &SQUADS_PROGRAM_ID,
    )
}

/// PDA of the vault transaction account for a given index.
pub fn transaction_pda(multisig: &Pubkey, transaction_index: u64) -> (Pubkey, u8) {
    Pubkey::find_program_address(
        &[
            SEED_PREFIX,
            multisig.as_ref(),
            SEED_TRANSACTION,
            &transaction_index.to_le_bytes(),
        ],
        &SQUADS_PROGRAM_ID,
    )
}

/// Read the current `transaction_index` out of raw multisig account data.
pub fn transaction_index_from_account(data: &[u8]) -> Result<u64, UpgradeError> {
    let end = TRANSACTION_INDEX_OFFSET + 8;
    let bytes = data
        .get(TRANSACTION_INDEX_OFFSET..end)
        .ok_or(UpgradeError::MalformedMultisigAccount { len: data.len() })?;
    Ok(u64::from_le_bytes(bytes.try_into().expect("8-byte slice")))
}

/// Parameters for wrapping an instruction list into a vault transaction.
#[derive(Debug, Clone)]
pub struct VaultTransactionArgs<'a> {
    pub multisig: Pubkey,
    /// Index this transaction will occupy; one past the multisig's
    /// current `transaction_index`.
    pub transaction_index: u64,
    pub creator: Pubkey,
    pub vault_index: u8,
    pub ephemeral_signers: u8,
    pub memo: Option<&'a str>,
}

/// Build the `vault_transaction_create` instruction. The inner
/// instructions execute later with the vault PDA as fee payer and signer,
/// once the proposal is approved.
pub fn vault_transaction_create(
    args: &VaultTransactionArgs<'_>,
    instructions: &[Instruction],
) -> Result<Instruction, UpgradeError> {
    let (vault, _) = vault_pda(&args.multisig, args.vault_index);
    let (transaction, _) = transaction_pda(&args.multisig, args.transaction_index);

    let inner = Message::new(instructions, Some(&vault));
    let message_bytes = encode_transaction_message(&inner)?;

    let mut data =
        Vec::with_capacity(8 + 2 + 4 + message_bytes.len() + 5 + args.memo.map_or(0, str::len));
    data.extend_from_slice(&VAULT_TRANSACTION_CREATE_DISCRIMINATOR);
    data.push(args.vault_index);
    data.push(args.ephemeral_signers);
    // borsh Vec<u8>: u32 LE length prefix
    data.extend_from_slice(&(message_bytes.len() as u32).to_le_bytes());
    data.extend_from_slice(&message_bytes);
    // borsh Option<String>
    match args.memo {
        Some(memo) => {
            data.push(1);
            data.extend_from_slice(&(memo.len() as u32).to_le_bytes());
            data.extend_from_slice(memo.as_bytes());
        }
        None => data.push(0),
    }

    Ok(Instruction {
        program_id: SQUADS_PROGRAM_ID,
        accounts: vec![
            AccountMeta::new(args.multisig, false),
            AccountMeta::new(transaction, false),
            AccountMeta::new_readonly(args.creator, true),
            AccountMeta::new(args.creator, true), // rent payer
            AccountMeta::new_readonly(system_program::id(), false),
        ],
        data,
    })
}

/// Compact Squads `TransactionMessage` encoding: header counts, then
/// u8-length-prefixed account keys and instructions (instruction data uses
/// a u16 LE length), then the address-table-lookup count (always zero
/// here; the upgrade message carries static keys only).
fn encode_transaction_message(message: &Message) -> Result<Vec<u8>, UpgradeError> {
    let account_count = message.account_keys.len();
    if account_count > u8::MAX as usize || message.instructions.len() > u8::MAX as usize {
        return Err(UpgradeError::MessageTooLarge(format!(
            "{account_count} accounts, {} instructions",
            message.instructions.len()
        )));
    }

    let header = &message.header;
    let num_signers = header.num_required_signatures;
    let num_writable_signers = num_signers - header.num_readonly_signed_accounts;
    let num_non_signers = account_count as u8 - num_signers;
    let num_writable_non_signers = num_non_signers - header.num_readonly_unsigned_accounts;

    let mut out = Vec::with_capacity(4 + account_count * 32 + 64);
    out.push(num_signers);
    out.push(num_writable_signers);
    out.push(num_writable_non_signers);

    out.push(account_count as u8);
    for key in &message.account_keys {
        out.extend_from_slice(key.as_ref());
    }

    out.push(message.instructions.len() as u8);
    for ix in &message.instructions {
        if ix.accounts.len() > u8::MAX as usize || ix.data.len() > u16::MAX as usize {
            return Err(UpgradeError::MessageTooLarge(format!(
                "instruction with {} accounts, {} data bytes",
                ix.accounts.len(),
                ix.data.len()
            )));
        }
        out.push(ix.program_id_index);
        out.push(ix.accounts.len() as u8);
        out.extend_from_slice(&ix.accounts);
        out.extend_from_slice(&(ix.data.len() as u16).to_le_bytes());
        out.extend_from_slice(&ix.data);
    }

    out.push(0); // no address table lookups
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use solana_sdk::system_instruction;

    #[test]
    fn vault_pda_varies_with_index() {
        let multisig = Pubkey::new_unique();
        let (vault_0, _) = vault_pda(&multisig, 0);
        let (vault_1, _) = vault_pda(&multisig, 1);
        assert_ne!(vault_0, vault_1);
        assert_eq!(vault_pda(&multisig, 0).0, vault_0);
    }

    #[test]
    fn transaction_index_decodes_from_fixed_offset() {
        let mut data = vec![0u8; 128];
        data[TRANSACTION_INDEX_OFFSET..TRANSACTION_INDEX_OFFSET + 8]
            .copy_from_slice(&42u64.to_le_bytes());
        assert_eq!(transaction_index_from_account(&data).unwrap(), 42);

        let short = vec![0u8; 16];
        assert!(matches!(
            transaction_index_from_account(&short),
            Err(UpgradeError::MalformedMultisigAccount { len: 16 })
        ));
    }

    #[test]
    fn vault_transaction_create_layout() {
        let multisig = Pubkey::new_unique();
        let creator = Pubkey::new_unique();
        let (vault, _) = vault_pda(&multisig, 0);
        let dest = Pubkey::new_unique();
        let inner = vec![system_instruction::transfer(&vault, &dest, 1)];

        let args = VaultTransactionArgs {
            multisig,
            transaction_index: 7,
            creator,
            vault_index: 0,
            ephemeral_signers: 0,
            memo: Some("Program and IDL upgrade"),
        };
        let ix = vault_transaction_create(&args, &inner).unwrap();

        assert_eq!(ix.program_id, SQUADS_PROGRAM_ID);
        assert_eq!(ix.accounts.len(), 5);
        assert_eq!(ix.accounts[0].pubkey, multisig);
        assert!(ix.accounts[0].is_writable);
        assert_eq!(ix.accounts[1].pubkey, transaction_pda(&multisig, 7).0);
        assert_eq!(ix.accounts[2].pubkey, creator);
        assert!(ix.accounts[2].is_signer);
        assert_eq!(ix.accounts[4].pubkey, system_program::id());

        assert_eq!(&ix.data[..8], &VAULT_TRANSACTION_CREATE_DISCRIMINATOR);
        assert_eq!(ix.data[8], 0); // vault index
        assert_eq!(ix.data[9], 0); // ephemeral signers
        let message_len = u32::from_le_bytes(ix.data[10..14].try_into().unwrap()) as usize;
        let memo_tag_at = 14 + message_len;
        assert_eq!(ix.data[memo_tag_at], 1);
        let memo_len =
            u32::from_le_bytes(ix.data[memo_tag_at + 1..memo_tag_at + 5].try_into().unwrap());
        assert_eq!(memo_len as usize, "Program and IDL upgrade".len());
        assert_eq!(ix.data.len(), memo_tag_at + 5 + memo_len as usize);
    }

    #[test]
    fn encoded_message_header_matches_compiled_message() {
        let multisig = Pubkey::new_unique();
        let (vault, _) = vault_pda(&multisig, 0);
        let dest = Pubkey::new_unique();
        let inner = vec![system_instruction::transfer(&vault, &dest, 1)];
        let message = Message::new(&inner, Some(&vault));

        let encoded = encode_transaction_message(&message).unwrap();
        // one signer (the vault), writable; transfer destination writable
        assert_eq!(encoded[0], message.header.num_required_signatures);
        assert_eq!(encoded[3] as usize, message.account_keys.len());
        // first account key is the vault payer
        assert_eq!(&encoded[4..36], vault.as_ref());

        let instructions_at = 4 + message.account_keys.len() * 32;
        assert_eq!(encoded[instructions_at], 1);
        // trailing lookup count is zero
        assert_eq!(*encoded.last().unwrap(), 0);
    }
}
