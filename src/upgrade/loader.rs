//! BPF upgradeable-loader and Anchor IDL upgrade instructions.

use solana_sdk::bpf_loader_upgradeable;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::pubkey::Pubkey;

use super::UpgradeError;

/// Anchor `IdlInstruction::SetBuffer` data: the IDL instruction tag
/// followed by the set-buffer variant.
pub const IDL_UPGRADE_DATA: [u8; 9] = [0x40, 0xf4, 0xbc, 0x78, 0xa7, 0xe9, 0x69, 0x0a, 0x03];

/// ProgramData account owned by the upgradeable loader.
pub fn program_data_address(program_id: &Pubkey) -> Pubkey {
    Pubkey::find_program_address(&[program_id.as_ref()], &bpf_loader_upgradeable::id()).0
}

/// Upgrade a program from a staged buffer, spilling leftover lamports to
/// `spill`. The authority here is the multisig vault, which signs only
/// when the wrapped transaction executes.
pub fn program_upgrade_instruction(
    program_id: &Pubkey,
    buffer: &Pubkey,
    authority: &Pubkey,
    spill: &Pubkey,
) -> Instruction {
    bpf_loader_upgradeable::upgrade(program_id, buffer, authority, spill)
}

/// The program's canonical IDL account:
/// `create_with_seed(find_program_address([], program).0, "anchor:idl", program)`.
pub fn idl_address(program_id: &Pubkey) -> Result<Pubkey, UpgradeError> {
    let (base, _) = Pubkey::find_program_address(&[], program_id);
    Ok(Pubkey::create_with_seed(&base, "anchor:idl", program_id)?)
}

/// Point the program's IDL account at a staged IDL buffer.
pub fn idl_upgrade_instruction(
    program_id: &Pubkey,
    idl_buffer: &Pubkey,
    authority: &Pubkey,
) -> Result<Instruction, UpgradeError> {
    let idl = idl_address(program_id)?;
    Ok(Instruction {
        program_id: *program_id,
        accounts: vec![
            AccountMeta::new(*idl_buffer, false),
            AccountMeta::new(idl, false),
            AccountMeta::new(*authority, true),
        ],
        data: IDL_UPGRADE_DATA.to_vec(),
    })
}
