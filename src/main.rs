//! Squads-gated program upgrade workflow.
//!
//! Wraps a BPF program upgrade and its IDL upgrade into a Squads v4 vault
//! transaction, then delivers it with compute budget estimation and
//! bounded retries. Approval of the resulting proposal happens in the
//! Squads UI; this binary only lands the vault transaction on chain.

#![deny(unused_imports)]
#![deny(unused_mut)]
#![warn(unused_must_use)]

use anyhow::{Context, Result};
use clap::Parser;
use solana_sdk::instruction::Instruction;
use solana_sdk::pubkey::Pubkey;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use upgrade_sender::upgrade::{
    decompile_instruction, idl_upgrade_instruction, parse_verification_transaction,
    program_upgrade_instruction, transaction_index_from_account, vault_pda,
    vault_transaction_create, VaultTransactionArgs,
};
use upgrade_sender::{
    send_transaction, SendOptions, SolanaLedgerClient, TracingSink, UnsignedTransaction,
    WalletManager,
};

/// Priority fee for the wrapping transaction, well above the minimum so
/// the upgrade is not starved during congestion.
const UPGRADE_PRIORITY_FEE: u64 = 100_000;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// RPC endpoint URL
    #[arg(long, env = "UPGRADE_RPC")]
    rpc: String,

    /// Program to upgrade
    #[arg(long)]
    program: Pubkey,

    /// Staged program buffer
    #[arg(long)]
    buffer: Pubkey,

    /// Staged IDL buffer
    #[arg(long = "idl-buffer")]
    idl_buffer: Pubkey,

    /// Squads multisig account
    #[arg(long)]
    multisig: Pubkey,

    /// Keypair: path to a file, the JSON byte array itself, or a base58
    /// secret
    #[arg(long, env = "UPGRADE_KEYPAIR")]
    keypair: String,

    /// Optional base64 verification transaction whose PDA instruction is
    /// prepended to the upgrade message
    #[arg(long = "pda-tx")]
    pda_tx: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose)?;

    let wallet = WalletManager::from_source(&args.keypair)?;
    let client = SolanaLedgerClient::new(&args.rpc);

    let (vault, _) = vault_pda(&args.multisig, 0);
    info!(
        multisig = %args.multisig,
        vault = %vault,
        program = %args.program,
        program_buffer = %args.buffer,
        idl_buffer = %args.idl_buffer,
        creator = %wallet.pubkey(),
        "upgrade setup"
    );

    // Both accounts must exist before we stage an upgrade against them.
    let rpc = client.rpc();
    rpc.get_account(&args.program)
        .await
        .context("Could not fetch program account")?;
    rpc.get_account(&args.buffer)
        .await
        .context("Could not fetch buffer account")?;

    // IDL first: upgrading it after the program swap reports the program
    // as not deployed.
    let mut instructions: Vec<Instruction> = vec![
        idl_upgrade_instruction(&args.program, &args.idl_buffer, &vault)?,
        program_upgrade_instruction(&args.program, &args.buffer, &vault, &wallet.pubkey()),
    ];

    if let Some(encoded) = &args.pda_tx {
        let verification = parse_verification_transaction(encoded)?;
        if let Some(ix) = decompile_instruction(&verification.message, 1) {
            info!("adding verification instruction");
            instructions.insert(0, ix);
        }
    }

    let multisig_account = rpc
        .get_account(&args.multisig)
        .await
        .context("Could not fetch multisig account")?;
    let transaction_index = transaction_index_from_account(&multisig_account.data)? + 1;

    let create_ix = vault_transaction_create(
        &VaultTransactionArgs {
            multisig: args.multisig,
            transaction_index,
            creator: wallet.pubkey(),
            vault_index: 0,
            ephemeral_signers: 0,
            memo: Some("Program and IDL upgrade"),
        },
        &instructions,
    )?;

    let tx = UnsignedTransaction::new(vec![create_ix]).with_fee_payer(wallet.pubkey());
    let signature = send_transaction(
        &client,
        tx,
        &[wallet.keypair()],
        UPGRADE_PRIORITY_FEE,
        None,
        &SendOptions::default(),
        &mut TracingSink,
    )
    .await?;

    info!(%signature, transaction_index, "vault transaction created");
    info!("approve the proposal in the Squads UI: https://v4.squads.so/");
    Ok(())
}

fn init_tracing(verbose: bool) -> Result<()> {
    let default_filter = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init()
        .context("Failed to initialize tracing")?;
    Ok(())
}
