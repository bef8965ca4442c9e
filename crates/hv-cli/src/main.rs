mod commands;
mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "hv", about = "HermesVault operator tools")]
struct Cli {
    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Generate a vault key pair and write the public key file
    Keygen {
        /// Where to write the raw 32-byte public key
        #[arg(long, default_value = "public_key.bin")]
        out: PathBuf,
        /// Overwrite an existing key file
        #[arg(long)]
        force: bool,
    },
    /// Decrypt one sealed nullifier (hex)
    Decrypt {
        blob: String,
    },
    /// Decrypt every confirmed note's nullifier in a service database
    DecryptNotes {
        #[arg(long, default_value = "hermesvault.db")]
        db: PathBuf,
    },
    /// Inspect or create notes
    Note {
        #[command(subcommand)]
        action: NoteCmd,
    },
    /// Preview the withdrawal fee and change for a note amount
    Fee {
        /// Note amount, in coins (e.g. "2.5")
        note_amount: String,
        /// Withdrawal amount, in coins
        amount: String,
        #[arg(long, default_value_t = 0)]
        divisor: u64,
        #[arg(long, default_value_t = hv_types::WITHDRAWAL_MIN_FEE)]
        minimum: u64,
    },
}

#[derive(Subcommand)]
enum NoteCmd {
    /// Show the amount and derived values of a note
    Inspect { note: String },
    /// Generate a fresh note for an amount in coins
    New { amount: String },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    output::set_json_mode(cli.json);
    match cli.command {
        Cmd::Keygen { out, force } => commands::keygen::run(&out, force)?,
        Cmd::Decrypt { blob } => commands::decrypt::run(&blob)?,
        Cmd::DecryptNotes { db } => commands::decrypt::run_db(&db)?,
        Cmd::Note { action } => match action {
            NoteCmd::Inspect { note } => commands::note::inspect(&note)?,
            NoteCmd::New { amount } => commands::note::new(&amount)?,
        },
        Cmd::Fee {
            note_amount,
            amount,
            divisor,
            minimum,
        } => commands::fee::run(&note_amount, &amount, divisor, minimum)?,
    }
    Ok(())
}
