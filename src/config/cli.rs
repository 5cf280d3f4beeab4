use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Clone, Parser)]
#[command(name = "rfid-assign")]
#[command(about = "Encode, decode and look up vehicle identities stored on RFID tags")]
pub struct CliConfig {
    #[arg(long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Emit logs as JSON lines")]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Print the EPC hex for a plate and record id
    Encode {
        #[arg(long)]
        plate: String,
        #[arg(long)]
        record_id: String,
    },
    /// Decode an EPC hex string
    Decode { epc_hex: String },
    /// Print a plate in registry form
    Normalize { raw: String },
    /// Authenticate and print the registry record for a plate
    Lookup {
        plate: String,
        #[arg(long, default_value = "rfid-assign.toml")]
        config: PathBuf,
    },
}
