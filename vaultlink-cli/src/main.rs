use std::path::PathBuf;

use clap::Parser;
use vaultlink_core::error::VaultError;

mod commands;

#[derive(Parser, Debug)]
#[command(
    name = "vaultlink",
    version,
    about = "Keep the link graph of a markdown vault in sync with its files"
)]
struct Cli {
    #[command(subcommand)]
    command: commands::Command,

    /// Vault root directory
    #[arg(long, global = true, default_value = ".", env = "VAULTLINK_VAULT")]
    vault: PathBuf,

    /// Print machine-readable JSON instead of text
    #[arg(long, global = true)]
    json: bool,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    quiet: bool,
}

/// Map an error to the process exit code.
///
/// Exit codes:
///   0  success
///   1  general/unknown error (including rewrite I/O)
///   2  configuration error
///   3  index not found or other precondition failure
///   4  database error
///   5  ambiguity or link integrity violation
///   6  a source file changed on disk since it was indexed
fn classify_exit_code(err: &anyhow::Error) -> i32 {
    let Some(vault_err) = err.chain().find_map(|e| e.downcast_ref::<VaultError>()) else {
        return 1;
    };
    match vault_err {
        VaultError::Config(_) => 2,
        VaultError::Precondition(_) => 3,
        VaultError::Store(_) => 4,
        VaultError::Integrity(_) => 5,
        VaultError::Stale { .. } => 6,
        VaultError::Rewrite(_) | VaultError::Io(_) => 1,
    }
}

fn main() {
    let cli = Cli::parse();

    // Initialize tracing based on verbosity
    let filter = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (_, 0) => "warn",
        (_, 1) => "info",
        (_, 2) => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .init();

    let globals = commands::Globals {
        vault: cli.vault,
        json: cli.json,
        quiet: cli.quiet,
    };

    match commands::run(&globals, cli.command) {
        Ok(()) => std::process::exit(0),
        Err(e) => {
            eprintln!("Error: {e:#}");
            std::process::exit(classify_exit_code(&e));
        }
    }
}
