pub mod add;
pub mod backlinks;
pub mod build;
pub mod delete;
pub mod disambiguate;
pub mod status;

use std::path::PathBuf;

use anyhow::Context;
use clap::Subcommand;
use serde::Serialize;
use tracing::debug;

use vaultlink_core::store::SqliteStore;
use vaultlink_core::types::RewrittenLink;
use vaultlink_core::vault::Vault;

/// Flags shared by every subcommand.
#[derive(Debug)]
pub struct Globals {
    pub vault: PathBuf,
    pub json: bool,
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Scan the whole vault and rebuild the index from scratch
    Build(build::BuildArgs),
    /// Register new documents, promoting phantoms they satisfy
    Add(add::AddArgs),
    /// Remove documents from the index, keeping referenced ones as phantoms
    Delete(delete::DeleteArgs),
    /// Rewrite basename links to a document into path-qualified form
    Disambiguate(disambiguate::DisambiguateArgs),
    /// List the links pointing at a document
    Backlinks(backlinks::BacklinksArgs),
    /// Show index counts and the time of the last build
    Status(status::StatusArgs),
}

pub fn run(globals: &Globals, cmd: Command) -> anyhow::Result<()> {
    match cmd {
        Command::Build(args) => build::run(globals, args),
        Command::Add(args) => add::run(globals, args),
        Command::Delete(args) => delete::run(globals, args),
        Command::Disambiguate(args) => disambiguate::run(globals, args),
        Command::Backlinks(args) => backlinks::run(globals, args),
        Command::Status(args) => status::run(globals, args),
    }
}

/// Open the vault named by `--vault`.
pub(crate) fn open_vault(globals: &Globals) -> anyhow::Result<Vault> {
    let vault = Vault::open(&globals.vault)
        .with_context(|| format!("Cannot open vault: {}", globals.vault.display()))?;
    debug!(root = %vault.root().display(), "Opened vault");
    Ok(vault)
}

/// Open the existing index of `vault`.
pub(crate) fn open_index(vault: &Vault) -> anyhow::Result<SqliteStore> {
    let store = vault
        .open_index()
        .with_context(|| format!("Cannot open index: {}", vault.index_path().display()))?;
    debug!(index = %vault.index_path().display(), "Opened index");
    Ok(store)
}

pub(crate) fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{text}");
    Ok(())
}

pub(crate) fn print_rewrites(rewritten: &[RewrittenLink]) {
    if rewritten.is_empty() {
        return;
    }
    println!("  Rewritten links: {}", rewritten.len());
    for link in rewritten {
        println!("    {:<30} {} -> {}", link.file, link.old, link.new);
    }
}
