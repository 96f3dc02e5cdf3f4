use anyhow::Context;
use clap::Args;
use serde::Serialize;

use vaultlink_core::query;
use vaultlink_core::types::IndexStats;

use super::Globals;

#[derive(Args, Debug)]
pub struct StatusArgs {}

#[derive(Serialize)]
struct StatusReport {
    vault: String,
    index: String,
    #[serde(flatten)]
    stats: IndexStats,
}

pub fn run(globals: &Globals, _args: StatusArgs) -> anyhow::Result<()> {
    let vault = super::open_vault(globals)?;
    let store = super::open_index(&vault)?;
    let stats = query::stats(&store).context("Failed to read index stats")?;

    if globals.json {
        return super::print_json(&StatusReport {
            vault: vault.root().display().to_string(),
            index: vault.index_path().display().to_string(),
            stats,
        });
    }

    println!("vaultlink status for {}", vault.root().display());
    println!();
    println!("  Index: {}", vault.index_path().display());
    match &stats.built_at {
        Some(at) => println!("  Built: {at}"),
        None => println!("  Built: never"),
    }
    println!();
    println!("  Notes:    {:>6}", stats.notes);
    println!("  Phantoms: {:>6}", stats.phantoms);
    println!("  Tags:     {:>6}", stats.tags);
    println!("  Assets:   {:>6}", stats.assets);
    println!("  Edges:    {:>6}", stats.edges);
    Ok(())
}
