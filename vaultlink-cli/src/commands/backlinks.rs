use anyhow::Context;
use clap::Args;

use vaultlink_core::query;

use super::Globals;

#[derive(Args, Debug)]
pub struct BacklinksArgs {
    /// Document whose incoming links to list
    pub path: String,
}

pub fn run(globals: &Globals, args: BacklinksArgs) -> anyhow::Result<()> {
    let vault = super::open_vault(globals)?;
    let store = super::open_index(&vault)?;

    let path = vault.relative_path(&args.path)?;
    let links = query::backlinks(&store, &path)
        .with_context(|| format!("Cannot list backlinks of {path}"))?;

    if globals.json {
        return super::print_json(&links);
    }

    if links.is_empty() {
        println!("No links to {path}");
        return Ok(());
    }
    println!("Links to {path}: {}", links.len());
    for link in &links {
        println!(
            "  {:<30} {:>5}  {:<9} {}",
            link.source,
            link.line,
            link.kind.as_str(),
            link.raw_link
        );
    }
    Ok(())
}
