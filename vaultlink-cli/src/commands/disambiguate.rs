use anyhow::Context;
use clap::Args;

use vaultlink_core::engine::disambiguate::{self, DisambiguateOptions};

use super::Globals;

#[derive(Args, Debug)]
pub struct DisambiguateArgs {
    /// Basename of the document links should name by path
    pub name: String,

    /// Document the links should point at, when several share the name
    #[arg(long)]
    pub target: Option<String>,

    /// Only rewrite links in these documents
    #[arg(long)]
    pub scope: Vec<String>,

    /// Scan documents on disk instead of using the index; the index is not updated
    #[arg(long)]
    pub scan_only: bool,
}

pub fn run(globals: &Globals, args: DisambiguateArgs) -> anyhow::Result<()> {
    let vault = super::open_vault(globals)?;
    let options = DisambiguateOptions {
        target: args.target,
        scope: args.scope,
    };

    let outcome = if args.scan_only {
        disambiguate::run_scan_only(&vault, &args.name, &options)
    } else {
        let mut store = super::open_index(&vault)?;
        disambiguate::run(&vault, &mut store, &args.name, &options)
    }
    .with_context(|| format!("Cannot disambiguate links to {}", args.name))?;

    if globals.json {
        return super::print_json(&outcome);
    }
    if globals.quiet {
        return Ok(());
    }

    if outcome.rewritten.is_empty() {
        println!("No basename links to {} needed rewriting", outcome.target);
    } else {
        println!("Links to {} now name it by path", outcome.target);
        super::print_rewrites(&outcome.rewritten);
    }
    Ok(())
}
