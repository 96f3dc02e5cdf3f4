use anyhow::Context;
use clap::Args;

use vaultlink_core::engine::add::{self, AddOptions};

use super::Globals;

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Documents to register (vault-relative or absolute under the vault)
    #[arg(required = true)]
    pub paths: Vec<String>,

    /// Rewrite basename links the new documents would make ambiguous
    #[arg(long)]
    pub auto_disambiguate: bool,
}

pub fn run(globals: &Globals, args: AddArgs) -> anyhow::Result<()> {
    let vault = super::open_vault(globals)?;
    let mut store = super::open_index(&vault)?;

    let options = AddOptions {
        auto_disambiguate: args.auto_disambiguate || vault.config().add.auto_disambiguate,
    };
    let outcome = add::run(&vault, &mut store, &args.paths, options)
        .with_context(|| format!("Cannot add {}", args.paths.join(", ")))?;

    if globals.json {
        return super::print_json(&outcome);
    }
    if globals.quiet {
        return Ok(());
    }

    for path in &outcome.added {
        if outcome.promoted.contains(path) {
            println!("  added     {path} (replaces missing link target)");
        } else {
            println!("  added     {path}");
        }
    }
    super::print_rewrites(&outcome.rewritten);
    Ok(())
}
