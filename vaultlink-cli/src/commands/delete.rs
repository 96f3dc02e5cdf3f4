use anyhow::Context;
use clap::{Args, ValueEnum};
use tracing::info;

use vaultlink_core::config::DeletePolicy;
use vaultlink_core::engine::delete;

use super::Globals;

/// Command-line spelling of the deletion disk policy.
#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum PolicyArg {
    /// Remove the file from disk as part of the deletion
    RemoveFile,
    /// Refuse unless the file is already gone from disk
    RequireAbsent,
}

impl From<PolicyArg> for DeletePolicy {
    fn from(arg: PolicyArg) -> Self {
        match arg {
            PolicyArg::RemoveFile => Self::RemoveFile,
            PolicyArg::RequireAbsent => Self::RequireAbsent,
        }
    }
}

#[derive(Args, Debug)]
pub struct DeleteArgs {
    /// Documents to remove from the index
    #[arg(required = true)]
    pub paths: Vec<String>,

    /// What to do with the file on disk (default from `delete.policy` in config)
    #[arg(long, value_enum)]
    pub policy: Option<PolicyArg>,
}

pub fn run(globals: &Globals, args: DeleteArgs) -> anyhow::Result<()> {
    let vault = super::open_vault(globals)?;
    let mut store = super::open_index(&vault)?;

    let policy = args
        .policy
        .map_or(vault.config().delete.policy, DeletePolicy::from);
    if args.policy.is_none() {
        info!(policy = policy.as_str(), "Using delete policy from config");
    }
    let outcome = delete::run(&vault, &mut store, &args.paths, policy)
        .with_context(|| format!("Cannot delete {}", args.paths.join(", ")))?;

    if globals.json {
        return super::print_json(&outcome);
    }
    if globals.quiet {
        return Ok(());
    }

    for path in &outcome.deleted {
        println!("  deleted   {path}");
    }
    for path in &outcome.phantomized {
        println!("  deleted   {path} (still linked; kept as missing target)");
    }
    Ok(())
}
