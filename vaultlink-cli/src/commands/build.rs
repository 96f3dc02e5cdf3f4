use anyhow::Context;
use clap::Args;
use tracing::info;

use vaultlink_core::engine::build::{self, BuildOptions};
use vaultlink_core::progress::{IndicatifReporter, NoopReporter, ProgressReporter};

use super::Globals;

#[derive(Args, Debug)]
pub struct BuildArgs {
    /// Fail on the first ambiguous or escaping link instead of skipping it
    #[arg(long)]
    pub strict: bool,
}

pub fn run(globals: &Globals, args: BuildArgs) -> anyhow::Result<()> {
    let vault = super::open_vault(globals)?;
    let mut store = vault
        .create_index()
        .with_context(|| format!("Cannot create index: {}", vault.index_path().display()))?;

    let options = BuildOptions {
        strict: args.strict || vault.config().build.strict,
    };
    if options.strict && !args.strict {
        info!("Strict mode enabled by config");
    }
    let reporter: Box<dyn ProgressReporter> = if globals.quiet || globals.json {
        Box::new(NoopReporter)
    } else {
        Box::new(IndicatifReporter::new())
    };

    let report = build::run(&vault, &mut store, options, reporter.as_ref())
        .with_context(|| format!("Build failed for {}", vault.root().display()))?;

    if globals.json {
        return super::print_json(&report);
    }
    if globals.quiet {
        return Ok(());
    }

    let stats = &report.stats;
    println!("Built index for {}", vault.root().display());
    println!();
    println!("  Notes:    {:>6}", stats.notes);
    println!("  Phantoms: {:>6}", stats.phantoms);
    println!("  Tags:     {:>6}", stats.tags);
    println!("  Assets:   {:>6}", stats.assets);
    println!("  Edges:    {:>6}", stats.edges);

    if !report.diagnostics.is_empty() {
        println!();
        println!("  Skipped: {}", report.diagnostics.len());
        for d in &report.diagnostics {
            println!("    {}:{}  {}", d.path, d.line, d.message);
        }
    }
    Ok(())
}
