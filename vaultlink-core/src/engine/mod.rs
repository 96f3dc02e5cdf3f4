//! Operations that mutate the index.
//!
//! Each entry point takes the vault and a `&mut SqliteStore`, performs any
//! disk rewrites first, and finishes with a single transaction. A failed
//! transaction restores the disk to its state before the call.

pub mod add;
pub mod build;
pub mod delete;
pub mod disambiguate;

use tracing::warn;

use crate::error::Result;
use crate::parser;
use crate::rewrite::AppliedRewrites;
use crate::store::GraphWrite;
use crate::types::IncomingEdge;
use crate::vault::{Vault, VaultFs};

/// Normalize caller paths and drop duplicates, keeping first-seen order.
pub(crate) fn normalize_inputs(vault: &Vault, inputs: &[String]) -> Result<Vec<String>> {
    let mut out: Vec<String> = Vec::with_capacity(inputs.len());
    for input in inputs {
        let path = vault.relative_path(input)?;
        if !out.contains(&path) {
            out.push(path);
        }
    }
    Ok(out)
}

/// Incoming edges that name their target by basename and come from a note.
pub(crate) fn basename_edges(incoming: Vec<IncomingEdge>) -> Vec<IncomingEdge> {
    incoming
        .into_iter()
        .filter(|e| {
            e.source_path.is_some() && parser::is_basename_raw(e.edge.kind, &e.edge.raw_link)
        })
        .collect()
}

/// Persist the new raw text of rewritten edges and the new mtimes of their
/// source files.
pub(crate) fn record_rewrites<W: GraphWrite + ?Sized>(tx: &W, applied: &AppliedRewrites) -> Result<()> {
    for (edge, raw) in applied.edge_updates() {
        tx.update_raw_link(*edge, raw)?;
    }
    for (path, mtime) in applied.mtimes() {
        if let Some(note) = tx.note_by_path(path)? {
            tx.update_note_mtime(note.id, *mtime)?;
        }
    }
    Ok(())
}

/// Undo applied rewrites if the index update failed.
pub(crate) fn restore_on_error<T>(
    fs: &dyn VaultFs,
    applied: &AppliedRewrites,
    result: Result<T>,
) -> Result<T> {
    if let Err(e) = &result {
        if !applied.is_empty() {
            warn!(error = %e, "Index update failed; restoring rewritten files");
            applied.restore(fs);
        }
    }
    result
}
