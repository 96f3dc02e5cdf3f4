//! Remove documents from the index.
//!
//! A deleted note that others still link to survives as a phantom carrying
//! those links; an unreferenced one disappears with its edges.

use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::DeletePolicy;
use crate::error::{PreconditionError, Result};
use crate::paths;
use crate::store::{GraphRead, GraphWrite, SqliteStore};
use crate::types::{Node, RemovalOutcome};
use crate::vault::{FileBackup, Vault, VaultFs};

use super::normalize_inputs;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeleteOutcome {
    /// Removed from the graph entirely.
    pub deleted: Vec<String>,
    /// Kept as phantoms because other documents still link to them.
    pub phantomized: Vec<String>,
}

/// Delete documents from the index under the given disk policy.
pub fn run(
    vault: &Vault,
    store: &mut SqliteStore,
    inputs: &[String],
    policy: DeletePolicy,
) -> Result<DeleteOutcome> {
    let start = Instant::now();
    let fs = vault.fs();

    let mut nodes: Vec<Node> = Vec::new();
    for path in normalize_inputs(vault, inputs)? {
        let Some(node) = store.registered_by_path(&path)? else {
            return Err(PreconditionError::NotRegistered(path).into());
        };
        if nodes.iter().any(|n| n.id == node.id) {
            continue;
        }
        let on_disk = node.path.as_deref().unwrap_or(&path);
        if policy == DeletePolicy::RequireAbsent && fs.exists(on_disk) {
            return Err(PreconditionError::StillOnDisk(on_disk.to_string()).into());
        }
        nodes.push(node);
    }

    let removed = match policy {
        DeletePolicy::RemoveFile => remove_files(fs, &nodes)?,
        DeletePolicy::RequireAbsent => Vec::new(),
    };

    let result = commit(store, &nodes);
    if result.is_err() && !removed.is_empty() {
        warn!("Index update failed; restoring removed files");
        restore(fs, &removed);
    }
    let outcome = result?;

    info!(
        deleted = outcome.deleted.len(),
        phantomized = outcome.phantomized.len(),
        policy = policy.as_str(),
        duration = ?start.elapsed(),
        "Delete complete"
    );
    Ok(outcome)
}

/// Remove the files of `nodes` from disk, keeping their bytes.
///
/// If any removal fails the files already removed are written back.
fn remove_files(fs: &dyn VaultFs, nodes: &[Node]) -> Result<Vec<FileBackup>> {
    let mut removed = Vec::new();
    for path in nodes.iter().filter_map(|n| n.path.as_deref()) {
        if !fs.exists(path) {
            continue;
        }
        let step = fs
            .read(path)
            .and_then(|bytes| FileBackup::capture(fs, path, bytes))
            .and_then(|backup| fs.remove(path).map(|()| backup));
        match step {
            Ok(backup) => {
                debug!(path, "Removed file");
                removed.push(backup);
            }
            Err(e) => {
                restore(fs, &removed);
                return Err(e.into());
            }
        }
    }
    Ok(removed)
}

fn restore(fs: &dyn VaultFs, backups: &[FileBackup]) {
    for backup in backups {
        if let Err(e) = backup.restore(fs) {
            warn!(path = %backup.path, error = %e, "Failed to restore removed file");
        }
    }
}

fn commit(store: &mut SqliteStore, nodes: &[Node]) -> Result<DeleteOutcome> {
    let tx = store.begin()?;
    let mut outcome = DeleteOutcome::default();
    let mut kept: Vec<(&Node, String)> = Vec::new();
    for node in nodes {
        let label = node.path.clone().unwrap_or_else(|| node.name.clone());
        match tx.remove_or_phantomize(node.id, &node.name)? {
            RemovalOutcome::Deleted => outcome.deleted.push(label),
            RemovalOutcome::Phantomized => kept.push((node, label)),
        }
    }
    tx.cleanup_orphaned_nodes()?;

    // A phantom whose only referrers were deleted later in the batch is swept.
    for (node, label) in kept {
        if tx.node_by_key(&paths::phantom_key(&node.name))?.is_some() {
            outcome.phantomized.push(label);
        } else {
            outcome.deleted.push(label);
        }
    }
    tx.commit()?;
    Ok(outcome)
}
