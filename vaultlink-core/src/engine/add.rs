//! Register new documents with the index.
//!
//! Adding a document can give an existing basename a second owner. Links that
//! named the old owner by basename are then either rewritten to a
//! path-qualified form (with auto-disambiguation) or the whole addition is
//! refused. Phantoms the new documents satisfy are promoted.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::{IntegrityError, PreconditionError, Result};
use crate::parser::{self, LinkOccurrence};
use crate::paths;
use crate::resolve::{self, LinkIndex, Resolution};
use crate::rewrite::{self, AppliedRewrites, RewriteEntry, RewritePlan};
use crate::store::{GraphRead, GraphWrite, SqliteStore, StoreTx};
use crate::types::{NodeId, NodeKind, RewrittenLink};
use crate::vault::Vault;

use super::{basename_edges, normalize_inputs, record_rewrites, restore_on_error};

#[derive(Debug, Clone, Copy, Default)]
pub struct AddOptions {
    /// Rewrite basename links that the addition would make ambiguous.
    pub auto_disambiguate: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AddOutcome {
    pub added: Vec<String>,
    /// New documents that replaced a phantom.
    pub promoted: Vec<String>,
    pub rewritten: Vec<RewrittenLink>,
}

/// A validated new document with its parsed, resolved links.
struct NewDocument {
    path: String,
    mtime: i64,
    links: Vec<(LinkOccurrence, Resolution)>,
}

/// Add documents to the index. All or nothing.
pub fn run(
    vault: &Vault,
    store: &mut SqliteStore,
    inputs: &[String],
    options: AddOptions,
) -> Result<AddOutcome> {
    let start = Instant::now();
    let fs = vault.fs();

    let mut new_files = Vec::new();
    for path in normalize_inputs(vault, inputs)? {
        if Vault::is_internal(&path) {
            return Err(PreconditionError::OutsideVault(path).into());
        }
        if !paths::has_document_extension(&path) {
            return Err(PreconditionError::NotDocument(path).into());
        }
        if store.note_by_path(&path)?.is_some() {
            return Err(PreconditionError::AlreadyRegistered(path).into());
        }
        let mtime = vault.require_mtime(&path)?;
        new_files.push((path, mtime));
    }

    let existing: Vec<String> = store.notes()?.into_iter().filter_map(|n| n.path).collect();
    let before = LinkIndex::new(&existing);
    let mut after = before.clone();
    for (path, _) in &new_files {
        after.insert(path);
    }

    // Basenames that gain a second document.
    let mut plan = RewritePlan::default();
    let mut stale_checks: BTreeMap<String, Option<i64>> = BTreeMap::new();
    let keys: BTreeSet<String> = new_files.iter().map(|(p, _)| paths::basename_key(p)).collect();
    for key in &keys {
        let prior = before.candidates(key);
        let post = after.candidates(key);
        if prior.len() > 1 || post.len() < 2 {
            continue;
        }

        if let [prior_path] = prior {
            let Some(prior_note) = store.note_by_path(prior_path)? else {
                continue;
            };
            let edges = basename_edges(store.incoming_edges(prior_note.id)?);
            if edges.is_empty() {
                continue;
            }
            if !options.auto_disambiguate {
                return Err(IntegrityError::WouldAmbiguate {
                    basename: key.clone(),
                    target: prior_path.clone(),
                    count: edges.len(),
                }
                .into());
            }
            for incoming in edges {
                let Some(source) = incoming.source_path else {
                    continue;
                };
                let edge = incoming.edge;
                if let Some(entry) = RewriteEntry::new(
                    Some(edge.id),
                    &source,
                    edge.line_start,
                    edge.kind,
                    &edge.raw_link,
                    prior_path,
                ) {
                    stale_checks.insert(source, incoming.source_mtime);
                    plan.push(entry);
                }
            }
        } else if let Some(phantom) = store.node_by_key(&paths::phantom_key(key))? {
            let edges = basename_edges(store.incoming_edges(phantom.id)?);
            if !edges.is_empty() {
                return Err(IntegrityError::AmbiguousPromotion {
                    basename: key.clone(),
                    candidates: post.to_vec(),
                    count: edges.len(),
                }
                .into());
            }
        }
    }

    rewrite::check_staleness(
        fs,
        stale_checks.iter().map(|(path, mtime)| (path.as_str(), *mtime)),
    )?;

    let mut documents = Vec::with_capacity(new_files.len());
    for (path, mtime) in new_files {
        let text = vault.read_text(&path)?;
        let mut links = Vec::new();
        for occ in parser::parse_links(&text) {
            let resolution = resolve::resolve(&path, &occ, &after, fs)?;
            links.push((occ, resolution));
        }
        documents.push(NewDocument { path, mtime, links });
    }

    let applied = if plan.is_empty() {
        AppliedRewrites::default()
    } else {
        rewrite::apply(fs, &plan)?
    };

    let result = commit(vault, store, &documents, &after, &applied);
    let promoted = restore_on_error(fs, &applied, result)?;

    let outcome = AddOutcome {
        added: documents.into_iter().map(|d| d.path).collect(),
        promoted,
        rewritten: applied.into_links(),
    };
    info!(
        added = outcome.added.len(),
        promoted = outcome.promoted.len(),
        rewritten = outcome.rewritten.len(),
        duration = ?start.elapsed(),
        "Add complete"
    );
    Ok(outcome)
}

/// The transactional half of an addition. Returns the promoted paths.
fn commit(
    vault: &Vault,
    store: &mut SqliteStore,
    documents: &[NewDocument],
    index: &LinkIndex,
    applied: &AppliedRewrites,
) -> Result<Vec<String>> {
    let tx = store.begin()?;

    let mut note_ids: HashMap<String, NodeId> = HashMap::new();
    for doc in documents {
        let id = tx.upsert_note(&doc.path, paths::stem(&doc.path), doc.mtime)?;
        note_ids.insert(doc.path.clone(), id);
    }

    let mut promoted = Vec::new();
    for doc in documents {
        if promote_phantoms(vault, &tx, &doc.path, note_ids[&doc.path], index)? {
            promoted.push(doc.path.clone());
        }
    }

    for doc in documents {
        let source_id = note_ids[&doc.path];
        for (occ, resolution) in &doc.links {
            let target = resolve::materialize(&tx, resolution, source_id, &note_ids)?;
            tx.insert_edge(&resolve::edge_for(source_id, target, occ))?;
        }
    }

    record_rewrites(&tx, applied)?;
    tx.cleanup_orphaned_nodes()?;
    tx.commit()?;
    Ok(promoted)
}

/// Move edges from phantoms named after `path` onto the new note.
///
/// A phantom matches by basename or by extension-less path. Only edges whose
/// link now resolves to the new note move; a phantom left without edges is
/// deleted. Returns whether anything was promoted.
fn promote_phantoms(
    vault: &Vault,
    tx: &StoreTx<'_>,
    path: &str,
    note_id: NodeId,
    index: &LinkIndex,
) -> Result<bool> {
    let keys: BTreeSet<String> = [
        paths::phantom_key(paths::stem(path)),
        paths::phantom_key(paths::strip_document_extension(path)),
    ]
    .into_iter()
    .collect();

    let mut promoted = false;
    for key in keys {
        let Some(phantom) = tx.node_by_key(&key)? else {
            continue;
        };
        if phantom.kind != NodeKind::Phantom {
            continue;
        }

        let incoming = tx.incoming_edges(phantom.id)?;
        let total = incoming.len();
        let mut moved = 0;
        for edge in incoming {
            let Some(source) = edge.source_path.as_deref() else {
                continue;
            };
            let Some(occ) = parser::parse_raw(edge.edge.kind, &edge.edge.raw_link) else {
                continue;
            };
            match resolve::resolve(source, &occ, index, vault.fs()) {
                Ok(Resolution::Note(target)) if target == path => {
                    tx.retarget_edge(edge.edge.id, note_id)?;
                    moved += 1;
                }
                _ => {}
            }
        }

        if moved == total {
            tx.delete_node(phantom.id)?;
        }
        if moved > 0 {
            debug!(phantom = %phantom.name, note = path, moved, "Promoted phantom");
            promoted = true;
        }
    }
    Ok(promoted)
}
