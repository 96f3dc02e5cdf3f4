//! Rewrite basename links to a path-qualified form.
//!
//! Index-backed mode rewrites the recorded edges of one note and updates the
//! index in the same operation. Scan-only mode re-parses documents on disk
//! and never touches the index.

use std::collections::BTreeMap;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, info};

use crate::error::{IntegrityError, PreconditionError, Result};
use crate::parser;
use crate::paths;
use crate::resolve::{self, LinkIndex, Resolution};
use crate::rewrite::{self, AppliedRewrites, RewriteEntry, RewritePlan};
use crate::store::{GraphRead, SqliteStore};
use crate::types::{LinkKind, RewrittenLink};
use crate::vault::Vault;

use super::{basename_edges, normalize_inputs, record_rewrites, restore_on_error};

#[derive(Debug, Clone, Default)]
pub struct DisambiguateOptions {
    /// Which same-named document links should point at.
    pub target: Option<String>,
    /// Only rewrite links in these documents.
    pub scope: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DisambiguateOutcome {
    /// The document the rewritten links now name by path.
    pub target: String,
    pub rewritten: Vec<RewrittenLink>,
}

/// Pick the document links should point at.
///
/// `candidates` are the documents whose basename matches `name`.
fn select_target(
    vault: &Vault,
    name: &str,
    candidates: &[String],
    explicit: Option<&str>,
) -> Result<String> {
    if candidates.is_empty() {
        return Err(PreconditionError::NoSuchName(name.to_string()).into());
    }
    match explicit {
        Some(requested) => {
            let wanted = vault.relative_path(requested)?.to_lowercase();
            candidates
                .iter()
                .find(|c| {
                    c.to_lowercase() == wanted
                        || paths::strip_document_extension(&c.to_lowercase()) == wanted
                })
                .cloned()
                .ok_or_else(|| {
                    IntegrityError::NotACandidate {
                        name: name.to_string(),
                        target: requested.to_string(),
                    }
                    .into()
                })
        }
        None => match candidates {
            [only] => Ok(only.clone()),
            many => Err(IntegrityError::MultipleCandidates {
                name: name.to_string(),
                candidates: many.to_vec(),
            }
            .into()),
        },
    }
}

fn commit_rewrites(store: &mut SqliteStore, applied: &AppliedRewrites) -> Result<()> {
    let tx = store.begin()?;
    record_rewrites(&tx, applied)?;
    tx.commit()
}

/// Rewrite the indexed basename links to the note named `name`.
pub fn run(
    vault: &Vault,
    store: &mut SqliteStore,
    name: &str,
    options: &DisambiguateOptions,
) -> Result<DisambiguateOutcome> {
    let start = Instant::now();
    let fs = vault.fs();
    let key = paths::basename_key(name);

    let candidates: Vec<String> = store
        .notes()?
        .into_iter()
        .filter_map(|n| n.path)
        .filter(|p| paths::basename_key(p) == key)
        .collect();
    let target = select_target(vault, name, &candidates, options.target.as_deref())?;
    let Some(target_note) = store.note_by_path(&target)? else {
        return Err(PreconditionError::NotRegistered(target).into());
    };

    let mut scope = Vec::with_capacity(options.scope.len());
    for path in normalize_inputs(vault, &options.scope)? {
        match store.note_by_path(&path)? {
            Some(note) => scope.push(note.id),
            None => return Err(PreconditionError::NotRegistered(path).into()),
        }
    }

    let mut plan = RewritePlan::default();
    let mut stale_checks: BTreeMap<String, Option<i64>> = BTreeMap::new();
    for incoming in basename_edges(store.incoming_edges(target_note.id)?) {
        let edge = &incoming.edge;
        if edge.source == target_note.id || (!scope.is_empty() && !scope.contains(&edge.source)) {
            continue;
        }
        let Some(source) = incoming.source_path.as_deref() else {
            continue;
        };
        if let Some(entry) = RewriteEntry::new(
            Some(edge.id),
            source,
            edge.line_start,
            edge.kind,
            &edge.raw_link,
            &target,
        ) {
            stale_checks.insert(source.to_string(), incoming.source_mtime);
            plan.push(entry);
        }
    }

    if plan.is_empty() {
        info!(target = %target, "No basename links to rewrite");
        return Ok(DisambiguateOutcome {
            target,
            rewritten: Vec::new(),
        });
    }

    rewrite::check_staleness(
        fs,
        stale_checks.iter().map(|(path, mtime)| (path.as_str(), *mtime)),
    )?;
    let applied = rewrite::apply(fs, &plan)?;

    let result = commit_rewrites(store, &applied);
    restore_on_error(fs, &applied, result)?;

    info!(
        target = %target,
        rewritten = applied.links().len(),
        duration = ?start.elapsed(),
        "Disambiguation complete"
    );
    Ok(DisambiguateOutcome {
        target,
        rewritten: applied.into_links(),
    })
}

/// Rewrite basename links to `name` by scanning documents on disk.
///
/// A link is rewritten when it currently resolves to the chosen target or is
/// ambiguous between it and other documents; links that root priority sends
/// elsewhere are left alone.
pub fn run_scan_only(
    vault: &Vault,
    name: &str,
    options: &DisambiguateOptions,
) -> Result<DisambiguateOutcome> {
    let start = Instant::now();
    let fs = vault.fs();
    let key = paths::basename_key(name);

    let documents = vault.scan_documents(&vault.config().build.exclude_patterns)?;
    let candidates: Vec<String> = documents
        .iter()
        .filter(|p| paths::basename_key(p) == key)
        .cloned()
        .collect();
    let target = select_target(vault, name, &candidates, options.target.as_deref())?;

    let in_scope: Vec<String> = if options.scope.is_empty() {
        documents.clone()
    } else {
        let scope = normalize_inputs(vault, &options.scope)?;
        for path in &scope {
            if !fs.exists(path) {
                return Err(PreconditionError::FileNotFound(path.clone()).into());
            }
        }
        scope
    };

    let index = LinkIndex::new(&documents);
    let mut plan = RewritePlan::default();
    for source in in_scope.iter().filter(|p| **p != target) {
        let text = vault.read_text(source)?;
        for occ in parser::parse_links(&text) {
            if !occ.is_basename_form()
                || occ.kind == LinkKind::Tag
                || paths::basename_key(&occ.target) != key
            {
                continue;
            }
            let points_at_target = match resolve::resolve(source, &occ, &index, fs) {
                Ok(Resolution::Note(path)) => path == target,
                Err(IntegrityError::AmbiguousLink { candidates, .. }) => candidates.contains(&target),
                _ => false,
            };
            if !points_at_target {
                debug!(source = %source, link = %occ.raw, "Link resolves elsewhere; skipped");
                continue;
            }
            if let Some(entry) =
                RewriteEntry::new(None, source, occ.line_start, occ.kind, &occ.raw, &target)
            {
                plan.push(entry);
            }
        }
    }

    let rewritten = if plan.is_empty() {
        Vec::new()
    } else {
        rewrite::apply(fs, &plan)?.into_links()
    };
    info!(
        target = %target,
        rewritten = rewritten.len(),
        duration = ?start.elapsed(),
        "Scan-only disambiguation complete"
    );
    Ok(DisambiguateOutcome { target, rewritten })
}
