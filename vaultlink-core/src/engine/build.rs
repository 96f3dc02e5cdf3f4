//! Full-vault scan that (re)populates the index from scratch.

use std::collections::HashMap;
use std::time::Instant;

use chrono::Utc;
use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::{IntegrityError, Result, RewriteError, VaultError};
use crate::parser::{self, LinkOccurrence};
use crate::paths;
use crate::progress::ProgressReporter;
use crate::resolve::{self, LinkIndex, Resolution};
use crate::store::{GraphRead, GraphWrite, SqliteStore};
use crate::types::{IndexStats, NodeId};
use crate::vault::Vault;

#[derive(Debug, Clone, Copy, Default)]
pub struct BuildOptions {
    /// Fail on the first ambiguous or escaping link instead of skipping it.
    pub strict: bool,
}

/// A link or document the build skipped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub path: String,
    /// 1-based; 0 for document-level problems.
    pub line: usize,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BuildReport {
    pub stats: IndexStats,
    pub diagnostics: Vec<Diagnostic>,
}

struct ParsedDocument {
    path: String,
    mtime: i64,
    links: Vec<(LinkOccurrence, Resolution)>,
}

/// Rebuild the index from every document under the vault root.
pub fn run(
    vault: &Vault,
    store: &mut SqliteStore,
    options: BuildOptions,
    progress: &dyn ProgressReporter,
) -> Result<BuildReport> {
    let start = Instant::now();
    let documents = vault.scan_documents(&vault.config().build.exclude_patterns)?;
    info!(documents = documents.len(), "Found documents");

    progress.start("Parsing documents", Some(documents.len() as u64));
    let parsed: Vec<(String, Result<(i64, String)>)> = documents
        .par_iter()
        .map(|path| {
            let loaded = vault
                .require_mtime(path)
                .and_then(|mtime| Ok((mtime, vault.read_text(path)?)));
            progress.advance(1);
            (path.clone(), loaded)
        })
        .collect();
    progress.finish();

    let mut diagnostics = Vec::new();
    let mut loaded = Vec::with_capacity(parsed.len());
    for (path, result) in parsed {
        match result {
            Ok((mtime, text)) => loaded.push((path, mtime, text)),
            Err(VaultError::Rewrite(RewriteError::Encoding(_))) if !options.strict => {
                diagnostics.push(diagnostic(&path, 0, "not valid UTF-8; skipped".into()));
            }
            Err(e) => return Err(e),
        }
    }

    let index = LinkIndex::new(loaded.iter().map(|(path, _, _)| path));
    let mut documents = Vec::with_capacity(loaded.len());
    for (path, mtime, text) in loaded {
        let mut links = Vec::new();
        for occ in parser::parse_links(&text) {
            match resolve::resolve(&path, &occ, &index, vault.fs()) {
                Ok(resolution) => links.push((occ, resolution)),
                Err(e) if !options.strict && is_skippable(&e) => {
                    diagnostics.push(diagnostic(&path, occ.line_start, e.to_string()));
                }
                Err(e) => return Err(e.into()),
            }
        }
        documents.push(ParsedDocument { path, mtime, links });
    }

    for d in &diagnostics {
        warn!(path = %d.path, line = d.line, "{}", d.message);
    }

    let tx = store.begin()?;
    tx.clear()?;
    let mut note_ids: HashMap<String, NodeId> = HashMap::with_capacity(documents.len());
    for doc in &documents {
        let id = tx.upsert_note(&doc.path, paths::stem(&doc.path), doc.mtime)?;
        note_ids.insert(doc.path.clone(), id);
    }
    for doc in &documents {
        let source_id = note_ids[&doc.path];
        for (occ, resolution) in &doc.links {
            let target = resolve::materialize(&tx, resolution, source_id, &note_ids)?;
            tx.insert_edge(&resolve::edge_for(source_id, target, occ))?;
        }
    }
    tx.cleanup_orphaned_nodes()?;
    tx.set_meta("built_at", &Utc::now().to_rfc3339())?;
    tx.commit()?;

    let stats = store.stats()?;
    info!(
        notes = stats.notes,
        phantoms = stats.phantoms,
        tags = stats.tags,
        edges = stats.edges,
        diagnostics = diagnostics.len(),
        duration = ?start.elapsed(),
        "Build complete"
    );
    Ok(BuildReport { stats, diagnostics })
}

fn is_skippable(error: &IntegrityError) -> bool {
    matches!(
        error,
        IntegrityError::AmbiguousLink { .. } | IntegrityError::LinkEscapesVault { .. }
    )
}

fn diagnostic(path: &str, line: usize, message: String) -> Diagnostic {
    Diagnostic {
        path: path.to_string(),
        line,
        message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::progress::NoopReporter;
    use crate::types::NodeKind;

    fn vault_with(files: &[(&str, &str)]) -> (tempfile::TempDir, Vault) {
        let tmp = tempfile::tempdir().unwrap();
        for (path, content) in files {
            let full = tmp.path().join(path);
            std::fs::create_dir_all(full.parent().unwrap()).unwrap();
            std::fs::write(full, content).unwrap();
        }
        let vault = Vault::open(tmp.path()).unwrap();
        (tmp, vault)
    }

    #[test]
    fn build_counts_notes_phantoms_tags_and_assets() {
        let (_tmp, vault) = vault_with(&[
            ("A.md", "---\ntags: [area]\n---\n[[B]] [[Missing]] #todo ![[img/p.png]]\n"),
            ("sub/B.md", "[[A#Intro]] [[#Local]] [ext](https://example.com)\n"),
            ("img/p.png", "png"),
        ]);
        let mut store = vault.create_index().unwrap();

        let report = run(&vault, &mut store, BuildOptions::default(), &NoopReporter).unwrap();

        let stats = &report.stats;
        assert_eq!(stats.notes, 2);
        assert_eq!(stats.phantoms, 1);
        assert_eq!(stats.tags, 2);
        assert_eq!(stats.assets, 1);
        assert_eq!(stats.edges, 7);
        assert!(stats.built_at.is_some());
        assert!(report.diagnostics.is_empty());

        let b = store.note_by_path("sub/B.md").unwrap().unwrap();
        let edges = store.edges_from(b.id).unwrap();
        assert_eq!(edges[0].subpath.as_deref(), Some("Intro"));
        assert_eq!(edges[1].target, b.id, "fragment-only link is a self-loop");
        assert_eq!(
            store.node_by_key("asset:path:img/p.png").unwrap().map(|n| n.kind),
            Some(NodeKind::Asset)
        );
    }

    #[test]
    fn lenient_build_reports_ambiguous_links() {
        let (_tmp, vault) = vault_with(&[
            ("x/A.md", ""),
            ("y/A.md", ""),
            ("B.md", "[[A]]\n[[../Out]]\n"),
        ]);
        let mut store = vault.create_index().unwrap();

        let report = run(&vault, &mut store, BuildOptions::default(), &NoopReporter).unwrap();

        assert_eq!(report.diagnostics.len(), 2);
        assert_eq!(report.diagnostics[0].line, 1);
        assert_eq!(report.stats.edges, 0);
        assert_eq!(report.stats.notes, 3);
    }

    #[test]
    fn strict_build_fails_and_writes_nothing() {
        let (_tmp, vault) = vault_with(&[("x/A.md", ""), ("y/A.md", ""), ("B.md", "[[A]]\n")]);
        let mut store = vault.create_index().unwrap();

        let err = run(&vault, &mut store, BuildOptions { strict: true }, &NoopReporter).unwrap_err();

        assert!(matches!(err, VaultError::Integrity(IntegrityError::AmbiguousLink { .. })));
        assert_eq!(store.stats().unwrap().notes, 0);
    }

    #[test]
    fn rebuild_replaces_previous_graph() {
        let (tmp, vault) = vault_with(&[("A.md", "[[Gone]]\n")]);
        let mut store = vault.create_index().unwrap();
        run(&vault, &mut store, BuildOptions::default(), &NoopReporter).unwrap();

        std::fs::write(tmp.path().join("A.md"), "nothing\n").unwrap();
        let report = run(&vault, &mut store, BuildOptions::default(), &NoopReporter).unwrap();

        assert_eq!(report.stats.phantoms, 0);
        assert_eq!(report.stats.edges, 0);
        assert_eq!(report.stats.notes, 1);
    }
}
