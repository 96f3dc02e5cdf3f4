//! Link resolution: map a parsed occurrence to the node it points at.
//!
//! Resolution works against a transient [`LinkIndex`] built from the store
//! (or a disk scan) for the duration of one operation.

use std::collections::{BTreeMap, HashMap};

use crate::error::{IntegrityError, Result, StoreError};
use crate::parser::{LinkOccurrence, TargetForm};
use crate::paths;
use crate::store::GraphWrite;
use crate::types::{NewEdge, NodeId};
use crate::vault::VaultFs;

/// Case-insensitive lookup tables over the set of document paths.
#[derive(Debug, Clone, Default)]
pub struct LinkIndex {
    /// Lowercased path, with and without document extension → canonical path.
    by_path: HashMap<String, String>,
    /// Basename key → candidate paths, sorted.
    by_basename: BTreeMap<String, Vec<String>>,
}

impl LinkIndex {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut index = Self::default();
        for path in paths {
            index.insert(path.as_ref());
        }
        index
    }

    pub fn insert(&mut self, path: &str) {
        let lower = path.to_lowercase();
        self.by_path
            .entry(paths::strip_document_extension(&lower).to_string())
            .or_insert_with(|| path.to_string());
        self.by_path.insert(lower, path.to_string());

        let candidates = self.by_basename.entry(paths::basename_key(path)).or_default();
        if !candidates.iter().any(|c| c == path) {
            candidates.push(path.to_string());
            candidates.sort();
        }
    }

    /// Find a document by path, case-insensitively, with or without extension.
    pub fn lookup_path(&self, path: &str) -> Option<&str> {
        let lower = path.to_lowercase();
        self.by_path
            .get(&lower)
            .or_else(|| self.by_path.get(paths::strip_document_extension(&lower)))
            .map(String::as_str)
    }

    /// Documents sharing a basename key.
    pub fn candidates(&self, basename_key: &str) -> &[String] {
        self.by_basename
            .get(basename_key)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Number of documents per basename key.
    pub fn basename_counts(&self) -> HashMap<&str, usize> {
        self.by_basename
            .iter()
            .map(|(key, paths)| (key.as_str(), paths.len()))
            .collect()
    }

    /// Resolve a basename key with root priority.
    ///
    /// A single root-level candidate wins; several root-level candidates are
    /// ambiguous. Otherwise exactly one candidate is required. Returns
    /// `Ok(None)` when nothing matches.
    pub fn resolve_basename(&self, basename_key: &str) -> std::result::Result<Option<&str>, Vec<String>> {
        let candidates = self.candidates(basename_key);
        let roots: Vec<&str> = candidates
            .iter()
            .map(String::as_str)
            .filter(|c| paths::is_root_level(c))
            .collect();
        match roots.as_slice() {
            [] => {}
            [root] => return Ok(Some(*root)),
            many => return Err(many.iter().map(|r| (*r).to_string()).collect()),
        }
        match candidates {
            [] => Ok(None),
            [only] => Ok(Some(only.as_str())),
            many => Err(many.to_vec()),
        }
    }
}

/// What a link occurrence points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A registered document, by canonical path.
    Note(String),
    /// The containing document itself.
    SelfRef,
    Tag(String),
    /// A non-document file on disk, by normalized path.
    Asset(String),
    /// Nothing exists; carries the phantom's name.
    Phantom(String),
}

/// Resolve one occurrence found in `source`.
pub fn resolve(
    source: &str,
    occ: &LinkOccurrence,
    index: &LinkIndex,
    fs: &dyn VaultFs,
) -> std::result::Result<Resolution, IntegrityError> {
    let escape = || IntegrityError::LinkEscapesVault {
        source_path: source.to_string(),
        link: occ.raw.clone(),
    };
    let dir = paths::parent_dir(source);

    match occ.form {
        TargetForm::Tag => Ok(Resolution::Tag(occ.target.clone())),
        TargetForm::SelfRef => Ok(Resolution::SelfRef),
        TargetForm::Relative => {
            let joined = paths::join_relative(dir, &occ.target).ok_or_else(escape)?;
            Ok(resolve_path(&[joined], index, fs))
        }
        TargetForm::PathQualified => {
            let attempts: Vec<String> = [
                paths::normalize(&occ.target),
                paths::join_relative(dir, &occ.target),
            ]
            .into_iter()
            .flatten()
            .collect();
            if attempts.is_empty() {
                return Err(escape());
            }
            Ok(resolve_path(&attempts, index, fs))
        }
        TargetForm::Basename => {
            match index.resolve_basename(&paths::basename_key(&occ.target)) {
                Ok(Some(path)) => Ok(Resolution::Note(path.to_string())),
                Err(candidates) => Err(IntegrityError::AmbiguousLink {
                    source_path: source.to_string(),
                    link: occ.raw.clone(),
                    candidates,
                }),
                Ok(None) => {
                    let normalized = paths::normalize(&occ.target).unwrap_or_default();
                    if is_asset(&normalized, fs) {
                        Ok(Resolution::Asset(normalized))
                    } else {
                        Ok(phantom_for(&occ.target))
                    }
                }
            }
        }
    }
}

/// Try each candidate path in priority order: documents first, then assets.
fn resolve_path(attempts: &[String], index: &LinkIndex, fs: &dyn VaultFs) -> Resolution {
    if let Some(path) = attempts.iter().find_map(|p| index.lookup_path(p)) {
        return Resolution::Note(path.to_string());
    }
    if let Some(asset) = attempts.iter().find(|p| is_asset(p, fs)) {
        return Resolution::Asset(asset.clone());
    }
    // attempts is never empty here
    phantom_for(attempts.first().map_or("", String::as_str))
}

fn is_asset(path: &str, fs: &dyn VaultFs) -> bool {
    !path.is_empty()
        && paths::extension(path).is_some()
        && !paths::has_document_extension(path)
        && fs.exists(path)
}

fn phantom_for(target: &str) -> Resolution {
    Resolution::Phantom(paths::strip_document_extension(target).to_string())
}

/// Get or create the node a resolution points at.
///
/// `note_ids` maps canonical note paths to ids for notes touched by the
/// current operation; other notes are looked up in the store.
pub fn materialize<W: GraphWrite + ?Sized>(
    tx: &W,
    resolution: &Resolution,
    source_id: NodeId,
    note_ids: &HashMap<String, NodeId>,
) -> Result<NodeId> {
    match resolution {
        Resolution::Note(path) => {
            if let Some(&id) = note_ids.get(path) {
                return Ok(id);
            }
            tx.note_by_path(path)?
                .map(|n| n.id)
                .ok_or_else(|| StoreError::NodeNotFound(paths::note_key(path)).into())
        }
        Resolution::SelfRef => Ok(source_id),
        Resolution::Tag(name) => tx.upsert_tag(name),
        Resolution::Asset(path) => tx.upsert_asset(path),
        Resolution::Phantom(name) => tx.upsert_phantom(name),
    }
}

/// The edge recorded for an occurrence.
pub fn edge_for(source: NodeId, target: NodeId, occ: &LinkOccurrence) -> NewEdge {
    NewEdge {
        source,
        target,
        kind: occ.kind,
        raw_link: occ.raw.clone(),
        subpath: occ.fragment.clone(),
        line_start: occ.line_start,
        line_end: occ.line_end,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_links;
    use crate::vault::DiskFs;

    fn first(text: &str) -> LinkOccurrence {
        parse_links(text).into_iter().next().unwrap()
    }

    fn resolve_in(source: &str, text: &str, notes: &[&str]) -> std::result::Result<Resolution, IntegrityError> {
        let fs = DiskFs::new("/nonexistent-vault-root");
        resolve(source, &first(text), &LinkIndex::new(notes), &fs)
    }

    #[test]
    fn root_note_wins_over_subdirectory_candidates() {
        let res = resolve_in("x.md", "[[A]]", &["A.md", "sub/A.md"]).unwrap();
        assert_eq!(res, Resolution::Note("A.md".into()));
    }

    #[test]
    fn two_subdirectory_candidates_are_ambiguous() {
        let err = resolve_in("x.md", "[[A]]", &["one/A.md", "two/A.md"]).unwrap_err();
        match err {
            IntegrityError::AmbiguousLink { candidates, .. } => {
                assert_eq!(candidates, vec!["one/A.md".to_string(), "two/A.md".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn two_root_candidates_are_ambiguous() {
        let notes = ["A.md", "A.markdown", "sub/A.md"];
        let err = resolve_in("x.md", "[[A]]", &notes).unwrap_err();
        match err {
            IntegrityError::AmbiguousLink { candidates, .. } => {
                assert_eq!(candidates, vec!["A.markdown".to_string(), "A.md".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn single_candidate_resolves_case_insensitively() {
        let res = resolve_in("x.md", "[[alpha]]", &["deep/Alpha.md"]).unwrap();
        assert_eq!(res, Resolution::Note("deep/Alpha.md".into()));
    }

    #[test]
    fn path_qualified_prefers_vault_root() {
        let notes = ["a/b/C.md", "x/a/b/C.md"];
        let res = resolve_in("x/n.md", "[[a/b/C]]", &notes).unwrap();
        assert_eq!(res, Resolution::Note("a/b/C.md".into()));

        let res = resolve_in("x/n.md", "[[a/b/C]]", &["x/a/b/C.md"]).unwrap();
        assert_eq!(res, Resolution::Note("x/a/b/C.md".into()));
    }

    #[test]
    fn relative_links_resolve_against_source_dir() {
        let res = resolve_in("notes/n.md", "[up](../A.md)", &["A.md"]).unwrap();
        assert_eq!(res, Resolution::Note("A.md".into()));

        let err = resolve_in("n.md", "[[../Outside]]", &[]).unwrap_err();
        assert!(matches!(err, IntegrityError::LinkEscapesVault { .. }));
    }

    #[test]
    fn unresolved_targets_become_phantoms() {
        assert_eq!(
            resolve_in("n.md", "[[Missing.md]]", &[]).unwrap(),
            Resolution::Phantom("Missing".into())
        );
        assert_eq!(
            resolve_in("n.md", "[[x/Foo]]", &[]).unwrap(),
            Resolution::Phantom("x/Foo".into())
        );
    }

    #[test]
    fn tags_and_self_references() {
        assert_eq!(resolve_in("n.md", "#todo", &[]).unwrap(), Resolution::Tag("todo".into()));
        assert_eq!(resolve_in("n.md", "[[#Heading]]", &[]).unwrap(), Resolution::SelfRef);
    }

    #[test]
    fn existing_non_document_resolves_to_asset() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("img")).unwrap();
        std::fs::write(tmp.path().join("img/p.png"), b"png").unwrap();
        let fs = DiskFs::new(tmp.path());
        let res = resolve("n.md", &first("![[img/p.png]]"), &LinkIndex::default(), &fs).unwrap();
        assert_eq!(res, Resolution::Asset("img/p.png".into()));
    }

    #[test]
    fn index_lookups_ignore_case_and_extension() {
        let index = LinkIndex::new(["Sub/Note.md"]);
        assert_eq!(index.lookup_path("sub/note"), Some("Sub/Note.md"));
        assert_eq!(index.lookup_path("SUB/NOTE.MD"), Some("Sub/Note.md"));
        assert_eq!(index.candidates("note"), ["Sub/Note.md".to_string()]);
        assert_eq!(index.basename_counts().get("note"), Some(&1));
    }
}
