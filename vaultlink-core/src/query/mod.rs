// Read-only queries over the index, used by the CLI `backlinks` and `status`
// commands.

use serde::Serialize;

use crate::error::{PreconditionError, Result};
use crate::store::GraphRead;
use crate::types::{IndexStats, LinkKind, NodeId};

/// One link pointing at a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Backlink {
    /// Linking document, or the node name for non-document sources.
    pub source: String,
    pub kind: LinkKind,
    pub raw_link: String,
    pub line: usize,
}

/// Resolve a node id to its path or name, or "node:{id}" if not found.
pub fn resolve_name(store: &dyn GraphRead, id: NodeId) -> String {
    store
        .node_by_id(id)
        .ok()
        .flatten()
        .map_or_else(|| format!("node:{}", id.0), |n| n.path.unwrap_or(n.name))
}

/// Links into the registered note or asset at `path`, in source order.
pub fn backlinks(store: &dyn GraphRead, path: &str) -> Result<Vec<Backlink>> {
    let Some(node) = store.registered_by_path(path)? else {
        return Err(PreconditionError::NotRegistered(path.to_string()).into());
    };
    let links = store
        .incoming_edges(node.id)?
        .into_iter()
        .map(|incoming| Backlink {
            source: incoming
                .source_path
                .unwrap_or_else(|| resolve_name(store, incoming.edge.source)),
            kind: incoming.edge.kind,
            raw_link: incoming.edge.raw_link,
            line: incoming.edge.line_start,
        })
        .collect();
    Ok(links)
}

/// Node and edge counts plus the time of the last full build.
pub fn stats(store: &dyn GraphRead) -> Result<IndexStats> {
    store.stats()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{GraphWrite, SqliteStore};
    use crate::types::NewEdge;

    #[test]
    fn backlinks_list_sources_in_order() {
        let mut store = SqliteStore::in_memory().unwrap();
        let tx = store.begin().unwrap();
        let a = tx.upsert_note("A.md", "A", 1).unwrap();
        let b = tx.upsert_note("sub/B.md", "B", 1).unwrap();
        let c = tx.upsert_note("C.md", "C", 1).unwrap();
        for (source, line) in [(b, 4), (c, 2)] {
            tx.insert_edge(&NewEdge {
                source,
                target: a,
                kind: LinkKind::Wikilink,
                raw_link: "[[A]]".into(),
                subpath: None,
                line_start: line,
                line_end: line,
            })
            .unwrap();
        }
        tx.commit().unwrap();

        let links = backlinks(&store, "a.md").unwrap();
        let sources: Vec<_> = links.iter().map(|l| l.source.as_str()).collect();
        assert_eq!(sources, vec!["C.md", "sub/B.md"]);
        assert_eq!(links[1].line, 4);
        assert_eq!(resolve_name(&store, NodeId(999)), "node:999");
    }

    #[test]
    fn backlinks_of_unknown_path_fail() {
        let store = SqliteStore::in_memory().unwrap();
        assert!(backlinks(&store, "nope.md").is_err());
        assert_eq!(stats(&store).unwrap().notes, 0);
    }
}
