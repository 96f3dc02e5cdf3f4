use std::path::{Path, PathBuf};

use rusqlite::{Connection, Transaction, TransactionBehavior, params};

use crate::error::{PreconditionError, StoreError};

use super::schema;
use super::traits::{GraphRead, GraphWrite};

/// SQLite-backed link-graph index.
///
/// Reads go straight to the connection; every mutation happens inside a
/// [`StoreTx`] obtained from [`SqliteStore::begin`].
#[derive(Debug)]
pub struct SqliteStore {
    conn: Connection,
    db_path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open (or create) an index at the given path.
    pub fn open(path: &Path) -> crate::error::Result<Self> {
        let conn = Connection::open(path).map_err(StoreError::Sqlite)?;
        let store = Self {
            conn,
            db_path: Some(path.to_path_buf()),
        };
        store.initialize()?;
        Ok(store)
    }

    /// Open an index that must already exist.
    ///
    /// Every incremental operation starts here: a missing index is reported
    /// as a precondition failure rather than silently created.
    pub fn open_existing(path: &Path) -> crate::error::Result<Self> {
        if !path.is_file() {
            return Err(PreconditionError::IndexNotFound(path.to_path_buf()).into());
        }
        Self::open(path)
    }

    /// Create an in-memory index (for testing).
    pub fn in_memory() -> crate::error::Result<Self> {
        let conn = Connection::open_in_memory().map_err(StoreError::Sqlite)?;
        let store = Self {
            conn,
            db_path: None,
        };
        store.initialize()?;
        Ok(store)
    }

    fn initialize(&self) -> crate::error::Result<()> {
        self.conn
            .execute_batch(schema::PRAGMAS_SQL)
            .map_err(StoreError::Sqlite)?;

        // Try WAL mode; in-memory databases ignore it
        let _ = self.conn.execute_batch("PRAGMA journal_mode = WAL;");

        self.conn
            .execute_batch(schema::SCHEMA_SQL)
            .map_err(StoreError::Sqlite)?;

        self.conn
            .execute(
                "INSERT OR IGNORE INTO index_meta (key, value) VALUES ('schema_version', ?1)",
                params![schema::SCHEMA_VERSION],
            )
            .map_err(StoreError::Sqlite)?;

        match self.meta("schema_version")? {
            Some(found) if found != schema::SCHEMA_VERSION => Err(StoreError::SchemaVersion {
                found,
                expected: schema::SCHEMA_VERSION.to_string(),
            }
            .into()),
            _ => Ok(()),
        }
    }

    /// Location of the database file (`None` for in-memory stores).
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Begin the write transaction of one logical operation.
    ///
    /// The transaction takes the write lock immediately. Dropping the returned
    /// [`StoreTx`] without calling [`StoreTx::commit`] rolls it back.
    pub fn begin(&mut self) -> crate::error::Result<StoreTx<'_>> {
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(StoreError::Sqlite)?;
        Ok(StoreTx { tx })
    }
}

impl GraphRead for SqliteStore {
    fn conn(&self) -> &Connection {
        &self.conn
    }
}

/// An open write transaction on the index.
#[derive(Debug)]
pub struct StoreTx<'a> {
    tx: Transaction<'a>,
}

impl StoreTx<'_> {
    /// Make every mutation of this transaction durable.
    pub fn commit(self) -> crate::error::Result<()> {
        self.tx.commit().map_err(StoreError::Sqlite)?;
        Ok(())
    }

    /// Discard every mutation of this transaction.
    pub fn rollback(self) -> crate::error::Result<()> {
        self.tx.rollback().map_err(StoreError::Sqlite)?;
        Ok(())
    }
}

impl GraphRead for StoreTx<'_> {
    fn conn(&self) -> &Connection {
        &self.tx
    }
}

impl GraphWrite for StoreTx<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{LinkKind, NewEdge, NodeId, NodeKind, RemovalOutcome};

    fn edge(source: NodeId, target: NodeId, raw: &str, line: usize) -> NewEdge {
        NewEdge {
            source,
            target,
            kind: LinkKind::Wikilink,
            raw_link: raw.to_string(),
            subpath: None,
            line_start: line,
            line_end: line,
        }
    }

    #[test]
    fn upsert_note_is_idempotent_and_overwrites_metadata() {
        let mut store = SqliteStore::in_memory().unwrap();
        let tx = store.begin().unwrap();
        let first = tx.upsert_note("sub/A.md", "A", 100).unwrap();
        let second = tx.upsert_note("sub/A.md", "A2", 200).unwrap();
        tx.commit().unwrap();

        assert_eq!(first, second);
        let node = store.node_by_id(first).unwrap().unwrap();
        assert_eq!(node.kind, NodeKind::Note);
        assert_eq!(node.name, "A2");
        assert_eq!(node.mtime, Some(200));
        assert_eq!(node.path.as_deref(), Some("sub/A.md"));
        assert!(node.exists);
        assert_eq!(store.stats().unwrap().notes, 1);
    }

    #[test]
    fn phantom_and_tag_upserts_return_existing_ids() {
        let mut store = SqliteStore::in_memory().unwrap();
        let tx = store.begin().unwrap();
        let p1 = tx.upsert_phantom("Foo").unwrap();
        let p2 = tx.upsert_phantom("foo").unwrap();
        let t1 = tx.upsert_tag("Project").unwrap();
        let t2 = tx.upsert_tag("project").unwrap();
        tx.commit().unwrap();

        assert_eq!(p1, p2);
        assert_eq!(t1, t2);
        let phantom = store.node_by_id(p1).unwrap().unwrap();
        assert_eq!(phantom.key, "phantom:name:foo");
        assert_eq!(phantom.name, "Foo", "first registration keeps its name");
        assert!(!phantom.exists);
        assert_eq!(phantom.path, None);
    }

    #[test]
    fn note_lookup_is_case_insensitive() {
        let mut store = SqliteStore::in_memory().unwrap();
        let tx = store.begin().unwrap();
        let id = tx.upsert_note("Sub/Alpha.md", "Alpha", 1).unwrap();
        tx.commit().unwrap();

        assert_eq!(store.note_by_path("sub/alpha.md").unwrap().map(|n| n.id), Some(id));
        assert_eq!(store.registered_by_path("SUB/ALPHA.MD").unwrap().map(|n| n.id), Some(id));
        assert!(store.note_by_path("alpha.md").unwrap().is_none());
    }

    #[test]
    fn referenced_note_is_phantomized_in_place() {
        let mut store = SqliteStore::in_memory().unwrap();
        let tx = store.begin().unwrap();
        let a = tx.upsert_note("A.md", "A", 1).unwrap();
        let b = tx.upsert_note("B.md", "B", 1).unwrap();
        let tag = tx.upsert_tag("t").unwrap();
        tx.insert_edge(&edge(b, a, "[[A]]", 1)).unwrap();
        tx.insert_edge(&edge(a, b, "[[B]]", 1)).unwrap();
        tx.insert_edge(&edge(a, tag, "#t", 2)).unwrap();
        tx.insert_edge(&edge(a, a, "[[A]]", 3)).unwrap();

        let outcome = tx.remove_or_phantomize(a, "A").unwrap();
        tx.cleanup_orphaned_nodes().unwrap();
        tx.commit().unwrap();

        assert_eq!(outcome, RemovalOutcome::Phantomized);
        let node = store.node_by_id(a).unwrap().unwrap();
        assert_eq!(node.kind, NodeKind::Phantom);
        assert_eq!(node.key, "phantom:name:a");
        assert_eq!(node.path, None);
        assert_eq!(node.mtime, None);
        assert!(!node.exists);

        let incoming = store.incoming_edges(a).unwrap();
        assert_eq!(incoming.len(), 1);
        assert_eq!(incoming[0].edge.source, b);
        assert!(store.edges_from(a).unwrap().is_empty());
        // The tag lost its only incoming edge and was swept.
        assert_eq!(store.stats().unwrap().tags, 0);
    }

    #[test]
    fn phantomized_note_merges_into_existing_phantom() {
        let mut store = SqliteStore::in_memory().unwrap();
        let tx = store.begin().unwrap();
        let a = tx.upsert_note("sub/A.md", "A", 1).unwrap();
        let b = tx.upsert_note("B.md", "B", 1).unwrap();
        let phantom = tx.upsert_phantom("a").unwrap();
        tx.insert_edge(&edge(b, a, "[[sub/A]]", 1)).unwrap();
        tx.insert_edge(&edge(b, phantom, "[[a]]", 2)).unwrap();

        let outcome = tx.remove_or_phantomize(a, "A").unwrap();
        tx.commit().unwrap();

        assert_eq!(outcome, RemovalOutcome::Phantomized);
        assert!(store.node_by_id(a).unwrap().is_none());
        let stats = store.stats().unwrap();
        assert_eq!(stats.phantoms, 1);
        assert_eq!(store.incoming_edges(phantom).unwrap().len(), 2);
    }

    #[test]
    fn unreferenced_note_is_deleted_with_edges() {
        let mut store = SqliteStore::in_memory().unwrap();
        let tx = store.begin().unwrap();
        let a = tx.upsert_note("A.md", "A", 1).unwrap();
        let b = tx.upsert_note("B.md", "B", 1).unwrap();
        tx.insert_edge(&edge(a, b, "[[B]]", 1)).unwrap();
        tx.insert_edge(&edge(a, a, "[[A]]", 2)).unwrap();

        let outcome = tx.remove_or_phantomize(a, "A").unwrap();
        tx.commit().unwrap();

        assert_eq!(outcome, RemovalOutcome::Deleted);
        assert!(store.node_by_id(a).unwrap().is_none());
        assert!(store.incoming_edges(b).unwrap().is_empty());
        assert_eq!(store.stats().unwrap().edges, 0);
    }

    #[test]
    fn cleanup_keeps_referenced_phantoms_and_all_notes() {
        let mut store = SqliteStore::in_memory().unwrap();
        let tx = store.begin().unwrap();
        let a = tx.upsert_note("A.md", "A", 1).unwrap();
        tx.upsert_note("Lonely.md", "Lonely", 1).unwrap();
        let kept = tx.upsert_phantom("Kept").unwrap();
        tx.upsert_phantom("Gone").unwrap();
        tx.upsert_tag("gone").unwrap();
        tx.insert_edge(&edge(a, kept, "[[Kept]]", 1)).unwrap();

        let removed = tx.cleanup_orphaned_nodes().unwrap();
        tx.commit().unwrap();

        assert_eq!(removed, 2);
        let stats = store.stats().unwrap();
        assert_eq!((stats.notes, stats.phantoms, stats.tags), (2, 1, 0));
    }

    #[test]
    fn dropped_transaction_rolls_back() {
        let mut store = SqliteStore::in_memory().unwrap();
        {
            let tx = store.begin().unwrap();
            tx.upsert_note("A.md", "A", 1).unwrap();
        }
        assert_eq!(store.stats().unwrap().notes, 0);

        let tx = store.begin().unwrap();
        tx.upsert_note("A.md", "A", 1).unwrap();
        tx.rollback().unwrap();
        assert_eq!(store.stats().unwrap().notes, 0);
    }

    #[test]
    fn retarget_and_raw_link_updates() {
        let mut store = SqliteStore::in_memory().unwrap();
        let tx = store.begin().unwrap();
        let a = tx.upsert_note("A.md", "A", 1).unwrap();
        let b = tx.upsert_note("B.md", "B", 1).unwrap();
        let p = tx.upsert_phantom("C").unwrap();
        let e1 = tx.insert_edge(&edge(a, p, "[[C]]", 1)).unwrap();
        tx.insert_edge(&edge(a, p, "[[C]]", 2)).unwrap();

        assert_eq!(tx.retarget_edges(p, b).unwrap(), 2);
        tx.update_raw_link(e1, "[[sub/C]]").unwrap();
        tx.update_note_mtime(a, 42).unwrap();
        tx.commit().unwrap();

        let incoming = store.incoming_edges(b).unwrap();
        assert_eq!(incoming.len(), 2);
        assert_eq!(incoming[0].edge.raw_link, "[[sub/C]]");
        assert_eq!(incoming[0].source_path.as_deref(), Some("A.md"));
        assert_eq!(incoming[0].source_mtime, Some(42));
    }

    #[test]
    fn open_existing_requires_index_file() {
        let tmp = tempfile::tempdir().unwrap();
        let db = tmp.path().join("index.db");
        let err = SqliteStore::open_existing(&db).unwrap_err();
        assert!(matches!(
            err,
            crate::error::VaultError::Precondition(PreconditionError::IndexNotFound(_))
        ));

        drop(SqliteStore::open(&db).unwrap());
        let store = SqliteStore::open_existing(&db).unwrap();
        assert_eq!(store.db_path(), Some(db.as_path()));
    }

    #[test]
    fn meta_round_trips() {
        let mut store = SqliteStore::in_memory().unwrap();
        assert_eq!(store.meta("schema_version").unwrap().as_deref(), Some("1"));
        let tx = store.begin().unwrap();
        tx.set_meta("built_at", "2024-01-01T00:00:00Z").unwrap();
        tx.set_meta("built_at", "2024-02-01T00:00:00Z").unwrap();
        tx.commit().unwrap();
        assert_eq!(
            store.stats().unwrap().built_at.as_deref(),
            Some("2024-02-01T00:00:00Z")
        );
    }
}
