use rusqlite::{Connection, OptionalExtension, params};
use tracing::debug;

use crate::error::Result;
use crate::paths;
use crate::types::{
    Edge, EdgeId, IncomingEdge, IndexStats, LinkKind, NewEdge, Node, NodeId, NodeKind,
    RemovalOutcome,
};

const NODE_COLUMNS: &str = "id, node_key, type, name, path, exists_flag, mtime";
const EDGE_COLUMNS: &str =
    "e.id, e.source_id, e.target_id, e.link_type, e.raw_link, e.subpath, e.line_start, e.line_end";

/// Read access to the link graph.
///
/// Implemented by the open store and by an open transaction, so engines can
/// run the same queries before and inside their write transaction.
pub trait GraphRead {
    /// The connection queries run on.
    fn conn(&self) -> &Connection;

    // ── Node lookups ───────────────────────────────────────────────

    /// Get a node by its ID.
    fn node_by_id(&self, id: NodeId) -> Result<Option<Node>> {
        let node = self
            .conn()
            .query_row(
                &format!("SELECT {NODE_COLUMNS} FROM nodes WHERE id = ?1"),
                params![id.0],
                row_to_node,
            )
            .optional()?;
        Ok(node)
    }

    /// Get a node by its deterministic key.
    fn node_by_key(&self, key: &str) -> Result<Option<Node>> {
        let node = self
            .conn()
            .query_row(
                &format!("SELECT {NODE_COLUMNS} FROM nodes WHERE node_key = ?1"),
                params![key],
                row_to_node,
            )
            .optional()?;
        Ok(node)
    }

    /// Find a note by path, matching case-insensitively.
    fn note_by_path(&self, path: &str) -> Result<Option<Node>> {
        if let Some(node) = self.node_by_key(&paths::note_key(path))? {
            return Ok(Some(node));
        }
        let wanted = path.to_lowercase();
        Ok(self
            .notes()?
            .into_iter()
            .find(|n| n.path.as_deref().is_some_and(|p| p.to_lowercase() == wanted)))
    }

    /// Find a note or asset by path, matching case-insensitively.
    fn registered_by_path(&self, path: &str) -> Result<Option<Node>> {
        if let Some(note) = self.note_by_path(path)? {
            return Ok(Some(note));
        }
        if let Some(asset) = self.node_by_key(&paths::asset_key(path))? {
            return Ok(Some(asset));
        }
        let wanted = path.to_lowercase();
        Ok(self
            .nodes_of_kind(NodeKind::Asset)?
            .into_iter()
            .find(|n| n.path.as_deref().is_some_and(|p| p.to_lowercase() == wanted)))
    }

    /// All notes, ordered by path.
    fn notes(&self) -> Result<Vec<Node>> {
        self.nodes_of_kind(NodeKind::Note)
    }

    /// All nodes of one kind, ordered by path then name.
    fn nodes_of_kind(&self, kind: NodeKind) -> Result<Vec<Node>> {
        let mut stmt = self.conn().prepare_cached(&format!(
            "SELECT {NODE_COLUMNS} FROM nodes WHERE type = ?1 ORDER BY path, name"
        ))?;
        let nodes = stmt
            .query_map(params![kind.as_str()], row_to_node)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(nodes)
    }

    // ── Edge lookups ───────────────────────────────────────────────

    /// Edges pointing at `target`, with their source's path and mtime.
    fn incoming_edges(&self, target: NodeId) -> Result<Vec<IncomingEdge>> {
        let mut stmt = self.conn().prepare_cached(&format!(
            "SELECT {EDGE_COLUMNS}, s.path, s.mtime, s.type
             FROM edges e JOIN nodes s ON s.id = e.source_id
             WHERE e.target_id = ?1
             ORDER BY s.path, e.line_start, e.id"
        ))?;
        let edges = stmt
            .query_map(params![target.0], |row| {
                let source_kind: String = row.get(10)?;
                let is_note = source_kind == NodeKind::Note.as_str();
                Ok(IncomingEdge {
                    edge: row_to_edge(row)?,
                    source_path: if is_note { row.get(8)? } else { None },
                    source_mtime: if is_note { row.get(9)? } else { None },
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(edges)
    }

    /// Edges originating at `source`, in document order.
    fn edges_from(&self, source: NodeId) -> Result<Vec<Edge>> {
        let mut stmt = self.conn().prepare_cached(&format!(
            "SELECT {EDGE_COLUMNS} FROM edges e WHERE e.source_id = ?1 ORDER BY e.line_start, e.id"
        ))?;
        let edges = stmt
            .query_map(params![source.0], row_to_edge)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(edges)
    }

    /// Number of edges into `id` from other nodes (self-loops excluded).
    fn incoming_count_excluding_self(&self, id: NodeId) -> Result<u64> {
        let count: u64 = self.conn().query_row(
            "SELECT COUNT(*) FROM edges WHERE target_id = ?1 AND source_id != ?1",
            params![id.0],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    // ── Metadata ───────────────────────────────────────────────────

    /// Read a value from `index_meta`.
    fn meta(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn()
            .query_row(
                "SELECT value FROM index_meta WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Summary counts of the index.
    fn stats(&self) -> Result<IndexStats> {
        let conn = self.conn();
        let mut stats = IndexStats::default();
        let mut stmt = conn.prepare("SELECT type, COUNT(*) FROM nodes GROUP BY type")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, u64>(1)?))
        })?;
        for row in rows {
            let (kind, count) = row?;
            match NodeKind::parse(&kind) {
                Some(NodeKind::Note) => stats.notes = count,
                Some(NodeKind::Phantom) => stats.phantoms = count,
                Some(NodeKind::Tag) => stats.tags = count,
                Some(NodeKind::Asset) => stats.assets = count,
                None => {}
            }
        }
        stats.edges = conn.query_row("SELECT COUNT(*) FROM edges", [], |row| row.get(0))?;
        stats.built_at = self.meta("built_at")?;
        Ok(stats)
    }
}

/// Mutations of the link graph. Only available inside a transaction.
pub trait GraphWrite: GraphRead {
    // ── Node upserts ───────────────────────────────────────────────

    /// Register a note. Re-registering the same path keeps the id and
    /// overwrites name, mtime and kind.
    fn upsert_note(&self, path: &str, name: &str, mtime: i64) -> Result<NodeId> {
        let id: i64 = self.conn().query_row(
            "INSERT INTO nodes (node_key, type, name, path, exists_flag, mtime)
             VALUES (?1, 'note', ?2, ?3, 1, ?4)
             ON CONFLICT(node_key) DO UPDATE SET
                type = 'note',
                name = excluded.name,
                path = excluded.path,
                exists_flag = 1,
                mtime = excluded.mtime
             RETURNING id",
            params![paths::note_key(path), name, path, mtime],
            |row| row.get(0),
        )?;
        Ok(NodeId(id))
    }

    /// Get or create the phantom for an unresolved name.
    fn upsert_phantom(&self, name: &str) -> Result<NodeId> {
        insert_if_absent(self.conn(), &paths::phantom_key(name), NodeKind::Phantom, name, None)
    }

    /// Get or create a tag node.
    fn upsert_tag(&self, name: &str) -> Result<NodeId> {
        insert_if_absent(self.conn(), &paths::tag_key(name), NodeKind::Tag, name, None)
    }

    /// Get or create an asset node for a non-document file.
    fn upsert_asset(&self, path: &str) -> Result<NodeId> {
        insert_if_absent(
            self.conn(),
            &paths::asset_key(path),
            NodeKind::Asset,
            paths::file_name(path),
            Some(path),
        )
    }

    /// Record the last-seen modification time of a note.
    fn update_note_mtime(&self, id: NodeId, mtime: i64) -> Result<()> {
        self.conn().execute(
            "UPDATE nodes SET mtime = ?2 WHERE id = ?1 AND type = 'note'",
            params![id.0, mtime],
        )?;
        Ok(())
    }

    /// Delete a node and every edge touching it.
    fn delete_node(&self, id: NodeId) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "DELETE FROM edges WHERE source_id = ?1 OR target_id = ?1",
            params![id.0],
        )?;
        conn.execute("DELETE FROM nodes WHERE id = ?1", params![id.0])?;
        Ok(())
    }

    // ── Edges ──────────────────────────────────────────────────────

    /// Append an edge. Never deduplicates: one row per literal occurrence.
    fn insert_edge(&self, edge: &NewEdge) -> Result<EdgeId> {
        self.conn().execute(
            "INSERT INTO edges (source_id, target_id, link_type, raw_link, subpath, line_start, line_end)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                edge.source.0,
                edge.target.0,
                edge.kind.as_str(),
                edge.raw_link,
                edge.subpath,
                to_sql_int(edge.line_start),
                to_sql_int(edge.line_end),
            ],
        )?;
        Ok(EdgeId(self.conn().last_insert_rowid()))
    }

    /// Point a single edge at a different node.
    fn retarget_edge(&self, edge: EdgeId, target: NodeId) -> Result<()> {
        self.conn().execute(
            "UPDATE edges SET target_id = ?2 WHERE id = ?1",
            params![edge.0, target.0],
        )?;
        Ok(())
    }

    /// Point every edge targeting `from` at `to`. Returns the number moved.
    fn retarget_edges(&self, from: NodeId, to: NodeId) -> Result<u64> {
        let moved = self.conn().execute(
            "UPDATE edges SET target_id = ?2 WHERE target_id = ?1",
            params![from.0, to.0],
        )?;
        Ok(moved as u64)
    }

    /// Replace the recorded literal text of an edge after a rewrite.
    fn update_raw_link(&self, edge: EdgeId, raw_link: &str) -> Result<()> {
        self.conn().execute(
            "UPDATE edges SET raw_link = ?2 WHERE id = ?1",
            params![edge.0, raw_link],
        )?;
        Ok(())
    }

    // ── Lifecycle ──────────────────────────────────────────────────

    /// Remove a note, or turn it into a phantom if others still link to it.
    ///
    /// A referenced node loses its outgoing edges and either merges into an
    /// existing phantom named `name` or becomes that phantom in place, keeping
    /// its id. An unreferenced node is deleted with all its edges.
    fn remove_or_phantomize(&self, id: NodeId, name: &str) -> Result<RemovalOutcome> {
        let conn = self.conn();
        if self.incoming_count_excluding_self(id)? == 0 {
            self.delete_node(id)?;
            debug!(node = id.0, "Deleted unreferenced node");
            return Ok(RemovalOutcome::Deleted);
        }

        conn.execute("DELETE FROM edges WHERE source_id = ?1", params![id.0])?;

        let key = paths::phantom_key(name);
        match self.node_by_key(&key)? {
            Some(existing) if existing.id != id => {
                self.retarget_edges(id, existing.id)?;
                conn.execute("DELETE FROM nodes WHERE id = ?1", params![id.0])?;
                debug!(node = id.0, phantom = existing.id.0, "Merged node into existing phantom");
            }
            _ => {
                conn.execute(
                    "UPDATE nodes
                     SET type = 'phantom', node_key = ?2, path = NULL, exists_flag = 0, mtime = NULL
                     WHERE id = ?1",
                    params![id.0, key],
                )?;
                debug!(node = id.0, "Converted node to phantom in place");
            }
        }
        Ok(RemovalOutcome::Phantomized)
    }

    /// Delete every tag or phantom with no incoming edges. Returns the count.
    fn cleanup_orphaned_nodes(&self) -> Result<u64> {
        let removed = self.conn().execute(
            "DELETE FROM nodes
             WHERE type IN ('tag', 'phantom')
               AND NOT EXISTS (SELECT 1 FROM edges WHERE edges.target_id = nodes.id)",
            [],
        )?;
        if removed > 0 {
            debug!(removed, "Swept orphaned tags and phantoms");
        }
        Ok(removed as u64)
    }

    /// Remove every node and edge (full rebuild).
    fn clear(&self) -> Result<()> {
        self.conn()
            .execute_batch("DELETE FROM edges; DELETE FROM nodes;")?;
        Ok(())
    }

    /// Write a value into `index_meta`.
    fn set_meta(&self, key: &str, value: &str) -> Result<()> {
        self.conn().execute(
            "INSERT INTO index_meta (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }
}

fn insert_if_absent(
    conn: &Connection,
    key: &str,
    kind: NodeKind,
    name: &str,
    path: Option<&str>,
) -> Result<NodeId> {
    conn.execute(
        "INSERT INTO nodes (node_key, type, name, path, exists_flag, mtime)
         VALUES (?1, ?2, ?3, ?4, ?5, NULL)
         ON CONFLICT(node_key) DO NOTHING",
        params![key, kind.as_str(), name, path, kind.exists_on_disk()],
    )?;
    let id: i64 = conn.query_row(
        "SELECT id FROM nodes WHERE node_key = ?1",
        params![key],
        |row| row.get(0),
    )?;
    Ok(NodeId(id))
}

fn to_sql_int(n: usize) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn from_sql_int(n: i64) -> usize {
    usize::try_from(n).unwrap_or_default()
}

/// Helper: read a full node from a row selected with `NODE_COLUMNS`.
fn row_to_node(row: &rusqlite::Row<'_>) -> rusqlite::Result<Node> {
    let kind_str: String = row.get(2)?;
    let kind = NodeKind::parse(&kind_str).ok_or_else(|| {
        rusqlite::Error::InvalidColumnType(2, kind_str.clone(), rusqlite::types::Type::Text)
    })?;
    Ok(Node {
        id: NodeId(row.get(0)?),
        key: row.get(1)?,
        kind,
        name: row.get(3)?,
        path: row.get(4)?,
        exists: row.get(5)?,
        mtime: row.get(6)?,
    })
}

/// Helper: read a full edge from a row selected with `EDGE_COLUMNS`.
fn row_to_edge(row: &rusqlite::Row<'_>) -> rusqlite::Result<Edge> {
    let kind_str: String = row.get(3)?;
    let kind = LinkKind::parse(&kind_str).ok_or_else(|| {
        rusqlite::Error::InvalidColumnType(3, kind_str.clone(), rusqlite::types::Type::Text)
    })?;
    Ok(Edge {
        id: EdgeId(row.get(0)?),
        source: NodeId(row.get(1)?),
        target: NodeId(row.get(2)?),
        kind,
        raw_link: row.get(4)?,
        subpath: row.get(5)?,
        line_start: from_sql_int(row.get(6)?),
        line_end: from_sql_int(row.get(7)?),
    })
}
