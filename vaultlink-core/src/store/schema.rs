/// Current schema version.
pub const SCHEMA_VERSION: &str = "1";

/// Full SQL schema for the link-graph index.
pub const SCHEMA_SQL: &str = r"
-- Schema version and build bookkeeping
CREATE TABLE IF NOT EXISTS index_meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

-- Graph vertices: notes, phantoms, tags, assets
CREATE TABLE IF NOT EXISTS nodes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    node_key TEXT NOT NULL UNIQUE,
    type TEXT NOT NULL CHECK (type IN ('note', 'phantom', 'tag', 'asset')),
    name TEXT NOT NULL,
    path TEXT,
    exists_flag INTEGER NOT NULL DEFAULT 0,
    mtime INTEGER
);
CREATE INDEX IF NOT EXISTS idx_nodes_type ON nodes(type);
CREATE INDEX IF NOT EXISTS idx_nodes_path ON nodes(path);

-- One edge per literal link occurrence
CREATE TABLE IF NOT EXISTS edges (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    source_id INTEGER NOT NULL REFERENCES nodes(id),
    target_id INTEGER NOT NULL REFERENCES nodes(id),
    link_type TEXT NOT NULL,
    raw_link TEXT NOT NULL,
    subpath TEXT,
    line_start INTEGER NOT NULL,
    line_end INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_edges_source ON edges(source_id);
CREATE INDEX IF NOT EXISTS idx_edges_target ON edges(target_id);
";

/// `SQLite` PRAGMAs applied on every open.
pub const PRAGMAS_SQL: &str = r"
PRAGMA synchronous = NORMAL;
PRAGMA foreign_keys = ON;
";
