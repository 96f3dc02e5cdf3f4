use std::path::PathBuf;

/// Top-level vaultlink error type.
///
/// All fallible operations in `vaultlink-core` return [`Result<T, VaultError>`](Result).
/// Variants group failures by category so callers (the CLI in particular) can
/// decide presentation and exit codes without string matching. Every category
/// is terminal for the current call; nothing is retried internally.
#[derive(thiserror::Error, Debug)]
pub enum VaultError {
    /// A precondition of the requested operation does not hold.
    #[error(transparent)]
    Precondition(#[from] PreconditionError),

    /// The operation would break an ambiguity or containment invariant.
    #[error(transparent)]
    Integrity(#[from] IntegrityError),

    /// A source file changed on disk since it was indexed.
    #[error("{path} changed on disk since it was indexed (indexed mtime {indexed}, on disk {on_disk})")]
    Stale {
        /// Vault-relative path of the stale file.
        path: String,
        /// Modification time recorded in the index (ns since epoch).
        indexed: i64,
        /// Modification time observed on disk (ns since epoch).
        on_disk: i64,
    },

    /// Error from the link-graph store (`SQLite` operations, schema).
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Error reading or writing documents during a rewrite batch.
    #[error("Rewrite error: {0}")]
    Rewrite(#[from] RewriteError),

    /// Error in configuration parsing or validation.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Filesystem I/O error outside a rewrite batch.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Precondition failures: missing index, missing or unexpected files.
#[derive(thiserror::Error, Debug)]
pub enum PreconditionError {
    /// No index database exists at the expected location.
    #[error("index not found at {0}; run `vaultlink build` first")]
    IndexNotFound(PathBuf),

    /// The file does not exist on disk.
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// The file is already registered as a note.
    #[error("already registered: {0}")]
    AlreadyRegistered(String),

    /// The file is not registered in the index.
    #[error("file not registered: {0}")]
    NotRegistered(String),

    /// The path resolves outside the vault root.
    #[error("path outside vault: {0}")]
    OutsideVault(String),

    /// The path does not name a markdown document.
    #[error("not a document: {0}")]
    NotDocument(String),

    /// The deletion policy requires the file to be gone, but it is still on disk.
    #[error("file still exists on disk: {0}")]
    StillOnDisk(String),

    /// No document carries the requested basename.
    #[error("no document named {0}")]
    NoSuchName(String),
}

/// Ambiguity and referential-integrity failures.
#[derive(thiserror::Error, Debug)]
pub enum IntegrityError {
    /// A relative or path-qualified link resolves outside the vault root.
    #[error("link escapes vault: {link} in {source_path}")]
    LinkEscapesVault {
        /// Document containing the link.
        source_path: String,
        /// Raw link text.
        link: String,
    },

    /// A basename-only link has several candidate targets and none at the root.
    #[error("ambiguous link {link} in {source_path}: candidates {}", candidates.join(", "))]
    AmbiguousLink {
        /// Document containing the link.
        source_path: String,
        /// Raw link text.
        link: String,
        /// Candidate target paths.
        candidates: Vec<String>,
    },

    /// Adding files would make existing basename links to a note ambiguous.
    #[error(
        "adding files would make existing links ambiguous: {count} link(s) to {target} by basename {basename}"
    )]
    WouldAmbiguate {
        /// Basename key that gains a second document.
        basename: String,
        /// The note existing links currently resolve to.
        target: String,
        /// Number of basename-form links affected.
        count: usize,
    },

    /// Several new files would share the basename of a referenced phantom.
    #[error(
        "adding files would make existing links ambiguous: {count} link(s) to missing {basename} would match {}",
        candidates.join(", ")
    )]
    AmbiguousPromotion {
        /// Basename key of the phantom.
        basename: String,
        /// New files sharing the basename.
        candidates: Vec<String>,
        /// Number of basename-form links to the phantom.
        count: usize,
    },

    /// Several documents share the basename and no explicit target was given.
    #[error("multiple documents named {name}: {}; pass an explicit target", candidates.join(", "))]
    MultipleCandidates {
        /// Requested basename.
        name: String,
        /// Candidate document paths.
        candidates: Vec<String>,
    },

    /// The explicit target is not one of the documents sharing the basename.
    #[error("{target} is not a document named {name}")]
    NotACandidate {
        /// Requested basename.
        name: String,
        /// Explicit target given by the caller.
        target: String,
    },
}

/// Errors from the SQLite-backed link-graph store.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    /// Underlying `SQLite` operation failed.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// The index was written by an incompatible schema version.
    #[error("schema version mismatch: index has {found}, expected {expected}")]
    SchemaVersion {
        /// Version recorded in the index.
        found: String,
        /// Version this build understands.
        expected: String,
    },

    /// A referenced node was not found in the store.
    #[error("Node not found: {0}")]
    NodeNotFound(String),
}

/// Errors while reading or writing documents in a rewrite batch.
#[derive(thiserror::Error, Debug)]
pub enum RewriteError {
    /// Reading the original bytes of a document failed.
    #[error("cannot read {path}: {source}")]
    Read {
        /// Vault-relative path.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// Writing the rewritten document failed; the batch was rolled back.
    #[error("cannot write {path}: {source}")]
    Write {
        /// Vault-relative path.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A document is not valid UTF-8 and cannot be rewritten.
    #[error("{0} is not valid UTF-8")]
    Encoding(String),

    /// The recorded raw link was not found at its recorded line.
    #[error("{raw} not found at {path}:{line}")]
    OccurrenceMissing {
        /// Vault-relative path.
        path: String,
        /// Recorded 1-based line.
        line: usize,
        /// Recorded raw link text.
        raw: String,
    },
}

/// Errors in vaultlink configuration parsing and validation.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// Configuration values are present but semantically invalid.
    #[error("Invalid config: {0}")]
    Invalid(String),

    /// Configuration file syntax could not be parsed (TOML error).
    #[error("Parse error: {0}")]
    Parse(String),
}

impl VaultError {
    /// Shorthand for a staleness failure.
    pub fn stale(path: impl Into<String>, indexed: i64, on_disk: i64) -> Self {
        Self::Stale {
            path: path.into(),
            indexed,
            on_disk,
        }
    }
}

impl From<rusqlite::Error> for VaultError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Store(StoreError::Sqlite(e))
    }
}

/// Convenience alias for `Result<T, VaultError>`.
pub type Result<T> = std::result::Result<T, VaultError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precondition_messages_are_plain() {
        let err = VaultError::from(PreconditionError::NotRegistered("a.md".into()));
        assert_eq!(err.to_string(), "file not registered: a.md");

        let err = VaultError::from(PreconditionError::IndexNotFound(PathBuf::from("/v/.vaultlink/index.db")));
        assert!(err.to_string().starts_with("index not found"));
    }

    #[test]
    fn integrity_messages_list_candidates() {
        let err = VaultError::from(IntegrityError::MultipleCandidates {
            name: "A".into(),
            candidates: vec!["x/A.md".into(), "y/A.md".into()],
        });
        assert!(err.to_string().contains("x/A.md, y/A.md"));

        let err = VaultError::from(IntegrityError::WouldAmbiguate {
            basename: "a".into(),
            target: "A.md".into(),
            count: 2,
        });
        assert!(
            err.to_string()
                .starts_with("adding files would make existing links ambiguous")
        );
    }

    #[test]
    fn sqlite_errors_surface_as_store_errors() {
        let err = VaultError::from(rusqlite::Error::QueryReturnedNoRows);
        assert!(matches!(err, VaultError::Store(StoreError::Sqlite(_))));
    }
}
