//! Vault handle: root directory, configuration, and the document filesystem.

use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::config::{VAULTLINK_DIR, VaultConfig};
use crate::error::{PreconditionError, Result, RewriteError};
use crate::paths;
use crate::store::SqliteStore;

/// Document filesystem seam. Paths are normalized and vault-relative.
///
/// Every read, write and removal made by the engines goes through this trait,
/// so tests can substitute an implementation that fails on demand.
pub trait VaultFs: Send + Sync {
    fn read(&self, path: &str) -> io::Result<Vec<u8>>;

    fn write(&self, path: &str, bytes: &[u8]) -> io::Result<()>;

    fn remove(&self, path: &str) -> io::Result<()>;

    /// Modification time in ns since the Unix epoch, `None` if the file is absent.
    fn mtime(&self, path: &str) -> io::Result<Option<i64>>;

    /// Reset the modification time, used when restoring a file's original state.
    fn set_mtime(&self, path: &str, mtime: i64) -> io::Result<()>;

    fn exists(&self, path: &str) -> bool;
}

/// Original bytes and modification time of a file about to change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileBackup {
    pub path: String,
    pub bytes: Vec<u8>,
    pub mtime: Option<i64>,
}

impl FileBackup {
    pub fn capture(fs: &dyn VaultFs, path: &str, bytes: Vec<u8>) -> io::Result<Self> {
        Ok(Self {
            path: path.to_string(),
            bytes,
            mtime: fs.mtime(path)?,
        })
    }

    /// Write the original bytes back and reset the modification time, so the
    /// index's recorded mtime matches again.
    pub fn restore(&self, fs: &dyn VaultFs) -> io::Result<()> {
        fs.write(&self.path, &self.bytes)?;
        if let Some(mtime) = self.mtime {
            fs.set_mtime(&self.path, mtime)?;
        }
        Ok(())
    }
}

/// [`VaultFs`] backed by the real filesystem under a root directory.
#[derive(Debug, Clone)]
pub struct DiskFs {
    root: PathBuf,
}

impl DiskFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn full(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

impl VaultFs for DiskFs {
    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        std::fs::read(self.full(path))
    }

    fn write(&self, path: &str, bytes: &[u8]) -> io::Result<()> {
        let full = self.full(path);
        if let Some(parent) = full.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(full, bytes)
    }

    fn remove(&self, path: &str) -> io::Result<()> {
        let full = self.full(path).canonicalize()?;
        let root = self.root.canonicalize()?;
        if !full.starts_with(&root) {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("{} is outside the vault", full.display()),
            ));
        }
        std::fs::remove_file(full)
    }

    fn mtime(&self, path: &str) -> io::Result<Option<i64>> {
        match std::fs::metadata(self.full(path)) {
            Ok(meta) if meta.is_file() => Ok(Some(system_time_nanos(meta.modified()?))),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn set_mtime(&self, path: &str, mtime: i64) -> io::Result<()> {
        let file = std::fs::OpenOptions::new().write(true).open(self.full(path))?;
        file.set_modified(nanos_system_time(mtime))
    }

    fn exists(&self, path: &str) -> bool {
        self.full(path).is_file()
    }
}

/// Convert a filesystem timestamp to ns since the Unix epoch.
pub fn system_time_nanos(time: SystemTime) -> i64 {
    DateTime::<Utc>::from(time)
        .timestamp_nanos_opt()
        .unwrap_or(i64::MAX)
}

/// Inverse of [`system_time_nanos`].
pub fn nanos_system_time(nanos: i64) -> SystemTime {
    DateTime::<Utc>::from_timestamp_nanos(nanos).into()
}

/// An opened vault: root directory, loaded configuration and document access.
pub struct Vault {
    root: PathBuf,
    config: VaultConfig,
    fs: Box<dyn VaultFs>,
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault")
            .field("root", &self.root)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Vault {
    /// Open the vault rooted at `root`, loading `.vaultlink/config.toml`.
    pub fn open(root: &Path) -> Result<Self> {
        let root = root.canonicalize()?;
        let config = VaultConfig::load(&root)?;
        let fs = DiskFs::new(&root);
        Ok(Self::with_fs(root, config, Box::new(fs)))
    }

    /// Assemble a vault from parts. Used by tests to inject a filesystem.
    pub fn with_fs(root: PathBuf, config: VaultConfig, fs: Box<dyn VaultFs>) -> Self {
        Self { root, config, fs }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut VaultConfig {
        &mut self.config
    }

    pub fn fs(&self) -> &dyn VaultFs {
        self.fs.as_ref()
    }

    /// Location of the index database.
    pub fn index_path(&self) -> PathBuf {
        self.root.join(&self.config.index.db_path)
    }

    /// Open the existing index, failing with "index not found" if absent.
    pub fn open_index(&self) -> Result<SqliteStore> {
        SqliteStore::open_existing(&self.index_path())
    }

    /// Open the index, creating it (and its directory) if needed.
    pub fn create_index(&self) -> Result<SqliteStore> {
        let path = self.index_path();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        SqliteStore::open(&path)
    }

    /// Turn a caller-supplied path into normalized vault-relative form.
    ///
    /// Absolute paths must lie under the vault root; relative paths are taken
    /// relative to the root.
    pub fn relative_path(&self, input: &str) -> Result<String> {
        let candidate = Path::new(input);
        let relative = if candidate.is_absolute() {
            paths::vault_relative(&self.root, candidate)
        } else {
            paths::normalize(input)
        };
        match relative {
            Some(path) if !path.is_empty() => Ok(path),
            _ => Err(PreconditionError::OutsideVault(input.to_string()).into()),
        }
    }

    /// Read a document as UTF-8 text.
    pub fn read_text(&self, path: &str) -> Result<String> {
        let bytes = self.fs.read(path).map_err(|source| RewriteError::Read {
            path: path.to_string(),
            source,
        })?;
        String::from_utf8(bytes).map_err(|_| RewriteError::Encoding(path.to_string()).into())
    }

    /// Current modification time of a document that must exist.
    pub fn require_mtime(&self, path: &str) -> Result<i64> {
        self.fs
            .mtime(path)?
            .ok_or_else(|| PreconditionError::FileNotFound(path.to_string()).into())
    }

    /// Every document under the root, sorted, minus paths matching `excludes`.
    pub fn scan_documents(&self, excludes: &[String]) -> Result<Vec<String>> {
        let excludes: Vec<glob::Pattern> = excludes
            .iter()
            .filter_map(|p| glob::Pattern::new(p).ok())
            .collect();
        let options = glob::MatchOptions {
            case_sensitive: false,
            require_literal_separator: false,
            require_literal_leading_dot: false,
        };
        let root = glob::Pattern::escape(&self.root.to_string_lossy());

        let mut found = Vec::new();
        for ext in paths::DOCUMENT_EXTENSIONS {
            let pattern = format!("{root}/**/*.{ext}");
            let entries = glob::glob_with(&pattern, options)
                .map_err(|e| crate::error::ConfigError::Invalid(e.to_string()))?;
            for entry in entries.flatten() {
                if !entry.is_file() {
                    continue;
                }
                let Some(rel) = paths::vault_relative(&self.root, &entry) else {
                    continue;
                };
                if excludes.iter().any(|p| p.matches_with(&rel, options)) {
                    debug!(path = %rel, "Excluded from scan");
                    continue;
                }
                found.push(rel);
            }
        }
        found.sort();
        found.dedup();
        Ok(found)
    }

    /// Whether `path` is the vault's own metadata directory or inside it.
    pub fn is_internal(path: &str) -> bool {
        path == VAULTLINK_DIR || path.starts_with(&format!("{VAULTLINK_DIR}/"))
    }
}
