// Integration test utilities and fixture management for vaultlink.

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use vaultlink_core::config::VaultConfig;
use vaultlink_core::engine::build::{self, BuildOptions};
use vaultlink_core::progress::NoopReporter;
use vaultlink_core::store::{GraphRead, SqliteStore};
use vaultlink_core::types::NodeKind;
use vaultlink_core::vault::{DiskFs, Vault, VaultFs};

/// A temporary vault directory.
#[derive(Debug)]
pub struct TestVault {
    pub dir: tempfile::TempDir,
}

impl TestVault {
    /// An empty vault.
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("create tempdir"),
        }
    }

    /// A vault holding `files` as (path, content) pairs.
    pub fn with_files(files: &[(&str, &str)]) -> Self {
        let vault = Self::new();
        for (path, content) in files {
            vault.write(path, content);
        }
        vault
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Canonical root, as `Vault::open` sees it.
    pub fn root(&self) -> PathBuf {
        self.path().canonicalize().expect("canonicalize vault root")
    }

    pub fn write(&self, path: &str, content: &str) {
        let full = self.path().join(path);
        std::fs::create_dir_all(full.parent().unwrap()).unwrap();
        std::fs::write(full, content).unwrap();
    }

    pub fn read(&self, path: &str) -> String {
        std::fs::read_to_string(self.path().join(path)).unwrap()
    }

    pub fn remove(&self, path: &str) {
        std::fs::remove_file(self.path().join(path)).unwrap();
    }

    pub fn exists(&self, path: &str) -> bool {
        self.path().join(path).is_file()
    }

    /// Open the vault on the real filesystem.
    pub fn vault(&self) -> Vault {
        Vault::open(self.path()).expect("open vault")
    }

    /// Open the vault with a substitute filesystem.
    pub fn vault_with_fs(&self, fs: Box<dyn VaultFs>) -> Vault {
        let root = self.root();
        let config = VaultConfig::load(&root).expect("load config");
        Vault::with_fs(root, config, fs)
    }

    /// Run a lenient full build and return the vault with its index.
    pub fn build(&self) -> (Vault, SqliteStore) {
        let vault = self.vault();
        let mut store = vault.create_index().expect("create index");
        build::run(&vault, &mut store, BuildOptions::default(), &NoopReporter).expect("build");
        (vault, store)
    }

    /// Reopen the index written by an earlier build.
    pub fn open_store(&self) -> SqliteStore {
        self.vault().open_index().expect("open index")
    }

    /// Move a file's modification time forward without changing its content.
    pub fn bump_mtime(&self, path: &str) {
        let full = self.path().join(path);
        let modified = std::fs::metadata(&full).unwrap().modified().unwrap();
        let file = std::fs::OpenOptions::new().write(true).open(&full).unwrap();
        file.set_modified(modified + Duration::from_secs(5)).unwrap();
    }

    /// Bytes of every markdown document, keyed by vault-relative path.
    pub fn snapshot(&self) -> BTreeMap<String, Vec<u8>> {
        let vault = self.vault();
        vault
            .scan_documents(&[])
            .unwrap()
            .into_iter()
            .map(|path| {
                let bytes = std::fs::read(self.path().join(&path)).unwrap();
                (path, bytes)
            })
            .collect()
    }
}

impl Default for TestVault {
    fn default() -> Self {
        Self::new()
    }
}

/// Panics if any phantom or tag has no incoming edge.
pub fn assert_no_orphans(store: &dyn GraphRead) {
    for kind in [NodeKind::Phantom, NodeKind::Tag] {
        for node in store.nodes_of_kind(kind).unwrap() {
            let incoming = store.incoming_edges(node.id).unwrap();
            assert!(
                !incoming.is_empty(),
                "{} {} has no incoming edges",
                kind.as_str(),
                node.name
            );
        }
    }
}

/// [`VaultFs`] over the real filesystem that fails chosen operations.
#[derive(Debug)]
pub struct FaultyFs {
    inner: DiskFs,
    fail_writes: Mutex<BTreeSet<String>>,
    fail_removes: Mutex<BTreeSet<String>>,
}

impl FaultyFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            inner: DiskFs::new(root),
            fail_writes: Mutex::new(BTreeSet::new()),
            fail_removes: Mutex::new(BTreeSet::new()),
        }
    }

    /// Every write to `path` fails.
    #[must_use]
    pub fn fail_write(self, path: &str) -> Self {
        self.fail_writes.lock().unwrap().insert(path.to_string());
        self
    }

    /// Every removal of `path` fails.
    #[must_use]
    pub fn fail_remove(self, path: &str) -> Self {
        self.fail_removes.lock().unwrap().insert(path.to_string());
        self
    }

    fn injected(set: &Mutex<BTreeSet<String>>, path: &str) -> io::Result<()> {
        if set.lock().unwrap().contains(path) {
            return Err(io::Error::other(format!("injected failure for {path}")));
        }
        Ok(())
    }
}

impl VaultFs for FaultyFs {
    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        self.inner.read(path)
    }

    fn write(&self, path: &str, bytes: &[u8]) -> io::Result<()> {
        Self::injected(&self.fail_writes, path)?;
        self.inner.write(path, bytes)
    }

    fn remove(&self, path: &str) -> io::Result<()> {
        Self::injected(&self.fail_removes, path)?;
        self.inner.remove(path)
    }

    fn mtime(&self, path: &str) -> io::Result<Option<i64>> {
        self.inner.mtime(path)
    }

    fn set_mtime(&self, path: &str, mtime: i64) -> io::Result<()> {
        self.inner.set_mtime(path, mtime)
    }

    fn exists(&self, path: &str) -> bool {
        self.inner.exists(path)
    }
}
