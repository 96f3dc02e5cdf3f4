use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Vault directory holding the index and configuration.
pub const VAULTLINK_DIR: &str = ".vaultlink";

/// Configuration file name inside [`VAULTLINK_DIR`].
pub const CONFIG_FILE: &str = "config.toml";

/// How the delete engine treats the file on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum DeletePolicy {
    /// The engine removes the file itself, restoring it if the index update fails.
    RemoveFile,
    /// The file must already be gone; the engine only updates the index.
    #[default]
    RequireAbsent,
}

impl DeletePolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RemoveFile => "remove-file",
            Self::RequireAbsent => "require-absent",
        }
    }
}

/// Top-level vaultlink configuration, matching `.vaultlink/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VaultConfig {
    #[serde(default)]
    pub index: IndexSection,
    #[serde(default)]
    pub build: BuildSection,
    #[serde(default)]
    pub add: AddSection,
    #[serde(default)]
    pub delete: DeleteSection,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSection {
    /// Index database location, relative to the vault root.
    pub db_path: String,
}

impl Default for IndexSection {
    fn default() -> Self {
        Self {
            db_path: format!("{VAULTLINK_DIR}/index.db"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildSection {
    pub exclude_patterns: Vec<String>,
    /// Fail the build on ambiguous or escaping links instead of skipping them.
    pub strict: bool,
}

impl Default for BuildSection {
    fn default() -> Self {
        Self {
            exclude_patterns: vec![
                ".vaultlink/**".into(),
                ".git/**".into(),
                ".obsidian/**".into(),
                ".trash/**".into(),
            ],
            strict: false,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AddSection {
    pub auto_disambiguate: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeleteSection {
    pub policy: DeletePolicy,
}

impl VaultConfig {
    /// Load `<root>/.vaultlink/config.toml`, falling back to defaults when the
    /// file does not exist.
    pub fn load(root: &Path) -> crate::error::Result<Self> {
        let path = root.join(VAULTLINK_DIR).join(CONFIG_FILE);
        if !path.is_file() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(&path)?;
        let config = Self::from_toml(&text)?;
        Ok(config)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Self =
            toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.index.db_path.trim().is_empty() {
            return Err(ConfigError::Invalid("index.db_path must not be empty".into()));
        }
        for pattern in &self.build.exclude_patterns {
            glob::Pattern::new(pattern).map_err(|e| {
                ConfigError::Invalid(format!("bad exclude pattern {pattern:?}: {e}"))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_sections_use_defaults() {
        let config = VaultConfig::from_toml("[add]\nauto_disambiguate = true\n").unwrap();
        assert!(config.add.auto_disambiguate);
        assert_eq!(config.index.db_path, ".vaultlink/index.db");
        assert_eq!(config.delete.policy, DeletePolicy::RequireAbsent);
        assert_eq!(config.build.exclude_patterns.len(), 4);
        assert!(!config.build.strict);
    }

    #[test]
    fn partial_sections_fill_missing_keys() {
        let config = VaultConfig::from_toml("[build]\nstrict = true\n").unwrap();
        assert!(config.build.strict);
        assert_eq!(config.build.exclude_patterns, BuildSection::default().exclude_patterns);

        let config = VaultConfig::from_toml("[add]\n[delete]\n[index]\n").unwrap();
        assert_eq!(config, VaultConfig::default());
    }

    #[test]
    fn delete_policy_is_kebab_case() {
        let config = VaultConfig::from_toml("[delete]\npolicy = \"remove-file\"\n").unwrap();
        assert_eq!(config.delete.policy, DeletePolicy::RemoveFile);
        assert!(VaultConfig::from_toml("[delete]\npolicy = \"trash\"\n").is_err());
    }

    #[test]
    fn invalid_glob_is_rejected() {
        let err = VaultConfig::from_toml("[build]\nexclude_patterns = [\"[\"]\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn load_without_file_returns_default() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(VaultConfig::load(tmp.path()).unwrap(), VaultConfig::default());
    }

    #[test]
    fn load_reads_config_file() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join(VAULTLINK_DIR)).unwrap();
        std::fs::write(
            tmp.path().join(VAULTLINK_DIR).join(CONFIG_FILE),
            "[build]\nexclude_patterns = [\"drafts/**\"]\nstrict = true\n",
        )
        .unwrap();
        let config = VaultConfig::load(tmp.path()).unwrap();
        assert!(config.build.strict);
        assert_eq!(config.build.exclude_patterns, vec!["drafts/**".to_string()]);
    }

    #[test]
    fn default_round_trips_through_toml() {
        let text = toml::to_string(&VaultConfig::default()).unwrap();
        assert_eq!(VaultConfig::from_toml(&text).unwrap(), VaultConfig::default());
    }
}
