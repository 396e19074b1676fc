use std::fs;
use std::path::{Path, PathBuf};

use chainlog_store::{FileStoreConfig, SyncPolicy};
use serde::{Deserialize, Serialize};

use crate::error::LedgerError;

/// Ledger configuration, usually loaded from TOML.
///
/// ```toml
/// [storage]
/// backend = "file"
/// path = "data/ledger.log"
/// sync = "every-write"
///
/// [verification]
/// verify_on_open = true
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LedgerConfig {
    pub storage: StorageConfig,
    pub verification: VerificationConfig,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StorageBackend {
    Memory,
    #[default]
    File,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// Segment file for the `file` backend.
    pub path: PathBuf,
    pub sync: SyncPolicy,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::File,
            path: PathBuf::from("data/ledger.log"),
            sync: SyncPolicy::EveryWrite,
        }
    }
}

impl StorageConfig {
    pub fn file_store_config(&self) -> FileStoreConfig {
        FileStoreConfig { sync: self.sync }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VerificationConfig {
    /// Walk the chain when the ledger opens and refuse to open a broken one.
    pub verify_on_open: bool,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            verify_on_open: true,
        }
    }
}

impl LedgerConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, LedgerError> {
        toml::from_str(text).map_err(|e| LedgerError::Config(e.to_string()))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, LedgerError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|e| LedgerError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    /// In-memory ledger, verified on open. Mostly useful for tests.
    pub fn in_memory() -> Self {
        Self {
            storage: StorageConfig {
                backend: StorageBackend::Memory,
                ..StorageConfig::default()
            },
            ..Self::default()
        }
    }
}
