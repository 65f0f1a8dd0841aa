use super::ApiKey;
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Single-slot storage for the bearer key. Read once at startup, rewritten
/// whenever the user changes the key.
pub trait KeyStore: Send + Sync {
    fn load(&self) -> Result<Option<ApiKey>>;
    /// `None` clears the slot.
    fn save(&self, key: Option<&ApiKey>) -> Result<()>;
}

/// Stores the key as the only line of a small text file.
pub struct FileKeyStore {
    path: PathBuf,
}

impl FileKeyStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl KeyStore for FileKeyStore {
    fn load(&self) -> Result<Option<ApiKey>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read key file: {}", self.path.display()))?;
        // Strip BOM if the file was written by another tool
        let content = content.strip_prefix('\u{feff}').unwrap_or(&content);
        Ok(content.lines().next().and_then(ApiKey::new))
    }

    fn save(&self, key: Option<&ApiKey>) -> Result<()> {
        let contents = match key {
            Some(key) => format!("{}\n", key.as_str()),
            None => String::new(),
        };
        std::fs::write(&self.path, contents)
            .with_context(|| format!("Failed to write key file: {}", self.path.display()))
    }
}

/// In-process store, for tests and for running without a key file.
#[derive(Default)]
pub struct MemoryKeyStore {
    slot: Mutex<Option<ApiKey>>,
}

impl MemoryKeyStore {
    pub fn new(initial: Option<ApiKey>) -> Self {
        Self {
            slot: Mutex::new(initial),
        }
    }
}

impl KeyStore for MemoryKeyStore {
    fn load(&self) -> Result<Option<ApiKey>> {
        let slot = self
            .slot
            .lock()
            .map_err(|_| anyhow::anyhow!("key store lock poisoned"))?;
        Ok(slot.clone())
    }

    fn save(&self, key: Option<&ApiKey>) -> Result<()> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| anyhow::anyhow!("key store lock poisoned"))?;
        *slot = key.cloned();
        Ok(())
    }
}
