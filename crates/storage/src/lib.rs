use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use pagewatch_core::TabId;

/// Best-effort "is this tab supervised" map, kept for display continuity
/// only. The supervisor's record table is the source of truth; this store may
/// transiently disagree with it and must never drive control decisions.
#[async_trait]
pub trait FlagStore: Send + Sync {
    async fn get(&self, tab_id: &TabId) -> Result<bool>;
    async fn set(&self, tab_id: &TabId, supervised: bool) -> Result<()>;
    async fn remove(&self, tab_id: &TabId) -> Result<()>;
}

/// In-memory store for embedding and tests.
#[derive(Default)]
pub struct MemoryFlagStore {
    flags: Mutex<HashMap<TabId, bool>>,
}

impl MemoryFlagStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether an entry exists at all, regardless of its value.
    pub fn contains(&self, tab_id: &TabId) -> bool {
        self.flags.lock().unwrap().contains_key(tab_id)
    }
}

#[async_trait]
impl FlagStore for MemoryFlagStore {
    async fn get(&self, tab_id: &TabId) -> Result<bool> {
        Ok(self.flags.lock().unwrap().get(tab_id).copied().unwrap_or(false))
    }

    async fn set(&self, tab_id: &TabId, supervised: bool) -> Result<()> {
        self.flags.lock().unwrap().insert(tab_id.clone(), supervised);
        Ok(())
    }

    async fn remove(&self, tab_id: &TabId) -> Result<()> {
        self.flags.lock().unwrap().remove(tab_id);
        Ok(())
    }
}

/// Single-file JSON store, one object keyed by tab id.
///
/// Reads and writes are not transactional; concurrent read-modify-write races
/// leave the file eventually consistent, which is all the flag map promises.
pub struct JsonFileFlagStore {
    path: PathBuf,
}

impl JsonFileFlagStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok(); // ensure folder exists
        }
        Self { path }
    }

    async fn read_map(&self) -> HashMap<String, bool> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).unwrap_or_default(),
            Err(_) => HashMap::new(),
        }
    }

    async fn write_map(&self, map: &HashMap<String, bool>) -> Result<()> {
        let data = serde_json::to_string_pretty(map)?;
        tokio::fs::write(&self.path, data).await?;
        Ok(())
    }
}

#[async_trait]
impl FlagStore for JsonFileFlagStore {
    async fn get(&self, tab_id: &TabId) -> Result<bool> {
        Ok(self.read_map().await.get(&tab_id.0).copied().unwrap_or(false))
    }

    async fn set(&self, tab_id: &TabId, supervised: bool) -> Result<()> {
        let mut map = self.read_map().await;
        map.insert(tab_id.0.clone(), supervised);
        self.write_map(&map).await
    }

    async fn remove(&self, tab_id: &TabId) -> Result<()> {
        let mut map = self.read_map().await;
        if map.remove(&tab_id.0).is_some() {
            self.write_map(&map).await?;
        }
        Ok(())
    }
}
