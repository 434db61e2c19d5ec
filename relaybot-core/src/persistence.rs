//! src/persistence.rs
//!
//! Plugin state snapshots. The engine never looks inside a plugin's blob; it
//! only moves the bytes between plugins and a `SnapshotStore`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::Error;

/// Plugin name -> opaque state blob.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Snapshot {
    plugins: BTreeMap<String, Vec<u8>>,
}

impl Snapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, plugin: &str) -> Option<&[u8]> {
        self.plugins.get(plugin).map(|b| b.as_slice())
    }

    pub fn insert(&mut self, plugin: impl Into<String>, blob: Vec<u8>) {
        self.plugins.insert(plugin.into(), blob);
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.plugins.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

/// Somewhere snapshots can be kept between runs.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Returns an empty snapshot if nothing has been stored yet.
    async fn load(&self) -> Result<Snapshot, Error>;
    async fn save(&self, snapshot: &Snapshot) -> Result<(), Error>;
}

const STATE_FILE_VERSION: u32 = 1;

/// On-disk shape of the state file. Blobs are base64 so the file stays
/// valid, readable JSON whatever the plugins store.
#[derive(Debug, Default, Serialize, Deserialize)]
struct PluginStatesFile {
    version: u32,
    plugins: BTreeMap<String, String>,
}

/// Stores snapshots in a single JSON file.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn encode(snapshot: &Snapshot) -> Result<Vec<u8>, Error> {
        let file = PluginStatesFile {
            version: STATE_FILE_VERSION,
            plugins: snapshot
                .iter()
                .map(|(name, blob)| (name.to_string(), BASE64.encode(blob)))
                .collect(),
        };
        Ok(serde_json::to_vec_pretty(&file)?)
    }

    fn decode(bytes: &[u8]) -> Result<Snapshot, Error> {
        let file: PluginStatesFile = serde_json::from_slice(bytes)?;
        if file.version != STATE_FILE_VERSION {
            return Err(Error::Parse(format!(
                "unsupported state file version {}",
                file.version
            )));
        }
        let mut snapshot = Snapshot::new();
        for (name, encoded) in file.plugins {
            snapshot.insert(name, BASE64.decode(encoded.as_bytes())?);
        }
        Ok(snapshot)
    }
}

#[async_trait]
impl SnapshotStore for JsonFileStore {
    async fn load(&self) -> Result<Snapshot, Error> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                let snapshot = Self::decode(&bytes)?;
                info!("Loaded {} plugin state(s) from {:?}", snapshot.len(), self.path);
                Ok(snapshot)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No state file at {:?}, starting fresh", self.path);
                Ok(Snapshot::new())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, snapshot: &Snapshot) -> Result<(), Error> {
        let bytes = Self::encode(snapshot)?;
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        // Write-then-rename so a crash mid-write leaves the old file intact.
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        debug!("Saved {} plugin state(s) to {:?}", snapshot.len(), self.path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("none.json"));
        assert!(store.load().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_then_load_keeps_binary_blobs() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("nested/state.json"));

        let mut snap = Snapshot::new();
        snap.insert("trivia", br#"{"round":3}"#.to_vec());
        snap.insert("binary", vec![0, 159, 146, 150, 255]);
        snap.insert("empty", Vec::new());
        store.save(&snap).await.unwrap();

        let loaded = store.load().await.unwrap();
        assert_eq!(loaded, snap);
        assert_eq!(loaded.get("binary"), Some(&[0u8, 159, 146, 150, 255][..]));
    }

    #[tokio::test]
    async fn corrupted_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        tokio::fs::write(&path, b"not json").await.unwrap();
        let err = JsonFileStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, Error::Json(_)));
    }

    #[tokio::test]
    async fn unknown_version_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        tokio::fs::write(&path, br#"{"version":9,"plugins":{}}"#).await.unwrap();
        let err = JsonFileStore::new(&path).load().await.unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }
}
