use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, path::Path};
use store_api::Fields;
use tokio::fs;

/// On-disk form of every collection held by a [`crate::MemoryStore`].
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    #[serde(default)]
    pub collections: BTreeMap<String, BTreeMap<String, Fields>>,
}

/// Read a snapshot file. A missing file yields an empty snapshot.
pub async fn load(path: &Path) -> Result<Snapshot> {
    match fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .with_context(|| format!("invalid snapshot file {}", path.display())),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Snapshot::default()),
        Err(e) => Err(e).with_context(|| format!("failed to read {}", path.display())),
    }
}

/// Write a snapshot, creating parent directories as needed.
pub async fn save(path: &Path, snapshot: &Snapshot) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).await?;
    }
    let bytes = serde_json::to_vec_pretty(snapshot)?;
    fs::write(path, bytes).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let snap = load(&dir.path().join("none.json")).await.unwrap();
        assert!(snap.collections.is_empty());
    }

    #[tokio::test]
    async fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("docs.json");
        let mut snap = Snapshot::default();
        let fields = store_api::to_fields(&json!({"email": "a@x.org"})).unwrap();
        snap.collections
            .entry("users".into())
            .or_default()
            .insert("u1".into(), fields);
        save(&path, &snap).await.unwrap();
        assert_eq!(load(&path).await.unwrap(), snap);
    }

    #[tokio::test]
    async fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docs.json");
        std::fs::write(&path, b"{not json").unwrap();
        assert!(load(&path).await.is_err());
    }
}
