//! JSON persistence for corpus snapshots.

use std::path::Path;

use tracing::info;

use super::store::{CorpusSnapshot, CorpusStore, StorageError, StorageResult};
use super::types::EmbeddingVersion;

/// Write the store's current contents to `path` as pretty JSON.
pub fn save_corpus(store: &CorpusStore, path: &Path) -> StorageResult<()> {
    let snapshot = store.snapshot()?;
    let json = serde_json::to_string_pretty(&snapshot)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, json)?;
    info!(
        path = %path.display(),
        chunks = snapshot.chunks.len(),
        version = %snapshot.version,
        "Saved corpus snapshot"
    );
    Ok(())
}

/// Load a snapshot written by [`save_corpus`].
///
/// Returns `Ok(None)` when the file does not exist. A snapshot built with a
/// different embedding version is rejected.
pub fn load_corpus(
    path: &Path,
    expected: &EmbeddingVersion,
    dedup_similarity: f64,
) -> StorageResult<Option<CorpusStore>> {
    if !path.exists() {
        return Ok(None);
    }
    let json = std::fs::read_to_string(path)?;
    let snapshot: CorpusSnapshot =
        serde_json::from_str(&json).map_err(|e| StorageError::Serialization(e.to_string()))?;
    let store = CorpusStore::from_snapshot(snapshot, expected, dedup_similarity)?;
    info!(path = %path.display(), chunks = store.len()?, "Loaded corpus snapshot");
    Ok(Some(store))
}

/// Load a snapshot, or start an empty store when none exists yet.
pub fn load_or_create_corpus(
    path: &Path,
    version: &EmbeddingVersion,
    dedup_similarity: f64,
) -> StorageResult<CorpusStore> {
    match load_corpus(path, version, dedup_similarity)? {
        Some(store) => Ok(store),
        None => Ok(CorpusStore::with_dedup_similarity(
            version.clone(),
            dedup_similarity,
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::types::Chunk;

    fn store_with_one_chunk() -> CorpusStore {
        let version = EmbeddingVersion::new("m", 2);
        let store = CorpusStore::new(version.clone());
        store
            .upsert(vec![Chunk {
                chunk_id: Chunk::chunk_id_for("s", 0),
                source_id: "s".into(),
                race_id: "r".into(),
                candidate_ref: None,
                issue_tags: Default::default(),
                text: "hello".into(),
                vector: vec![1.0, 0.0],
                position_index: 0,
                embedding_version: version,
            }])
            .unwrap();
        store
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("corpus.json");
        let store = store_with_one_chunk();

        save_corpus(&store, &path).unwrap();
        let loaded = load_corpus(&path, store.version(), 0.97).unwrap().unwrap();
        assert_eq!(loaded.len().unwrap(), 1);
        assert_eq!(loaded.snapshot().unwrap().chunks, store.snapshot().unwrap().chunks);
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let version = EmbeddingVersion::new("m", 2);
        assert!(load_corpus(&path, &version, 0.97).unwrap().is_none());
        let fresh = load_or_create_corpus(&path, &version, 0.97).unwrap();
        assert!(fresh.is_empty().unwrap());
    }

    #[test]
    fn test_load_rejects_other_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.json");
        save_corpus(&store_with_one_chunk(), &path).unwrap();

        let other = EmbeddingVersion::new("m2", 2);
        assert!(matches!(
            load_corpus(&path, &other, 0.97),
            Err(StorageError::VersionMismatch { .. })
        ));
    }

    #[test]
    fn test_corrupt_file_is_serialization_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.json");
        std::fs::write(&path, "{not json").unwrap();
        let version = EmbeddingVersion::new("m", 2);
        assert!(matches!(
            load_corpus(&path, &version, 0.97),
            Err(StorageError::Serialization(_))
        ));
    }
}
