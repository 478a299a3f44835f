//! Storage trait and implementations

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::{BatchOp, KvError, Result};

type Map = BTreeMap<Vec<u8>, Vec<u8>>;

pub trait Storage: Send + Sync {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// All entries whose key starts with `prefix`, in key order.
    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;

    /// Apply every op or none of them.
    fn apply(&mut self, ops: &[BatchOp]) -> Result<()>;
}

fn apply_to_map(map: &mut Map, ops: &[BatchOp]) {
    for op in ops {
        match op {
            BatchOp::Put { key, value } => {
                map.insert(key.clone(), value.clone());
            }
            BatchOp::Delete { key } => {
                map.remove(key);
            }
        }
    }
}

fn scan_map(map: &Map, prefix: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
    map.range(prefix.to_vec()..)
        .take_while(|(k, _)| k.starts_with(prefix))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn poisoned() -> KvError {
    KvError::Storage("storage lock poisoned".into())
}

/// In-memory storage (for testing and demos).
///
/// Clones share the same underlying map.
#[derive(Clone, Default)]
pub struct InMemoryStorage {
    data: Arc<RwLock<Map>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.read().map(|d| d.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Storage for InMemoryStorage {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let data = self.data.read().map_err(|_| poisoned())?;
        Ok(data.get(key).cloned())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let data = self.data.read().map_err(|_| poisoned())?;
        Ok(scan_map(&data, prefix))
    }

    fn apply(&mut self, ops: &[BatchOp]) -> Result<()> {
        let mut data = self.data.write().map_err(|_| poisoned())?;
        apply_to_map(&mut data, ops);
        Ok(())
    }
}

/// Snapshot-per-commit file storage.
///
/// Every `apply` rewrites the whole snapshot to a temp file and renames it over
/// the previous one, so a crash leaves either the old or the new state on disk.
pub struct FileBackedStorage {
    path: PathBuf,
    data: Map,
}

impl FileBackedStorage {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let data = if path.exists() {
            let bytes = fs::read(&path)?;
            let entries: Vec<(Vec<u8>, Vec<u8>)> = bincode::deserialize(&bytes)
                .map_err(|e| KvError::Serialization(e.to_string()))?;
            entries.into_iter().collect()
        } else {
            Map::new()
        };
        Ok(Self { path, data })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, data: &Map) -> Result<()> {
        let entries: Vec<(&Vec<u8>, &Vec<u8>)> = data.iter().collect();
        let bytes = bincode::serialize(&entries).map_err(|e| KvError::Serialization(e.to_string()))?;

        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, bytes)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl Storage for FileBackedStorage {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.data.get(key).cloned())
    }

    fn scan_prefix(&self, prefix: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        Ok(scan_map(&self.data, prefix))
    }

    fn apply(&mut self, ops: &[BatchOp]) -> Result<()> {
        let mut next = self.data.clone();
        apply_to_map(&mut next, ops);
        self.persist(&next)?;
        self.data = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_prefix_stops_at_prefix_boundary() {
        let mut s = InMemoryStorage::new();
        s.apply(&[
            BatchOp::Put { key: b"a:1".to_vec(), value: b"x".to_vec() },
            BatchOp::Put { key: b"a:2".to_vec(), value: b"y".to_vec() },
            BatchOp::Put { key: b"b:1".to_vec(), value: b"z".to_vec() },
        ])
        .unwrap();

        let hits = s.scan_prefix(b"a:").unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0, b"a:1".to_vec());
    }

    #[test]
    fn clones_share_data() {
        let mut s = InMemoryStorage::new();
        let view = s.clone();
        s.apply(&[BatchOp::Put { key: b"k".to_vec(), value: b"v".to_vec() }]).unwrap();
        assert_eq!(view.get(b"k").unwrap(), Some(b"v".to_vec()));
    }
}
