use super::store::{KeyValueStore, ListRecord, RecordFilter, RecordKey, StoreError};
use crate::ring::VirtualNodeId;

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

const RECORD_EXTENSION: &str = "json";

/// Durable table laid out as `<root>/<virtual node>/<list uuid>.json`.
///
/// Records are read from disk on demand. Files are replaced through a rename so a
/// crash never leaves a half-written record behind.
#[derive(Debug)]
pub struct DiskStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl DiskStore {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        tracing::info!("Opened disk store at {}", root.display());
        Ok(Self {
            root,
            write_lock: Mutex::new(()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, key: &RecordKey) -> PathBuf {
        self.root
            .join(key.virtual_node.to_string())
            .join(format!("{}.{}", key.list_uuid, RECORD_EXTENSION))
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn read_record(path: &Path) -> Result<Option<ListRecord>, StoreError> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write_record(&self, record: &ListRecord) -> Result<(), StoreError> {
        let path = self.record_path(&record.key());
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let tmp = path.with_extension(format!("tmp-{}", rand::random::<u32>()));
        fs::write(&tmp, serde_json::to_vec(record)?)?;
        fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove_record(&self, key: &RecordKey) -> Result<bool, StoreError> {
        match fs::remove_file(self.record_path(key)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Parses `<vnode>/<uuid>.json` back into a key.
    fn key_from_path(&self, path: &Path) -> Result<RecordKey, StoreError> {
        let corrupt = || StoreError::CorruptKey(path.display().to_string());
        let stem = path.file_stem().and_then(|s| s.to_str()).ok_or_else(corrupt)?;
        let dir = path
            .parent()
            .and_then(Path::file_name)
            .and_then(|s| s.to_str())
            .ok_or_else(corrupt)?;
        let virtual_node: VirtualNodeId = dir.parse().map_err(|_| corrupt())?;
        let list_uuid = Uuid::parse_str(stem).map_err(|_| corrupt())?;
        Ok(RecordKey::new(virtual_node, list_uuid))
    }

    fn record_files(&self) -> Result<Vec<PathBuf>, StoreError> {
        let mut files = Vec::new();
        for dir in fs::read_dir(&self.root)? {
            let dir = dir?.path();
            if !dir.is_dir() {
                continue;
            }
            for file in fs::read_dir(&dir)? {
                let file = file?.path();
                if file.extension().and_then(|e| e.to_str()) == Some(RECORD_EXTENSION) {
                    files.push(file);
                }
            }
        }
        Ok(files)
    }
}

impl KeyValueStore for DiskStore {
    fn get(&self, key: &RecordKey) -> Result<Option<ListRecord>, StoreError> {
        Self::read_record(&self.record_path(key))
    }

    fn put(&self, record: ListRecord) -> Result<(), StoreError> {
        let _guard = self.lock();
        self.write_record(&record)
    }

    fn delete(&self, key: &RecordKey) -> Result<bool, StoreError> {
        let _guard = self.lock();
        self.remove_record(key)
    }

    fn scan(&self, filter: RecordFilter<'_>) -> Result<Vec<ListRecord>, StoreError> {
        let mut records = Vec::new();
        for path in self.record_files()? {
            let key = match self.key_from_path(&path) {
                Ok(key) => key,
                Err(e) => {
                    tracing::warn!("Skipping stray file: {}", e);
                    continue;
                }
            };
            // Removed between listing and reading.
            let Some(record) = Self::read_record(&path)? else {
                continue;
            };
            if record.key() != key {
                return Err(StoreError::CorruptKey(path.display().to_string()));
            }
            if filter(&record) {
                records.push(record);
            }
        }
        Ok(records)
    }

    fn update(
        &self,
        key: &RecordKey,
        change: &mut dyn FnMut(Option<ListRecord>) -> Option<ListRecord>,
    ) -> Result<Option<ListRecord>, StoreError> {
        let _guard = self.lock();
        let current = Self::read_record(&self.record_path(key))?;
        let existed = current.is_some();
        match change(current) {
            Some(next) => {
                self.write_record(&next)?;
                Ok(Some(next))
            }
            None => {
                if existed {
                    self.remove_record(key)?;
                }
                Ok(None)
            }
        }
    }
}
