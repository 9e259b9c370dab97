use anyhow::Result;
use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::warn;

use super::layout::{read_json, write_json_atomic, Library};

lazy_static! {
    /// One lock per `index.json`, shared by every `Library` pointing at it
    static ref INDEX_LOCKS: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>> = Mutex::new(HashMap::new());
}

fn index_lock(library: &Library) -> Arc<Mutex<()>> {
    let mut locks = INDEX_LOCKS.lock().unwrap_or_else(|p| p.into_inner());
    Arc::clone(locks.entry(library.index_path()).or_default())
}

/// Display name to comic hash mapping persisted in `index.json`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ComicIndex {
    entries: BTreeMap<String, String>,
}

impl ComicIndex {
    /// Load the index. A missing or unreadable file yields an empty index.
    pub fn load(library: &Library) -> Self {
        let path = library.index_path();
        if !path.exists() {
            return Self::default();
        }
        match read_json(&path) {
            Ok(index) => index,
            Err(e) => {
                warn!("Ignoring unreadable comic index: {:#}", e);
                Self::default()
            }
        }
    }

    pub fn save(&self, library: &Library) -> Result<()> {
        write_json_atomic(&library.index_path(), self)
    }

    /// Load, modify and save the index while holding its lock.
    ///
    /// The file is only rewritten when `f` changed the mapping.
    pub fn update<R>(library: &Library, f: impl FnOnce(&mut ComicIndex) -> R) -> Result<R> {
        let lock = index_lock(library);
        let _guard = lock.lock().unwrap_or_else(|p| p.into_inner());

        let mut index = Self::load(library);
        let before = index.clone();
        let result = f(&mut index);
        if index != before {
            index.save(library)?;
        }
        Ok(result)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries.get(name).map(String::as_str)
    }

    pub fn insert(&mut self, name: impl Into<String>, hash: impl Into<String>) {
        self.entries.insert(name.into(), hash.into());
    }

    /// Drop every name pointing at `hash`; returns how many were removed
    pub fn remove_hash(&mut self, hash: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, h| h != hash);
        before - self.entries.len()
    }

    /// Point `new_name` at `hash` instead of its previous names
    pub fn rename_hash(&mut self, hash: &str, new_name: &str) {
        self.remove_hash(hash);
        self.insert(new_name, hash);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
