//! Content-addressed cache of optimization evaluations.
//!
//! Keys are derived from the serialized parameter set, so two evaluations
//! with identical settings always hit the same entry regardless of which
//! search (grid or genetic) produced them.

use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use anyhow::{Context, Result};

use crate::optimize::{OptimizationResult, ParamSet};

/// Stable cache key for a parameter set.
///
/// `ParamSet` is a BTreeMap, so its JSON form is deterministic and the
/// hash is too.
pub fn setting_key(setting: &ParamSet) -> String {
    let bytes = serde_json::to_vec(setting).expect("parameter set serializes");
    blake3::hash(&bytes).to_hex().to_string()
}

/// In-memory evaluation cache with an optional directory-backed store.
///
/// With a directory configured, every `put` also writes `<key>.json` and a
/// memory miss falls through to disk, so repeated optimization runs reuse
/// earlier evaluations.
#[derive(Debug, Default)]
pub struct EvalCache {
    entries: Mutex<HashMap<String, OptimizationResult>>,
    cache_dir: Option<PathBuf>,
}

impl EvalCache {
    /// Purely in-memory cache.
    pub fn new() -> Self {
        EvalCache::default()
    }

    /// Cache backed by `cache_dir`, created if missing.
    pub fn with_dir(cache_dir: impl Into<PathBuf>) -> Result<Self> {
        let cache_dir = cache_dir.into();
        fs::create_dir_all(&cache_dir)
            .with_context(|| format!("creating cache dir {}", cache_dir.display()))?;
        Ok(EvalCache {
            entries: Mutex::new(HashMap::new()),
            cache_dir: Some(cache_dir),
        })
    }

    fn entry_path(&self, key: &str) -> Option<PathBuf> {
        self.cache_dir.as_ref().map(|dir| dir.join(format!("{key}.json")))
    }

    pub fn contains(&self, setting: &ParamSet) -> bool {
        self.get(setting).is_some()
    }

    pub fn get(&self, setting: &ParamSet) -> Option<OptimizationResult> {
        let key = setting_key(setting);
        if let Some(result) = self.entries.lock().unwrap().get(&key) {
            return Some(result.clone());
        }

        let path = self.entry_path(&key)?;
        let bytes = fs::read(&path).ok()?;
        let result: OptimizationResult = serde_json::from_slice(&bytes).ok()?;
        self.entries
            .lock()
            .unwrap()
            .insert(key, result.clone());
        Some(result)
    }

    pub fn put(&self, setting: &ParamSet, result: OptimizationResult) -> Result<()> {
        let key = setting_key(setting);
        if let Some(path) = self.entry_path(&key) {
            let bytes = serde_json::to_vec_pretty(&result)
                .context("serializing cached evaluation")?;
            fs::write(&path, bytes)
                .with_context(|| format!("writing cache entry {}", path.display()))?;
        }
        self.entries.lock().unwrap().insert(key, result);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops all entries, on disk included.
    pub fn clear(&self) -> Result<()> {
        self.entries.lock().unwrap().clear();
        if let Some(dir) = &self.cache_dir {
            for entry in fs::read_dir(dir)
                .with_context(|| format!("reading cache dir {}", dir.display()))?
            {
                let path = entry?.path();
                if path.extension().is_some_and(|ext| ext == "json") {
                    fs::remove_file(&path)
                        .with_context(|| format!("removing {}", path.display()))?;
                }
            }
        }
        Ok(())
    }
}
