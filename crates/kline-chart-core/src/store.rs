use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::StoreError;
use crate::instrument::Instrument;
use crate::tick::{Series, Tick};

/// Namespace under which series snapshots are stored.
pub const SERIES_NAMESPACE: &str = "series";

/// Storage key for an instrument's snapshot: `series:<instrument>`.
///
/// The interval is not part of the key, so every timeframe of an instrument
/// shares one slot.
pub fn series_key(instrument: Instrument) -> String {
    format!("{SERIES_NAMESPACE}:{}", instrument.id())
}

/// Namespaced string key-value storage. Keys have the form `namespace:name`.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Store a value, replacing any previous value for the key.
    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Remove a key. Removing a missing key is not an error.
    fn remove(&mut self, key: &str) -> Result<(), StoreError>;

    /// All keys in a namespace, sorted.
    fn keys(&self, namespace: &str) -> Result<Vec<String>, StoreError>;
}

fn split_key(key: &str) -> Result<(&str, &str), StoreError> {
    let valid = |part: &str| {
        !part.is_empty()
            && part != "."
            && part != ".."
            && !part.contains(['/', '\\', ':'])
    };
    match key.split_once(':') {
        Some((namespace, name)) if valid(namespace) && valid(name) => Ok((namespace, name)),
        _ => Err(StoreError::InvalidKey(key.to_string())),
    }
}

/// Filesystem-backed key-value store, one JSON file per key.
///
/// Directory layout: `{root}/{namespace}/{name}.json`
pub struct FileStore {
    data_dir: PathBuf,
}

impl FileStore {
    /// Create a store rooted at the given directory.
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            data_dir: data_dir.as_ref().to_path_buf(),
        }
    }

    /// Path of the file holding a key's value.
    pub fn file_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        let (namespace, name) = split_key(key)?;
        Ok(self.data_dir.join(namespace).join(format!("{name}.json")))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.file_path(key)?;
        match std::fs::read_to_string(&path) {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.file_path(key)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, value)?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        let path = self.file_path(key)?;
        match std::fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn keys(&self, namespace: &str) -> Result<Vec<String>, StoreError> {
        let dir = self.data_dir.join(namespace);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_file() {
                continue;
            }
            let file_name = entry.file_name();
            let name = file_name.to_string_lossy();
            if let Some(stem) = name.strip_suffix(".json") {
                keys.push(format!("{namespace}:{stem}"));
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// In-process key-value store with an optional size quota.
///
/// The quota counts key and value bytes across all entries.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
    quota: Option<usize>,
}

impl MemoryStore {
    /// Empty store without a quota.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store whose writes fail once keys and values exceed `limit` bytes.
    pub fn with_quota(limit: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            quota: Some(limit),
        }
    }

    fn used_bytes_without(&self, key: &str) -> usize {
        self.entries
            .iter()
            .filter(|(k, _)| k.as_str() != key)
            .map(|(k, v)| k.len() + v.len())
            .sum()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        split_key(key)?;
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), StoreError> {
        split_key(key)?;
        if let Some(limit) = self.quota {
            let needed = self.used_bytes_without(key) + key.len() + value.len();
            if needed > limit {
                return Err(StoreError::QuotaExceeded {
                    key: key.to_string(),
                    needed,
                    limit,
                });
            }
        }
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<(), StoreError> {
        split_key(key)?;
        self.entries.remove(key);
        Ok(())
    }

    fn keys(&self, namespace: &str) -> Result<Vec<String>, StoreError> {
        let prefix = format!("{namespace}:");
        Ok(self
            .entries
            .keys()
            .filter(|k| k.starts_with(&prefix))
            .cloned()
            .collect())
    }
}

/// Series snapshots keyed by instrument, serialized as a flat JSON array of ticks.
pub struct SeriesStore<K> {
    kv: K,
}

impl<K: KeyValueStore> SeriesStore<K> {
    /// Wrap a key-value store. Snapshots live under the `series` namespace.
    pub fn new(kv: K) -> Self {
        Self { kv }
    }

    /// Most recently saved series for the instrument, or an empty series.
    pub fn load(&self, instrument: Instrument) -> Result<Series, StoreError> {
        match self.kv.get(&series_key(instrument))? {
            Some(raw) => Ok(serde_json::from_str(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    /// Replace the instrument's snapshot with the full series.
    pub fn save(&mut self, instrument: Instrument, series: &[Tick]) -> Result<(), StoreError> {
        let raw = serde_json::to_string(series)?;
        self.kv.set(&series_key(instrument), &raw)
    }

    /// Delete the instrument's snapshot. Clearing a missing snapshot is not an error.
    pub fn clear(&mut self, instrument: Instrument) -> Result<(), StoreError> {
        self.kv.remove(&series_key(instrument))
    }

    /// Instruments with a saved snapshot. Keys that name no known instrument are skipped.
    pub fn stored_instruments(&self) -> Result<Vec<Instrument>, StoreError> {
        let prefix = format!("{SERIES_NAMESPACE}:");
        Ok(self
            .kv
            .keys(SERIES_NAMESPACE)?
            .iter()
            .filter_map(|key| key.strip_prefix(&prefix))
            .filter_map(|id| id.parse().ok())
            .collect())
    }

    /// The underlying key-value store.
    pub fn kv(&self) -> &K {
        &self.kv
    }

    /// Mutable access to the underlying key-value store.
    pub fn kv_mut(&mut self) -> &mut K {
        &mut self.kv
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tick(time: i64, close: f64) -> Tick {
        Tick {
            time,
            open: close - 1.0,
            high: close + 1.0,
            low: close - 2.0,
            close,
        }
    }

    #[test]
    fn series_key_format() {
        assert_eq!(series_key(Instrument::EthUsdt), "series:ethusdt");
        assert_eq!(series_key(Instrument::BnbUsdt), "series:bnbusdt");
    }

    #[test]
    fn file_path_format() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        let path = store.file_path("series:ethusdt").unwrap();
        assert_eq!(path, dir.path().join("series/ethusdt.json"));
    }

    #[test]
    fn invalid_keys_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        for key in ["ethusdt", "series:", ":ethusdt", "series:../x", "a:b:c", "series:.."] {
            assert!(
                matches!(store.file_path(key), Err(StoreError::InvalidKey(_))),
                "{key} should be rejected"
            );
        }
    }

    #[test]
    fn file_store_get_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        assert_eq!(store.get("series:ethusdt").unwrap(), None);
    }

    #[test]
    fn file_store_set_creates_directories_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::new(dir.path());

        store.set("series:ethusdt", "[1]").unwrap();
        assert!(dir.path().join("series").exists());
        store.set("series:ethusdt", "[2]").unwrap();

        assert_eq!(store.get("series:ethusdt").unwrap().as_deref(), Some("[2]"));
    }

    #[test]
    fn file_store_keys_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::new(dir.path());
        store.set("series:ethusdt", "[]").unwrap();
        store.set("series:bnbusdt", "[]").unwrap();
        store.set("other:x", "[]").unwrap();

        assert_eq!(
            store.keys("series").unwrap(),
            vec!["series:bnbusdt", "series:ethusdt"]
        );

        store.remove("series:ethusdt").unwrap();
        store.remove("series:ethusdt").unwrap();
        assert_eq!(store.keys("series").unwrap(), vec!["series:bnbusdt"]);
        assert!(store.keys("missing").unwrap().is_empty());
    }

    #[test]
    fn memory_store_quota() {
        let mut store = MemoryStore::with_quota(32);
        store.set("series:ethusdt", "0123456789").unwrap();
        // Replacing a value only counts the new size.
        store.set("series:ethusdt", "01234567890123").unwrap();

        let err = store.set("series:bnbusdt", "0123456789").unwrap_err();
        assert!(matches!(err, StoreError::QuotaExceeded { limit: 32, .. }));
        assert_eq!(store.get("series:bnbusdt").unwrap(), None);
    }

    #[test]
    fn memory_store_keys_filtered_by_namespace() {
        let mut store = MemoryStore::new();
        store.set("series:dotusdt", "[]").unwrap();
        store.set("prefs:theme", "dark").unwrap();
        assert_eq!(store.keys("series").unwrap(), vec!["series:dotusdt"]);
    }

    #[test]
    fn load_missing_is_empty() {
        let store = SeriesStore::new(MemoryStore::new());
        assert!(store.load(Instrument::EthUsdt).unwrap().is_empty());
    }

    #[test]
    fn save_then_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = SeriesStore::new(FileStore::new(dir.path()));
        let series = vec![tick(1000, 11.0), tick(61_000, 11.5), tick(121_000, 10.25)];

        store.save(Instrument::DotUsdt, &series).unwrap();
        assert_eq!(store.load(Instrument::DotUsdt).unwrap(), series);
    }

    #[test]
    fn save_replaces_previous_snapshot() {
        let mut store = SeriesStore::new(MemoryStore::new());
        store
            .save(Instrument::EthUsdt, &[tick(1, 1.0), tick(2, 2.0)])
            .unwrap();
        store.save(Instrument::EthUsdt, &[tick(3, 3.0)]).unwrap();
        assert_eq!(store.load(Instrument::EthUsdt).unwrap(), vec![tick(3, 3.0)]);
    }

    #[test]
    fn snapshot_is_flat_array() {
        let mut store = SeriesStore::new(MemoryStore::new());
        store.save(Instrument::BnbUsdt, &[tick(1000, 11.0)]).unwrap();

        let raw = store.kv().get("series:bnbusdt").unwrap().unwrap();
        let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(
            value,
            serde_json::json!([{"time": 1000, "open": 10.0, "high": 12.0, "low": 9.0, "close": 11.0}])
        );
    }

    #[test]
    fn corrupt_snapshot_is_an_error() {
        let mut store = SeriesStore::new(MemoryStore::new());
        store.kv_mut().set("series:ethusdt", "{not json").unwrap();
        assert!(matches!(
            store.load(Instrument::EthUsdt),
            Err(StoreError::Json(_))
        ));
    }

    #[test]
    fn stored_instruments_and_clear() {
        let mut store = SeriesStore::new(MemoryStore::new());
        store.save(Instrument::EthUsdt, &[tick(1, 1.0)]).unwrap();
        store.save(Instrument::DotUsdt, &[tick(1, 1.0)]).unwrap();
        store.kv_mut().set("series:btcusdt", "[]").unwrap();

        let mut stored = store.stored_instruments().unwrap();
        stored.sort_by_key(|i| i.id());
        assert_eq!(stored, vec![Instrument::DotUsdt, Instrument::EthUsdt]);

        store.clear(Instrument::EthUsdt).unwrap();
        assert!(store.load(Instrument::EthUsdt).unwrap().is_empty());
    }
}
