use anyhow::{Context, Result};
use std::{
    collections::BTreeMap,
    fs::File,
    io::BufReader,
    path::{Path, PathBuf},
    sync::Mutex,
};

// A small string key-value store for state that has to outlive the process
// (search history, résumé draft). Reads come from memory; writes go straight
// through to the backing storage.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
}

// Stores every key in a single pretty-printed json object on disk.
pub struct JsonFileStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}
impl JsonFileStore {
    // opens the store at the path, creating the parent folder if needed.
    // a missing file is treated as an empty store.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .context("Attempting to create the folder for the state file")?;
            }
        }

        let values = if path.exists() {
            let f = File::open(path).context("Attempting to open the json state file")?;
            let bf = BufReader::new(f);
            serde_json::from_reader(bf).context("Attempting to deserialize the json state file")?
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path: path.to_path_buf(),
            values: Mutex::new(values),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Option<String> {
        match self.values.lock() {
            Ok(values) => values.get(key).cloned(),
            Err(err) => {
                log::error!("State store lock was poisoned: {err}");
                None
            }
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut values = self
            .values
            .lock()
            .map_err(|err| anyhow::anyhow!("State store lock was poisoned: {err}"))?;
        values.insert(key.to_owned(), value.to_owned());

        let json = serde_json::to_string_pretty(&*values)
            .context("Attempting to serialize the state to json")?;
        std::fs::write(&self.path, json).context("Attempting to write the json state file")?;

        Ok(())
    }
}

// Volatile store used when the state file can't be opened.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<BTreeMap<String, String>>,
}
impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}
impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.lock().ok().and_then(|v| v.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.values
            .lock()
            .map_err(|err| anyhow::anyhow!("State store lock was poisoned: {err}"))?
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_store_writes_through_and_reads_back() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let store = JsonFileStore::open(&path).unwrap();
        assert_eq!(store.get("resume_draft"), None);
        store.set("resume_draft", "# Jane Doe").unwrap();
        assert_eq!(store.get("resume_draft").as_deref(), Some("# Jane Doe"));
        assert!(store.path().exists());

        let reopened = JsonFileStore::open(&path).unwrap();
        assert_eq!(reopened.get("resume_draft").as_deref(), Some("# Jane Doe"));
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(JsonFileStore::open(&path).is_err());
    }

    #[test]
    fn memory_store_overwrites() {
        let store = MemoryStore::new();
        store.set("k", "1").unwrap();
        store.set("k", "2").unwrap();
        assert_eq!(store.get("k").as_deref(), Some("2"));
    }
}
