use anyhow::{Context, Result};
use directories::ProjectDirs;
#[cfg(test)]
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Arc;
#[cfg(test)]
use std::sync::Mutex;
use std::thread::{self, JoinHandle};

pub const TASKS_KEY: &str = "todos";
pub const EVENTS_KEY: &str = "calendar_events";
pub const COUNTERS_KEY: &str = "counters";

/// Durable key-value port the record store persists through.
///
/// A missing key is `Ok(None)`; callers treat it as an empty collection.
pub trait Storage: Send + Sync {
    fn load(&self, key: &str) -> Result<Option<String>>;
    fn save(&self, key: &str, payload: &str) -> Result<()>;
}

/// One YAML document per key inside a data directory.
#[derive(Debug, Clone)]
pub struct FileStorage {
    dir: PathBuf,
}

impl FileStorage {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        FileStorage { dir: dir.into() }
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.yml"))
    }
}

impl Storage for FileStorage {
    fn load(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let data = fs::read_to_string(&path).with_context(|| format!("reading {:?}", path))?;
        Ok(Some(data))
    }

    fn save(&self, key: &str, payload: &str) -> Result<()> {
        fs::create_dir_all(&self.dir).with_context(|| format!("creating {:?}", self.dir))?;
        let path = self.path_for(key);
        let tmp = path.with_extension("yml.tmp");
        fs::write(&tmp, payload).with_context(|| format!("writing {:?}", tmp))?;
        fs::rename(&tmp, &path).with_context(|| format!("replacing {:?}", path))?;
        Ok(())
    }
}

/// In-process storage for tests.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, String>>,
}

#[cfg(test)]
impl MemoryStorage {
    pub fn new() -> Self {
        MemoryStorage::default()
    }

    pub fn insert(&self, key: &str, payload: &str) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_string(), payload.to_string());
        }
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().ok()?.get(key).cloned()
    }
}

#[cfg(test)]
impl Storage for MemoryStorage {
    fn load(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("memory storage lock poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    fn save(&self, key: &str, payload: &str) -> Result<()> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("memory storage lock poisoned"))?;
        entries.insert(key.to_string(), payload.to_string());
        Ok(())
    }
}

enum WriteJob {
    Save { key: String, payload: String },
    Flush(Sender<()>),
}

/// Background writer that applies saves in submission order without
/// making the caller wait for the disk.
pub struct WriteBehind {
    tx: Option<Sender<WriteJob>>,
    worker: Option<JoinHandle<()>>,
}

impl WriteBehind {
    pub fn spawn(storage: Arc<dyn Storage>) -> Result<Self> {
        let (tx, rx) = mpsc::channel();
        let worker = thread::Builder::new()
            .name("daybook-writer".into())
            .spawn(move || run_writer(storage, rx))
            .context("spawning storage writer thread")?;
        Ok(WriteBehind {
            tx: Some(tx),
            worker: Some(worker),
        })
    }

    pub fn submit(&self, key: &str, payload: String) {
        let job = WriteJob::Save {
            key: key.to_string(),
            payload,
        };
        if let Some(tx) = &self.tx {
            if tx.send(job).is_err() {
                log::warn!("storage writer is gone; dropped write for `{key}`");
            }
        }
    }

    /// Blocks until every save submitted so far has been applied.
    pub fn flush(&self) {
        let Some(tx) = &self.tx else { return };
        let (done_tx, done_rx) = mpsc::channel();
        if tx.send(WriteJob::Flush(done_tx)).is_ok() {
            let _ = done_rx.recv();
        }
    }
}

impl Drop for WriteBehind {
    fn drop(&mut self) {
        drop(self.tx.take());
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::warn!("storage writer thread panicked");
            }
        }
    }
}

fn run_writer(storage: Arc<dyn Storage>, rx: Receiver<WriteJob>) {
    for job in rx {
        match job {
            WriteJob::Save { key, payload } => {
                if let Err(err) = storage.save(&key, &payload) {
                    log::warn!("failed to persist `{key}`: {err:#}");
                } else {
                    log::debug!("persisted `{key}` ({} bytes)", payload.len());
                }
            }
            WriteJob::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

pub fn default_data_dir() -> Result<PathBuf> {
    let dirs = ProjectDirs::from("", "", "daybook").context("locating data directory")?;
    Ok(dirs.data_dir().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_storage_missing_key_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path());
        assert!(storage.load(TASKS_KEY).unwrap().is_none());
    }

    #[test]
    fn file_storage_round_trips_payload() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("nested"));
        storage.save(EVENTS_KEY, "- a\n- b\n").unwrap();
        assert_eq!(
            storage.load(EVENTS_KEY).unwrap().as_deref(),
            Some("- a\n- b\n")
        );
        assert!(dir.path().join("nested/calendar_events.yml").exists());
        assert!(!dir.path().join("nested/calendar_events.yml.tmp").exists());
    }

    #[test]
    fn write_behind_applies_saves_in_order() {
        let storage = Arc::new(MemoryStorage::new());
        let writer = WriteBehind::spawn(storage.clone()).unwrap();
        for n in 0..50 {
            writer.submit(TASKS_KEY, n.to_string());
        }
        writer.flush();
        assert_eq!(storage.get(TASKS_KEY).as_deref(), Some("49"));
    }

    #[test]
    fn dropping_write_behind_drains_queue() {
        let storage = Arc::new(MemoryStorage::new());
        {
            let writer = WriteBehind::spawn(storage.clone()).unwrap();
            writer.submit(EVENTS_KEY, "last".into());
        }
        assert_eq!(storage.get(EVENTS_KEY).as_deref(), Some("last"));
    }
}
