//! Whole-document key-value persistence.
//!
//! Every Folio store (grants, folder owners, encryption markers) is one small
//! JSON document. A [`KeyValueStore`] loads the whole document, lets the caller
//! mutate it in memory under an exclusive lock, and replaces it atomically.
//! Readers never observe a partially written document.

use std::fs::{self, OpenOptions};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Default timeout for acquiring a document lock.
pub const LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// How often a contended lock is retried.
const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// A single document protected by an exclusive lock during read-modify-write.
pub trait KeyValueStore<T>: Send + Sync {
    /// Load the current document, or the default if none has been written.
    fn load(&self) -> Result<T>;

    /// Run `f` against the document while holding the exclusive lock.
    ///
    /// The document is saved only if `f` returns `Ok`.
    fn update<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut T) -> Result<R>;
}

/// Write `contents` next to `path` and rename it into place.
///
/// Creates parent directories if they don't exist.
pub fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let temp_path = path.with_extension("json.tmp");
    fs::write(&temp_path, contents)
        .with_context(|| format!("Failed to write temp file: {}", temp_path.display()))?;

    fs::rename(&temp_path, path).with_context(|| {
        format!(
            "Failed to rename temp file {} to {}",
            temp_path.display(),
            path.display()
        )
    })
}

/// JSON file document with an advisory lock on a sibling `.lock` file.
pub struct JsonFileStore<T> {
    path: PathBuf,
    lock_path: PathBuf,
    _doc: PhantomData<fn() -> T>,
}

impl<T> JsonFileStore<T> {
    /// Create a store persisting to `path`. Nothing is read until first use.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let lock_path = path.with_extension("lock");
        Self {
            path,
            lock_path,
            _doc: PhantomData,
        }
    }

    /// Path of the JSON document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Run `f` with the document path while holding the exclusive lock.
    ///
    /// Use this to remove or move the document itself. The `.lock` file
    /// stays in place so every process keeps locking the same inode.
    pub fn with_lock<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&Path) -> Result<R>,
    {
        let lock_file = self.acquire_lock()?;
        let result = f(&self.path);
        let _ = FileExt::unlock(&lock_file);
        result
    }

    fn acquire_lock(&self) -> Result<fs::File> {
        if let Some(parent) = self.lock_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
        }

        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&self.lock_path)
            .with_context(|| format!("Failed to open lock file: {}", self.lock_path.display()))?;

        let start = Instant::now();
        loop {
            match lock_file.try_lock_exclusive() {
                Ok(()) => return Ok(lock_file),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    if start.elapsed() > LOCK_TIMEOUT {
                        anyhow::bail!(
                            "Timed out waiting for lock on {} after {:?}",
                            self.path.display(),
                            LOCK_TIMEOUT
                        );
                    }
                    std::thread::sleep(LOCK_POLL_INTERVAL);
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("Failed to lock: {}", self.lock_path.display())
                    })
                }
            }
        }
    }
}

impl<T> KeyValueStore<T> for JsonFileStore<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    fn load(&self) -> Result<T> {
        if !self.path.exists() {
            tracing::debug!("Document not found at {:?}, starting empty", self.path);
            return Ok(T::default());
        }

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read document: {}", self.path.display()))?;
        if contents.trim().is_empty() {
            return Ok(T::default());
        }

        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse document: {}", self.path.display()))
    }

    fn update<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut T) -> Result<R>,
    {
        let lock_file = self.acquire_lock()?;

        let mut doc = self.load()?;
        let result = f(&mut doc)?;

        let contents = serde_json::to_vec_pretty(&doc)
            .with_context(|| format!("Failed to serialize document: {}", self.path.display()))?;
        write_atomic(&self.path, &contents)?;

        let _ = FileExt::unlock(&lock_file);
        tracing::debug!("Saved document {:?}", self.path);
        Ok(result)
    }
}

/// In-memory document with the same all-or-nothing update semantics.
#[derive(Default)]
pub struct MemoryStore<T> {
    doc: Mutex<T>,
}

impl<T> MemoryStore<T> {
    /// Create a store holding `doc`.
    pub fn new(doc: T) -> Self {
        Self {
            doc: Mutex::new(doc),
        }
    }
}

impl<T> KeyValueStore<T> for MemoryStore<T>
where
    T: Clone + Send,
{
    fn load(&self) -> Result<T> {
        let doc = self
            .doc
            .lock()
            .map_err(|_| anyhow::anyhow!("Failed to acquire lock on memory store"))?;
        Ok(doc.clone())
    }

    fn update<R, F>(&self, f: F) -> Result<R>
    where
        F: FnOnce(&mut T) -> Result<R>,
    {
        let mut doc = self
            .doc
            .lock()
            .map_err(|_| anyhow::anyhow!("Failed to acquire lock on memory store"))?;
        let mut working = doc.clone();
        let result = f(&mut working)?;
        *doc = working;
        Ok(result)
    }
}
