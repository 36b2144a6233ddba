//! Persistent storage for reading-progress records.
//!
//! The loader only sees the [`ProgressStore`] trait; the bundled
//! implementation keeps one JSON document per profile, replaced atomically
//! on every write.

use std::collections::HashMap;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::anyhow;
use async_trait::async_trait;
use directories::ProjectDirs;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::types::BookId;

use super::Result;

const APP_QUALIFIER: &str = "com";
const APP_ORGANISATION: &str = "BookView";
const APP_NAME: &str = "bookview";

/// One book's saved position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressRecord {
    pub current_page: u32,
    pub total_pages: u32,
    pub percentage: u8,
    pub last_read_ms: u64,
}

impl ProgressRecord {
    pub fn new(current_page: u32, total_pages: u32) -> Self {
        let percentage = if total_pages == 0 {
            0
        } else {
            ((current_page as u64 * 100) / total_pages as u64).min(100) as u8
        };
        Self { current_page, total_pages, percentage, last_read_ms: now_ms() }
    }
}

/// Progress persistence as seen by the page loader.
#[async_trait]
pub trait ProgressStore: Send + Sync + std::fmt::Debug {
    async fn save(&self, book: &BookId, current_page: u32, total_pages: u32) -> Result<()>;
    async fn load(&self, book: &BookId) -> Result<Option<ProgressRecord>>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ProgressFile {
    entries: HashMap<String, ProgressRecord>,
}

/// File-backed store keeping every book's position in a single JSON file.
#[derive(Debug)]
pub struct JsonProgressStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonProgressStore {
    /// Store rooted at the platform data directory.
    pub fn open_default() -> Result<Self> {
        let dir = ProjectDirs::from(APP_QUALIFIER, APP_ORGANISATION, APP_NAME)
            .map(|dirs| dirs.data_dir().join("state"))
            .ok_or_else(|| anyhow!("unable to resolve application data directory"))?;
        Ok(Self::with_path(dir.join("progress.json")))
    }

    /// Store backed by an explicit file path. Parent directories are
    /// created on first write.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: Mutex::new(()) }
    }

    fn read_file(&self) -> Result<ProgressFile> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(ProgressFile::default()),
            Err(err) => Err(err.into()),
        }
    }

    fn write_file(&self, file: &ProgressFile) -> Result<()> {
        let Some(parent) = self.path.parent() else {
            return Err(anyhow!(
                "progress path {} does not have a parent directory",
                self.path.display()
            ));
        };

        fs::create_dir_all(parent)?;
        let data = serde_json::to_vec_pretty(file)?;
        let mut temp = NamedTempFile::new_in(parent)?;
        temp.write_all(&data)?;
        temp.flush()?;
        match temp.persist(&self.path) {
            Ok(_) => Ok(()),
            Err(err) => {
                if err.error.kind() == io::ErrorKind::AlreadyExists {
                    if let Err(remove_err) = fs::remove_file(&self.path) {
                        if remove_err.kind() != io::ErrorKind::NotFound {
                            return Err(remove_err.into());
                        }
                    }
                    err.file
                        .persist(&self.path)
                        .map(|_| ())
                        .map_err(|persist_err| persist_err.error.into())
                } else {
                    Err(err.error.into())
                }
            }
        }
    }
}

#[async_trait]
impl ProgressStore for JsonProgressStore {
    async fn save(&self, book: &BookId, current_page: u32, total_pages: u32) -> Result<()> {
        let _guard = self.lock.lock();
        let mut file = self.read_file()?;
        file.entries
            .insert(book.as_str().to_string(), ProgressRecord::new(current_page, total_pages));
        self.write_file(&file)
    }

    async fn load(&self, book: &BookId) -> Result<Option<ProgressRecord>> {
        let _guard = self.lock.lock();
        let file = self.read_file()?;
        Ok(file.entries.get(book.as_str()).cloned())
    }
}

fn now_ms() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_and_reads_progress() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonProgressStore::with_path(dir.path().join("progress.json"));
        let book = BookId::new("demo");

        store.save(&book, 42, 120).await.expect("save progress");

        let record = store.load(&book).await.expect("load progress").expect("record present");
        assert_eq!(record.current_page, 42);
        assert_eq!(record.total_pages, 120);
        assert_eq!(record.percentage, 35);
    }

    #[tokio::test]
    async fn missing_book_returns_none() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonProgressStore::with_path(dir.path().join("progress.json"));

        let record = store.load(&BookId::new("unknown")).await.expect("load");
        assert!(record.is_none());
    }

    #[tokio::test]
    async fn later_saves_overwrite_earlier_ones() {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = JsonProgressStore::with_path(dir.path().join("progress.json"));
        let book = BookId::new("demo");

        store.save(&book, 5, 100).await.unwrap();
        store.save(&book, 9, 100).await.unwrap();

        let record = store.load(&book).await.unwrap().unwrap();
        assert_eq!(record.current_page, 9);
    }
}
