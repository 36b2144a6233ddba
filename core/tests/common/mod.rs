//! Shared fixtures: an in-memory storage provider, scriptable identity,
//! and a recording progress store.
#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgba};
use parking_lot::Mutex;

use bookview_core::Result;
use bookview_core::config::ViewerConfig;
use bookview_core::fetch::{FetchError, Identity, PageSource};
use bookview_core::store::{ProgressRecord, ProgressStore};
use bookview_core::types::{Book, BookId, PageKey};

pub fn png_bytes() -> Bytes {
    let buffer: ImageBuffer<Rgba<u8>, Vec<u8>> =
        ImageBuffer::from_pixel(2, 2, Rgba([120, 60, 30, 255]));
    let mut cursor = Cursor::new(Vec::new());
    DynamicImage::ImageRgba8(buffer)
        .write_to(&mut cursor, ImageFormat::Png)
        .expect("encode fixture png");
    Bytes::from(cursor.into_inner())
}

pub fn book(pages: u32) -> Book {
    let listing = (1..=pages)
        .map(|n| (PageKey::new(format!("key-{n}")), format!("{n:03}.png")))
        .collect();
    Book::new(BookId::new("test-book"), "Test Book", listing)
}

pub fn key(page: u32) -> PageKey {
    PageKey::new(format!("key-{page}"))
}

/// Test config with a short progress debounce.
pub fn config() -> ViewerConfig {
    let mut config = ViewerConfig::default();
    config.loader.save_debounce = Duration::from_millis(150);
    config
}

/// Storage provider serving one fixture image, with optional per-key
/// delays and a list of tokens it rejects as expired.
#[derive(Debug)]
pub struct ScriptedSource {
    png: Bytes,
    delays: HashMap<String, Duration>,
    rejected_tokens: Vec<String>,
    calls: Mutex<HashMap<String, usize>>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self {
            png: png_bytes(),
            delays: HashMap::new(),
            rejected_tokens: Vec::new(),
            calls: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_delay(mut self, page: u32, delay: Duration) -> Self {
        self.delays.insert(key(page).as_str().to_string(), delay);
        self
    }

    pub fn with_rejected_token(mut self, token: &str) -> Self {
        self.rejected_tokens.push(token.to_string());
        self
    }

    pub fn calls_for(&self, page: u32) -> usize {
        self.calls.lock().get(key(page).as_str()).copied().unwrap_or(0)
    }
}

#[async_trait]
impl PageSource for ScriptedSource {
    async fn fetch_bytes(&self, page: &PageKey, token: &str) -> std::result::Result<Bytes, FetchError> {
        *self.calls.lock().entry(page.as_str().to_string()).or_insert(0) += 1;

        if self.rejected_tokens.iter().any(|rejected| rejected == token) {
            return Err(FetchError::AuthExpired);
        }
        if let Some(delay) = self.delays.get(page.as_str()) {
            tokio::time::sleep(*delay).await;
        }
        Ok(self.png.clone())
    }
}

/// Identity provider whose refresh swaps in a scripted next token.
#[derive(Debug)]
pub struct ScriptedIdentity {
    token: Mutex<Option<String>>,
    refresh_to: Option<String>,
    refreshes: AtomicUsize,
}

impl ScriptedIdentity {
    pub fn with_token(token: &str) -> Self {
        Self {
            token: Mutex::new(Some(token.to_string())),
            refresh_to: None,
            refreshes: AtomicUsize::new(0),
        }
    }

    pub fn refreshing_to(mut self, token: &str) -> Self {
        self.refresh_to = Some(token.to_string());
        self
    }

    pub fn refresh_count(&self) -> usize {
        self.refreshes.load(Ordering::SeqCst)
    }

    /// Out-of-band re-authentication, as a sign-in flow would perform.
    pub fn set_token(&self, token: &str) {
        *self.token.lock() = Some(token.to_string());
    }
}

#[async_trait]
impl Identity for ScriptedIdentity {
    fn access_token(&self) -> Option<String> {
        self.token.lock().clone()
    }

    async fn refresh(&self) -> bool {
        self.refreshes.fetch_add(1, Ordering::SeqCst);
        match &self.refresh_to {
            Some(next) => {
                *self.token.lock() = Some(next.clone());
                true
            }
            None => false,
        }
    }
}

/// Progress store keeping records in memory and counting writes.
#[derive(Debug, Default)]
pub struct MemoryProgress {
    saves: AtomicUsize,
    records: Mutex<HashMap<String, ProgressRecord>>,
}

impl MemoryProgress {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seeded(book: &BookId, current_page: u32, total_pages: u32) -> Self {
        let store = Self::default();
        store
            .records
            .lock()
            .insert(book.as_str().to_string(), ProgressRecord::new(current_page, total_pages));
        store
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn saved_page(&self, book: &BookId) -> Option<u32> {
        self.records.lock().get(book.as_str()).map(|record| record.current_page)
    }
}

#[async_trait]
impl ProgressStore for MemoryProgress {
    async fn save(&self, book: &BookId, current_page: u32, total_pages: u32) -> Result<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.records
            .lock()
            .insert(book.as_str().to_string(), ProgressRecord::new(current_page, total_pages));
        Ok(())
    }

    async fn load(&self, book: &BookId) -> Result<Option<ProgressRecord>> {
        Ok(self.records.lock().get(book.as_str()).cloned())
    }
}

/// Bundle the usual collaborators for a loader test.
pub fn collaborators(
    source: ScriptedSource,
    identity: ScriptedIdentity,
    progress: MemoryProgress,
) -> (Arc<ScriptedSource>, Arc<ScriptedIdentity>, Arc<MemoryProgress>) {
    (Arc::new(source), Arc::new(identity), Arc::new(progress))
}
