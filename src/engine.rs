// engine.rs
use crate::page::Page;
use std::path::PathBuf;

pub type DownloadId = u64;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownloadRequest {
    pub id: DownloadId,
    pub suggested_filename: String,
    pub url: String,
}

/// Lifecycle notifications the engine reports back to the chrome.
#[derive(Clone, Debug, PartialEq)]
pub enum EngineEvent {
    LoadStarted,
    UrlChanged(String),
    LoadProgress(u8),
    LoadFinished { ok: bool, title: String },
    DownloadRequested(DownloadRequest),
    DownloadFinished { id: DownloadId, path: PathBuf },
    DownloadFailed { id: DownloadId, error: String },
}

/// The embedded view. Everything behind this trait belongs to the engine.
pub trait Engine {
    fn load(&mut self, url: &str);
    fn back(&mut self);
    fn forward(&mut self);
    fn reload(&mut self);
    /// Drains pending events without blocking.
    fn poll_events(&mut self) -> Vec<EngineEvent>;
    /// `None` rejects the download.
    fn resolve_download(&mut self, id: DownloadId, path: Option<PathBuf>);
    fn page(&self) -> Option<&Page>;
}

/// Back/forward list.
#[derive(Debug, Default)]
pub struct History {
    entries: Vec<String>,
    index: usize,
    /// Entry whose document is on screen.
    committed: usize,
}

impl History {
    pub fn current(&self) -> Option<&str> {
        self.entries.get(self.index).map(String::as_str)
    }

    /// A fresh navigation drops any forward entries.
    pub fn push(&mut self, url: &str) {
        if self.entries.is_empty() {
            self.entries.push(url.to_string());
            self.index = 0;
            self.committed = 0;
            return;
        }
        if self.current() == Some(url) {
            return;
        }
        self.entries.truncate(self.index + 1);
        self.committed = self.committed.min(self.index);
        self.entries.push(url.to_string());
        self.index = self.entries.len() - 1;
    }

    /// Redirects rewrite the current entry instead of adding one.
    pub fn replace_current(&mut self, url: &str) {
        match self.entries.get_mut(self.index) {
            Some(entry) => *entry = url.to_string(),
            None => self.push(url),
        }
    }

    /// The current entry's document has arrived.
    pub fn commit(&mut self) {
        self.committed = self.index;
    }

    /// Forgets the current entry and returns to the one still on screen,
    /// e.g. when a navigation turned into a download.
    pub fn pop_current(&mut self) {
        if self.index >= self.entries.len() {
            return;
        }
        self.entries.remove(self.index);
        if self.committed > self.index {
            self.committed -= 1;
        }
        self.index = self.committed.min(self.entries.len().saturating_sub(1));
        self.committed = self.index;
    }

    pub fn back(&mut self) -> Option<&str> {
        if self.index == 0 || self.entries.is_empty() {
            return None;
        }
        self.index -= 1;
        self.current()
    }

    pub fn forward(&mut self) -> Option<&str> {
        if self.index + 1 >= self.entries.len() {
            return None;
        }
        self.index += 1;
        self.current()
    }
}
