//! Where the client keeps its token and how it rewrites the address bar.

use std::sync::Mutex;

use url::Url;

/// Persistent token slot (browser local storage, a keyring file, ...).
pub trait TokenStorage: Send + Sync {
    fn load(&self) -> Option<String>;
    fn store(&self, token: &str);
    fn clear(&self);
}

/// Navigation history of the page.
pub trait History: Send + Sync {
    fn current(&self) -> Url;
    /// Replace the current entry without adding a new one.
    fn replace(&self, url: Url);
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    token: Mutex<Option<String>>,
}

impl MemoryStorage {
    pub fn new(token: Option<&str>) -> Self {
        Self {
            token: Mutex::new(token.map(str::to_string)),
        }
    }
}

impl TokenStorage for MemoryStorage {
    fn load(&self) -> Option<String> {
        self.token.lock().map(|t| t.clone()).unwrap_or_default()
    }

    fn store(&self, token: &str) {
        if let Ok(mut slot) = self.token.lock() {
            *slot = Some(token.to_string());
        }
    }

    fn clear(&self) {
        if let Ok(mut slot) = self.token.lock() {
            *slot = None;
        }
    }
}

/// In-memory history. `len` counts entries, so a replace never grows it.
#[derive(Debug)]
pub struct MemoryHistory {
    entries: Mutex<Vec<Url>>,
}

impl MemoryHistory {
    pub fn new(start: Url) -> Self {
        Self {
            entries: Mutex::new(vec![start]),
        }
    }

    /// Navigate to a new entry.
    pub fn push(&self, url: Url) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(url);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl History for MemoryHistory {
    fn current(&self) -> Url {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        // `new` seeds one entry and nothing removes entries.
        entries[entries.len() - 1].clone()
    }

    fn replace(&self, url: Url) {
        if let Ok(mut entries) = self.entries.lock() {
            if let Some(last) = entries.last_mut() {
                *last = url;
            }
        }
    }
}
