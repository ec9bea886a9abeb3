//! Per-run cache of URLs that were already processed or enqueued.

use std::collections::HashSet;
use std::sync::{Mutex, MutexGuard};

/// Thread-safe set of visited URLs.
///
/// One instance belongs to one crawl run and is shared by `Arc` between that
/// run's tasks. Every read-modify-write happens under the internal mutex.
#[derive(Debug, Default)]
pub struct VisitedSet {
    urls: Mutex<HashSet<String>>,
}

impl VisitedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `url` has been seen.
    pub fn contains(&self, url: &str) -> bool {
        self.lock().contains(url)
    }

    /// Mark `url` as seen. Adding a known URL is a no-op.
    pub fn add(&self, url: impl Into<String>) {
        self.lock().insert(url.into());
    }

    /// Mark `url` as seen and report whether it was new.
    ///
    /// Two tasks racing on the same URL get exactly one `true`.
    pub fn insert(&self, url: &str) -> bool {
        self.lock().insert(url.to_string())
    }

    pub fn size(&self) -> usize {
        self.lock().len()
    }

    // Poisoning is ignored: no critical section leaves the set half-updated.
    fn lock(&self) -> MutexGuard<'_, HashSet<String>> {
        self.urls.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<S: Into<String>> FromIterator<S> for VisitedSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            urls: Mutex::new(iter.into_iter().map(Into::into).collect()),
        }
    }
}
