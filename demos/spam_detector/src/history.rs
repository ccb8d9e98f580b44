//! Per-user message history.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// How long a message is kept.
pub const RETENTION: Duration = Duration::from_secs(60 * 60);

#[derive(Debug, Clone)]
struct Entry {
    content: String,
    at: Instant,
}

/// Recent messages per user, pruned to [`RETENTION`] on every insert.
#[derive(Debug, Default)]
pub struct MessageHistory {
    users: Mutex<HashMap<String, Vec<Entry>>>,
}

impl MessageHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, user_id: &str, content: impl Into<String>, at: Instant) {
        let mut users = self.users.lock();
        let entries = users.entry(user_id.to_string()).or_default();
        entries.push(Entry {
            content: content.into(),
            at,
        });
        entries.retain(|e| at.saturating_duration_since(e.at) < RETENTION);
    }

    /// Messages of `user_id` younger than `window` at `now`, oldest first.
    pub fn recent(&self, user_id: &str, window: Duration, now: Instant) -> Vec<String> {
        self.users
            .lock()
            .get(user_id)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| now.saturating_duration_since(e.at) < window)
                    .map(|e| e.content.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The last `count` recorded messages of `user_id`, oldest first.
    pub fn last(&self, user_id: &str, count: usize) -> Vec<String> {
        self.users
            .lock()
            .get(user_id)
            .map(|entries| {
                let skip = entries.len().saturating_sub(count);
                entries[skip..].iter().map(|e| e.content.clone()).collect()
            })
            .unwrap_or_default()
    }

    pub fn user_count(&self) -> usize {
        self.users.lock().len()
    }

    pub fn clear(&self) {
        self.users.lock().clear();
    }
}
