use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::constants::HISTORY_WINDOW;

#[derive(Debug, Clone)]
pub struct HistoryEntry {
    pub author: String,
    pub body: String,
}

/// Per-channel rolling window of recent exchanges, used only as prompt
/// context. Not authoritative: resets on restart, and dropping it loses
/// nothing that matters.
#[derive(Debug, Default)]
pub struct RollingHistory {
    inner: Mutex<HashMap<String, VecDeque<HistoryEntry>>>,
}

impl RollingHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, channel: &str, author: &str, body: &str) {
        let mut map = self.inner.lock().expect("history mutex poisoned");
        let window = map.entry(channel.to_string()).or_default();

        window.push_back(HistoryEntry {
            author: author.to_string(),
            body: body.to_string(),
        });

        while window.len() > HISTORY_WINDOW {
            window.pop_front();
        }
    }

    /// Last `count` entries joined oldest-first as `author: body` lines
    pub fn context(&self, channel: &str, count: usize) -> Option<String> {
        let map = self.inner.lock().expect("history mutex poisoned");
        let window = map.get(channel)?;

        if window.is_empty() {
            return None;
        }

        let skip = window.len().saturating_sub(count);
        let joined = window
            .iter()
            .skip(skip)
            .map(|entry| format!("{}: {}", entry.author, entry.body))
            .collect::<Vec<_>>()
            .join("\n");

        Some(joined)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_window_caps_at_limit() {
        let history = RollingHistory::new();
        for i in 0..50 {
            history.push("lounge", "someone", &format!("message {i}"));
        }

        let map = history.inner.lock().unwrap();
        assert_eq!(map.get("lounge").unwrap().len(), HISTORY_WINDOW);
        assert_eq!(map.get("lounge").unwrap().front().unwrap().body, "message 30");
    }

    #[test]
    fn test_context_is_oldest_first() {
        let history = RollingHistory::new();
        history.push("lounge", "a", "first");
        history.push("lounge", "b", "second");
        history.push("lounge", "c", "third");

        let context = history.context("lounge", 2).unwrap();
        assert_eq!(context, "b: second\nc: third");
    }

    #[test]
    fn test_unknown_channel_has_no_context() {
        let history = RollingHistory::new();
        assert!(history.context("nowhere", 5).is_none());
    }

    #[test]
    fn test_channels_are_independent() {
        let history = RollingHistory::new();
        history.push("lounge", "a", "hello");
        history.push("task-board", "b", "claiming");

        assert_eq!(history.context("lounge", 5).unwrap(), "a: hello");
        assert_eq!(history.context("task-board", 5).unwrap(), "b: claiming");
    }
}
