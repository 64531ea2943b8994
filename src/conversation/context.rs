//! Rolling 24-hour conversation windows, one per contact, used as model context.
//!
//! A window is never trimmed: once it is older than [`WINDOW_TTL_MS`] it is
//! dropped whole and the next message opens a fresh one. Expiry is a lazy sweep
//! run once per inbound message, so a quiet contact keeps its stale window on
//! disk until some other message arrives.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::store::{load_or_init, write_snapshot};
use crate::error::StoreError;

pub const CONTEXT_FILE: &str = "context.json";

/// 24 hours.
pub const WINDOW_TTL_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    Bot,
}

impl Speaker {
    const fn label(self) -> &'static str {
        match self {
            Self::User => "User",
            Self::Bot => "Bot",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub author: Speaker,
    pub text: String,
    /// Epoch millis.
    pub time: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationWindow {
    /// Epoch millis at which the window was opened.
    pub start: i64,
    #[serde(default)]
    pub history: Vec<Turn>,
}

impl ConversationWindow {
    pub const fn is_expired(&self, now: i64) -> bool {
        now.saturating_sub(self.start) > WINDOW_TTL_MS
    }
}

/// Owns every contact's window and the file that backs them.
#[derive(Debug)]
pub struct ContextWindows {
    path: PathBuf,
    windows: BTreeMap<String, ConversationWindow>,
}

impl ContextWindows {
    pub fn open(state_dir: &Path) -> Result<Self, StoreError> {
        let path = state_dir.join(CONTEXT_FILE);
        let windows = load_or_init(&path)?;
        Ok(Self { path, windows })
    }

    /// Append a turn, first replacing a missing or expired window with a fresh one.
    pub fn append(&mut self, id: &str, speaker: Speaker, text: &str, now: i64) -> Result<(), StoreError> {
        let window = self
            .windows
            .entry(id.to_string())
            .or_insert_with(|| ConversationWindow {
                start: now,
                history: Vec::new(),
            });
        if window.is_expired(now) {
            *window = ConversationWindow {
                start: now,
                history: Vec::new(),
            };
        }
        window.history.push(Turn {
            author: speaker,
            text: text.to_string(),
            time: now,
        });
        self.persist()
    }

    /// Speaker-labelled transcript, oldest first. Empty when there is no window.
    pub fn render(&self, id: &str) -> String {
        let Some(window) = self.windows.get(id) else {
            return String::new();
        };
        window
            .history
            .iter()
            .map(|turn| format!("{}: {}", turn.author.label(), turn.text))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Drop every window older than the TTL. Persists once, only if something went.
    pub fn expire_stale(&mut self, now: i64) -> Result<usize, StoreError> {
        let before = self.windows.len();
        self.windows.retain(|_, w| !w.is_expired(now));
        let removed = before - self.windows.len();
        if removed > 0 {
            self.persist()?;
        }
        Ok(removed)
    }

    pub fn clear(&mut self, id: &str) -> Result<(), StoreError> {
        if self.windows.remove(id).is_some() {
            self.persist()?;
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&ConversationWindow> {
        self.windows.get(id)
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    fn persist(&self) -> Result<(), StoreError> {
        write_snapshot(&self.path, &self.windows)
    }
}
