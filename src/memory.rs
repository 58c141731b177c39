//! Conversation memory.
//!
//! In-memory history buffers behind one mutex. In shared mode every
//! request reads and writes the same buffer; in per-session mode buffers
//! are keyed by the session id a client sends, with a default bucket for
//! requests that send none. Buffers keep only the most recent turns.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::config::MemoryMode;

const SHARED_KEY: &str = "shared";
const DEFAULT_SESSION: &str = "default";

/// One completed question/answer exchange.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub question: String,
    pub answer: String,
}

#[derive(Clone)]
pub struct ConversationMemory {
    mode: MemoryMode,
    max_turns: usize,
    inner: Arc<Mutex<HashMap<String, Vec<Turn>>>>,
}

impl ConversationMemory {
    pub fn new(mode: MemoryMode, max_turns: usize) -> Self {
        Self {
            mode,
            max_turns: max_turns.max(1),
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    fn key(&self, session_id: Option<&str>) -> String {
        match self.mode {
            MemoryMode::Shared => SHARED_KEY.to_string(),
            MemoryMode::PerSession => session_id
                .map(str::trim)
                .filter(|id| !id.is_empty())
                .unwrap_or(DEFAULT_SESSION)
                .to_string(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Vec<Turn>>> {
        // Writers only push and drain under the lock; nothing panics
        // there, so recovering from poisoning is safe.
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Snapshot of the turns visible to this session, oldest first.
    pub fn history(&self, session_id: Option<&str>) -> Vec<Turn> {
        let key = self.key(session_id);
        let guard = self.lock();
        guard.get(&key).cloned().unwrap_or_default()
    }

    /// Appends a completed turn, dropping the oldest past the bound.
    pub fn record(&self, session_id: Option<&str>, question: &str, answer: &str) {
        let key = self.key(session_id);
        let mut guard = self.lock();
        let turns = guard.entry(key).or_default();
        turns.push(Turn {
            question: question.to_string(),
            answer: answer.to_string(),
        });
        if turns.len() > self.max_turns {
            let excess = turns.len() - self.max_turns;
            turns.drain(..excess);
        }
    }
}
