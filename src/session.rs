// Chat sessions: the persisted envelope around a conversation

use crate::conversation::ChatState;
use crate::storage::KvStore;
use crate::types::ProviderId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const SESSIONS_KEY: &str = "sessions";
const ACTIVE_SESSION_KEY: &str = "sessions:active";
const DEFAULT_TITLE: &str = "New Chat";
const TITLE_MAX_CHARS: usize = 40;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatSession {
    pub id: Uuid,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub providers: Vec<ProviderId>,
    pub state: ChatState,
}

impl ChatSession {
    pub fn new(providers: &[ProviderId]) -> Self {
        let now = Utc::now();
        ChatSession {
            id: Uuid::new_v4(),
            title: DEFAULT_TITLE.to_string(),
            created_at: now,
            updated_at: now,
            providers: providers.to_vec(),
            state: ChatState::new(providers),
        }
    }

    /// Adopt the first prompt as the title, truncated to 40 characters.
    /// Sessions already renamed keep their title.
    pub fn with_title_from(&self, prompt: &str) -> ChatSession {
        if self.title != DEFAULT_TITLE {
            return self.clone();
        }
        let trimmed = prompt.trim();
        let mut title: String = trimmed.chars().take(TITLE_MAX_CHARS).collect();
        if trimmed.chars().count() > TITLE_MAX_CHARS {
            title.push('…');
        }
        ChatSession {
            title,
            ..self.clone()
        }
    }

    pub fn with_state(&self, state: ChatState) -> ChatSession {
        ChatSession {
            state,
            updated_at: Utc::now(),
            ..self.clone()
        }
    }
}

/// How well a session matches a search query: number of messages whose
/// text contains it.
fn match_score(session: &ChatSession, query: &str) -> usize {
    session
        .state
        .threads
        .values()
        .flat_map(|t| t.messages.iter())
        .filter(|m| m.text.to_lowercase().contains(query))
        .count()
}

/// Case-insensitive full-text search over sessions, best matches first.
pub fn search_sessions<'a>(
    sessions: &'a [ChatSession],
    query: &str,
) -> Vec<(&'a ChatSession, usize)> {
    let query = query.trim().to_lowercase();
    if query.is_empty() {
        return Vec::new();
    }
    let mut results: Vec<_> = sessions
        .iter()
        .map(|s| (s, match_score(s, &query)))
        .filter(|(_, score)| *score > 0)
        .collect();
    results.sort_by(|a, b| b.1.cmp(&a.1));
    results.truncate(50);
    results
}

/// Load all sessions from the store; a missing or corrupt blob is an
/// empty list, never an error.
pub fn load_sessions(store: &dyn KvStore) -> Vec<ChatSession> {
    store
        .get(SESSIONS_KEY)
        .and_then(|value| serde_json::from_value(value).ok())
        .unwrap_or_default()
}

/// Insert or replace a session (most recent first) and mark it active.
pub fn upsert_session(
    store: &dyn KvStore,
    session: &ChatSession,
) -> Result<(), crate::storage::StoreError> {
    let mut sessions = load_sessions(store);
    match sessions.iter().position(|s| s.id == session.id) {
        Some(idx) => sessions[idx] = session.clone(),
        None => sessions.insert(0, session.clone()),
    }
    store.set(SESSIONS_KEY, serde_json::to_value(&sessions)?)?;
    store.set(ACTIVE_SESSION_KEY, serde_json::to_value(session.id)?)?;
    Ok(())
}

pub fn active_session(store: &dyn KvStore) -> Option<ChatSession> {
    let id: Uuid = store
        .get(ACTIVE_SESSION_KEY)
        .and_then(|value| serde_json::from_value(value).ok())?;
    load_sessions(store).into_iter().find(|s| s.id == id)
}
