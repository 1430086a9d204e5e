// Interactive chat flow: dispatcher and reducer wired to a session store

use crate::dispatcher::Dispatcher;
use crate::session::{upsert_session, ChatSession};
use crate::storage::{KvStore, StoreError};
use crate::types::{ImageAttachment, MessageRole, ProviderConfig, ProviderId};
use std::collections::HashMap;
use std::sync::Arc;

/// Drives one conversation: broadcasts prompts, settles results into the
/// session's threads and persists every visible step through the injected
/// store. The store and provider configurations arrive as parameters;
/// nothing here reads ambient state.
pub struct ChatController {
    dispatcher: Dispatcher,
    store: Arc<dyn KvStore>,
}

impl ChatController {
    pub fn new(store: Arc<dyn KvStore>) -> Self {
        Self::with_dispatcher(store, Dispatcher::new())
    }

    pub fn with_dispatcher(store: Arc<dyn KvStore>, dispatcher: Dispatcher) -> Self {
        ChatController { dispatcher, store }
    }

    /// Broadcast `prompt` to every configured provider and return the
    /// session once all columns have settled. The session with its
    /// pending placeholders is persisted before the first network call,
    /// so readers see the in-flight state.
    pub async fn send_prompt(
        &self,
        session: &ChatSession,
        configs: &[ProviderConfig],
        prompt: &str,
        image: Option<&ImageAttachment>,
    ) -> Result<ChatSession, StoreError> {
        if prompt.trim().is_empty() || configs.is_empty() {
            return Ok(session.clone());
        }
        let targets: Vec<ProviderId> = configs.iter().map(|c| c.id).collect();

        // Histories are cut before the new user turn is appended; the
        // prompt travels separately and must not appear twice.
        let mut history_by_provider = HashMap::new();
        for &id in &targets {
            history_by_provider.insert(id, session.state.history_for(id));
        }

        let session = session.with_title_from(prompt);
        let (state, generations) = session.state.begin_dispatch(prompt, &targets, image);
        let mut session = session.with_state(state);
        upsert_session(self.store.as_ref(), &session)?;

        let results = self
            .dispatcher
            .dispatch_prompt(prompt, configs, &history_by_provider, image)
            .await;

        let mut state = session.state.clone();
        for (&id, result) in &results {
            if let Some(&generation) = generations.get(&id) {
                state = state.apply_result(id, generation, result);
            }
        }
        session = session.with_state(state);
        upsert_session(self.store.as_ref(), &session)?;
        Ok(session)
    }

    /// Re-dispatch the most recent user message of one provider's thread.
    /// Other threads are untouched, and a concurrent broadcast does not
    /// cancel this call.
    pub async fn retry_last(
        &self,
        session: &ChatSession,
        config: &ProviderConfig,
    ) -> Result<ChatSession, StoreError> {
        let Some((state, generation, prompt)) = session.state.begin_retry(config.id) else {
            return Ok(session.clone());
        };

        let mut history = session.state.history_for(config.id);
        if let Some(idx) = history
            .iter()
            .rposition(|m| m.role == MessageRole::User && m.content == prompt)
        {
            history.truncate(idx);
        }

        let mut session = session.with_state(state);
        upsert_session(self.store.as_ref(), &session)?;

        let result = self.dispatcher.retry_provider(config, &prompt, &history).await;
        let state = session.state.apply_result(config.id, generation, &result);
        session = session.with_state(state);
        upsert_session(self.store.as_ref(), &session)?;
        Ok(session)
    }

    /// Drop every thread's messages. In-flight results become orphans and
    /// are discarded when they arrive.
    pub fn clear(&self, session: &ChatSession) -> Result<ChatSession, StoreError> {
        let session = session.with_state(session.state.clear_all());
        upsert_session(self.store.as_ref(), &session)?;
        Ok(session)
    }
}
