// Conversation state reducer: per-provider threads, generation-tagged placeholders

use crate::types::{
    HistoryMessage, ImageAttachment, Message, MessageRole, MessageStatus, NormalizedResult,
    ProviderId, ProviderThread,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-provider message timelines for one conversation. Values, not
/// shared state: every reducer function takes the prior state by
/// reference and returns a new one, so callers can rely on the old value
/// staying intact while results race in.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatState {
    pub threads: HashMap<ProviderId, ProviderThread>,
}

impl ChatState {
    pub fn new(providers: &[ProviderId]) -> Self {
        let threads = providers
            .iter()
            .map(|&id| (id, ProviderThread::new(id)))
            .collect();
        ChatState { threads }
    }

    pub fn thread(&self, id: ProviderId) -> Option<&ProviderThread> {
        self.threads.get(&id)
    }

    /// Prior turns for an adapter call: user messages and settled
    /// assistant replies. Pending placeholders and errored replies carry
    /// no conversational content and are skipped.
    pub fn history_for(&self, id: ProviderId) -> Vec<HistoryMessage> {
        let Some(thread) = self.threads.get(&id) else {
            return Vec::new();
        };
        thread
            .messages
            .iter()
            .filter(|m| m.status == MessageStatus::Success)
            .map(|m| HistoryMessage {
                role: m.role,
                content: m.text.clone(),
            })
            .collect()
    }

    /// Record a broadcast: per targeted provider, append the user message
    /// (attachment only where the provider can use it) and a pending
    /// assistant placeholder under a freshly bumped generation. Returns
    /// the new state and each thread's dispatch generation; results must
    /// be applied with the matching generation.
    pub fn begin_dispatch(
        &self,
        prompt: &str,
        providers: &[ProviderId],
        image: Option<&ImageAttachment>,
    ) -> (ChatState, HashMap<ProviderId, u64>) {
        if prompt.trim().is_empty() {
            return (self.clone(), HashMap::new());
        }

        let mut next = self.clone();
        let mut generations = HashMap::new();

        for &id in providers {
            let thread = next.threads.entry(id).or_insert_with(|| ProviderThread::new(id));
            thread.generation += 1;
            let image = image.filter(|_| id.supports_images()).cloned();
            thread.messages.push(Message::user(prompt, image));
            thread
                .messages
                .push(Message::pending_assistant(id, thread.generation));
            generations.insert(id, thread.generation);
        }

        (next, generations)
    }

    /// Settle one provider's result into its thread. Scans from the end
    /// for the most recent pending assistant placeholder of the given
    /// generation and replaces it in place (same id, same position). A
    /// result with no matching placeholder (thread cleared mid-flight, or
    /// superseded by a newer dispatch) is discarded silently.
    pub fn apply_result(
        &self,
        provider: ProviderId,
        generation: u64,
        result: &NormalizedResult,
    ) -> ChatState {
        let mut next = self.clone();
        let Some(thread) = next.threads.get_mut(&provider) else {
            return next;
        };
        let Some(idx) = thread.messages.iter().rposition(|m| {
            m.role == MessageRole::Assistant
                && m.status == MessageStatus::Pending
                && m.generation == Some(generation)
        }) else {
            return next;
        };

        let message = &mut thread.messages[idx];
        message.text = result.text.clone();
        message.status = if result.success {
            MessageStatus::Success
        } else {
            MessageStatus::Error
        };
        message.error = result.error.clone();
        message.latency_ms = Some(result.latency_ms);

        next
    }

    /// Record a single-provider retry: a fresh pending placeholder under a
    /// bumped generation. Returns the new state, the generation to apply
    /// the result with, and the prompt to re-send (the thread's most
    /// recent user message). `None` when there is nothing to retry.
    pub fn begin_retry(&self, provider: ProviderId) -> Option<(ChatState, u64, String)> {
        let mut next = self.clone();
        let thread = next.threads.get_mut(&provider)?;
        let prompt = thread
            .messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)?
            .text
            .clone();

        thread.generation += 1;
        let generation = thread.generation;
        thread
            .messages
            .push(Message::pending_assistant(provider, generation));

        Some((next, generation, prompt))
    }

    /// Drop one thread's messages. The generation bump makes any
    /// in-flight result for the cleared dispatch an orphan, discarded on
    /// arrival.
    pub fn clear_thread(&self, provider: ProviderId) -> ChatState {
        let mut next = self.clone();
        if let Some(thread) = next.threads.get_mut(&provider) {
            thread.messages.clear();
            thread.generation += 1;
        }
        next
    }

    pub fn clear_all(&self) -> ChatState {
        let mut next = self.clone();
        for thread in next.threads.values_mut() {
            thread.messages.clear();
            thread.generation += 1;
        }
        next
    }

    /// Plain-text transcript, one section per provider column in the
    /// fixed provider order.
    pub fn transcript_text(&self) -> String {
        let mut lines = Vec::new();
        for id in ProviderId::ALL {
            let Some(thread) = self.threads.get(&id) else {
                continue;
            };
            lines.push(format!("# {} ({})", id.display_name(), id.as_str()));
            for message in &thread.messages {
                let speaker = if message.role == MessageRole::User {
                    "User"
                } else {
                    "AI"
                };
                lines.push(format!("{}: {}", speaker, message.text));
            }
            lines.push(String::new());
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_provider_state() -> ChatState {
        ChatState::new(&[ProviderId::Openai, ProviderId::Gemini])
    }

    #[test]
    fn begin_dispatch_appends_user_message_and_placeholder() {
        let state = two_provider_state();
        let (next, generations) =
            state.begin_dispatch("2+2?", &[ProviderId::Openai, ProviderId::Gemini], None);

        for id in [ProviderId::Openai, ProviderId::Gemini] {
            let thread = next.thread(id).unwrap();
            assert_eq!(thread.messages.len(), 2);
            assert_eq!(thread.messages[0].role, MessageRole::User);
            assert_eq!(thread.messages[0].text, "2+2?");
            assert_eq!(thread.messages[1].status, MessageStatus::Pending);
            assert_eq!(thread.messages[1].generation, Some(generations[&id]));
        }
        // Prior state untouched.
        assert!(state.thread(ProviderId::Openai).unwrap().messages.is_empty());
    }

    #[test]
    fn image_rides_only_on_multimodal_providers() {
        let state = ChatState::new(&[ProviderId::Openai, ProviderId::Zai]);
        let image = ImageAttachment {
            data_url: "data:image/png;base64,aGVsbG8=".to_string(),
            mime_type: None,
        };
        let (next, _) = state.begin_dispatch(
            "look",
            &[ProviderId::Openai, ProviderId::Zai],
            Some(&image),
        );

        assert!(next.thread(ProviderId::Openai).unwrap().messages[0]
            .image
            .is_some());
        assert!(next.thread(ProviderId::Zai).unwrap().messages[0]
            .image
            .is_none());
    }

    #[test]
    fn apply_result_settles_the_exact_placeholder() {
        let state = two_provider_state();
        let (state, generations) =
            state.begin_dispatch("2+2?", &[ProviderId::Openai, ProviderId::Gemini], None);
        let placeholder_id = state.thread(ProviderId::Openai).unwrap().messages[1].id;

        let next = state.apply_result(
            ProviderId::Openai,
            generations[&ProviderId::Openai],
            &NormalizedResult::ok("4", 120),
        );

        let settled = &next.thread(ProviderId::Openai).unwrap().messages[1];
        assert_eq!(settled.id, placeholder_id);
        assert_eq!(settled.status, MessageStatus::Success);
        assert_eq!(settled.text, "4");
        assert_eq!(settled.latency_ms, Some(120));
        // The other provider's placeholder is untouched.
        assert_eq!(
            next.thread(ProviderId::Gemini).unwrap().messages[1].status,
            MessageStatus::Pending
        );
    }

    #[test]
    fn apply_result_records_errors_as_terminal_state() {
        let state = two_provider_state();
        let (state, generations) = state.begin_dispatch("2+2?", &[ProviderId::Openai], None);

        let next = state.apply_result(
            ProviderId::Openai,
            generations[&ProviderId::Openai],
            &NormalizedResult::failure("rate limited", 300),
        );

        let settled = &next.thread(ProviderId::Openai).unwrap().messages[1];
        assert_eq!(settled.status, MessageStatus::Error);
        assert_eq!(settled.text, "");
        assert_eq!(settled.error.as_deref(), Some("rate limited"));
    }

    #[test]
    fn apply_result_is_commutative_across_providers() {
        let state = two_provider_state();
        let (state, generations) =
            state.begin_dispatch("2+2?", &[ProviderId::Openai, ProviderId::Gemini], None);
        let openai = NormalizedResult::ok("4", 10);
        let gemini = NormalizedResult::ok("four", 20);

        let ab = state
            .apply_result(ProviderId::Openai, generations[&ProviderId::Openai], &openai)
            .apply_result(ProviderId::Gemini, generations[&ProviderId::Gemini], &gemini);
        let ba = state
            .apply_result(ProviderId::Gemini, generations[&ProviderId::Gemini], &gemini)
            .apply_result(ProviderId::Openai, generations[&ProviderId::Openai], &openai);

        for id in [ProviderId::Openai, ProviderId::Gemini] {
            assert_eq!(
                ab.thread(id).unwrap().messages[1].text,
                ba.thread(id).unwrap().messages[1].text
            );
        }
    }

    #[test]
    fn orphaned_result_is_discarded_silently() {
        let state = two_provider_state();
        let (state, generations) = state.begin_dispatch("2+2?", &[ProviderId::Openai], None);
        let cleared = state.clear_thread(ProviderId::Openai);

        let next = cleared.apply_result(
            ProviderId::Openai,
            generations[&ProviderId::Openai],
            &NormalizedResult::ok("4", 10),
        );
        assert!(next.thread(ProviderId::Openai).unwrap().messages.is_empty());

        // A provider with no thread at all is equally harmless.
        let next = state.apply_result(ProviderId::Anthropic, 1, &NormalizedResult::ok("4", 10));
        assert!(next.thread(ProviderId::Anthropic).is_none());
    }

    #[test]
    fn stale_generation_result_cannot_reach_a_newer_placeholder() {
        let state = two_provider_state();
        let (state, first_gen) = state.begin_dispatch("first", &[ProviderId::Openai], None);
        let (state, second_gen) = state.begin_dispatch("second", &[ProviderId::Openai], None);
        assert_ne!(first_gen[&ProviderId::Openai], second_gen[&ProviderId::Openai]);

        // The late result of the first dispatch settles its own
        // placeholder, not the second's.
        let next = state.apply_result(
            ProviderId::Openai,
            first_gen[&ProviderId::Openai],
            &NormalizedResult::failure("request cancelled", 5),
        );
        let messages = &next.thread(ProviderId::Openai).unwrap().messages;
        assert_eq!(messages[1].status, MessageStatus::Error);
        assert_eq!(messages[3].status, MessageStatus::Pending);

        // And once its placeholder is gone, a replay of the stale
        // generation changes nothing.
        let replay = next.apply_result(
            ProviderId::Openai,
            first_gen[&ProviderId::Openai],
            &NormalizedResult::ok("too late", 5),
        );
        assert_eq!(replay.thread(ProviderId::Openai).unwrap().messages[1].text, "");
    }

    #[test]
    fn begin_retry_reuses_the_last_user_message() {
        let state = two_provider_state();
        let (state, generations) = state.begin_dispatch("2+2?", &[ProviderId::Openai], None);
        let state = state.apply_result(
            ProviderId::Openai,
            generations[&ProviderId::Openai],
            &NormalizedResult::failure("boom", 10),
        );

        let (next, generation, prompt) = state.begin_retry(ProviderId::Openai).unwrap();
        assert_eq!(prompt, "2+2?");
        assert!(generation > generations[&ProviderId::Openai]);

        let messages = &next.thread(ProviderId::Openai).unwrap().messages;
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[2].status, MessageStatus::Pending);
        // The failed placeholder stays terminal; retry never revives it.
        assert_eq!(messages[1].status, MessageStatus::Error);
    }

    #[test]
    fn begin_retry_on_an_empty_thread_is_none() {
        let state = two_provider_state();
        assert!(state.begin_retry(ProviderId::Openai).is_none());
        assert!(state.begin_retry(ProviderId::Anthropic).is_none());
    }

    #[test]
    fn history_excludes_pending_and_errored_messages() {
        let state = two_provider_state();
        let (state, generations) = state.begin_dispatch("first", &[ProviderId::Openai], None);
        let state = state.apply_result(
            ProviderId::Openai,
            generations[&ProviderId::Openai],
            &NormalizedResult::ok("one", 10),
        );
        let (state, _) = state.begin_dispatch("second", &[ProviderId::Openai], None);

        let history = state.history_for(ProviderId::Openai);
        let contents: Vec<_> = history.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "one", "second"]);
    }

    #[test]
    fn transcript_renders_columns_in_provider_order() {
        let state = two_provider_state();
        let (state, generations) =
            state.begin_dispatch("2+2?", &[ProviderId::Openai, ProviderId::Gemini], None);
        let state = state.apply_result(
            ProviderId::Openai,
            generations[&ProviderId::Openai],
            &NormalizedResult::ok("4", 10),
        );

        let transcript = state.transcript_text();
        let openai_at = transcript.find("# OpenAI (openai)").unwrap();
        let gemini_at = transcript.find("# Gemini (gemini)").unwrap();
        assert!(openai_at < gemini_at);
        assert!(transcript.contains("User: 2+2?"));
        assert!(transcript.contains("AI: 4"));
    }
}
