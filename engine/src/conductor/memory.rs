//! Session memory: recall and store decisions
//!
//! Wraps the `MemoryStore` adapter for the coordinator. Recall lists a
//! session's records and condenses them into a plain-text summary; the
//! store decision asks the completion port whether the new input carries
//! anything worth keeping.

use crate::llm::{strip_thinking, CompletionPort};
use sdk::errors::EngineError;
use sdk::memory::MemoryStore;
use std::sync::Arc;

/// Reply meaning "nothing worth storing"; matched as a substring
const DO_NOT_STORE: &str = "00000";

const SUMMARY_SYSTEM_PROMPT: &str =
    "You condense conversation records into a short summary. Keep only the key facts.";

const STORE_SYSTEM_PROMPT: &str = "You decide whether a user message contains new \
information worth remembering for future requests.";

/// What recall found for a session
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecalledMemory {
    /// Raw contents of the records considered, oldest first
    pub contents: Vec<String>,
    /// Plain-text summary; `None` when there is nothing to recall
    pub summary: Option<String>,
}

/// Outcome of the store decision
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreDecision {
    Store(String),
    Skip(&'static str),
}

pub struct SessionMemory {
    port: Arc<dyn CompletionPort>,
    store: Arc<dyn MemoryStore>,
    max_recall_records: usize,
}

impl SessionMemory {
    pub fn new(
        port: Arc<dyn CompletionPort>,
        store: Arc<dyn MemoryStore>,
        max_recall_records: usize,
    ) -> Self {
        Self {
            port,
            store,
            max_recall_records: max_recall_records.max(1),
        }
    }

    pub fn store_adapter(&self) -> &Arc<dyn MemoryStore> {
        &self.store
    }

    /// List the session's most recent records and summarise them.
    ///
    /// Store failures are returned; a failed summary falls back to the raw
    /// contents joined by newlines.
    pub async fn recall(&self, session_id: &str) -> Result<RecalledMemory, EngineError> {
        let records = self.store.list(session_id).await?;
        let skip = records.len().saturating_sub(self.max_recall_records);
        let contents: Vec<String> = records.into_iter().skip(skip).map(|r| r.content).collect();

        if contents.is_empty() {
            return Ok(RecalledMemory::default());
        }

        let joined = contents.join("\n");
        let prompt = format!("Summarise these conversation records concisely:\n{}", joined);
        let summary = match self.port.complete_with_system(SUMMARY_SYSTEM_PROMPT, &prompt).await {
            Ok(text) if !strip_thinking(&text).is_empty() => strip_thinking(&text),
            Ok(_) => joined,
            Err(e) => {
                tracing::warn!("Memory summary failed, using raw records: {}", e);
                joined
            }
        };

        Ok(RecalledMemory {
            contents,
            summary: Some(summary),
        })
    }

    /// Decide whether `user_input` is worth persisting
    pub async fn decide_store(
        &self,
        user_input: &str,
        recalled: &RecalledMemory,
    ) -> Result<StoreDecision, EngineError> {
        if is_known(user_input, recalled) {
            return Ok(StoreDecision::Skip("already remembered"));
        }

        let prompt = format!(
            "user context = {}\nuser input = {}\n\n\
            TASK: Determine if the user input contains new information worth storing.\n\n\
            RULES:\n\
            - If the content already exists in the user context: return \"000000\"\n\
            - If the content is new but not meaningful for future requests: return \"000000\"\n\
            - If the content is new and meaningful: return ONLY the core content to store\n\
            - NO explanations, reasons, or any additional text\n\n\
            OUTPUT:",
            recalled.summary.as_deref().unwrap_or("(none)"),
            user_input
        );

        let reply = strip_thinking(&self.port.complete_with_system(STORE_SYSTEM_PROMPT, &prompt).await?);
        Ok(interpret_store_reply(&reply, user_input, recalled))
    }

    /// Persist `content` for the session
    pub async fn store(&self, session_id: &str, content: &str) -> Result<bool, EngineError> {
        self.store.store(session_id, content).await
    }
}

/// Apply the sentinel protocol and the local dedup rule to a model reply
pub fn interpret_store_reply(reply: &str, user_input: &str, recalled: &RecalledMemory) -> StoreDecision {
    if reply.contains(DO_NOT_STORE) {
        return StoreDecision::Skip("not worth storing");
    }

    let candidate = reply.trim().trim_matches('"').trim();
    let content = if candidate.is_empty() { user_input.trim() } else { candidate };

    if content.is_empty() {
        return StoreDecision::Skip("nothing to store");
    }
    if is_known(content, recalled) || is_known(user_input, recalled) {
        return StoreDecision::Skip("already remembered");
    }
    StoreDecision::Store(content.to_string())
}

/// True when `text` already appears verbatim in a record or the summary
fn is_known(text: &str, recalled: &RecalledMemory) -> bool {
    let needle = text.trim().to_lowercase();
    if needle.is_empty() {
        return false;
    }
    recalled
        .contents
        .iter()
        .any(|c| c.trim().to_lowercase() == needle)
        || recalled
            .summary
            .as_deref()
            .map_or(false, |s| s.to_lowercase().contains(&needle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Message;
    use crate::memory::InMemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Scripted {
        reply: Result<&'static str, ()>,
        calls: AtomicUsize,
    }

    impl Scripted {
        fn ok(reply: &'static str) -> Arc<Self> {
            Arc::new(Self { reply: Ok(reply), calls: AtomicUsize::new(0) })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self { reply: Err(()), calls: AtomicUsize::new(0) })
        }
    }

    #[async_trait]
    impl CompletionPort for Scripted {
        async fn complete_messages(&self, _messages: &[Message]) -> Result<String, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply
                .map(str::to_string)
                .map_err(|_| EngineError::Completion("offline".to_string()))
        }
    }

    fn recalled(contents: &[&str], summary: Option<&str>) -> RecalledMemory {
        RecalledMemory {
            contents: contents.iter().map(|s| s.to_string()).collect(),
            summary: summary.map(str::to_string),
        }
    }

    #[test]
    fn test_sentinel_means_skip() {
        let none = RecalledMemory::default();
        assert_eq!(
            interpret_store_reply("000000", "hello", &none),
            StoreDecision::Skip("not worth storing")
        );
        assert_eq!(
            interpret_store_reply("\"000000\"", "hello", &none),
            StoreDecision::Skip("not worth storing")
        );
    }

    #[test]
    fn test_candidate_is_stored_content() {
        let decision = interpret_store_reply(
            "\"I live in Seattle\"",
            "by the way I live in Seattle, what's the weather?",
            &RecalledMemory::default(),
        );
        assert_eq!(decision, StoreDecision::Store("I live in Seattle".to_string()));
    }

    #[test]
    fn test_empty_reply_falls_back_to_input() {
        let decision = interpret_store_reply("  ", "my dog is called Rex", &RecalledMemory::default());
        assert_eq!(decision, StoreDecision::Store("my dog is called Rex".to_string()));
    }

    #[test]
    fn test_dedup_against_records_and_summary() {
        let memory = recalled(&["I live in Seattle"], Some("The user lives in Seattle."));
        assert_eq!(
            interpret_store_reply("i live in seattle", "I live in Seattle", &memory),
            StoreDecision::Skip("already remembered")
        );

        let memory = recalled(&[], Some("User's favourite colour is green"));
        assert_eq!(
            interpret_store_reply("favourite colour is green", "x", &memory),
            StoreDecision::Skip("already remembered")
        );
    }

    #[tokio::test]
    async fn test_recall_empty_skips_summary() {
        let port = Scripted::ok("summary");
        let memory = SessionMemory::new(port.clone(), Arc::new(InMemoryStore::new()), 10);

        let recalled = memory.recall("alice").await.unwrap();
        assert_eq!(recalled, RecalledMemory::default());
        assert_eq!(port.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_recall_falls_back_to_raw_records() {
        let store = Arc::new(InMemoryStore::new());
        store.store("alice", "first").await.unwrap();
        store.store("alice", "second").await.unwrap();
        store.store("alice", "third").await.unwrap();

        let memory = SessionMemory::new(Scripted::failing(), store, 2);
        let recalled = memory.recall("alice").await.unwrap();
        assert_eq!(recalled.contents, vec!["second", "third"]);
        assert_eq!(recalled.summary.as_deref(), Some("second\nthird"));
    }

    #[tokio::test]
    async fn test_known_input_skips_completion() {
        let port = Scripted::ok("I live in Seattle");
        let memory = SessionMemory::new(port.clone(), Arc::new(InMemoryStore::new()), 10);

        let decision = memory
            .decide_store("I live in Seattle", &recalled(&["I live in Seattle"], None))
            .await
            .unwrap();
        assert_eq!(decision, StoreDecision::Skip("already remembered"));
        assert_eq!(port.calls.load(Ordering::SeqCst), 0);
    }
}
