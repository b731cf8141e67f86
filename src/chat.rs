//! Question answering over a document, with per-session memory.

use std::sync::PoisonError;

use crate::generate::{variables, vars, Generator, PromptKind};
use crate::session::{Role, SessionStore};
use crate::{Error, Result, RetryPolicy};

/// Answers questions about a text, remembering earlier turns per session.
///
/// ```rust,ignore
/// let chat = Conversation::new(generator, MemorySessionStore::default());
/// let answer = chat.ask("user-42", &transcript, "Who owns the follow-ups?").await?;
/// ```
#[derive(Debug)]
pub struct Conversation<G, S> {
    generator: G,
    store: S,
    retry: RetryPolicy,
}

impl<G: Generator, S: SessionStore> Conversation<G, S> {
    /// Create a conversation with the default retry policy.
    pub fn new(generator: G, store: S) -> Self {
        Self {
            generator,
            store,
            retry: RetryPolicy::default(),
        }
    }

    /// Use a different retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The session store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Answer `question` about `text` in the context of `session_id`.
    ///
    /// On success the question and answer are appended to the session's
    /// history. A failed call leaves the history unchanged.
    ///
    /// # Errors
    ///
    /// - [`Error::EmptyInput`] if `text` or `question` is blank
    /// - any generation error
    pub async fn ask(&self, session_id: &str, text: &str, question: &str) -> Result<String> {
        if text.trim().is_empty() || question.trim().is_empty() {
            return Err(Error::EmptyInput);
        }

        let handle = self.store.get_or_create(session_id);
        let history = handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .render();

        let vars = variables([
            (vars::TEXT, text.to_string()),
            (vars::HISTORY, history),
            (vars::QUESTION, question.to_string()),
        ]);
        let answer = self
            .retry
            .generate(&self.generator, PromptKind::Answer, &vars)
            .await?;

        let mut history = handle.lock().unwrap_or_else(PoisonError::into_inner);
        history.push(Role::User, question);
        history.push(Role::Assistant, answer.clone());
        tracing::debug!(session = session_id, turns = history.len(), "answered");

        Ok(answer)
    }
}
