//! The generation client seam.
//!
//! The pipeline only needs a function from (prompt kind, variables) to
//! generated text. It never sees prompt wording: that lives in
//! [`PromptTemplates`], which [`TemplateGenerator`] renders before handing
//! the prompt to a raw [`Completion`] backend.
//!
//! ```text
//! pipeline ──(kind, vars)──> Generator
//!                              │
//!                  TemplateGenerator: render template
//!                              │
//!                         Completion::complete(prompt) ──> model
//! ```
//!
//! Tests implement [`Generator`] directly with deterministic stubs.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Variable names the pipeline fills in.
pub mod vars {
    /// The text to summarize (a chunk, or the next chunk when refining).
    pub const CONTEXT: &str = "context";
    /// Newline-joined summaries for a reduce call.
    pub const DOCS: &str = "docs";
    /// The running summary when refining.
    pub const EXISTING_ANSWER: &str = "existing_answer";
    /// Document text for a chat answer.
    pub const TEXT: &str = "text";
    /// Rendered conversation history for a chat answer.
    pub const HISTORY: &str = "history";
    /// The user's question for a chat answer.
    pub const QUESTION: &str = "question";
}

/// Template variables, keyed by name.
pub type Variables = BTreeMap<String, String>;

/// Build [`Variables`] from name/value pairs.
///
/// ```rust
/// use precis::generate::{variables, vars};
///
/// let v = variables([(vars::CONTEXT, "some text".to_string())]);
/// assert_eq!(v["context"], "some text");
/// ```
pub fn variables<const N: usize>(pairs: [(&str, String); N]) -> Variables {
    pairs
        .into_iter()
        .map(|(name, value)| (name.to_string(), value))
        .collect()
}

/// Which prompt a generation call is for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromptKind {
    /// Summarize one chunk. Uses `context`.
    SummarizeChunk,
    /// Combine summaries into one. Uses `docs`.
    Reduce,
    /// First refine step. Uses `context`.
    RefineInitial,
    /// Fold the next chunk into the running summary. Uses `existing_answer`
    /// and `context`.
    RefineStep,
    /// Answer a question about a text. Uses `text`, `history`, `question`.
    Answer,
}

impl PromptKind {
    /// Every kind, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::SummarizeChunk,
        Self::Reduce,
        Self::RefineInitial,
        Self::RefineStep,
        Self::Answer,
    ];

    /// Stable lowercase name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SummarizeChunk => "summarize_chunk",
            Self::Reduce => "reduce",
            Self::RefineInitial => "refine_initial",
            Self::RefineStep => "refine_step",
            Self::Answer => "answer",
        }
    }
}

impl std::fmt::Display for PromptKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure modes of a single generation call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GenerationError {
    /// The model provider throttled the request.
    #[error("rate limited")]
    RateLimited,

    /// Network failure, timeout or a provider-side 5xx.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Invalid input, authentication failure or an unusable response.
    #[error("fatal failure: {0}")]
    Fatal(String),
}

impl GenerationError {
    /// Whether retrying the same call could succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited | Self::Transient(_))
    }
}

/// Turns a prompt kind and variables into generated text.
pub trait Generator: Send + Sync {
    /// Run one generation.
    ///
    /// # Errors
    ///
    /// Returns a [`GenerationError`] describing whether the call may be retried.
    fn generate(
        &self,
        kind: PromptKind,
        variables: &Variables,
    ) -> impl Future<Output = Result<String, GenerationError>> + Send;
}

impl<G: Generator> Generator for Arc<G> {
    fn generate(
        &self,
        kind: PromptKind,
        variables: &Variables,
    ) -> impl Future<Output = Result<String, GenerationError>> + Send {
        (**self).generate(kind, variables)
    }
}

impl<G: Generator> Generator for &G {
    fn generate(
        &self,
        kind: PromptKind,
        variables: &Variables,
    ) -> impl Future<Output = Result<String, GenerationError>> + Send {
        (**self).generate(kind, variables)
    }
}

/// A raw text-in, text-out model backend.
pub trait Completion: Send + Sync {
    /// Complete a fully rendered prompt.
    ///
    /// # Errors
    ///
    /// Returns a [`GenerationError`] classified by retryability.
    fn complete(&self, prompt: &str) -> impl Future<Output = Result<String, GenerationError>> + Send;
}

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{([a-z_]+)\}").expect("placeholder pattern is valid"));

/// Prompt text for each [`PromptKind`].
///
/// Templates reference variables as `{name}`. The defaults are deliberately
/// plain; real deployments load their own wording from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptTemplates {
    /// Template for [`PromptKind::SummarizeChunk`].
    pub summarize_chunk: String,
    /// Template for [`PromptKind::Reduce`].
    pub reduce: String,
    /// Template for [`PromptKind::RefineInitial`].
    pub refine_initial: String,
    /// Template for [`PromptKind::RefineStep`].
    pub refine_step: String,
    /// Template for [`PromptKind::Answer`].
    pub answer: String,
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            summarize_chunk: "Write a concise summary of the following:\n\n{context}".into(),
            reduce: "The following is a set of summaries:\n\n{docs}\n\n\
                     Combine them into a single summary of the main themes."
                .into(),
            refine_initial: "Write a concise summary of the following:\n\n{context}".into(),
            refine_step: "Here is an existing summary:\n\n{existing_answer}\n\n\
                          Refine it with the additional text below. Integrate new \
                          information and keep the existing structure.\n\n{context}"
                .into(),
            answer: "Use the following text to answer the question.\n\n{text}\n\n\
                     Conversation so far:\n{history}\n\nQuestion: {question}"
                .into(),
        }
    }
}

impl PromptTemplates {
    /// The template for `kind`.
    #[must_use]
    pub fn get(&self, kind: PromptKind) -> &str {
        match kind {
            PromptKind::SummarizeChunk => &self.summarize_chunk,
            PromptKind::Reduce => &self.reduce,
            PromptKind::RefineInitial => &self.refine_initial,
            PromptKind::RefineStep => &self.refine_step,
            PromptKind::Answer => &self.answer,
        }
    }

    /// Substitute `variables` into the template for `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`GenerationError::Fatal`] if the template references a
    /// variable that was not supplied. Retrying would not help.
    pub fn render(&self, kind: PromptKind, variables: &Variables) -> Result<String, GenerationError> {
        let template = self.get(kind);
        let mut out = String::with_capacity(template.len());
        let mut last = 0;

        for caps in PLACEHOLDER.captures_iter(template) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            let value = variables.get(name.as_str()).ok_or_else(|| {
                GenerationError::Fatal(format!(
                    "template {kind} references missing variable {:?}",
                    name.as_str()
                ))
            })?;
            out.push_str(&template[last..whole.start()]);
            out.push_str(value);
            last = whole.end();
        }
        out.push_str(&template[last..]);

        Ok(out)
    }
}

/// A [`Generator`] that renders [`PromptTemplates`] and calls a [`Completion`] backend.
#[derive(Debug, Clone)]
pub struct TemplateGenerator<C> {
    templates: PromptTemplates,
    backend: C,
}

impl<C: Completion> TemplateGenerator<C> {
    /// Pair templates with a backend.
    pub fn new(templates: PromptTemplates, backend: C) -> Self {
        Self { templates, backend }
    }

    /// The templates in use.
    pub fn templates(&self) -> &PromptTemplates {
        &self.templates
    }
}

impl<C: Completion> Generator for TemplateGenerator<C> {
    async fn generate(
        &self,
        kind: PromptKind,
        variables: &Variables,
    ) -> Result<String, GenerationError> {
        let prompt = self.templates.render(kind, variables)?;
        tracing::debug!(%kind, prompt_bytes = prompt.len(), "rendered prompt");
        self.backend.complete(&prompt).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    struct Echo {
        seen: Mutex<Vec<String>>,
    }

    impl Completion for Echo {
        async fn complete(&self, prompt: &str) -> Result<String, GenerationError> {
            self.seen.lock().unwrap().push(prompt.to_string());
            Ok(format!("echo: {prompt}"))
        }
    }

    #[test]
    fn render_substitutes_every_placeholder() {
        let templates = PromptTemplates {
            refine_step: "{existing_answer} + {context} + {context}".into(),
            ..PromptTemplates::default()
        };
        let v = variables([
            (vars::EXISTING_ANSWER, "old".to_string()),
            (vars::CONTEXT, "new".to_string()),
        ]);
        assert_eq!(
            templates.render(PromptKind::RefineStep, &v).unwrap(),
            "old + new + new"
        );
    }

    #[test]
    fn render_does_not_reinterpret_values() {
        let templates = PromptTemplates::default();
        let v = variables([(vars::CONTEXT, "literal {docs} braces".to_string())]);
        let prompt = templates.render(PromptKind::SummarizeChunk, &v).unwrap();
        assert!(prompt.ends_with("literal {docs} braces"));
    }

    #[test]
    fn render_missing_variable_is_fatal() {
        let templates = PromptTemplates::default();
        let err = templates
            .render(PromptKind::Reduce, &Variables::new())
            .unwrap_err();
        assert!(matches!(err, GenerationError::Fatal(_)));
        assert!(!err.is_retryable());
    }

    #[test]
    fn default_templates_cover_every_kind() {
        let templates = PromptTemplates::default();
        for kind in PromptKind::ALL {
            assert!(!templates.get(kind).is_empty(), "{kind} has no template");
        }
    }

    #[test]
    fn retryable_classification() {
        assert!(GenerationError::RateLimited.is_retryable());
        assert!(GenerationError::Transient("timeout".into()).is_retryable());
        assert!(!GenerationError::Fatal("bad request".into()).is_retryable());
    }

    #[tokio::test]
    async fn template_generator_renders_then_completes() {
        let backend = Echo {
            seen: Mutex::new(Vec::new()),
        };
        let templates = PromptTemplates {
            summarize_chunk: "S: {context}".into(),
            ..PromptTemplates::default()
        };
        let generator = TemplateGenerator::new(templates, backend);

        let out = generator
            .generate(
                PromptKind::SummarizeChunk,
                &variables([(vars::CONTEXT, "abc".to_string())]),
            )
            .await
            .unwrap();

        assert_eq!(out, "echo: S: abc");
        assert_eq!(generator.backend.seen.lock().unwrap().as_slice(), ["S: abc"]);
    }
}
