//! Pipeline configuration.
//!
//! Settings come from three layers, later ones winning:
//!
//! 1. built-in defaults (the [`ContentKind::WebPage`] preset)
//! 2. a TOML file, if present
//! 3. `PRECIS_*` environment variables
//!
//! ```toml
//! strategy = "map_reduce"
//! chunker = "recursive"
//! chunk_size = 2000
//! chunk_overlap = 200
//! size_budget = 4000
//! batch_pacing = 1000     # milliseconds
//!
//! [retry]
//! max_retries = 5
//! initial_backoff = 1000  # milliseconds
//!
//! [templates]
//! summarize_chunk = "Summarize:\n\n{context}"
//! ```
//!
//! Every field is optional. Sizes are in estimator units; with the default
//! estimator that means whitespace-delimited words.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::estimate::EstimatorKind;
use crate::generate::PromptTemplates;
use crate::retry::millis;
use crate::{Chunker, Error, RecursiveChunker, Result, RetryPolicy, SizeEstimator, Strategy, WordChunker};

/// Which chunker to build.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkerKind {
    /// [`RecursiveChunker::prose`], sizes measured with the configured estimator.
    #[default]
    Recursive,
    /// [`RecursiveChunker::markdown`].
    Markdown,
    /// [`WordChunker`], sizes always in whitespace words.
    Words,
}

impl ChunkerKind {
    /// Build the chunker.
    ///
    /// # Errors
    ///
    /// Returns the chunker's construction error for invalid sizes.
    pub fn build(
        self,
        chunk_size: usize,
        chunk_overlap: usize,
        estimator: Arc<dyn SizeEstimator>,
    ) -> Result<Box<dyn Chunker>> {
        Ok(match self {
            Self::Recursive => {
                Box::new(RecursiveChunker::prose(chunk_size, chunk_overlap)?.with_estimator(estimator))
            }
            Self::Markdown => {
                Box::new(RecursiveChunker::markdown(chunk_size, chunk_overlap)?.with_estimator(estimator))
            }
            Self::Words => Box::new(WordChunker::new(chunk_size, chunk_overlap)?),
        })
    }
}

/// The kinds of long text the pipeline is tuned for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    /// An article or documentation page.
    WebPage,
    /// A video transcript. Long and loosely structured, so chunks and budget
    /// are larger.
    #[serde(rename = "youtube")]
    YouTube,
    /// A meeting transcript.
    MeetingTranscript,
}

impl std::str::FromStr for ContentKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "web" | "web_page" | "webpage" => Ok(Self::WebPage),
            "youtube" | "video" => Ok(Self::YouTube),
            "meeting" | "meeting_transcript" | "transcript" => Ok(Self::MeetingTranscript),
            other => Err(format!("unknown content kind {other:?}, expected web, youtube or meeting")),
        }
    }
}

/// Settings for an OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// API root, without the `/chat/completions` suffix.
    pub base_url: String,
    /// Model name sent with every request.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".into(),
            model: "gpt-4o-mini".into(),
            temperature: 0.0,
            timeout_secs: 120,
        }
    }
}

/// Everything needed to build a [`Pipeline`](crate::Pipeline).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Map-reduce or refine.
    pub strategy: Strategy,
    /// How to split text.
    pub chunker: ChunkerKind,
    /// How to measure text.
    pub estimator: EstimatorKind,
    /// Maximum chunk size.
    pub chunk_size: usize,
    /// Size shared between adjacent chunks.
    pub chunk_overlap: usize,
    /// Largest input a single reduce call may receive.
    pub size_budget: usize,
    /// Concurrent generation calls per map batch or collapse level.
    pub batch_size: usize,
    /// Pause between map batches, in milliseconds.
    #[serde(with = "millis")]
    pub batch_pacing: Duration,
    /// Collapse levels allowed before giving up.
    pub max_collapse_levels: usize,
    /// Optional wall-clock limit for a whole run, in seconds.
    pub deadline_secs: Option<u64>,
    /// Retry policy for every generation call.
    pub retry: RetryPolicy,
    /// Prompt wording.
    pub templates: PromptTemplates,
    /// Model endpoint settings.
    pub llm: LlmConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self::for_content(ContentKind::WebPage)
    }
}

impl PipelineConfig {
    /// Defaults tuned for a kind of content.
    ///
    /// | Kind | Strategy | Chunk | Overlap | Budget |
    /// |------|----------|-------|---------|--------|
    /// | `WebPage` | map-reduce | 2000 | 200 | 4000 |
    /// | `YouTube` | map-reduce | 10000 | 1000 | 10000 |
    /// | `MeetingTranscript` | map-reduce | 2000 | 200 | 4000 |
    ///
    /// Every preset maps and reduces; set `strategy` to refine a document
    /// sequentially instead.
    #[must_use]
    pub fn for_content(kind: ContentKind) -> Self {
        let (strategy, chunk_size, chunk_overlap, size_budget) = match kind {
            ContentKind::WebPage => (Strategy::MapReduce, 2000, 200, 4000),
            ContentKind::YouTube => (Strategy::MapReduce, 10_000, 1000, 10_000),
            ContentKind::MeetingTranscript => (Strategy::MapReduce, 2000, 200, 4000),
        };
        Self {
            strategy,
            chunker: ChunkerKind::default(),
            estimator: EstimatorKind::default(),
            chunk_size,
            chunk_overlap,
            size_budget,
            batch_size: 5,
            batch_pacing: Duration::from_secs(1),
            max_collapse_levels: 16,
            deadline_secs: None,
            retry: RetryPolicy::default(),
            templates: PromptTemplates::default(),
            llm: LlmConfig::default(),
        }
    }

    /// Load from a TOML file, then apply environment overrides and validate.
    ///
    /// A missing file is not an error: defaults are used instead.
    ///
    /// # Errors
    ///
    /// - [`Error::Io`] if the file exists but cannot be read
    /// - [`Error::ConfigFile`] if it is not valid TOML for this struct
    /// - [`Error::Configuration`] if the merged settings are invalid
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            Self::from_toml(&content)?
        } else {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            Self::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse TOML. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigFile`] on a syntax or type error.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::ConfigFile(e.to_string()))
    }

    /// The deadline, if one is configured.
    #[must_use]
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_secs.map(Duration::from_secs)
    }

    /// Override fields from `PRECIS_*` environment variables.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    /// Override fields from any key lookup. Unparseable values are logged
    /// and ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(lookup: &dyn Fn(&str) -> Option<String>, key: &str) -> Option<T> {
            let raw = lookup(key)?;
            match raw.trim().parse() {
                Ok(v) => Some(v),
                Err(_) => {
                    tracing::warn!("ignoring invalid {key} value: {raw}");
                    None
                }
            }
        }
        let lookup: &dyn Fn(&str) -> Option<String> = &lookup;

        if let Some(v) = parsed(lookup, "PRECIS_STRATEGY") {
            self.strategy = v;
        }
        if let Some(v) = parsed(lookup, "PRECIS_CHUNK_SIZE") {
            self.chunk_size = v;
        }
        if let Some(v) = parsed(lookup, "PRECIS_CHUNK_OVERLAP") {
            self.chunk_overlap = v;
        }
        if let Some(v) = parsed(lookup, "PRECIS_SIZE_BUDGET") {
            self.size_budget = v;
        }
        if let Some(v) = parsed(lookup, "PRECIS_BATCH_SIZE") {
            self.batch_size = v;
        }
        if let Some(ms) = parsed(lookup, "PRECIS_BATCH_PACING_MS") {
            self.batch_pacing = Duration::from_millis(ms);
        }
        if let Some(v) = parsed(lookup, "PRECIS_MAX_RETRIES") {
            self.retry.max_retries = v;
        }
        if let Some(v) = parsed(lookup, "PRECIS_DEADLINE_SECS") {
            self.deadline_secs = Some(v);
        }
        if let Some(v) = lookup("PRECIS_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Some(v) = lookup("PRECIS_LLM_MODEL") {
            self.llm.model = v;
        }
    }

    /// Check that the settings can produce a summary.
    ///
    /// # Errors
    ///
    /// Returns the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::InvalidChunkSize(self.chunk_size));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(Error::OverlapExceedsSize {
                size: self.chunk_size,
                overlap: self.chunk_overlap,
            });
        }
        if self.size_budget == 0 {
            return Err(Error::Configuration("size_budget must be > 0".into()));
        }
        if self.batch_size == 0 {
            return Err(Error::Configuration("batch_size must be > 0".into()));
        }
        if self.max_collapse_levels == 0 {
            return Err(Error::Configuration("max_collapse_levels must be > 0".into()));
        }
        if self.deadline_secs == Some(0) {
            return Err(Error::Configuration("deadline_secs must be > 0 when set".into()));
        }
        self.retry.validate()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn test_presets() {
        let yt = PipelineConfig::for_content(ContentKind::YouTube);
        assert_eq!((yt.chunk_size, yt.chunk_overlap, yt.size_budget), (10_000, 1000, 10_000));
        assert_eq!(yt.strategy, Strategy::MapReduce);

        let meeting = PipelineConfig::for_content(ContentKind::MeetingTranscript);
        assert_eq!(meeting.strategy, Strategy::MapReduce);
        assert_eq!((meeting.chunk_size, meeting.size_budget), (2000, 4000));

        let web = PipelineConfig::default();
        assert_eq!((web.chunk_size, web.size_budget, web.batch_size), (2000, 4000, 5));
        assert_eq!(web.batch_pacing, Duration::from_secs(1));
        assert!(web.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = PipelineConfig::from_toml(
            r#"
            strategy = "refine"
            chunk_size = 500
            chunk_overlap = 50
            batch_pacing = 250

            [retry]
            max_retries = 3

            [templates]
            reduce = "Merge:\n{docs}"
            "#,
        )
        .unwrap();

        assert_eq!(config.strategy, Strategy::Refine);
        assert_eq!(config.chunk_size, 500);
        assert_eq!(config.batch_pacing, Duration::from_millis(250));
        assert_eq!(config.retry.max_retries, 3);
        assert_eq!(config.retry.initial_backoff, Duration::from_secs(1));
        assert_eq!(config.templates.reduce, "Merge:\n{docs}");
        assert_eq!(config.templates.summarize_chunk, PromptTemplates::default().summarize_chunk);
        assert_eq!(config.size_budget, 4000);
    }

    #[test]
    fn test_bad_toml() {
        let err = PipelineConfig::from_toml("chunk_size = \"big\"").unwrap_err();
        assert!(matches!(err, Error::ConfigFile(_)));
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = PipelineConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.chunk_size, PipelineConfig::default().chunk_size);
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("precis.toml");
        std::fs::write(&path, "chunk_size = 100\nchunk_overlap = 100\n").unwrap();
        let err = PipelineConfig::load(&path).unwrap_err();
        assert!(matches!(err, Error::OverlapExceedsSize { .. }));
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("PRECIS_STRATEGY", "refine"),
            ("PRECIS_CHUNK_SIZE", "800"),
            ("PRECIS_SIZE_BUDGET", "not a number"),
            ("PRECIS_MAX_RETRIES", "2"),
            ("PRECIS_LLM_MODEL", "local-model"),
        ]);
        let mut config = PipelineConfig::default();
        config.apply_overrides(|k| env.get(k).map(ToString::to_string));

        assert_eq!(config.strategy, Strategy::Refine);
        assert_eq!(config.chunk_size, 800);
        assert_eq!(config.size_budget, 4000);
        assert_eq!(config.retry.max_retries, 2);
        assert_eq!(config.llm.model, "local-model");
    }

    #[test]
    fn test_validation() {
        let ok = PipelineConfig::default();
        assert!(PipelineConfig { batch_size: 0, ..ok.clone() }.validate().is_err());
        assert!(PipelineConfig { size_budget: 0, ..ok.clone() }.validate().is_err());
        assert!(PipelineConfig { chunk_size: 0, ..ok.clone() }.validate().is_err());
        assert!(PipelineConfig { deadline_secs: Some(0), ..ok.clone() }.validate().is_err());
        assert!(PipelineConfig { deadline_secs: Some(30), ..ok }.validate().is_ok());
    }

    #[test]
    fn test_content_kind_parsing() {
        assert_eq!("youtube".parse::<ContentKind>().unwrap(), ContentKind::YouTube);
        assert_eq!("Meeting".parse::<ContentKind>().unwrap(), ContentKind::MeetingTranscript);
        assert!("podcast".parse::<ContentKind>().is_err());
    }
}
