//! Web page acquisition.
//!
//! [`UrlSource`] fetches a page and keeps only its readable text: the
//! `<main>` element when the page has one, otherwise `<body>`. Script and
//! style contents never reach the pipeline.
//!
//! | Outcome | [`AcquisitionError`] |
//! |---------|----------------------|
//! | connect failure, timeout, non-2xx status | `Unreachable` |
//! | malformed URL, content type other than HTML or plain text | `Unsupported` |

use std::sync::LazyLock;
use std::time::Duration;

use reqwest::header::{HeaderMap, CONTENT_TYPE};
use reqwest::StatusCode;
use scraper::{ElementRef, Html, Selector};

use crate::source::{AcquisitionError, DocumentSource, FileSource};
use crate::{Document, Error, Result};

static MAIN: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("main").expect("main selector is valid"));
static BODY: LazyLock<Selector> =
    LazyLock::new(|| Selector::parse("body").expect("body selector is valid"));

/// Elements whose text is never content.
const HIDDEN: [&str; 4] = ["script", "style", "noscript", "template"];

/// Fetches web pages over HTTP(S).
#[derive(Debug, Clone)]
pub struct UrlSource {
    client: reqwest::Client,
}

impl UrlSource {
    /// Create a source whose requests give up after `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if the HTTP client cannot be built.
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(timeout.min(Duration::from_secs(30)))
            .timeout(timeout)
            .user_agent(concat!("precis/", env!("CARGO_PKG_VERSION")))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| Error::Configuration(format!("http client: {e}")))?;
        Ok(Self { client })
    }

    /// Use an existing client.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Format {
    Html,
    Plain,
}

impl Format {
    fn name(self) -> &'static str {
        match self {
            Self::Html => "html",
            Self::Plain => "text",
        }
    }
}

/// Classify a response by its `Content-Type`. A missing header is read as HTML.
fn format_of(headers: &HeaderMap) -> std::result::Result<Format, String> {
    let Some(value) = headers.get(CONTENT_TYPE) else {
        return Ok(Format::Html);
    };
    let mime = value
        .to_str()
        .unwrap_or_default()
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    match mime.as_str() {
        "text/html" | "application/xhtml+xml" => Ok(Format::Html),
        "text/plain" => Ok(Format::Plain),
        other => Err(format!("content type {other:?} is not a web page")),
    }
}

fn status_reason(status: StatusCode) -> String {
    match status {
        StatusCode::FORBIDDEN => "access forbidden (403); the site may block automated access".into(),
        StatusCode::NOT_FOUND => "page not found (404)".into(),
        other => format!("server answered {other}"),
    }
}

fn request_reason(e: &reqwest::Error) -> String {
    if e.is_timeout() {
        format!("request timed out: {e}")
    } else if e.is_connect() {
        format!("could not connect: {e}")
    } else {
        e.to_string()
    }
}

impl DocumentSource for UrlSource {
    async fn acquire(&self, descriptor: &str) -> std::result::Result<Document, AcquisitionError> {
        let unreachable = |reason: String| AcquisitionError::Unreachable {
            descriptor: descriptor.to_string(),
            reason,
        };
        let unsupported = |reason: String| AcquisitionError::Unsupported {
            descriptor: descriptor.to_string(),
            reason,
        };

        let response = self.client.get(descriptor).send().await.map_err(|e| {
            if e.is_builder() {
                unsupported(format!("not a fetchable URL: {e}"))
            } else {
                unreachable(request_reason(&e))
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(descriptor, status = status.as_u16(), "fetch failed");
            return Err(unreachable(status_reason(status)));
        }
        let format = format_of(response.headers()).map_err(unsupported)?;

        let body = response
            .text()
            .await
            .map_err(|e| unreachable(request_reason(&e)))?;
        let content = match format {
            Format::Html => page_text(&body),
            Format::Plain => body,
        };
        tracing::debug!(descriptor, bytes = content.len(), format = format.name(), "acquired page");

        Ok(Document::new(content, descriptor).with_metadata("format", format.name()))
    }
}

/// Readable text of an HTML page, one text node per line.
///
/// ```rust
/// use precis::page_text;
///
/// let html = "<html><body><nav>Menu</nav><main><h1>Title</h1><p>Body text.</p></main></body></html>";
/// assert_eq!(page_text(html), "Title\nBody text.");
/// ```
#[must_use]
pub fn page_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let root = document
        .select(&MAIN)
        .next()
        .or_else(|| document.select(&BODY).next())
        .unwrap_or_else(|| document.root_element());

    let lines: Vec<&str> = root
        .descendants()
        .filter_map(|node| {
            let text = node.value().as_text()?;
            let hidden = node
                .ancestors()
                .filter_map(ElementRef::wrap)
                .any(|el| HIDDEN.contains(&el.value().name()));
            (!hidden).then_some(text.trim())
        })
        .filter(|line| !line.is_empty())
        .collect();
    lines.join("\n")
}

/// Fetches `http://` and `https://` descriptors, reads everything else as a
/// local file.
#[derive(Debug, Clone)]
pub struct AutoSource {
    web: UrlSource,
}

impl AutoSource {
    /// Route web descriptors to `web`.
    #[must_use]
    pub fn new(web: UrlSource) -> Self {
        Self { web }
    }
}

fn is_web(descriptor: &str) -> bool {
    let lower = descriptor.trim_start().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

impl DocumentSource for AutoSource {
    async fn acquire(&self, descriptor: &str) -> std::result::Result<Document, AcquisitionError> {
        if is_web(descriptor) {
            self.web.acquire(descriptor).await
        } else {
            FileSource.acquire(descriptor).await
        }
    }
}
