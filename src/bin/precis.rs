//! Command-line front end: summarize a file or web page, or ask questions about it.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use precis::{
    AutoSource, ContentKind, Conversation, DocumentSource, MemorySessionStore, OpenAiCompletion,
    Pipeline, PipelineConfig, Strategy, TemplateGenerator, UrlSource,
};

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "precis", version, about = "Summarize documents too long for one model call")]
struct Cli {
    /// TOML configuration file. Missing is fine; defaults are used.
    #[arg(long, short, default_value = "precis.toml")]
    config: PathBuf,

    /// Start from a content preset instead of the file's values (web, youtube, meeting).
    #[arg(long)]
    content: Option<ContentKind>,

    /// API key for the completions endpoint.
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    api_key: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Summarize a .txt, .md, .srt or .vtt file, or an http(s) URL.
    Summarize {
        /// File or URL to summarize.
        path: String,
        /// Override the configured strategy (map_reduce, refine).
        #[arg(long)]
        strategy: Option<Strategy>,
        /// Print the summary with run statistics as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Ask questions about a file or URL. Reads one question per line from stdin.
    Ask {
        /// File or URL to ask about.
        path: String,
        /// Session id for conversation memory.
        #[arg(long, default_value = "cli")]
        session: String,
    },
}

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> anyhow::Result<PipelineConfig> {
    let mut config = PipelineConfig::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(kind) = cli.content {
        let preset = PipelineConfig::for_content(kind);
        config.strategy = preset.strategy;
        config.chunk_size = preset.chunk_size;
        config.chunk_overlap = preset.chunk_overlap;
        config.size_budget = preset.size_budget;
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let mut config = load_config(&cli)?;

    let backend = OpenAiCompletion::new(cli.api_key.clone(), &config.llm)?;
    let generator = TemplateGenerator::new(config.templates.clone(), backend);
    let source = AutoSource::new(UrlSource::new(FETCH_TIMEOUT)?);

    match cli.command {
        Command::Summarize {
            path,
            strategy,
            json,
        } => {
            if let Some(strategy) = strategy {
                config.strategy = strategy;
            }
            let pipeline = Pipeline::new(generator, &config)?;
            let summary = match pipeline.summarize_source(&source, &path).await {
                Ok(summary) => summary,
                Err(e) if e.is_generation() => {
                    let endpoint = &config.llm.base_url;
                    return Err(anyhow::Error::new(e)
                        .context(format!("model endpoint {endpoint} failed while summarizing {path}")));
                }
                Err(e) => return Err(anyhow::Error::new(e).context(format!("summarizing {path}"))),
            };

            if json {
                println!("{}", serde_json::to_string_pretty(&summary)?);
            } else {
                println!("{summary}");
            }
        }
        Command::Ask { path, session } => {
            let document = source.acquire(&path).await?;
            let chat = Conversation::new(generator, MemorySessionStore::default()).with_retry(config.retry);

            let stdin = std::io::stdin();
            let mut stdout = std::io::stdout();
            for line in stdin.lock().lines() {
                let question = line?;
                if question.trim().is_empty() {
                    continue;
                }
                let answer = chat.ask(&session, document.content(), &question).await?;
                writeln!(stdout, "{answer}\n")?;
                stdout.flush()?;
            }
        }
    }

    Ok(())
}
