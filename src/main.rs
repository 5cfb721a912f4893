//! evalai CLI
//!
//! Sends one prompt to a provider, prints the answer as it streams, then
//! prints response metadata and token usage.

use anyhow::{Context, Result};
use clap::Parser;
use evalai::provider::resolve_provider;
use evalai::{init_tracing, Completion, FragmentSink, ProviderClient, RequestConfig};
use std::io::Write;
use std::ops::ControlFlow;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "evalai")]
#[command(about = "Stream an LLM answer and report token usage")]
#[command(version)]
struct Cli {
    /// Prompt to send
    prompt: String,

    /// Provider preset or definition file name
    #[arg(short, long, default_value = "deepseek")]
    provider: String,

    /// Model (defaults to the provider's default model)
    #[arg(short, long)]
    model: Option<String>,

    /// System message
    #[arg(short, long, default_value = evalai::DEFAULT_SYSTEM_MESSAGE)]
    system: String,

    /// Output token limit
    #[arg(long)]
    max_tokens: Option<u32>,

    #[arg(long)]
    temperature: Option<f32>,

    /// Reasoning effort for models that support it (low, medium, high)
    #[arg(long)]
    reasoning_effort: Option<String>,

    /// Directory searched for .evalai/providers
    #[arg(short = 'w', long)]
    working_dir: Option<PathBuf>,

    /// Write JSON logs to this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Enable verbose logging on stderr
    #[arg(short, long)]
    verbose: bool,
}

/// Writes content to stdout as it arrives; reasoning goes to stderr.
///
/// A failed write (closed pipe) means nobody is reading anymore.
struct ConsolePrinter<O, E> {
    out: O,
    err: E,
}

impl ConsolePrinter<std::io::Stdout, std::io::Stderr> {
    fn stdio() -> Self {
        Self {
            out: std::io::stdout(),
            err: std::io::stderr(),
        }
    }
}

fn write_now(writer: &mut impl Write, text: &str) -> ControlFlow<()> {
    match writer.write_all(text.as_bytes()).and_then(|_| writer.flush()) {
        Ok(()) => ControlFlow::Continue(()),
        Err(_) => ControlFlow::Break(()),
    }
}

impl<O: Write, E: Write> FragmentSink for ConsolePrinter<O, E> {
    fn on_fragment(&mut self, text: &str) -> ControlFlow<()> {
        write_now(&mut self.out, text)
    }

    fn on_reasoning(&mut self, text: &str) -> ControlFlow<()> {
        write_now(&mut self.err, text)
    }
}

fn print_summary(completion: &Completion) {
    println!();
    println!("{}", "-".repeat(40));
    println!("Request complete");
    if let Some(id) = &completion.metadata.id {
        println!("ID: {}", id);
    }
    if let Some(model) = &completion.metadata.model {
        println!("Model: {}", model);
    }
    if let Some(created) = completion.metadata.created {
        let local = created.with_timezone(&chrono::Local);
        println!("Created: {}", local.format("%Y-%m-%d %H:%M:%S"));
    }
    println!("Token usage: {}", completion.usage);
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let _guard = init_tracing(cli.verbose, cli.log_dir.as_deref())
        .context("Failed to initialize logging")?;

    let working_dir = match cli.working_dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to read current directory")?,
    };

    let config = resolve_provider(&cli.provider, &working_dir)?;
    let client = ProviderClient::new(config)?;

    let mut request = RequestConfig::new(cli.prompt).with_system(cli.system);
    if let Some(model) = cli.model {
        request = request.with_model(model);
    }
    if let Some(max_tokens) = cli.max_tokens {
        request = request.with_max_tokens(max_tokens);
    }
    if let Some(temperature) = cli.temperature {
        request = request.with_temperature(temperature);
    }
    if let Some(effort) = cli.reasoning_effort {
        request = request.with_reasoning_effort(effort);
    }

    let cancellation = CancellationToken::new();
    let ctrl_c = cancellation.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("Interrupted, cancelling request");
            ctrl_c.cancel();
        }
    });

    let mut printer = ConsolePrinter::stdio();

    match client
        .chat_stream(&request, &mut printer, Some(cancellation))
        .await
    {
        Ok(completion) => {
            print_summary(&completion);
            Ok(())
        }
        Err(e) => {
            // Partial text was already printed as it streamed
            println!();
            Err(e.into())
        }
    }
}
