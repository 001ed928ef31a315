//! # archdiagram CLI (`archd`)
//!
//! The `archd` binary drives the PDF → summary → diagram pipeline. It can
//! run the HTTP server for browser frontends, or execute the pipeline
//! stages directly from the command line.
//!
//! ## Usage
//!
//! ```bash
//! archd --config ./config/archdiagram.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `archd serve` | Start the HTTP API server |
//! | `archd extract <pdf>` | Extract text from a PDF, optionally summarize it |
//! | `archd generate <pdf>` | Run the full pipeline: extract, summarize, diagram |
//!
//! ## Examples
//!
//! ```bash
//! # Start the server
//! archd serve --config ./config/archdiagram.toml
//!
//! # Extract text only
//! archd extract whitepaper.pdf --print-text
//!
//! # Extract and summarize (requires AWS credentials in the environment)
//! archd extract whitepaper.pdf --summarize --summary-type general
//!
//! # Full pipeline, human progress on stderr
//! archd generate whitepaper.pdf
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use archdiagram::config::{self, Config};
use archdiagram::extract;
use archdiagram::naming::DiagramRequest;
use archdiagram::pipeline;
use archdiagram::progress::ProgressMode;
use archdiagram::server;
use archdiagram::store::{ArtifactStore, S3Mirror};
use archdiagram::summarize::{self, SummaryType};

/// archdiagram — turn PDF architecture documents into rendered diagrams.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/archdiagram.example.toml` for a full example. The
/// `extract` and `generate` commands fall back to built-in defaults when no
/// config file exists.
#[derive(Parser)]
#[command(
    name = "archd",
    about = "archdiagram — PDF to architecture-diagram pipeline",
    version,
    long_about = "archdiagram extracts text from uploaded PDF documents, summarizes it with a \
    Bedrock model, hands the summary to an external diagram agent, and resolves whatever \
    artifact the agent produced into a canonical location. Exposes the pipeline over HTTP \
    and as one-shot CLI commands."
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/archdiagram.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the HTTP API server.
    ///
    /// Binds to the address configured in `[server].bind` and serves the
    /// upload, summary, streaming, and diagram retrieval endpoints.
    Serve,

    /// Extract text from a PDF, optionally summarizing it.
    ///
    /// Runs the extraction stage (and, with `--summarize`, the Bedrock
    /// summarization stage) without invoking the diagram agent.
    Extract {
        /// Path to the PDF document.
        pdf: PathBuf,

        /// Also summarize the extracted text (requires AWS credentials).
        #[arg(long)]
        summarize: bool,

        /// Prompt template: `architecture`, `general`, or `detailed`.
        #[arg(long, default_value = "architecture")]
        summary_type: String,

        /// Print the extracted text to stdout.
        #[arg(long)]
        print_text: bool,

        /// Write the extracted text to a file.
        #[arg(long)]
        output: Option<PathBuf>,

        /// Write the summary to a file instead of stdout.
        #[arg(long)]
        summary_output: Option<PathBuf>,
    },

    /// Run the full pipeline against a PDF on disk.
    ///
    /// Extracts, summarizes, invokes the diagram agent, and resolves the
    /// artifact. Prints the resolved diagram path, or the summary alone
    /// when no diagram could be produced.
    Generate {
        /// Path to the PDF document.
        pdf: PathBuf,

        /// Extra instructions appended to the diagram prompt.
        #[arg(long)]
        instructions: Option<String>,

        /// Progress output: `off`, `human`, or `json`. Defaults to human
        /// when stderr is a terminal.
        #[arg(long)]
        progress: Option<String>,
    },
}

fn parse_progress_mode(value: Option<&str>) -> anyhow::Result<ProgressMode> {
    match value {
        None => Ok(ProgressMode::default_for_tty()),
        Some("off") => Ok(ProgressMode::Off),
        Some("human") => Ok(ProgressMode::Human),
        Some("json") => Ok(ProgressMode::Json),
        Some(other) => anyhow::bail!("Unknown progress mode: '{}'", other),
    }
}

fn build_mirror(cfg: &Config) -> Option<Arc<dyn ArtifactStore>> {
    let mirror_config = cfg.mirror.as_ref()?;
    match S3Mirror::new(mirror_config.clone()) {
        Ok(m) => Some(Arc::new(m)),
        Err(e) => {
            eprintln!("S3 mirror disabled: {:#}", e);
            None
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve => {
            let cfg = config::load_config(&cli.config)?;
            server::run_server(&cfg).await?;
        }

        Commands::Extract {
            pdf,
            summarize: do_summarize,
            summary_type,
            print_text,
            output,
            summary_output,
        } => {
            // One-shot commands work without a config file on disk.
            let cfg = config::load_config(&cli.config).unwrap_or_else(|_| Config::minimal());

            let content = extract::extract_pdf_file(&pdf)?;
            println!(
                "Extracted {} chars from {} pages ({})",
                content.text.len(),
                content.num_pages,
                content.method
            );

            if print_text {
                println!("{}", content.text);
            }
            if let Some(path) = output {
                std::fs::write(&path, &content.text)
                    .with_context(|| format!("Failed to write {}", path.display()))?;
                println!("Wrote extracted text to {}", path.display());
            }

            if do_summarize {
                let kind = SummaryType::parse(&summary_type)?;
                let result = summarize::summarize(&cfg.summarizer, &content.text, kind).await?;
                println!(
                    "Summary ({} chars, model {}, tokens in/out {}/{})",
                    result.summary_length,
                    result.model_id,
                    result
                        .usage
                        .input_tokens
                        .map(|t| t.to_string())
                        .unwrap_or_else(|| "?".to_string()),
                    result
                        .usage
                        .output_tokens
                        .map(|t| t.to_string())
                        .unwrap_or_else(|| "?".to_string()),
                );
                match summary_output {
                    Some(path) => {
                        std::fs::write(&path, &result.summary)
                            .with_context(|| format!("Failed to write {}", path.display()))?;
                        println!("Wrote summary to {}", path.display());
                    }
                    None => println!("{}", result.summary),
                }
            }
        }

        Commands::Generate {
            pdf,
            instructions,
            progress,
        } => {
            let cfg = config::load_config(&cli.config).unwrap_or_else(|_| Config::minimal());
            let reporter = parse_progress_mode(progress.as_deref())?.reporter();
            let mirror = build_mirror(&cfg);

            let request = DiagramRequest::new();
            println!("Request id: {}", request.id);

            let outcome = pipeline::generate_from_pdf(
                &cfg,
                mirror.as_deref(),
                reporter.as_ref(),
                request,
                &pdf,
                instructions.as_deref(),
            )
            .await?;

            match outcome.artifact {
                Some(path) => {
                    println!("Diagram: {}", path.display());
                    if let Some(key) = outcome.mirror_key {
                        println!("Mirrored as: {}", key);
                    }
                }
                None => {
                    println!("No diagram artifact could be produced. Summary follows:\n");
                    println!("{}", outcome.summary.summary);
                }
            }
        }
    }

    Ok(())
}
