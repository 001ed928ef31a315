//! End-to-end pipeline orchestration.
//!
//! Wires the stages together: extract text from the uploaded PDF, summarize
//! via Bedrock, normalize the summary to plain prose, hand it to the diagram
//! agent, resolve whatever artifact materialized, and optionally mirror it
//! to S3. Summarization failures propagate; everything diagram-side degrades
//! to "no artifact".

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::agent;
use crate::config::Config;
use crate::extract::{self, ExtractedContent};
use crate::naming::DiagramRequest;
use crate::normalize;
use crate::progress::{PipelineStage, ProgressEvent, ProgressReporter};
use crate::resolve::{self, ResolveContext};
use crate::store::ArtifactStore;
use crate::summarize::{self, SummaryResult, SummaryType};

/// Result of a full pipeline run. `artifact` is `None` when no diagram could
/// be produced; the summary is always present.
pub struct PipelineOutcome {
    pub request: DiagramRequest,
    pub extracted: ExtractedContent,
    pub summary: SummaryResult,
    pub normalized_summary: String,
    pub artifact: Option<PathBuf>,
    pub mirror_key: Option<String>,
}

/// Outcome of the diagram-only half (summary supplied by the caller).
pub struct DiagramOutcome {
    pub artifact: Option<PathBuf>,
    pub mirror_key: Option<String>,
}

/// A scratch file that is deleted when dropped, on every exit path.
pub struct TempUpload {
    path: PathBuf,
}

impl TempUpload {
    /// Persist uploaded bytes to `dir/filename`, creating the directory.
    pub async fn write(dir: &Path, filename: &str, bytes: &[u8]) -> Result<Self> {
        tokio::fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create upload dir: {}", dir.display()))?;
        let path = dir.join(filename);
        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to write upload: {}", path.display()))?;
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for TempUpload {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                eprintln!(
                    "Could not remove scratch upload {}: {}",
                    self.path.display(),
                    e
                );
            }
        }
    }
}

/// Run the full pipeline against a PDF on disk.
pub async fn generate_from_pdf(
    config: &Config,
    mirror: Option<&dyn ArtifactStore>,
    reporter: &dyn ProgressReporter,
    request: DiagramRequest,
    pdf_path: &Path,
    extra_instructions: Option<&str>,
) -> Result<PipelineOutcome> {
    reporter.report(ProgressEvent::stage(
        PipelineStage::Extract,
        format!("Extracting text from {}", pdf_path.display()),
    ));
    let extracted = extract::extract_pdf_file(pdf_path)?;
    println!(
        "Extracted {} chars from {} pages",
        extracted.text.len(),
        extracted.num_pages
    );

    reporter.report(ProgressEvent::stage(
        PipelineStage::Summarize,
        "Summarizing document",
    ));
    let summary =
        summarize::summarize(&config.summarizer, &extracted.text, SummaryType::Architecture)
            .await?;
    let normalized_summary = normalize::normalize(&summary.summary);

    let diagram = generate_diagram(
        config,
        mirror,
        reporter,
        &request,
        &normalized_summary,
        extra_instructions,
    )
    .await;

    reporter.report(ProgressEvent::stage(
        PipelineStage::Complete,
        match diagram.artifact {
            Some(_) => "Diagram generated".to_string(),
            None => "Summary ready; no diagram produced".to_string(),
        },
    ));

    Ok(PipelineOutcome {
        request,
        extracted,
        summary,
        normalized_summary,
        artifact: diagram.artifact,
        mirror_key: diagram.mirror_key,
    })
}

/// Run the diagram half only: agent invocation, artifact resolution, mirror.
/// Never fails; the worst case is `artifact: None`.
pub async fn generate_diagram(
    config: &Config,
    mirror: Option<&dyn ArtifactStore>,
    reporter: &dyn ProgressReporter,
    request: &DiagramRequest,
    summary_prose: &str,
    extra_instructions: Option<&str>,
) -> DiagramOutcome {
    let expected = request.expected_path(&config.storage.output_dir);
    if let Some(parent) = expected.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    reporter.report(ProgressEvent::stage(
        PipelineStage::Generate,
        "Invoking diagram agent",
    ));
    let prompt = agent::build_diagram_prompt(summary_prose, &expected, extra_instructions);
    let reported = agent::invoke(&config.agent, &prompt, &expected).await;
    if reported.is_none() {
        println!("Agent did not confirm the expected path; searching for the artifact");
    }

    reporter.report(ProgressEvent::stage(
        PipelineStage::Resolve,
        "Resolving diagram artifact",
    ));
    let working_root = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
    let ctx = ResolveContext {
        expected_path: &expected,
        request_id: &request.id,
        working_root: &working_root,
        extra_dirs: &config.resolver.extra_search_dirs,
        freshness_window: Duration::from_secs(config.resolver.freshness_window_secs),
        conversion_timeout: Duration::from_secs(config.resolver.conversion_timeout_secs),
        converter: agent::find_launcher("dot"),
    };
    let artifact = resolve::resolve_artifact(&ctx).await;

    let mirror_key = match (&artifact, mirror) {
        (Some(path), Some(store)) => {
            reporter.report(ProgressEvent::stage(
                PipelineStage::Mirror,
                "Mirroring diagram to S3",
            ));
            mirror_artifact(store, path).await
        }
        _ => None,
    };

    DiagramOutcome {
        artifact,
        mirror_key,
    }
}

/// Upload a resolved artifact; failures are logged and absorbed.
async fn mirror_artifact(store: &dyn ArtifactStore, path: &Path) -> Option<String> {
    let filename = path.file_name()?.to_str()?.to_string();
    let bytes = match tokio::fs::read(path).await {
        Ok(b) => b,
        Err(e) => {
            eprintln!("Could not read artifact for mirroring: {}", e);
            return None;
        }
    };
    match store.put(&filename, &bytes).await {
        Ok(key) => Some(key),
        Err(e) => {
            eprintln!("Mirror upload failed (continuing without): {:#}", e);
            None
        }
    }
}
