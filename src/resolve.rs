//! Artifact resolver and fallback search.
//!
//! Runs after every agent invocation, whatever the agent reported. The agent
//! may have honored the requested output path, written somewhere else
//! entirely, produced only a Graphviz DOT file, or produced nothing. The
//! resolver establishes a single canonical owner for whatever exists, in
//! strict priority order, stopping at the first success:
//!
//! 1. **Direct hit** — a file at the expected path wins unchanged.
//! 2. **Graph-description fallback** — newest `.dot` file in the search
//!    roots, rasterized via a local `dot` binary when one is installed.
//! 3. **Image scan** — raster/vector files under the search roots, with
//!    request-id affinity and a freshness window guarding against stale
//!    leftovers. Misplaced diagram-shaped files are claimed into the
//!    canonical directory by atomic rename as a side effect of the scan.
//! 4. **No artifact** — a normal, expected outcome, not an error.
//!
//! Filesystem errors during move/copy degrade to the unmoved candidate
//! rather than aborting resolution. Nothing here ever propagates an error.

use globset::{Glob, GlobSet, GlobSetBuilder};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use walkdir::WalkDir;

use crate::naming::{DIAGRAM_SUFFIX, GENERATED_SUBDIR};

/// Inputs for one resolution pass. The request id is carried explicitly;
/// it is never re-derived from the expected filename.
pub struct ResolveContext<'a> {
    pub expected_path: &'a Path,
    pub request_id: &'a str,
    /// The orchestrator's working root — a known "misplaced" location the
    /// agent has been observed writing into despite instructions.
    pub working_root: &'a Path,
    /// Additional misplaced locations from configuration.
    pub extra_dirs: &'a [PathBuf],
    /// Recency threshold for adopting a candidate with no request-id match.
    pub freshness_window: Duration,
    /// Timeout for one `dot` rasterization.
    pub conversion_timeout: Duration,
    /// Path to the local graph conversion tool, if installed. `None`
    /// disables the graph-description fallback.
    pub converter: Option<PathBuf>,
}

/// Resolve the artifact for one request. `None` means no artifact — callers
/// treat this as a normal negative outcome.
pub async fn resolve_artifact(ctx: &ResolveContext<'_>) -> Option<PathBuf> {
    // 1. Direct hit.
    if ctx.expected_path.is_file() {
        return Some(ctx.expected_path.to_path_buf());
    }

    let roots = search_roots(ctx);

    // 2. Graph-description fallback.
    if let Some(png) = try_dot_conversion(ctx, &roots).await {
        return Some(png);
    }

    // 3. Image scan with request-id affinity.
    let candidates = scan_images(ctx, &roots);
    select_candidate(ctx, candidates)
}

/// Directories searched for stray artifacts, deduplicated, existing only:
/// the canonical directory, its `generated-diagrams` relative, the parent
/// output directory, the working root, and configured extras.
fn search_roots(ctx: &ResolveContext<'_>) -> Vec<PathBuf> {
    let canonical_dir = ctx
        .expected_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let mut roots = vec![canonical_dir.clone()];

    if canonical_dir.file_name().and_then(|n| n.to_str()) == Some(GENERATED_SUBDIR) {
        if let Some(parent) = canonical_dir.parent() {
            roots.push(parent.to_path_buf());
        }
    } else {
        roots.push(canonical_dir.join(GENERATED_SUBDIR));
    }

    roots.push(ctx.working_root.to_path_buf());
    roots.extend(ctx.extra_dirs.iter().cloned());

    roots.sort();
    roots.dedup();
    roots.retain(|r| r.is_dir());
    roots
}

/// The canonical directory the expected path lives in.
fn canonical_dir(ctx: &ResolveContext<'_>) -> PathBuf {
    ctx.expected_path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."))
}

// ============ Step 2: DOT discovery and conversion ============

/// Find the newest `.dot` file in the roots and rasterize it into the
/// expected path. Falls through (returns `None`) when no DOT file exists,
/// no converter is installed, or the conversion fails or times out.
async fn try_dot_conversion(ctx: &ResolveContext<'_>, roots: &[PathBuf]) -> Option<PathBuf> {
    let dot_set = build_globset(&["*.dot"]);

    let mut dot_files: Vec<(PathBuf, SystemTime)> = Vec::new();
    for root in roots {
        collect_matching(root, 1, &dot_set, ctx.expected_path, &mut dot_files);
    }
    let (latest, _) = newest(dot_files)?;
    println!("Found DOT file: {}", latest.display());

    let converter = match &ctx.converter {
        Some(c) => c.clone(),
        None => {
            println!("DOT file found but no conversion tool installed; skipping");
            return None;
        }
    };

    if let Some(parent) = ctx.expected_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    // Explicit size, aspect-ratio, and orientation overrides: the agent's
    // DOT output routinely defaults to portrait.
    let run = tokio::process::Command::new(&converter)
        .arg("-Tpng")
        .arg("-Gsize=16,9!")
        .arg("-Gratio=fill")
        .arg("-Grankdir=LR")
        .arg(&latest)
        .arg("-o")
        .arg(ctx.expected_path)
        .output();

    match tokio::time::timeout(ctx.conversion_timeout, run).await {
        Ok(Ok(output)) if output.status.success() && ctx.expected_path.is_file() => {
            println!("Converted DOT to PNG: {}", ctx.expected_path.display());
            Some(ctx.expected_path.to_path_buf())
        }
        Ok(Ok(output)) => {
            eprintln!(
                "DOT conversion failed ({}): {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
                    .chars()
                    .take(200)
                    .collect::<String>()
            );
            None
        }
        Ok(Err(e)) => {
            eprintln!("DOT conversion failed to start: {}", e);
            None
        }
        Err(_) => {
            eprintln!(
                "DOT conversion timed out after {:?}",
                ctx.conversion_timeout
            );
            None
        }
    }
}

// ============ Step 3: image scan ============

/// Enumerate raster/vector candidates under the roots (one nesting level
/// deep). Misplaced diagram-shaped files are claimed into the canonical
/// directory via atomic rename as a side effect, regardless of which branch
/// eventually returns.
fn scan_images(ctx: &ResolveContext<'_>, roots: &[PathBuf]) -> Vec<(PathBuf, SystemTime)> {
    let image_set = build_globset(&["*.png", "*.jpg", "*.jpeg", "*.svg"]);
    let canonical = canonical_dir(ctx);

    let mut found: Vec<(PathBuf, SystemTime)> = Vec::new();
    for root in roots {
        collect_matching(root, 2, &image_set, ctx.expected_path, &mut found);
    }
    found.sort_by(|a, b| a.0.cmp(&b.0));
    found.dedup_by(|a, b| a.0 == b.0);

    let mut candidates = Vec::with_capacity(found.len());
    for (path, mtime) in found {
        let in_canonical = path.parent() == Some(canonical.as_path());
        if !in_canonical && is_diagram_shaped(&path, ctx.request_id) {
            if let Some(claimed) = claim_into(&path, &canonical) {
                println!(
                    "Moved misplaced diagram {} -> {}",
                    path.display(),
                    claimed.display()
                );
                candidates.push((claimed, mtime));
                continue;
            }
            // Another claimant won, or the move failed; keep working with
            // the original location.
        }
        candidates.push((path, mtime));
    }
    candidates
}

/// A stray file is diagram-shaped if its name carries the request id or the
/// conventional `_diagram` suffix.
fn is_diagram_shaped(path: &Path, request_id: &str) -> bool {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    stem.contains(request_id) || stem.ends_with(DIAGRAM_SUFFIX)
}

/// Claim an ownerless file into the canonical directory by atomic rename.
/// At most one claimant can win; a failed rename means another request got
/// there first (or the filesystem refused) and is not an error.
fn claim_into(path: &Path, canonical: &Path) -> Option<PathBuf> {
    if std::fs::create_dir_all(canonical).is_err() {
        return None;
    }
    let dest = conflict_free_dest(canonical, path)?;
    match std::fs::rename(path, &dest) {
        Ok(()) => Some(dest),
        Err(e) => {
            eprintln!(
                "Could not claim {} into {}: {}",
                path.display(),
                canonical.display(),
                e
            );
            None
        }
    }
}

/// Destination path inside `dir` for `src`'s filename, suffixing the stem
/// with a disambiguating marker if the name is already taken.
fn conflict_free_dest(dir: &Path, src: &Path) -> Option<PathBuf> {
    let name = src.file_name()?.to_str()?;
    let first = dir.join(name);
    if !first.exists() {
        return Some(first);
    }
    let (stem, ext) = match name.rsplit_once('.') {
        Some((s, e)) => (s, Some(e)),
        None => (name, None),
    };
    for n in 1..100 {
        let candidate = match ext {
            Some(e) => dir.join(format!("{}_{}.{}", stem, n, e)),
            None => dir.join(format!("{}_{}", stem, n)),
        };
        if !candidate.exists() {
            return Some(candidate);
        }
    }
    None
}

// ============ Step 4: selection policy ============

/// Prefer request-id matches (newest first); otherwise the newest candidate
/// within the freshness window. The canonical path is populated by copy on
/// success; copy failures degrade to the unmoved candidate.
fn select_candidate(
    ctx: &ResolveContext<'_>,
    candidates: Vec<(PathBuf, SystemTime)>,
) -> Option<PathBuf> {
    if candidates.is_empty() {
        return None;
    }

    let matching: Vec<&(PathBuf, SystemTime)> = candidates
        .iter()
        .filter(|(p, _)| is_id_match(p, ctx.request_id))
        .collect();

    if let Some((path, _)) = matching.iter().max_by_key(|(_, t)| *t) {
        println!(
            "Selected diagram matching request {}: {}",
            ctx.request_id,
            path.display()
        );
        return Some(populate_canonical(ctx, path));
    }

    // No id match: newest overall, but only if fresh enough that it cannot
    // be a leftover from an earlier, unrelated run.
    let (path, mtime) = candidates.iter().max_by_key(|(_, t)| *t)?;
    let age = SystemTime::now()
        .duration_since(*mtime)
        .unwrap_or(Duration::ZERO);
    if age > ctx.freshness_window {
        println!(
            "Only stale candidates found (newest is {:?} old); treating as no artifact",
            age
        );
        return None;
    }
    println!("Selected fresh diagram (no request-id match): {}", path.display());
    Some(populate_canonical(ctx, path))
}

fn is_id_match(path: &Path, request_id: &str) -> bool {
    path.file_stem()
        .and_then(|s| s.to_str())
        .map(|s| s.contains(request_id))
        .unwrap_or(false)
}

/// Copy the selected candidate to the expected path so the canonical
/// location is always populated on success. The original stays in place for
/// audit. On copy failure the unmoved candidate is returned instead.
fn populate_canonical(ctx: &ResolveContext<'_>, candidate: &Path) -> PathBuf {
    if candidate == ctx.expected_path {
        return candidate.to_path_buf();
    }
    if let Some(parent) = ctx.expected_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }
    if ctx.expected_path.exists() {
        // Populated between scan and selection (concurrent request or the
        // agent finishing late). Keep it; the candidate remains on disk.
        return ctx.expected_path.to_path_buf();
    }
    match std::fs::copy(candidate, ctx.expected_path) {
        Ok(_) => ctx.expected_path.to_path_buf(),
        Err(e) => {
            eprintln!(
                "Could not copy {} to canonical path: {}",
                candidate.display(),
                e
            );
            candidate.to_path_buf()
        }
    }
}

// ============ Shared scan helpers ============

fn build_globset(patterns: &[&str]) -> GlobSet {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        if let Ok(glob) = Glob::new(pattern) {
            builder.add(glob);
        }
    }
    builder.build().unwrap_or_else(|_| GlobSet::empty())
}

/// Collect files under `root` (bounded depth) whose names match `set`,
/// excluding the expected path itself.
fn collect_matching(
    root: &Path,
    max_depth: usize,
    set: &GlobSet,
    exclude: &Path,
    out: &mut Vec<(PathBuf, SystemTime)>,
) {
    for entry in WalkDir::new(root)
        .max_depth(max_depth)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path == exclude {
            continue;
        }
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n,
            None => continue,
        };
        if !set.is_match(name) {
            continue;
        }
        if let Ok(meta) = entry.metadata() {
            if let Ok(mtime) = meta.modified() {
                out.push((path.to_path_buf(), mtime));
            }
        }
    }
}

fn newest(mut files: Vec<(PathBuf, SystemTime)>) -> Option<(PathBuf, SystemTime)> {
    files.sort_by_key(|(_, t)| *t);
    files.pop()
}
