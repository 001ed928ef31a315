//! Diagram agent invocation wrapper.
//!
//! The external diagram agent is a black box: a launcher executable that
//! receives one natural-language instruction on stdin and may leave zero or
//! more image or graph-description files somewhere on disk. This wrapper
//! only locates the launcher, issues the single instruction, and checks the
//! one expected output path against a narrow machine-checked contract
//! (exists, non-empty, PNG magic bytes). Deeper filesystem search belongs to
//! [`crate::resolve`].
//!
//! Diagram generation is always optional: a missing launcher and every
//! invocation failure resolve to `None`, never an error. A timeout is
//! reported distinctly so operators can tell "agent too slow" from "agent
//! crashed."

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use crate::config::AgentConfig;

/// PNG file signature.
const PNG_MAGIC: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Locate the launcher executable: PATH first, then well-known install
/// locations. `None` means diagram generation is unavailable, which is a
/// normal outcome, not an error.
pub fn find_launcher(name: &str) -> Option<PathBuf> {
    if name.contains('/') {
        let p = PathBuf::from(name);
        return p.is_file().then_some(p);
    }

    if let Ok(path_var) = std::env::var("PATH") {
        for dir in std::env::split_paths(&path_var) {
            let candidate = dir.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }
    }

    let mut well_known: Vec<PathBuf> = Vec::new();
    if let Ok(home) = std::env::var("HOME") {
        let home = PathBuf::from(home);
        well_known.push(home.join(".local/bin"));
        well_known.push(home.join(".cargo/bin"));
    }
    well_known.push(PathBuf::from("/usr/local/bin"));
    well_known.push(PathBuf::from("/opt/homebrew/bin"));

    for dir in well_known {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
    }

    None
}

/// Single reviewable instruction template. Embeds the normalized summary and
/// the absolute output path, states the format constraints once, and relies
/// on the resolver's machine-checked contract instead of repeated emphasis.
pub fn build_diagram_prompt(summary: &str, expected_path: &Path, extra: Option<&str>) -> String {
    let mut prompt = format!(
        "Create a cloud architecture diagram from the summary below using the \
         available diagram tools.

Output contract:
- One rendered PNG image file, saved to exactly this path: {path}
- Landscape 16:9 canvas (for example 1920x1080), white background
- Rectangular containers with sharp corners, official provider icons, \
directional data-flow arrows
- Do not emit DOT, Mermaid, or any textual diagram syntax as the final output

Architecture summary:
{summary}
",
        path = expected_path.display(),
        summary = summary,
    );
    if let Some(extra) = extra {
        prompt.push_str("\nAdditional instructions:\n");
        prompt.push_str(extra);
        prompt.push('\n');
    }
    prompt
}

/// Scoped, guaranteed-reverting mutation of process environment variables.
///
/// Child processes inherit the environment at spawn time; this guard sets
/// variables for the duration of one external invocation and restores the
/// previous values on drop, on every exit path.
pub struct ScopedEnv {
    saved: Vec<(String, Option<String>)>,
}

impl ScopedEnv {
    pub fn set(vars: &[(&str, &str)]) -> Self {
        let mut saved = Vec::with_capacity(vars.len());
        for (key, value) in vars {
            saved.push((key.to_string(), std::env::var(key).ok()));
            std::env::set_var(key, value);
        }
        Self { saved }
    }
}

impl Drop for ScopedEnv {
    fn drop(&mut self) {
        for (key, previous) in self.saved.drain(..) {
            match previous {
                Some(v) => std::env::set_var(&key, v),
                None => std::env::remove_var(&key),
            }
        }
    }
}

/// Invoke the diagram agent with a single instruction.
///
/// Returns the expected path if the agent populated it with a valid PNG,
/// `None` otherwise. The return value is advisory: the resolver runs
/// afterwards regardless.
pub async fn invoke(config: &AgentConfig, prompt: &str, expected_path: &Path) -> Option<PathBuf> {
    let launcher = match find_launcher(&config.launcher) {
        Some(p) => p,
        None => {
            println!(
                "Diagram generation skipped: '{}' not found on PATH or in known install locations",
                config.launcher
            );
            return None;
        }
    };
    println!("Using diagram agent launcher: {}", launcher.display());

    // Quiet the launcher's interpreter noise for this one call only.
    let _env = ScopedEnv::set(&[("PYTHONWARNINGS", "ignore"), ("NO_COLOR", "1")]);

    match run_agent(config, &launcher, prompt).await {
        Ok(output) => {
            if !output.is_empty() {
                let head: String = output.chars().take(500).collect();
                println!("Agent response: {}...", head);
            }
        }
        Err(AgentFailure::Timeout(secs)) => {
            eprintln!("Diagram agent timed out after {}s (agent too slow)", secs);
            return check_expected(expected_path);
        }
        Err(AgentFailure::Other(msg)) => {
            let head: String = msg.chars().take(200).collect();
            println!("Diagram generation unavailable: {}", head);
            return check_expected(expected_path);
        }
    }

    check_expected(expected_path)
}

enum AgentFailure {
    Timeout(u64),
    Other(String),
}

async fn run_agent(
    config: &AgentConfig,
    launcher: &Path,
    prompt: &str,
) -> Result<String, AgentFailure> {
    let mut cmd = tokio::process::Command::new(launcher);
    cmd.args(&config.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(false); // fire-and-forget once started

    let mut child = cmd
        .spawn()
        .map_err(|e| AgentFailure::Other(format!("failed to start agent: {}", e)))?;

    if let Some(mut stdin) = child.stdin.take() {
        if let Err(e) = stdin.write_all(prompt.as_bytes()).await {
            return Err(AgentFailure::Other(format!(
                "failed to send instruction: {}",
                e
            )));
        }
        drop(stdin);
    }
    println!("Sent instruction to agent ({} chars)", prompt.len());

    let wait = child.wait_with_output();
    let output = if config.invoke_timeout_secs > 0 {
        match tokio::time::timeout(Duration::from_secs(config.invoke_timeout_secs), wait).await {
            Ok(result) => result,
            Err(_) => return Err(AgentFailure::Timeout(config.invoke_timeout_secs)),
        }
    } else {
        wait.await
    }
    .map_err(|e| AgentFailure::Other(format!("agent wait failed: {}", e)))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(AgentFailure::Other(format!(
            "agent exited with {}: {}",
            output.status,
            stderr.chars().take(300).collect::<String>()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).to_string())
}

/// The narrow output contract: file exists, non-empty, and carries PNG magic
/// bytes when the expected path is a `.png`.
fn check_expected(expected_path: &Path) -> Option<PathBuf> {
    let meta = std::fs::metadata(expected_path).ok()?;
    if !meta.is_file() || meta.len() == 0 {
        return None;
    }
    let wants_png = expected_path
        .extension()
        .map(|e| e.eq_ignore_ascii_case("png"))
        .unwrap_or(false);
    if wants_png && !has_png_magic(expected_path) {
        eprintln!(
            "File at expected path is not a PNG: {}",
            expected_path.display()
        );
        return None;
    }
    println!("Diagram found at expected path: {}", expected_path.display());
    Some(expected_path.to_path_buf())
}

fn has_png_magic(path: &Path) -> bool {
    use std::io::Read;
    let mut header = [0u8; 8];
    match std::fs::File::open(path).and_then(|mut f| f.read_exact(&mut header)) {
        Ok(()) => header == *PNG_MAGIC,
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scoped_env_restores_previous_value() {
        std::env::set_var("ARCHD_TEST_VAR", "before");
        {
            let _guard = ScopedEnv::set(&[("ARCHD_TEST_VAR", "during")]);
            assert_eq!(std::env::var("ARCHD_TEST_VAR").unwrap(), "during");
        }
        assert_eq!(std::env::var("ARCHD_TEST_VAR").unwrap(), "before");
        std::env::remove_var("ARCHD_TEST_VAR");
    }

    #[test]
    fn scoped_env_removes_previously_unset_value() {
        std::env::remove_var("ARCHD_TEST_UNSET");
        {
            let _guard = ScopedEnv::set(&[("ARCHD_TEST_UNSET", "x")]);
            assert!(std::env::var("ARCHD_TEST_UNSET").is_ok());
        }
        assert!(std::env::var("ARCHD_TEST_UNSET").is_err());
    }

    #[test]
    fn prompt_embeds_summary_and_path() {
        let p = build_diagram_prompt("the summary", Path::new("/out/x.png"), None);
        assert!(p.contains("the summary"));
        assert!(p.contains("/out/x.png"));
        assert!(p.contains("PNG"));
    }

    #[test]
    fn prompt_appends_extra_instructions() {
        let p = build_diagram_prompt("s", Path::new("/o.png"), Some("use orange boxes"));
        assert!(p.contains("use orange boxes"));
    }

    #[test]
    fn missing_launcher_is_none() {
        assert!(find_launcher("definitely-not-a-real-binary-name-xyz").is_none());
    }

    #[test]
    fn expected_check_rejects_empty_and_non_png() {
        let dir = std::env::temp_dir().join("archd-agent-test");
        std::fs::create_dir_all(&dir).unwrap();

        let empty = dir.join("empty_diagram.png");
        std::fs::write(&empty, b"").unwrap();
        assert!(check_expected(&empty).is_none());

        let not_png = dir.join("text_diagram.png");
        std::fs::write(&not_png, b"hello").unwrap();
        assert!(check_expected(&not_png).is_none());

        let png = dir.join("real_diagram.png");
        let mut bytes = PNG_MAGIC.to_vec();
        bytes.extend_from_slice(b"rest");
        std::fs::write(&png, &bytes).unwrap();
        assert_eq!(check_expected(&png), Some(png.clone()));

        let _ = std::fs::remove_dir_all(&dir);
    }
}
