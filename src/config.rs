use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub summarizer: SummarizerConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub resolver: ResolverConfig,
    #[serde(default)]
    pub mirror: Option<MirrorConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_upload_dir(),
            output_dir: default_output_dir(),
        }
    }
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("./uploads")
}
fn default_output_dir() -> PathBuf {
    PathBuf::from("./outputs")
}

#[derive(Debug, Deserialize, Clone)]
pub struct SummarizerConfig {
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default = "default_model_id")]
    pub model_id: String,
    /// Input is truncated to this length before prompt assembly
    /// (Bedrock request limits).
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Generous read timeout: summarization of long documents is slow.
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            model_id: default_model_id(),
            max_input_chars: default_max_input_chars(),
            connect_timeout_secs: default_connect_timeout_secs(),
            read_timeout_secs: default_read_timeout_secs(),
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_region() -> String {
    "us-east-1".to_string()
}
fn default_model_id() -> String {
    "anthropic.claude-3-5-sonnet-20241022-v2:0".to_string()
}
fn default_max_input_chars() -> usize {
    180_000
}
fn default_connect_timeout_secs() -> u64 {
    60
}
fn default_read_timeout_secs() -> u64 {
    600
}
fn default_max_attempts() -> u32 {
    3
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    /// Launcher executable for the diagram agent toolchain. Resolved via
    /// PATH first, then a short list of well-known install locations.
    #[serde(default = "default_launcher")]
    pub launcher: String,
    /// Arguments passed to the launcher (the diagram tool server to run).
    #[serde(default = "default_launcher_args")]
    pub args: Vec<String>,
    /// Optional wall-clock limit on the agent invocation, in seconds.
    /// `0` means no limit beyond whatever the launcher enforces itself.
    #[serde(default)]
    pub invoke_timeout_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            launcher: default_launcher(),
            args: default_launcher_args(),
            invoke_timeout_secs: 0,
        }
    }
}

fn default_launcher() -> String {
    "uvx".to_string()
}
fn default_launcher_args() -> Vec<String> {
    vec!["awslabs.aws-diagram-mcp-server".to_string()]
}

#[derive(Debug, Deserialize, Clone)]
pub struct ResolverConfig {
    /// Recency threshold for adopting a candidate that does not carry the
    /// request id in its name. Stale leftovers from earlier runs are ignored.
    #[serde(default = "default_freshness_window_secs")]
    pub freshness_window_secs: u64,
    /// Timeout for a single `dot` graph-to-PNG conversion.
    #[serde(default = "default_conversion_timeout_secs")]
    pub conversion_timeout_secs: u64,
    /// Additional directories the external agent has been observed to write
    /// into despite instructions. Scanned for misplaced artifacts.
    #[serde(default)]
    pub extra_search_dirs: Vec<PathBuf>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            freshness_window_secs: default_freshness_window_secs(),
            conversion_timeout_secs: default_conversion_timeout_secs(),
            extra_search_dirs: Vec::new(),
        }
    }
}

fn default_freshness_window_secs() -> u64 {
    60
}
fn default_conversion_timeout_secs() -> u64 {
    30
}

/// Optional S3 mirror for resolved diagrams.
#[derive(Debug, Deserialize, Clone)]
pub struct MirrorConfig {
    pub bucket: String,
    #[serde(default)]
    pub prefix: String,
    #[serde(default = "default_region")]
    pub region: String,
    /// Custom endpoint for S3-compatible services (MinIO, LocalStack).
    #[serde(default)]
    pub endpoint_url: Option<String>,
}

impl Config {
    /// Minimal configuration for tests and one-shot CLI commands that do not
    /// need a config file on disk.
    pub fn minimal() -> Self {
        Self {
            server: ServerConfig {
                bind: "127.0.0.1:8000".to_string(),
            },
            storage: StorageConfig::default(),
            summarizer: SummarizerConfig::default(),
            agent: AgentConfig::default(),
            resolver: ResolverConfig::default(),
            mirror: None,
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.server.bind.is_empty() {
        anyhow::bail!("server.bind must not be empty");
    }

    if config.summarizer.max_attempts == 0 {
        anyhow::bail!("summarizer.max_attempts must be >= 1");
    }

    if config.summarizer.max_input_chars == 0 {
        anyhow::bail!("summarizer.max_input_chars must be > 0");
    }

    if config.agent.launcher.is_empty() {
        anyhow::bail!("agent.launcher must not be empty");
    }

    if let Some(ref mirror) = config.mirror {
        if mirror.bucket.is_empty() {
            anyhow::bail!("mirror.bucket must not be empty when [mirror] is configured");
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_is_valid() {
        let cfg = Config::minimal();
        assert_eq!(cfg.resolver.freshness_window_secs, 60);
        assert_eq!(cfg.resolver.conversion_timeout_secs, 30);
        assert!(cfg.mirror.is_none());
    }

    #[test]
    fn parse_with_defaults() {
        let cfg: Config = toml::from_str(
            r#"
            [server]
            bind = "0.0.0.0:8000"
            "#,
        )
        .unwrap();
        assert_eq!(cfg.summarizer.region, "us-east-1");
        assert_eq!(cfg.summarizer.connect_timeout_secs, 60);
        assert_eq!(cfg.summarizer.read_timeout_secs, 600);
        assert_eq!(cfg.agent.launcher, "uvx");
    }

    #[test]
    fn parse_mirror_section() {
        let cfg: Config = toml::from_str(
            r#"
            [server]
            bind = "0.0.0.0:8000"

            [mirror]
            bucket = "diagrams"
            prefix = "generated/"
            "#,
        )
        .unwrap();
        let mirror = cfg.mirror.unwrap();
        assert_eq!(mirror.bucket, "diagrams");
        assert_eq!(mirror.region, "us-east-1");
    }
}
