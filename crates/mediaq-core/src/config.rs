use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::command::CommandSpec;

/// Worker pool sizing (`[engine]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of long-lived worker tasks.
    pub workers: usize,
    /// Queue capacity is `workers * queue_factor`; submitters block beyond it.
    pub queue_factor: usize,
    /// How long `serve` waits for in-flight jobs before cancelling them on shutdown.
    pub shutdown_grace_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            queue_factor: 10,
            shutdown_grace_secs: 5,
        }
    }
}

impl EngineConfig {
    pub fn queue_capacity(&self) -> usize {
        self.workers.max(1).saturating_mul(self.queue_factor.max(1))
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

/// External downloader invocation and output location (`[download]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DownloadConfig {
    /// Directory completed artifacts are written to.
    pub root: PathBuf,
    /// Downloader executable.
    pub program: String,
    /// Argument template; `{output}` and `{url}` are substituted per job.
    pub args: Vec<String>,
    /// Per-execution deadline in seconds (0 = rely on cancellation only).
    pub max_duration_secs: u64,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        let spec = CommandSpec::default();
        Self {
            root: PathBuf::from("./public/downloads"),
            program: spec.program,
            args: spec.args,
            max_duration_secs: 300,
        }
    }
}

impl DownloadConfig {
    pub fn command(&self) -> CommandSpec {
        CommandSpec {
            program: self.program.clone(),
            args: self.args.clone(),
        }
    }

    pub fn max_duration(&self) -> Duration {
        Duration::from_secs(self.max_duration_secs)
    }
}

/// Retry parameters (`[retry]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum number of executions per job (including the first).
    pub max_attempts: u32,
    /// Delay between attempts in milliseconds.
    pub delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 5_000,
        }
    }
}

impl RetryConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// Global configuration loaded from `~/.config/mediaq/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MediaqConfig {
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub download: DownloadConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("mediaq")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<MediaqConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = MediaqConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }
    load_from(&path)
}

/// Load configuration from an explicit path (e.g. `--config`).
pub fn load_from(path: &Path) -> Result<MediaqConfig> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("failed to read config: {}", path.display()))?;
    let cfg: MediaqConfig = toml::from_str(&data)
        .with_context(|| format!("failed to parse config: {}", path.display()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = MediaqConfig::default();
        assert_eq!(cfg.engine.workers, 4);
        assert_eq!(cfg.engine.queue_factor, 10);
        assert_eq!(cfg.engine.queue_capacity(), 40);
        assert_eq!(cfg.download.program, "yt-dlp");
        assert_eq!(cfg.download.max_duration(), Duration::from_secs(300));
        assert_eq!(cfg.retry.max_attempts, 3);
        assert_eq!(cfg.retry.delay(), Duration::from_secs(5));
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = MediaqConfig::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: MediaqConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.engine.workers, cfg.engine.workers);
        assert_eq!(parsed.download.args, cfg.download.args);
        assert_eq!(parsed.retry.delay_ms, cfg.retry.delay_ms);
    }

    #[test]
    fn config_toml_partial_sections_use_defaults() {
        let toml = r#"
            [engine]
            workers = 2

            [retry]
            delay_ms = 250
        "#;
        let cfg: MediaqConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.engine.workers, 2);
        assert_eq!(cfg.engine.queue_factor, 10);
        assert_eq!(cfg.engine.queue_capacity(), 20);
        assert_eq!(cfg.retry.max_attempts, 3);
        assert_eq!(cfg.retry.delay(), Duration::from_millis(250));
        assert_eq!(cfg.download.root, PathBuf::from("./public/downloads"));
    }

    #[test]
    fn config_toml_custom_download_command() {
        let toml = r#"
            [download]
            root = "/srv/media"
            program = "sh"
            args = ["-c", "cp /dev/null \"$0\"", "{output}"]
            max_duration_secs = 0
        "#;
        let cfg: MediaqConfig = toml::from_str(toml).unwrap();
        let spec = cfg.download.command();
        assert_eq!(spec.program, "sh");
        assert_eq!(spec.args.len(), 3);
        assert_eq!(cfg.download.max_duration(), Duration::ZERO);
        assert_eq!(cfg.download.root, PathBuf::from("/srv/media"));
    }

    #[test]
    fn queue_capacity_never_zero() {
        let cfg = EngineConfig {
            workers: 0,
            queue_factor: 0,
            shutdown_grace_secs: 0,
        };
        assert_eq!(cfg.queue_capacity(), 1);
    }

    #[test]
    fn load_from_reports_path_on_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[engine]\nworkers = \"many\"\n").unwrap();
        let err = load_from(&path).unwrap_err();
        assert!(format!("{:#}", err).contains("config.toml"));
    }
}
