//! External command invocation.
//!
//! A `CommandSpec` is the configured downloader (program plus an argument
//! template). Each execution renders it into an `Invocation` carrying the
//! job's cancellation token and optional deadline, and hands it to a
//! `CommandRunner`. `ProcessRunner` spawns a real child process via tokio and
//! kills it when cancelled or timed out.

use async_trait::async_trait;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Placeholder replaced by the temporary output path.
pub const OUTPUT_PLACEHOLDER: &str = "{output}";
/// Placeholder replaced by the source URL.
pub const URL_PLACEHOLDER: &str = "{url}";

/// How many trailing stderr bytes are kept for error reporting.
const STDERR_TAIL_BYTES: usize = 512;

/// Downloader program and argument template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for CommandSpec {
    fn default() -> Self {
        Self {
            program: "yt-dlp".to_string(),
            args: ["-o", OUTPUT_PLACEHOLDER, "-f", "mp4", URL_PLACEHOLDER]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl CommandSpec {
    /// Substitute `{output}` and `{url}` in every argument.
    pub fn render_args(&self, output: &Path, url: &str) -> Vec<String> {
        let output = output.to_string_lossy();
        self.args
            .iter()
            .map(|a| a.replace(OUTPUT_PLACEHOLDER, &output).replace(URL_PLACEHOLDER, url))
            .collect()
    }
}

/// One execution of a command, bound to a cancellation token and optional deadline.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    pub cancel: CancellationToken,
    /// `None` means no deadline beyond cancellation.
    pub deadline: Option<Duration>,
}

#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("failed to start {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed waiting for {program}: {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{program} exited with {status}{}", stderr_suffix(.stderr))]
    Exit {
        program: String,
        status: ExitStatus,
        stderr: String,
    },
    #[error("{program} did not finish within {limit:?}")]
    Timeout { program: String, limit: Duration },
    #[error("{program} cancelled")]
    Cancelled { program: String },
}

fn stderr_suffix(stderr: &str) -> String {
    if stderr.is_empty() {
        String::new()
    } else {
        format!(": {}", stderr)
    }
}

/// Runs an external command to completion, failure, deadline or cancellation.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, invocation: Invocation) -> Result<(), CommandError>;
}

/// Runs commands as child processes. The child is killed if the invocation is
/// cancelled or its deadline elapses.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, invocation: Invocation) -> Result<(), CommandError> {
        let Invocation {
            program,
            args,
            cancel,
            deadline,
        } = invocation;

        if cancel.is_cancelled() {
            return Err(CommandError::Cancelled { program });
        }

        let child = tokio::process::Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| CommandError::Spawn {
                program: program.clone(),
                source,
            })?;
        tracing::debug!(program = %program, pid = ?child.id(), "spawned command");

        let timer = async {
            match deadline {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };

        // Dropping `wait` on the losing branches drops the child, which kills it.
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(CommandError::Cancelled { program }),
            _ = timer => Err(CommandError::Timeout {
                program,
                limit: deadline.unwrap_or_default(),
            }),
            output = child.wait_with_output() => {
                let output = output.map_err(|source| CommandError::Wait {
                    program: program.clone(),
                    source,
                })?;
                if output.status.success() {
                    Ok(())
                } else {
                    Err(CommandError::Exit {
                        program,
                        status: output.status,
                        stderr: stderr_tail(&output.stderr),
                    })
                }
            }
        }
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let start = stderr.len().saturating_sub(STDERR_TAIL_BYTES);
    String::from_utf8_lossy(&stderr[start..]).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn invocation(program: &str, args: &[&str], deadline: Option<Duration>) -> Invocation {
        Invocation {
            program: program.to_string(),
            args: args.iter().map(|s| s.to_string()).collect(),
            cancel: CancellationToken::new(),
            deadline,
        }
    }

    #[test]
    fn default_spec_renders_yt_dlp_arguments() {
        let spec = CommandSpec::default();
        let args = spec.render_args(&PathBuf::from("/tmp/a.mp4.part"), "https://example.com/v");
        assert_eq!(spec.program, "yt-dlp");
        assert_eq!(
            args,
            vec!["-o", "/tmp/a.mp4.part", "-f", "mp4", "https://example.com/v"]
        );
    }

    #[test]
    fn render_substitutes_inside_arguments() {
        let spec = CommandSpec {
            program: "sh".into(),
            args: vec!["-c".into(), "echo {url} > {output}".into()],
        };
        let args = spec.render_args(Path::new("out.bin"), "u");
        assert_eq!(args[1], "echo u > out.bin");
    }

    #[test]
    fn stderr_tail_keeps_last_bytes() {
        let long = vec![b'x'; STDERR_TAIL_BYTES + 10];
        assert_eq!(stderr_tail(&long).len(), STDERR_TAIL_BYTES);
        assert_eq!(stderr_tail(b"  boom\n"), "boom");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn process_runner_reports_success_and_exit_status() {
        let runner = ProcessRunner;
        runner.run(invocation("true", &[], None)).await.unwrap();

        let err = runner
            .run(invocation("sh", &["-c", "echo nope >&2; exit 3"], None))
            .await
            .unwrap_err();
        match err {
            CommandError::Exit { status, stderr, .. } => {
                assert_eq!(status.code(), Some(3));
                assert_eq!(stderr, "nope");
            }
            other => panic!("expected Exit, got {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn process_runner_times_out() {
        let err = ProcessRunner
            .run(invocation("sleep", &["5"], Some(Duration::from_millis(50))))
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Timeout { .. }), "{err:?}");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn process_runner_stops_on_cancel() {
        let inv = invocation("sleep", &["5"], None);
        let cancel = inv.cancel.clone();
        let started = std::time::Instant::now();
        let handle = tokio::spawn(async move { ProcessRunner.run(inv).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        cancel.cancel();
        let err = handle.await.unwrap().unwrap_err();
        assert!(matches!(err, CommandError::Cancelled { .. }), "{err:?}");
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test]
    async fn process_runner_missing_program_is_spawn_error() {
        let err = ProcessRunner
            .run(invocation("mediaq-definitely-not-installed", &[], None))
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }), "{err:?}");
    }
}
