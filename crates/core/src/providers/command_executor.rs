//! Subprocess executor for command-line model providers.
//!
//! Spawns a command, optionally feeds the prompt on stdin, and collects its
//! output within a time limit.

use crate::providers::base::ModelError;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

/// Captured result of a finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub success: bool,
}

/// CLI executor for command providers.
pub struct CommandExecutor;

impl CommandExecutor {
    /// Run a command to completion.
    ///
    /// # Arguments
    ///
    /// * `command` - The program to execute (e.g., "claude", "llm")
    /// * `args` - Command line arguments
    /// * `stdin` - Text written to the child's stdin, which is then closed
    /// * `timeout` - Upper bound on the whole call; the child is killed when it elapses
    ///
    /// # Errors
    ///
    /// - `ModelError::NotAvailable` if the command cannot be spawned
    /// - `ModelError::Timeout` if the limit elapses
    /// - `ModelError::ProviderError` on I/O failures while talking to the child
    ///
    /// A non-zero exit status is not an error here; callers inspect
    /// [`CommandOutput::success`].
    pub async fn run(
        command: &str,
        args: &[String],
        stdin: Option<String>,
        timeout: Option<Duration>,
    ) -> Result<CommandOutput, ModelError> {
        let mut cmd = Command::new(command);
        cmd.args(args);
        cmd.stdin(if stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());
        cmd.kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            ModelError::NotAvailable(format!("Failed to spawn command '{command}': {e}"))
        })?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| ModelError::ProviderError("Failed to capture stdout".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| ModelError::ProviderError("Failed to capture stderr".to_string()))?;
        let child_stdin = child.stdin.take();

        let io = async {
            let write_stdin = async {
                if let (Some(mut pipe), Some(input)) = (child_stdin, stdin) {
                    // A child that exits without reading its input closes the pipe early.
                    if let Err(e) = pipe.write_all(input.as_bytes()).await {
                        if e.kind() != std::io::ErrorKind::BrokenPipe {
                            return Err(ModelError::ProviderError(format!(
                                "Failed to write stdin: {e}"
                            )));
                        }
                    }
                    // Dropping the pipe closes stdin so the child sees EOF.
                    drop(pipe);
                }
                Ok(())
            };

            let mut out = Vec::new();
            let mut err = Vec::new();
            let (in_res, out_res, err_res) = tokio::join!(
                write_stdin,
                stdout.read_to_end(&mut out),
                stderr.read_to_end(&mut err)
            );
            in_res?;
            out_res.map_err(|e| ModelError::ProviderError(format!("Failed to read stdout: {e}")))?;
            err_res.map_err(|e| ModelError::ProviderError(format!("Failed to read stderr: {e}")))?;

            let status = child
                .wait()
                .await
                .map_err(|e| ModelError::ProviderError(format!("Failed to wait for command: {e}")))?;

            Ok(CommandOutput {
                stdout: String::from_utf8_lossy(&out).into_owned(),
                stderr: String::from_utf8_lossy(&err).into_owned(),
                exit_code: status.code(),
                success: status.success(),
            })
        };

        match timeout {
            Some(limit) => match tokio::time::timeout(limit, io).await {
                Ok(result) => result,
                Err(_) => Err(ModelError::Timeout(limit.as_secs())),
            },
            None => io.await,
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_run_echo() {
        let output = CommandExecutor::run("echo", &["hello".to_string()], None, None)
            .await
            .expect("echo should run");

        assert!(output.success);
        assert_eq!(output.stdout.trim(), "hello");
    }

    #[tokio::test]
    async fn test_run_with_stdin() {
        let output = CommandExecutor::run("cat", &[], Some("from stdin".to_string()), None)
            .await
            .expect("cat should run");

        assert_eq!(output.stdout, "from stdin");
    }

    #[tokio::test]
    async fn test_run_invalid_command() {
        let result = CommandExecutor::run("nonexistent-command-xyz", &[], None, None).await;

        match result {
            Err(ModelError::NotAvailable(msg)) => assert!(msg.contains("Failed to spawn command")),
            other => panic!("Expected NotAvailable, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_run_nonzero_exit() {
        let output = CommandExecutor::run(
            "sh",
            &["-c".to_string(), "echo oops >&2; exit 3".to_string()],
            None,
            None,
        )
        .await
        .expect("sh should run");

        assert!(!output.success);
        assert_eq!(output.exit_code, Some(3));
        assert_eq!(output.stderr.trim(), "oops");
    }

    #[tokio::test]
    async fn test_run_timeout() {
        let result = CommandExecutor::run(
            "sleep",
            &["5".to_string()],
            None,
            Some(Duration::from_millis(100)),
        )
        .await;

        assert!(matches!(result, Err(ModelError::Timeout(_))));
    }
}
