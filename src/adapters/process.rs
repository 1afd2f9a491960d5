use crate::domain::model::CommandOutput;
use crate::domain::ports::CommandRunner;
use crate::utils::error::Result;
use std::process::Stdio;
use tokio::process::Command;

/// Spawns real processes on the host.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

impl CommandRunner for ProcessRunner {
    async fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput> {
        tracing::debug!("$ {} {}", program, args.join(" "));

        let output = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            // 取消時一併結束子行程
            .kill_on_drop(true)
            .output()
            .await?;

        // None means the process was killed by a signal
        let status = output.status.code().unwrap_or(-1);
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();

        tracing::debug!("exit status {} ({} bytes stdout)", status, stdout.len());

        Ok(CommandOutput {
            status,
            stdout,
            stderr,
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_captures_stdout_and_status() {
        let runner = ProcessRunner::new();
        let output = runner
            .run("sh", &["-c".to_string(), "echo out; echo err >&2; exit 3".to_string()])
            .await
            .unwrap();

        assert_eq!(output.status, 3);
        assert_eq!(output.stdout, "out\n");
        assert_eq!(output.stderr, "err\n");
        assert!(!output.success());
    }

    #[tokio::test]
    async fn test_dropped_run_kills_child() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("finished");
        let script = format!("sleep 1; touch {}", marker.display());

        let runner = ProcessRunner::new();
        let args = ["-c".to_string(), script];
        let run = runner.run("sh", &args);
        let timed_out = tokio::time::timeout(std::time::Duration::from_millis(200), run).await;
        assert!(timed_out.is_err());

        tokio::time::sleep(std::time::Duration::from_millis(1500)).await;
        assert!(!marker.exists());
    }

    #[tokio::test]
    async fn test_missing_program_is_io_error() {
        let runner = ProcessRunner::new();
        let result = runner.run("definitely-not-a-real-binary-xyz", &[]).await;

        assert!(matches!(
            result,
            Err(crate::utils::error::PipelineError::IoError(_))
        ));
    }
}
