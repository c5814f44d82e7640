//! Bounded `wg` invocations

use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;

use crate::error::{Error, Result};

/// Runner for the `wg` binary with a per-invocation time bound
#[derive(Debug, Clone)]
pub struct WgCommand {
    program: String,
    timeout: Duration,
}

impl WgCommand {
    /// Create a runner for `wg` found on PATH
    pub fn new(timeout: Duration) -> Self {
        Self::with_program("wg", timeout)
    }

    /// Create a runner for an explicit binary
    pub fn with_program(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    /// Run `wg <args>` optionally feeding `stdin`, returning trimmed stdout
    pub async fn run(&self, args: &[&str], stdin: Option<&str>) -> Result<String> {
        let label = format!("{} {}", self.program, args.join(" "));

        let mut child = Command::new(&self.program)
            .args(args)
            .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::external(&label, e))?;

        // Feeding stdin and waiting share one time bound
        let exchange = async move {
            if let Some(input) = stdin {
                if let Some(mut pipe) = child.stdin.take() {
                    pipe.write_all(input.as_bytes()).await?;
                    pipe.write_all(b"\n").await?;
                }
            }
            child.wait_with_output().await
        };

        let output = match timeout(self.timeout, exchange).await {
            Ok(result) => result.map_err(|e| Error::external(&label, e))?,
            Err(_) => {
                return Err(Error::external(
                    &label,
                    format!("timed out after {:?}", self.timeout),
                ));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::external(
                &label,
                format!("{}: {}", output.status, stderr.trim()),
            ));
        }

        tracing::trace!("{} succeeded", label);
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_stdout_is_trimmed() {
        let cmd = WgCommand::with_program("echo", Duration::from_secs(5));
        let out = cmd.run(&["  hello  "], None).await.unwrap();
        assert_eq!(out, "hello");
    }

    #[tokio::test]
    async fn test_stdin_is_forwarded() {
        let cmd = WgCommand::with_program("cat", Duration::from_secs(5));
        let out = cmd.run(&[], Some("private-key")).await.unwrap();
        assert_eq!(out, "private-key");
    }

    #[tokio::test]
    async fn test_failure_status_is_reported() {
        let cmd = WgCommand::with_program("false", Duration::from_secs(5));
        let err = cmd.run(&[], None).await.unwrap_err();
        assert!(matches!(err, Error::ExternalCapabilityFailed { .. }));
    }

    #[tokio::test]
    async fn test_missing_binary_is_reported() {
        let cmd = WgCommand::with_program("wolfgate-no-such-binary", Duration::from_secs(5));
        assert!(cmd.run(&["genkey"], None).await.is_err());
    }

    #[tokio::test]
    async fn test_timeout_covers_stdin_write() {
        // `sleep` never reads, so a payload larger than the pipe buffer blocks the write
        let cmd = WgCommand::with_program("sleep", Duration::from_millis(200));
        let payload = "x".repeat(1 << 20);
        let started = std::time::Instant::now();

        let err = cmd.run(&["5"], Some(&payload)).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_timeout_is_enforced() {
        let cmd = WgCommand::with_program("sleep", Duration::from_millis(100));
        let err = cmd.run(&["5"], None).await.unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
