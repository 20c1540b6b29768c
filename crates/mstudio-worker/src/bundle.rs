//! External bundler invocation.

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{WorkerError, WorkerResult};

/// Runs the configured bundler as `<command...> <entry> --out-dir <out>`.
#[derive(Debug, Clone)]
pub struct Bundler {
    command: Vec<String>,
    timeout: Duration,
}

impl Bundler {
    pub fn new(command: Vec<String>, timeout: Duration) -> Self {
        Self { command, timeout }
    }

    /// Bundle `entry_point` into `out_dir`. The output must contain `index.html`.
    pub async fn bundle(&self, entry_point: &Path, out_dir: &Path) -> WorkerResult<()> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| WorkerError::bundle("bundle command is empty"))?;

        info!(entry = ?entry_point, out = ?out_dir, "Bundling site");

        let mut cmd = Command::new(program);
        cmd.args(args)
            .arg(entry_point)
            .arg("--out-dir")
            .arg(out_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd
            .spawn()
            .map_err(|e| WorkerError::bundle(format!("failed to start {}: {}", program, e)))?;

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| {
                WorkerError::bundle(format!("timed out after {}s", self.timeout.as_secs()))
            })??;

        if !output.status.success() {
            return Err(WorkerError::bundle(format!(
                "{} exited with {}: {}",
                program,
                output.status,
                tail(&String::from_utf8_lossy(&output.stderr), 20)
            )));
        }

        if !tokio::fs::try_exists(out_dir.join("index.html")).await? {
            return Err(WorkerError::bundle("bundle output has no index.html"));
        }

        debug!(out = ?out_dir, "Bundle ready");
        Ok(())
    }
}

/// Last `lines` lines of `text`.
fn tail(text: &str, lines: usize) -> String {
    let all: Vec<&str> = text.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}
