//! Management agent invocation.
//!
//! [`ManagementAgent`] is the seam between the runner and the `jamf` binary;
//! tests substitute [`crate::fakes::ScriptedAgent`].

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use crate::error::{GoldloadError, Result};
use crate::policy::PolicyId;

/// Captured result of one agent invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentOutput {
    /// Exit code (`-1` when terminated by a signal).
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

impl AgentOutput {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

#[async_trait]
pub trait ManagementAgent: Send + Sync {
    /// `<agent> policy -id <id>`
    async fn run_policy(&self, id: &PolicyId) -> Result<AgentOutput>;

    /// Inventory submission run during cleanup (`<agent> recon` by default).
    async fn submit_inventory(&self) -> Result<AgentOutput>;
}

/// The `jamf` command-line binary.
#[derive(Debug, Clone)]
pub struct JamfAgent {
    binary: PathBuf,
    inventory_args: Vec<String>,
    policy_timeout: Option<Duration>,
}

impl JamfAgent {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            inventory_args: vec!["recon".to_string()],
            policy_timeout: None,
        }
    }

    /// Replace the inventory command arguments (e.g. `policy -id 61`).
    pub fn with_inventory_args(mut self, args: Vec<String>) -> Self {
        self.inventory_args = args;
        self
    }

    /// Kill a policy run that exceeds `timeout`.
    pub fn with_policy_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.policy_timeout = timeout;
        self
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    async fn exec(&self, args: &[String], timeout: Option<Duration>) -> Result<AgentOutput> {
        let start = Instant::now();
        debug!(binary = %self.binary.display(), ?args, "Invoking management agent");

        let child = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| GoldloadError::AgentSpawn {
                binary: self.binary.clone(),
                source,
            })?;

        let output = match timeout {
            Some(limit) => tokio::time::timeout(limit, child.wait_with_output())
                .await
                .map_err(|_| GoldloadError::AgentTimeout {
                    timeout_secs: limit.as_secs(),
                })??,
            None => child.wait_with_output().await?,
        };

        Ok(AgentOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

#[async_trait]
impl ManagementAgent for JamfAgent {
    async fn run_policy(&self, id: &PolicyId) -> Result<AgentOutput> {
        let args = vec!["policy".to_string(), "-id".to_string(), id.to_string()];
        self.exec(&args, self.policy_timeout).await
    }

    async fn submit_inventory(&self) -> Result<AgentOutput> {
        self.exec(&self.inventory_args, None).await
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;

    /// A stand-in `jamf` that echoes its arguments and exits with `$EXIT`.
    fn fake_jamf(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("jamf");
        std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn test_run_policy_passes_id() {
        let dir = tempfile::tempdir().unwrap();
        let jamf = fake_jamf(dir.path(), "echo \"$@\"");

        let agent = JamfAgent::new(jamf);
        let out = agent
            .run_policy(&PolicyId::new("42").unwrap())
            .await
            .unwrap();
        assert!(out.succeeded());
        assert_eq!(out.stdout.trim(), "policy -id 42");
    }

    #[tokio::test]
    async fn test_run_policy_captures_failure() {
        let dir = tempfile::tempdir().unwrap();
        let jamf = fake_jamf(dir.path(), "echo boom >&2\nexit 3");

        let out = JamfAgent::new(jamf)
            .run_policy(&PolicyId::new("1").unwrap())
            .await
            .unwrap();
        assert_eq!(out.exit_code, 3);
        assert!(out.stderr.contains("boom"));
    }

    #[tokio::test]
    async fn test_inventory_args_configurable() {
        let dir = tempfile::tempdir().unwrap();
        let jamf = fake_jamf(dir.path(), "echo \"$@\"");

        let default = JamfAgent::new(&jamf).submit_inventory().await.unwrap();
        assert_eq!(default.stdout.trim(), "recon");

        let custom = JamfAgent::new(&jamf)
            .with_inventory_args(vec!["policy".into(), "-id".into(), "61".into()])
            .submit_inventory()
            .await
            .unwrap();
        assert_eq!(custom.stdout.trim(), "policy -id 61");
    }

    #[tokio::test]
    async fn test_policy_timeout_kills_agent() {
        let dir = tempfile::tempdir().unwrap();
        let jamf = fake_jamf(dir.path(), "sleep 10");

        let err = JamfAgent::new(jamf)
            .with_policy_timeout(Some(Duration::from_millis(100)))
            .run_policy(&PolicyId::new("1").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, GoldloadError::AgentTimeout { .. }));
    }

    #[tokio::test]
    async fn test_missing_binary_is_spawn_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = JamfAgent::new(dir.path().join("nope"))
            .run_policy(&PolicyId::new("1").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, GoldloadError::AgentSpawn { .. }));
    }
}
