//! In-process fakes for the agent trait (testing only)
//!
//! `ScriptedAgent` writes the same marker/name line pair to its log that the
//! real agent writes to `jamf.log`, then returns a scripted outcome. Every
//! invocation is recorded in order.

use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::agent::{AgentOutput, ManagementAgent};
use crate::error::{GoldloadError, Result};
use crate::policy::PolicyId;
use crate::resolver::{marker_for, NAME_PREFIX};

/// Scripted outcome for one policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptedPolicy {
    /// Name written after the marker; `None` writes no log lines at all.
    pub name: Option<String>,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ScriptedPolicy {
    pub fn ok(name: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            exit_code: 0,
            stdout: format!("Running policy {name}\n"),
            stderr: String::new(),
        }
    }

    pub fn failing(name: &str, exit_code: i32, stderr: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            exit_code,
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }

    /// Runs without logging a marker, so its name never resolves.
    pub fn silent_log(exit_code: i32) -> Self {
        Self {
            name: None,
            exit_code,
            stdout: String::new(),
            stderr: String::new(),
        }
    }
}

#[derive(Debug, Default)]
struct Calls {
    policies: Vec<PolicyId>,
    inventory: usize,
}

/// Agent double driven by a table of [`ScriptedPolicy`] entries.
#[derive(Debug)]
pub struct ScriptedAgent {
    log_path: PathBuf,
    script: HashMap<PolicyId, ScriptedPolicy>,
    log_delay: Duration,
    calls: Mutex<Calls>,
}

impl ScriptedAgent {
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        Self {
            log_path: log_path.into(),
            script: HashMap::new(),
            log_delay: Duration::ZERO,
            calls: Mutex::new(Calls::default()),
        }
    }

    pub fn with_policy(mut self, id: &str, policy: ScriptedPolicy) -> Self {
        let id = PolicyId::new(id).expect("scripted policy id must be valid");
        self.script.insert(id, policy);
        self
    }

    /// Pause before writing log lines, to exercise resolution racing the run.
    pub fn with_log_delay(mut self, delay: Duration) -> Self {
        self.log_delay = delay;
        self
    }

    /// Policy IDs in invocation order.
    pub fn invocations(&self) -> Vec<PolicyId> {
        self.calls.lock().unwrap().policies.clone()
    }

    pub fn inventory_submissions(&self) -> usize {
        self.calls.lock().unwrap().inventory
    }

    fn append_log(&self, text: &str) -> Result<()> {
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.log_path)?;
        file.write_all(text.as_bytes())?;
        Ok(())
    }
}

#[async_trait]
impl ManagementAgent for ScriptedAgent {
    async fn run_policy(&self, id: &PolicyId) -> Result<AgentOutput> {
        self.calls
            .lock()
            .unwrap()
            .policies
            .push(id.clone());

        let policy = self.script.get(id).cloned().ok_or_else(|| {
            GoldloadError::AgentSpawn {
                binary: PathBuf::from("scripted"),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    format!("no scripted outcome for policy {id}"),
                ),
            }
        })?;

        if !self.log_delay.is_zero() {
            tokio::time::sleep(self.log_delay).await;
        }
        if let Some(name) = &policy.name {
            self.append_log(&format!(
                "jamf[1]: {}\njamf[1]: {NAME_PREFIX}{name}\n",
                marker_for(id)
            ))?;
        }

        Ok(AgentOutput {
            exit_code: policy.exit_code,
            stdout: policy.stdout,
            stderr: policy.stderr,
            duration_ms: 0,
        })
    }

    async fn submit_inventory(&self) -> Result<AgentOutput> {
        self.calls.lock().unwrap().inventory += 1;
        Ok(AgentOutput {
            exit_code: 0,
            stdout: "Submitting data to the management server...\n".to_string(),
            stderr: String::new(),
            duration_ms: 0,
        })
    }
}
