//! Session teardown after the summary has been shown.
//!
//! Every step is best-effort: failures are recorded in the
//! [`CleanupReport`] and the tracing log, never returned.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use serde::{Deserialize, Serialize};
use tokio::process::Command;

use crate::agent::ManagementAgent;
use crate::obs;
use crate::run_log::RunLog;

/// Files and tools touched by cleanup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CleanupConfig {
    /// Device whose owner is the logged-in console user.
    pub console_device: PathBuf,
    pub launchctl: PathBuf,
    pub launch_agent: PathBuf,
    pub launch_daemon: PathBuf,
    pub app_bundle: PathBuf,
    pub driver_script: PathBuf,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            console_device: PathBuf::from("/dev/console"),
            launchctl: PathBuf::from("/bin/launchctl"),
            launch_agent: PathBuf::from("/Library/LaunchAgents/com.goldload.launchdn.plist"),
            launch_daemon: PathBuf::from(
                "/Library/LaunchDaemons/com.goldload.launchdepnotify.plist",
            ),
            app_bundle: PathBuf::from("/Applications/Utilities/DEPNotify.app"),
            driver_script: PathBuf::from(
                "/Library/Application Support/JAMF/temp/DEPNotifyGoldLoad.py",
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CleanupStep {
    pub name: &'static str,
    pub ok: bool,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleanupReport {
    pub steps: Vec<CleanupStep>,
}

impl CleanupReport {
    pub fn all_ok(&self) -> bool {
        self.steps.iter().all(|s| s.ok)
    }

    pub fn step(&self, name: &str) -> Option<&CleanupStep> {
        self.steps.iter().find(|s| s.name == name)
    }

    fn record(&mut self, name: &'static str, outcome: Result<Option<String>, String>) {
        let step = match outcome {
            Ok(detail) => CleanupStep {
                name,
                ok: true,
                detail,
            },
            Err(error) => {
                obs::emit_cleanup_step_failed(name, &error);
                CleanupStep {
                    name,
                    ok: false,
                    detail: Some(error),
                }
            }
        };
        self.steps.push(step);
    }
}

pub struct Cleanup<'a> {
    config: &'a CleanupConfig,
    agent: &'a dyn ManagementAgent,
}

impl<'a> Cleanup<'a> {
    pub fn new(config: &'a CleanupConfig, agent: &'a dyn ManagementAgent) -> Self {
        Self { config, agent }
    }

    pub async fn run(&self, run_log: &mut RunLog) -> CleanupReport {
        let mut report = CleanupReport::default();

        note(run_log, "Removing LaunchAgent");
        let unload = match console_uid(&self.config.console_device) {
            Ok(uid) => self.unload_agent(uid, run_log).await,
            Err(err) => Err(format!(
                "cannot determine console user from {}: {err}",
                self.config.console_device.display()
            )),
        };
        report.record("unload_launch_agent", unload);
        report.record("remove_launch_agent", remove_path(&self.config.launch_agent).await);

        note(run_log, "Removing LaunchDaemon");
        report.record("remove_launch_daemon", remove_path(&self.config.launch_daemon).await);

        note(run_log, "Removing DEPNotify.app");
        report.record("remove_app_bundle", remove_path(&self.config.app_bundle).await);

        note(run_log, "Removing DEPNotify Script");
        report.record("remove_driver_script", remove_path(&self.config.driver_script).await);

        note(run_log, "Performing Recon");
        let inventory = match self.agent.submit_inventory().await {
            Ok(out) => {
                note(run_log, &out.stdout);
                note(run_log, &out.stderr);
                if out.succeeded() {
                    Ok(None)
                } else {
                    Err(format!("inventory exited with code {}", out.exit_code))
                }
            }
            Err(err) => Err(err.to_string()),
        };
        report.record("submit_inventory", inventory);

        if let Err(err) = run_log.flush() {
            obs::emit_cleanup_step_failed("flush_run_log", &err.to_string());
        }
        report
    }

    async fn unload_agent(&self, uid: u32, run_log: &mut RunLog) -> Result<Option<String>, String> {
        let output = Command::new(&self.config.launchctl)
            .arg("asuser")
            .arg(uid.to_string())
            .arg("unload")
            .arg(&self.config.launch_agent)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| format!("failed to run {}: {e}", self.config.launchctl.display()))?;

        note(run_log, &String::from_utf8_lossy(&output.stdout));
        note(run_log, &String::from_utf8_lossy(&output.stderr));

        if output.status.success() {
            Ok(Some(format!("unloaded for uid {uid}")))
        } else {
            Err(format!("launchctl exited with {}", output.status))
        }
    }
}

/// Write to the run log, tolerating failure.
fn note(run_log: &mut RunLog, message: &str) {
    if let Err(err) = run_log.write(message) {
        obs::emit_cleanup_step_failed("write_run_log", &err.to_string());
    }
}

/// UID of the user owning the console device.
#[cfg(unix)]
pub fn console_uid(device: &Path) -> io::Result<u32> {
    use std::os::unix::fs::MetadataExt;
    Ok(std::fs::metadata(device)?.uid())
}

#[cfg(not(unix))]
pub fn console_uid(_device: &Path) -> io::Result<u32> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "console user lookup requires a unix host",
    ))
}

/// Remove a file or directory tree; an absent path counts as done.
async fn remove_path(path: &Path) -> Result<Option<String>, String> {
    let meta = match tokio::fs::symlink_metadata(path).await {
        Ok(meta) => meta,
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            return Ok(Some("already absent".to_string()));
        }
        Err(err) => return Err(format!("{}: {err}", path.display())),
    };

    let removed = if meta.is_dir() {
        tokio::fs::remove_dir_all(path).await
    } else {
        tokio::fs::remove_file(path).await
    };
    removed
        .map(|_| None)
        .map_err(|err| format!("{}: {err}", path.display()))
}
