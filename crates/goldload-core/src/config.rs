//! Layered provisioning configuration.
//!
//! Defaults depend on the workflow, so a TOML file is merged over the
//! defaults of the workflow it selects (or the one forced by the caller)
//! rather than over a single static default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::agent::JamfAgent;
use crate::cleanup::CleanupConfig;
use crate::error::{GoldloadError, Result};
use crate::resolver::{PolicyNameResolver, DEFAULT_RESOLVE_TIMEOUT};
use crate::tail::DEFAULT_POLL_INTERVAL;
use crate::workflow::Workflow;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProvisionConfig {
    pub workflow: Workflow,
    pub agent_binary: PathBuf,
    /// Log the agent appends to while running policies.
    pub agent_log: PathBuf,
    pub run_log: PathBuf,
    pub relay_file: PathBuf,
    pub caution_icon: PathBuf,
    pub poll_interval_ms: u64,
    pub resolve_timeout_secs: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_timeout_secs: Option<u64>,
    /// Arguments passed to the agent for the final inventory submission.
    pub inventory_args: Vec<String>,
    pub cleanup: CleanupConfig,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self::for_workflow(Workflow::default())
    }
}

impl ProvisionConfig {
    pub fn for_workflow(workflow: Workflow) -> Self {
        Self {
            workflow,
            agent_binary: PathBuf::from("/usr/local/bin/jamf"),
            agent_log: PathBuf::from("/private/var/log/jamf.log"),
            run_log: PathBuf::from(workflow.default_run_log()),
            relay_file: PathBuf::from("/var/tmp/depnotify.log"),
            caution_icon: PathBuf::from(
                "/System/Library/CoreServices/CoreTypes.bundle/Contents/Resources/AlertCautionIcon.icns",
            ),
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            resolve_timeout_secs: DEFAULT_RESOLVE_TIMEOUT.as_secs(),
            policy_timeout_secs: None,
            inventory_args: vec!["recon".to_string()],
            cleanup: CleanupConfig {
                driver_script: PathBuf::from(workflow.default_driver_script()),
                ..CleanupConfig::default()
            },
        }
    }

    /// Build the effective configuration from an optional TOML file.
    ///
    /// `workflow` overrides whatever the file selects.
    pub fn load(path: Option<&Path>, workflow: Option<Workflow>) -> Result<Self> {
        let text = match path {
            Some(path) => std::fs::read_to_string(path).map_err(|source| GoldloadError::Open {
                what: "config file",
                path: path.to_path_buf(),
                source,
            })?,
            None => String::new(),
        };
        Self::from_toml_str(&text, workflow)
    }

    pub fn from_toml_str(text: &str, workflow: Option<Workflow>) -> Result<Self> {
        let mut overrides: toml::Table = toml::from_str(text)?;
        if let Some(workflow) = workflow {
            overrides.insert(
                "workflow".to_string(),
                toml::Value::String(workflow.name().to_string()),
            );
        }

        let selected = match overrides.get("workflow") {
            Some(value) => value.clone().try_into::<Workflow>()?,
            None => Workflow::default(),
        };

        let mut merged = match toml::Value::try_from(Self::for_workflow(selected)) {
            Ok(toml::Value::Table(table)) => table,
            Ok(_) => return Err(GoldloadError::Config("defaults are not a table".into())),
            Err(err) => return Err(GoldloadError::Config(err.to_string())),
        };
        merge_tables(&mut merged, overrides);

        let config: Self = toml::Value::Table(merged).try_into()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_ms == 0 {
            return Err(GoldloadError::Config("poll_interval_ms must be positive".into()));
        }
        if self.resolve_timeout_secs == 0 {
            return Err(GoldloadError::Config("resolve_timeout_secs must be positive".into()));
        }
        if self.policy_timeout_secs == Some(0) {
            return Err(GoldloadError::Config("policy_timeout_secs must be positive".into()));
        }
        if self.inventory_args.is_empty() {
            return Err(GoldloadError::Config("inventory_args must not be empty".into()));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn resolve_timeout(&self) -> Duration {
        Duration::from_secs(self.resolve_timeout_secs)
    }

    pub fn policy_timeout(&self) -> Option<Duration> {
        self.policy_timeout_secs.map(Duration::from_secs)
    }

    pub fn resolver(&self) -> PolicyNameResolver {
        PolicyNameResolver::new(self.resolve_timeout())
    }

    pub fn agent(&self) -> JamfAgent {
        JamfAgent::new(&self.agent_binary)
            .with_inventory_args(self.inventory_args.clone())
            .with_policy_timeout(self.policy_timeout())
    }
}

/// Recursively overlay `overrides` onto `base`.
fn merge_tables(base: &mut toml::Table, overrides: toml::Table) {
    for (key, value) in overrides {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}
