//! Sequential policy execution with live name correlation.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, warn};

use crate::agent::ManagementAgent;
use crate::classify::classify;
use crate::error::Result;
use crate::obs;
use crate::policy::{ensure_unique, PolicyCategory, PolicyId, PolicyName, PolicyRecord};
use crate::relay::{RelayCommand, RelayWriter};
use crate::resolver::{NameScan, PolicyNameResolver};
use crate::run_log::RunLog;
use crate::tail::LogTail;
use crate::workflow::Workflow;

const SEPARATOR: &str = "============================================";

/// Ordered policy lists for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunPlan {
    pub visible: Vec<PolicyId>,
    pub silent: Vec<PolicyId>,
}

impl RunPlan {
    /// Build a plan; an ID may appear only once across both lists.
    pub fn new(visible: Vec<PolicyId>, silent: Vec<PolicyId>) -> Result<Self> {
        ensure_unique(visible.iter().chain(silent.iter()))?;
        Ok(Self { visible, silent })
    }

    pub fn len(&self) -> usize {
        self.visible.len() + self.silent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Accumulated outcome of a run, owned by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunResult {
    pub run_id: String,
    /// Records in execution order.
    pub records: Vec<PolicyRecord>,
    failed: Vec<PolicyId>,
    pub duration_ms: u64,
}

impl RunResult {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            records: Vec::new(),
            failed: Vec::new(),
            duration_ms: 0,
        }
    }

    pub fn push(&mut self, record: PolicyRecord, failed: bool) {
        if failed {
            self.failed.push(record.id.clone());
        }
        self.records.push(record);
    }

    /// Failed policy IDs in execution order.
    pub fn failed_ids(&self) -> &[PolicyId] {
        &self.failed
    }

    pub fn is_failed(&self, id: &PolicyId) -> bool {
        self.failed.contains(id)
    }

    pub fn failed_records(&self) -> impl Iterator<Item = &PolicyRecord> {
        self.records.iter().filter(|r| self.is_failed(&r.id))
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn passed_count(&self) -> usize {
        self.records.len() - self.failed.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failed.len()
    }
}

/// The two product outputs of a run, opened once and flushed on drop.
pub struct RunOutputs {
    pub run_log: RunLog,
    pub relay: RelayWriter,
}

impl RunOutputs {
    pub fn open(run_log: impl AsRef<Path>, relay: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            run_log: RunLog::open(run_log)?,
            relay: RelayWriter::open(relay)?,
        })
    }

    pub fn flush(&mut self) -> Result<()> {
        self.run_log.flush()?;
        self.relay.flush()
    }
}

/// Drives the management agent through a [`RunPlan`].
pub struct PolicyRunner {
    agent: Arc<dyn ManagementAgent>,
    resolver: PolicyNameResolver,
    agent_log: PathBuf,
    poll_interval: Duration,
    workflow: Workflow,
}

impl PolicyRunner {
    pub fn new(
        agent: Arc<dyn ManagementAgent>,
        agent_log: impl Into<PathBuf>,
        resolver: PolicyNameResolver,
        poll_interval: Duration,
        workflow: Workflow,
    ) -> Self {
        Self {
            agent,
            resolver,
            agent_log: agent_log.into(),
            poll_interval,
            workflow,
        }
    }

    /// Run the visible policies, then the silent ones, one at a time.
    pub async fn run(
        &self,
        run_id: &str,
        plan: &RunPlan,
        outputs: &mut RunOutputs,
    ) -> Result<RunResult> {
        let start = Instant::now();
        let mut result = RunResult::new(run_id);
        obs::emit_run_started(run_id, self.workflow.name(), plan.visible.len(), plan.silent.len());

        self.begin_phase(PolicyCategory::UserVisible, plan.visible.len(), outputs)?;
        for id in &plan.visible {
            self.run_and_classify(id, PolicyCategory::UserVisible, outputs, &mut result)
                .await?;
        }

        self.begin_phase(PolicyCategory::Silent, plan.silent.len(), outputs)?;
        for id in &plan.silent {
            self.run_and_classify(id, PolicyCategory::Silent, outputs, &mut result)
                .await?;
        }

        result.duration_ms = start.elapsed().as_millis() as u64;
        obs::emit_run_finished(
            run_id,
            result.duration_ms,
            result.records.len(),
            result.failed_count(),
        );
        Ok(result)
    }

    fn begin_phase(
        &self,
        category: PolicyCategory,
        count: usize,
        outputs: &mut RunOutputs,
    ) -> Result<()> {
        match category {
            PolicyCategory::UserVisible => {
                outputs.relay.send(&RelayCommand::DeterminateManual(count))?;
                outputs.run_log.write_all([
                    format!("Beginning {} Policies:", self.workflow.title()).as_str(),
                    SEPARATOR,
                ])?;
                outputs
                    .relay
                    .send(&RelayCommand::Status("Installing software..".to_string()))?;
            }
            PolicyCategory::Silent => {
                outputs
                    .run_log
                    .write_all([SEPARATOR, "Beginning Security Policies:"])?;
                outputs
                    .relay
                    .send(&RelayCommand::Status("Applying the final touches..".to_string()))?;
            }
        }
        Ok(())
    }

    async fn run_and_classify(
        &self,
        id: &PolicyId,
        category: PolicyCategory,
        outputs: &mut RunOutputs,
        result: &mut RunResult,
    ) -> Result<()> {
        let record = self.run_policy(id, category, outputs).await?;
        let classification = classify(&record);

        outputs
            .run_log
            .write_all(classification.run_log.iter().map(String::as_str))?;
        outputs.relay.send_all(&classification.relay)?;
        obs::emit_policy_finished(
            id.as_str(),
            category.name(),
            record.exit_code,
            record.name.is_resolved(),
        );

        result.push(record, classification.failed);
        Ok(())
    }

    /// Execute one policy and resolve its name.
    ///
    /// The tail is positioned before the agent starts, so the marker line
    /// cannot be written ahead of it. Resolution and execution then proceed
    /// together; whichever finishes first, the other is awaited. If the agent
    /// log cannot be opened (mid-rotation, say) the policy still runs and
    /// is reported under its ID.
    pub async fn run_policy(
        &self,
        id: &PolicyId,
        category: PolicyCategory,
        outputs: &mut RunOutputs,
    ) -> Result<PolicyRecord> {
        info!(policy_id = %id, category = category.name(), "Running policy");

        let tail = match LogTail::open(&self.agent_log, self.poll_interval).await {
            Ok(tail) => Some(tail),
            Err(err) => {
                warn!(policy_id = %id, error = %err, "Agent log unavailable, running without name resolution");
                None
            }
        };
        let mut execution = self.agent.run_policy(id);
        let mut finished = None;

        let name = match tail {
            Some(mut tail) => {
                let mut scan = NameScan::new(id);
                let name = tokio::select! {
                    resolved = self.resolver.resolve(&mut tail, id, &mut scan) => resolved,
                    output = &mut execution => {
                        finished = Some(output);
                        self.resolver.drain(&mut tail, id, &mut scan).await
                    }
                };
                name.unwrap_or_else(|err| {
                    warn!(policy_id = %id, error = %err, "Lost the agent log while resolving name");
                    PolicyName::Unresolved
                })
            }
            None => {
                obs::emit_name_unresolved(id.as_str(), "log_unavailable", false);
                PolicyName::Unresolved
            }
        };

        outputs.relay.send(&RelayCommand::Status(format!(
            "Currently installing {}",
            name.display_for(id)
        )))?;

        let output = match finished {
            Some(output) => output,
            None => execution.await,
        };

        let record = match output {
            Ok(out) => PolicyRecord {
                id: id.clone(),
                category,
                name,
                exit_code: out.exit_code,
                stdout: out.stdout,
                stderr: out.stderr,
            },
            Err(err) => {
                warn!(policy_id = %id, error = %err, "Policy could not be run");
                PolicyRecord {
                    id: id.clone(),
                    category,
                    name,
                    exit_code: -1,
                    stdout: String::new(),
                    stderr: err.to_string(),
                }
            }
        };

        outputs.run_log.write(&record.stdout)?;
        Ok(record)
    }
}
