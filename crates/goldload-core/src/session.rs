//! One provisioning session: run the plan, show the summary, clean up.

use std::sync::Arc;

use serde::Serialize;
use tracing::{warn, Instrument};
use uuid::Uuid;

use crate::agent::ManagementAgent;
use crate::cleanup::{Cleanup, CleanupReport};
use crate::completion::CompletionState;
use crate::config::ProvisionConfig;
use crate::error::Result;
use crate::obs;
use crate::runner::{PolicyRunner, RunOutputs, RunPlan, RunResult};

#[derive(Debug, Clone, Serialize)]
pub struct ProvisionReport {
    pub run_id: String,
    pub result: RunResult,
    pub completion: CompletionState,
    pub cleanup: CleanupReport,
}

impl ProvisionReport {
    pub fn succeeded(&self) -> bool {
        self.completion.succeeded()
    }
}

pub struct Provisioner {
    config: ProvisionConfig,
    agent: Arc<dyn ManagementAgent>,
}

impl Provisioner {
    pub fn new(config: ProvisionConfig, agent: Arc<dyn ManagementAgent>) -> Self {
        Self { config, agent }
    }

    /// Provisioner driving the real agent binary named in `config`.
    pub fn from_config(config: ProvisionConfig) -> Self {
        let agent = Arc::new(config.agent());
        Self::new(config, agent)
    }

    pub fn config(&self) -> &ProvisionConfig {
        &self.config
    }

    pub async fn provision(&self, plan: &RunPlan) -> Result<ProvisionReport> {
        let run_id = Uuid::new_v4().to_string();
        let span = obs::run_span(&run_id);
        self.provision_with_id(run_id, plan).instrument(span).await
    }

    /// Cleanup runs whatever happened to the run or the summary; an error
    /// from either is returned only after it.
    async fn provision_with_id(&self, run_id: String, plan: &RunPlan) -> Result<ProvisionReport> {
        let config = &self.config;
        let mut outputs = RunOutputs::open(&config.run_log, &config.relay_file)?;

        let outcome = self.run_and_publish(&run_id, plan, &mut outputs).await;
        if let Err(err) = &outcome {
            warn!(run_id = %run_id, error = %err, "Run aborted, cleaning up anyway");
        }

        let cleanup = Cleanup::new(&config.cleanup, self.agent.as_ref())
            .run(&mut outputs.run_log)
            .await;

        let (result, completion) = outcome?;
        Ok(ProvisionReport {
            run_id,
            result,
            completion,
            cleanup,
        })
    }

    async fn run_and_publish(
        &self,
        run_id: &str,
        plan: &RunPlan,
        outputs: &mut RunOutputs,
    ) -> Result<(RunResult, CompletionState)> {
        let config = &self.config;
        let runner = PolicyRunner::new(
            Arc::clone(&self.agent),
            &config.agent_log,
            config.resolver(),
            config.poll_interval(),
            config.workflow,
        );
        let result = runner.run(run_id, plan, outputs).await?;

        let completion = CompletionState::from_result(&result);
        completion.publish(config.workflow, &config.caution_icon, outputs)?;
        obs::emit_completion(run_id, completion.name(), result.failed_count());
        Ok((result, completion))
    }
}
