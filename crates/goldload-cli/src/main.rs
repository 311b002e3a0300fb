//! goldload - post-enrollment provisioning for Jamf-managed Macs
//!
//! ## Commands
//!
//! - `run`: run visible then silent policies, show the summary, clean up
//! - `jamf`: same as `run`, taking Jamf script parameters positionally
//! - `prepare`: remove the previous run log and DEPNotify command file
//! - `resolve`: watch the agent log and print the name of one policy
//! - `config`: print the effective configuration

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tracing::{info, Level};

use goldload_core::resolver::NameScan;
use goldload_core::{
    parse_policy_list, LogTail, PolicyId, PolicyNameResolver, ProvisionConfig, ProvisionReport,
    Provisioner, RunPlan, Workflow,
};

#[derive(Parser)]
#[command(name = "goldload")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run Jamf policies and report progress to DEPNotify", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// TOML configuration file
    #[arg(long, global = true, env = "GOLDLOAD_CONFIG")]
    config: Option<PathBuf>,

    /// Workflow profile
    #[arg(long, global = true, value_enum, env = "GOLDLOAD_WORKFLOW")]
    workflow: Option<WorkflowArg>,

    #[command(flatten)]
    overrides: ConfigOverrides,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the policy lists and finish the session
    Run {
        /// Policies shown to the user, comma or space separated
        #[arg(long, default_value = "", env = "GOLDLOAD_VISIBLE")]
        visible: String,

        /// Policies run in the background, comma or space separated
        #[arg(long, default_value = "", env = "GOLDLOAD_SILENT")]
        silent: String,

        /// Exit non-zero when any policy failed
        #[arg(long)]
        strict: bool,

        /// Rotate the run log and command file first
        #[arg(long)]
        rotate: bool,
    },

    /// Entry point for a Jamf script payload ($1-$3 are supplied by Jamf)
    Jamf {
        mount_point: String,
        computer_name: String,
        username: String,
        /// Parameter 4: user-visible policy IDs
        visible: String,
        /// Parameter 5: silent policy IDs
        #[arg(default_value = "")]
        silent: String,
    },

    /// Remove the previous run log and command file
    Prepare,

    /// Wait for a policy to start and print its name
    Resolve {
        id: String,

        /// Seconds to wait before giving up
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Print the effective configuration as JSON
    Config,
}

#[derive(Clone, Copy, ValueEnum)]
enum WorkflowArg {
    GoldLoad,
    Image,
}

impl From<WorkflowArg> for Workflow {
    fn from(arg: WorkflowArg) -> Self {
        match arg {
            WorkflowArg::GoldLoad => Workflow::GoldLoad,
            WorkflowArg::Image => Workflow::Image,
        }
    }
}

/// Flags layered over the config file.
#[derive(Args, Default)]
struct ConfigOverrides {
    /// Path to the jamf binary
    #[arg(long, global = true, env = "GOLDLOAD_AGENT_BINARY")]
    agent_binary: Option<PathBuf>,

    /// Log the agent writes policy names to
    #[arg(long, global = true, env = "GOLDLOAD_AGENT_LOG")]
    agent_log: Option<PathBuf>,

    #[arg(long, global = true, env = "GOLDLOAD_RUN_LOG")]
    run_log: Option<PathBuf>,

    /// DEPNotify command file
    #[arg(long, global = true, env = "GOLDLOAD_RELAY_FILE")]
    relay_file: Option<PathBuf>,

    /// Seconds to wait for a policy name before falling back to its ID
    #[arg(long, global = true, env = "GOLDLOAD_RESOLVE_TIMEOUT")]
    resolve_timeout: Option<u64>,

    /// Kill a policy run after this many seconds
    #[arg(long, global = true, env = "GOLDLOAD_POLICY_TIMEOUT")]
    policy_timeout: Option<u64>,
}

impl ConfigOverrides {
    fn apply(self, config: &mut ProvisionConfig) {
        if let Some(path) = self.agent_binary {
            config.agent_binary = path;
        }
        if let Some(path) = self.agent_log {
            config.agent_log = path;
        }
        if let Some(path) = self.run_log {
            config.run_log = path;
        }
        if let Some(path) = self.relay_file {
            config.relay_file = path;
        }
        if let Some(secs) = self.resolve_timeout {
            config.resolve_timeout_secs = secs;
        }
        if self.policy_timeout.is_some() {
            config.policy_timeout_secs = self.policy_timeout;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    goldload_core::init_tracing(cli.json, level);

    let mut config = ProvisionConfig::load(cli.config.as_deref(), cli.workflow.map(Into::into))
        .context("Failed to load configuration")?;
    cli.overrides.apply(&mut config);
    config.validate().context("Invalid configuration")?;

    match cli.command {
        Commands::Run {
            visible,
            silent,
            strict,
            rotate,
        } => cmd_run(config, &visible, &silent, strict, rotate).await,
        Commands::Jamf {
            mount_point,
            computer_name,
            username,
            visible,
            silent,
        } => {
            info!(
                mount_point = %mount_point,
                computer = %computer_name,
                user = %username,
                "Invoked from Jamf"
            );
            cmd_run(config, &visible, &silent, false, false).await
        }
        Commands::Prepare => cmd_prepare(&config),
        Commands::Resolve { id, timeout } => cmd_resolve(&config, &id, timeout).await,
        Commands::Config => cmd_config(&config),
    }
}

#[derive(Serialize)]
struct RunSummary<'a> {
    run_id: &'a str,
    state: &'static str,
    passed: usize,
    failed: Vec<String>,
    duration_ms: u64,
    cleanup_ok: bool,
}

impl<'a> From<&'a ProvisionReport> for RunSummary<'a> {
    fn from(report: &'a ProvisionReport) -> Self {
        Self {
            run_id: &report.run_id,
            state: report.completion.name(),
            passed: report.result.passed_count(),
            failed: report
                .result
                .failed_ids()
                .iter()
                .map(|id| id.to_string())
                .collect(),
            duration_ms: report.result.duration_ms,
            cleanup_ok: report.cleanup.all_ok(),
        }
    }
}

async fn cmd_run(
    config: ProvisionConfig,
    visible: &str,
    silent: &str,
    strict: bool,
    rotate: bool,
) -> Result<()> {
    let plan = RunPlan::new(
        parse_policy_list(visible).context("Invalid visible policy list")?,
        parse_policy_list(silent).context("Invalid silent policy list")?,
    )
    .context("Invalid policy lists")?;

    if rotate {
        goldload_core::rotate(&config.run_log, &config.relay_file)
            .context("Failed to rotate previous logs")?;
    }

    info!(
        workflow = config.workflow.name(),
        policies = plan.len(),
        "Starting {}",
        config.workflow.title()
    );

    let provisioner = Provisioner::from_config(config);
    let report = provisioner
        .provision(&plan)
        .await
        .context("Provisioning run failed")?;

    println!("{}", serde_json::to_string_pretty(&RunSummary::from(&report))?);

    if strict && !report.succeeded() {
        bail!(
            "{} of {} policies failed",
            report.result.failed_count(),
            report.result.records.len()
        );
    }
    Ok(())
}

fn cmd_prepare(config: &ProvisionConfig) -> Result<()> {
    let rotation = goldload_core::rotate(&config.run_log, &config.relay_file)
        .context("Failed to rotate previous logs")?;
    println!("{}", serde_json::to_string_pretty(&rotation)?);
    Ok(())
}

async fn cmd_resolve(config: &ProvisionConfig, id: &str, timeout: Option<u64>) -> Result<()> {
    let id: PolicyId = id.parse().context("Invalid policy ID")?;
    let resolver = match timeout {
        Some(secs) => PolicyNameResolver::new(Duration::from_secs(secs)),
        None => config.resolver(),
    };

    let mut tail = LogTail::open(&config.agent_log, config.poll_interval())
        .await
        .with_context(|| format!("Failed to open {}", config.agent_log.display()))?;
    let mut scan = NameScan::new(&id);

    let name = resolver.resolve(&mut tail, &id, &mut scan).await?;
    println!("{}", name.display_for(&id));
    Ok(())
}

fn cmd_config(config: &ProvisionConfig) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}
