use crate::output::{print_json, print_table};
use anyhow::Context;
use clap::Args;
use orchestrate_core::builder::DockerBuilder;
use orchestrate_core::cancel::CancelToken;
use orchestrate_core::cluster::applier::SystemClock;
use orchestrate_core::cluster::KubectlCluster;
use orchestrate_core::config::{Config, WarnLevel};
use orchestrate_core::orchestrator::{Orchestrator, RunOptions, RunRecord, Stages};
use orchestrate_core::paths;
use orchestrate_core::plan::DeploymentPlan;
use orchestrate_core::publisher::{DockerPublisher, PublishOutcome};
use orchestrate_core::tool::Tool;
use orchestrate_core::OrchestrateError;
use serde::Serialize;
use std::path::{Path, PathBuf};

// ---------------------------------------------------------------------------
// Arguments
// ---------------------------------------------------------------------------

#[derive(Args, Debug, Default)]
pub struct DeployArgs {
    /// Push built images to the registry before deploying
    #[arg(long)]
    pub push: bool,

    /// Plan file (default: <root>/plan.yaml)
    #[arg(long, value_name = "FILE")]
    pub plan: Option<PathBuf>,

    /// Validate the plan and print the startup order, then stop
    #[arg(long)]
    pub dry_run: bool,

    /// Write the resource set to FILE instead of applying it
    #[arg(long, value_name = "FILE")]
    pub render: Option<PathBuf>,

    /// Per-component readiness deadline in seconds
    #[arg(long, value_name = "SECS")]
    pub deadline: Option<u64>,

    /// Seconds between readiness checks
    #[arg(long, value_name = "SECS")]
    pub poll_interval: Option<u64>,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(root: &Path, args: &DeployArgs, json: bool, cancel: CancelToken) -> anyhow::Result<()> {
    let config = load_config(root, args)?;

    let plan_path = args
        .plan
        .clone()
        .unwrap_or_else(|| paths::default_plan_path(root));
    let plan = DeploymentPlan::load(&plan_path)
        .with_context(|| format!("invalid plan {}", plan_path.display()))?;

    if args.dry_run {
        return print_order(&plan, json);
    }

    let docker = Tool::resolve(&config.tools.docker)?;
    let kubectl = Tool::resolve(&config.tools.kubectl)?;
    tracing::debug!(
        docker = %docker.program().display(),
        kubectl = %kubectl.program().display(),
        "tools resolved"
    );

    let order = plan.names().into_iter().map(String::from).collect();
    let mut record = RunRecord::new(&plan_path, args.push, order);
    let log_dir = paths::run_log_dir(root, &record.id_string());

    let builder = DockerBuilder::new(docker.clone(), log_dir);
    let publisher = DockerPublisher::new(docker);
    let cluster = KubectlCluster::new(
        kubectl,
        config.cluster.context.clone(),
        config.cluster.namespace.clone(),
    );
    let clock = SystemClock::new();
    let stages = Stages {
        builder: &builder,
        publisher: &publisher,
        cluster: &cluster,
        clock: &clock,
    };

    let opts = RunOptions {
        push: args.push,
        render_to: args.render.clone(),
    };
    let result = Orchestrator::new(stages, &config, cancel).run(&plan, &opts, &mut record);

    match record.save(root) {
        Ok(path) => tracing::info!(path = %path.display(), "run record saved"),
        Err(e) => tracing::warn!(error = %e, "could not save run record"),
    }

    if json {
        print_json(&record)?;
    } else {
        print_summary(&record);
    }

    result.map_err(anyhow::Error::from)
}

fn load_config(root: &Path, args: &DeployArgs) -> anyhow::Result<Config> {
    let mut config = Config::load(root)
        .with_context(|| format!("cannot read {}", paths::config_path(root).display()))?;
    if let Some(secs) = args.deadline {
        config.readiness.deadline_secs = secs;
    }
    if let Some(secs) = args.poll_interval {
        config.readiness.poll_interval_secs = secs;
    }

    for w in config.validate() {
        if w.level == WarnLevel::Warning {
            tracing::warn!("{}", w.message);
        }
    }
    if let Some(message) = config.first_error() {
        return Err(OrchestrateError::InvalidConfig(message).into());
    }
    Ok(config)
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

#[derive(Serialize)]
struct OrderEntry<'a> {
    rank: usize,
    component: &'a str,
    image: &'a str,
    depends_on: &'a [String],
}

fn print_order(plan: &DeploymentPlan, json: bool) -> anyhow::Result<()> {
    let entries: Vec<OrderEntry> = plan
        .components()
        .iter()
        .enumerate()
        .map(|(rank, c)| OrderEntry {
            rank: rank + 1,
            component: &c.name,
            image: &c.image,
            depends_on: &c.depends_on,
        })
        .collect();

    if json {
        return print_json(&entries);
    }
    let rows: Vec<Vec<String>> = entries
        .iter()
        .map(|e| {
            vec![
                e.rank.to_string(),
                e.component.to_string(),
                e.image.to_string(),
                if e.depends_on.is_empty() {
                    "-".to_string()
                } else {
                    e.depends_on.join(",")
                },
            ]
        })
        .collect();
    print_table(&["#", "COMPONENT", "IMAGE", "DEPENDS ON"], &rows);
    Ok(())
}

fn print_summary(record: &RunRecord) {
    let rows: Vec<Vec<String>> = record
        .order
        .iter()
        .map(|name| {
            let build = record
                .builds
                .iter()
                .find(|b| &b.component == name)
                .map(|b| if b.success { "built" } else { "failed" })
                .unwrap_or("-");
            let push = record
                .publishes
                .iter()
                .find(|p| p.component() == name)
                .map(|p| match p {
                    PublishOutcome::Published { .. } => "pushed",
                    PublishOutcome::Skipped { .. } => "skipped",
                    PublishOutcome::Tolerated { .. } => "failed (tolerated)",
                })
                .unwrap_or("-");
            let readiness = record
                .readiness
                .iter()
                .find(|r| &r.component == name)
                .map(|r| r.state.as_str())
                .unwrap_or("-");
            vec![
                name.clone(),
                build.to_string(),
                push.to_string(),
                readiness.to_string(),
            ]
        })
        .collect();
    print_table(&["COMPONENT", "BUILD", "PUSH", "READINESS"], &rows);

    if let Some(applied) = &record.applied {
        println!(
            "\n{} resource(s) submitted, {} changed",
            applied.resources.len(),
            applied.changed()
        );
    }
    if let Some(path) = &record.rendered {
        println!("\nresource set written to {}", path.display());
    }
    println!("run {}", record.id);
}
