//! lbscale: set up, monitor, stress-test and tear down an autoscaling HTTP
//! load balancer demo on Google Cloud.

use anyhow::{Context, Result};
use clap::{ArgGroup, Parser, Subcommand};
use garde::Validate;
use lbscale_common::defaults::{
    DEFAULT_BENCH_CONCURRENCY, DEFAULT_BENCH_REQUESTS, DEFAULT_LOADGEN_MACHINE_TYPE,
    DEFAULT_LOADGEN_REGION, DEFAULT_LOADGEN_ZONE, DEFAULT_MACHINE_TYPE, DEFAULT_NETWORK,
    DEFAULT_PRIMARY_REGION, DEFAULT_PRIMARY_ZONE, DEFAULT_READY_ATTEMPTS,
    DEFAULT_READY_INTERVAL_SECS, DEFAULT_READY_MARKER, DEFAULT_SECONDARY_REGION,
    DEFAULT_SECONDARY_ZONE, DEFAULT_WATCH_INTERVAL_SECS,
};
use lbscale_coordinator::config::{resolve_project, DeploymentConfig, LoadTestConfig, Location};
use lbscale_coordinator::gcloud::{CommandRunner, Gcloud, ProcessRunner};
use lbscale_coordinator::loadgen::{follow, LoadGenerator};
use lbscale_coordinator::orchestrator::summary::{plan_table, setup_table, teardown_table};
use lbscale_coordinator::orchestrator::{
    run_setup, AssumeYes, Confirm, FrontendWait, LogReporter, Provisioner, Teardown,
    TerminalConfirm, FRONTEND_POLL_INTERVAL,
};
use lbscale_coordinator::plan::ResourcePlan;
use lbscale_coordinator::probe::http_client;
use lbscale_coordinator::status::{render_probe, render_snapshot, StatusReporter, StatusView};
use lbscale_coordinator::wait::PollConfig;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "lbscale")]
#[command(about = "Autoscaling HTTP load balancer demo on Google Cloud")]
#[command(version)]
struct Args {
    #[command(flatten)]
    deployment: DeploymentArgs,

    /// Enable debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

/// Where and how the demo is deployed
#[derive(clap::Args, Debug)]
struct DeploymentArgs {
    /// Cloud project (default: the active gcloud configuration's project)
    #[arg(long, global = true, env = "CLOUDSDK_CORE_PROJECT")]
    project: Option<String>,

    /// VPC network
    #[arg(long, global = true, default_value = DEFAULT_NETWORK)]
    network: String,

    /// Region of the first backend, the NAT and the image builder
    #[arg(long, global = true, default_value = DEFAULT_PRIMARY_REGION)]
    primary_region: String,

    #[arg(long, global = true, default_value = DEFAULT_PRIMARY_ZONE)]
    primary_zone: String,

    /// Region of the second backend
    #[arg(long, global = true, default_value = DEFAULT_SECONDARY_REGION)]
    secondary_region: String,

    #[arg(long, global = true, default_value = DEFAULT_SECONDARY_ZONE)]
    secondary_zone: String,

    /// Region of the load generator VM
    #[arg(long, global = true, default_value = DEFAULT_LOADGEN_REGION)]
    loadgen_region: String,

    #[arg(long, global = true, default_value = DEFAULT_LOADGEN_ZONE)]
    loadgen_zone: String,

    /// Machine type of backends and the image builder
    #[arg(long, global = true, default_value = DEFAULT_MACHINE_TYPE)]
    machine_type: String,

    /// Machine type of the load generator
    #[arg(long, global = true, default_value = DEFAULT_LOADGEN_MACHINE_TYPE)]
    loadgen_machine_type: String,

    /// Text a healthy response body must contain
    #[arg(long, global = true, default_value = DEFAULT_READY_MARKER)]
    ready_marker: String,

    /// gcloud executable
    #[arg(long = "gcloud", global = true, env = "LBSCALE_GCLOUD", default_value = "gcloud")]
    gcloud_bin: String,
}

impl DeploymentArgs {
    fn into_config(self, project: String) -> DeploymentConfig {
        DeploymentConfig {
            project,
            network: self.network,
            primary: Location::new(self.primary_region, self.primary_zone),
            secondary: Location::new(self.secondary_region, self.secondary_zone),
            loadgen: Location::new(self.loadgen_region, self.loadgen_zone),
            machine_type: self.machine_type,
            loadgen_machine_type: self.loadgen_machine_type,
            ready_marker: self.ready_marker,
        }
    }
}

/// Arguments for the stress command
#[derive(clap::Args, Debug)]
struct StressArgs {
    /// Total requests
    #[arg(short = 'n', long, default_value_t = DEFAULT_BENCH_REQUESTS)]
    requests: u64,

    /// Concurrent connections
    #[arg(short, long, default_value_t = DEFAULT_BENCH_CONCURRENCY)]
    concurrency: u32,

    /// Readiness attempts before giving up on the load balancer
    #[arg(long, default_value_t = DEFAULT_READY_ATTEMPTS)]
    ready_attempts: u32,

    /// Seconds between readiness attempts
    #[arg(long, default_value_t = DEFAULT_READY_INTERVAL_SECS)]
    ready_interval: u64,

    /// Keep sampling the load balancer every second after the benchmark
    #[arg(long)]
    follow: bool,
}

impl From<StressArgs> for LoadTestConfig {
    fn from(args: StressArgs) -> Self {
        Self {
            requests: args.requests,
            concurrency: args.concurrency,
            ready_attempts: args.ready_attempts,
            ready_interval: Duration::from_secs(args.ready_interval),
            follow: args.follow,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Create every resource of the demo, then wait for the load balancer
    Setup {
        /// Return as soon as the resources exist
        #[arg(long)]
        no_wait: bool,

        /// Print the resources that would be created and exit
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the state of the load balancer and instance groups
    #[command(group(ArgGroup::new("view").multiple(false)))]
    Monitor {
        /// Only the frontend and backend service
        #[arg(long, group = "view")]
        lb: bool,

        /// Only the instance groups
        #[arg(long, group = "view")]
        groups: bool,

        /// Refresh the full view until Ctrl-C
        #[arg(long, group = "view")]
        watch: bool,

        /// Send one request to the load balancer
        #[arg(long, group = "view")]
        test: bool,

        /// Seconds between refreshes with --watch
        #[arg(long, default_value_t = DEFAULT_WATCH_INTERVAL_SECS)]
        interval: u64,
    },

    /// Benchmark the load balancer from a dedicated VM
    Stress(StressArgs),

    /// Delete every resource of the demo
    Cleanup {
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&e);
        std::process::exit(1);
    }
}

/// Print error in a user-friendly way
fn print_error(e: &anyhow::Error) {
    use std::io::Write;

    let mut stderr = std::io::stderr();

    // Print main error message
    let _ = writeln!(stderr, "\n\x1b[1;31mError:\x1b[0m {e}");

    // Print error chain (causes)
    let mut source = e.source();
    while let Some(cause) = source {
        let _ = writeln!(stderr, "  \x1b[33mCaused by:\x1b[0m {cause}");
        source = cause.source();
    }

    if std::env::var("RUST_BACKTRACE").is_err() {
        let _ = writeln!(
            stderr,
            "\n\x1b[2mSet RUST_BACKTRACE=1 for a detailed backtrace\x1b[0m"
        );
    } else {
        let backtrace = e.backtrace();
        if backtrace.status() == std::backtrace::BacktraceStatus::Captured {
            let _ = writeln!(stderr, "\n\x1b[2mBacktrace:\x1b[0m\n{backtrace}");
        }
    }
}

/// Cancel the token on the first Ctrl-C
fn cancel_on_ctrl_c() -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Interrupted, stopping");
            token.cancel();
        }
    });
    cancel
}

async fn run() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();

    let deployment = args.deployment;
    let runner = ProcessRunner::new(deployment.gcloud_bin.clone());

    if let Command::Setup { dry_run: true, .. } = args.command {
        let project = deployment
            .project
            .clone()
            .unwrap_or_else(|| "(gcloud default)".to_string());
        let config = deployment.into_config(project);
        config.check()?;
        let plan = ResourcePlan::from_config(&config);
        println!("Resources for project {}:\n{}", config.project, plan_table(&plan));
        return Ok(());
    }

    let project = resolve_project(deployment.project.clone(), &runner).await?;
    let config = deployment.into_config(project);
    config.check()?;
    info!(project = %config.project, "Using project");

    let gcloud = Gcloud::new(runner.with_project(config.project.clone()));
    let plan = ResourcePlan::from_config(&config);

    match args.command {
        Command::Setup { no_wait, .. } => handle_setup(&gcloud, &plan, &config, no_wait).await?,
        Command::Monitor {
            lb,
            groups,
            watch,
            test,
            interval,
        } => {
            let status = StatusReporter::new(&gcloud, &plan);
            if test {
                let client = http_client()?;
                let sample = status.probe(&client, &config.ready_marker).await?;
                println!("{}", render_probe(&sample, &config.ready_marker));
                if !sample.is_serving() {
                    anyhow::bail!("load balancer is not serving the expected page yet");
                }
            } else if watch {
                let cancel = cancel_on_ctrl_c();
                status
                    .watch(Duration::from_secs(interval), &cancel, |snapshot| {
                        println!("{}", render_snapshot(snapshot))
                    })
                    .await;
            } else {
                let view = if lb {
                    StatusView::LoadBalancer
                } else if groups {
                    StatusView::InstanceGroups
                } else {
                    StatusView::Full
                };
                println!("{}", render_snapshot(&status.snapshot(view).await));
            }
        }
        Command::Stress(stress_args) => {
            let load: LoadTestConfig = stress_args.into();
            load.validate().context("Invalid stress test options")?;
            handle_stress(&gcloud, &plan, &config, &load).await?;
        }
        Command::Cleanup { yes } => {
            if yes {
                handle_cleanup(&gcloud, &plan, &AssumeYes).await?;
            } else {
                handle_cleanup(&gcloud, &plan, &TerminalConfirm).await?;
            }
        }
    }

    Ok(())
}

/// Handle the setup command
async fn handle_setup<R: CommandRunner>(
    gcloud: &Gcloud<R>,
    plan: &ResourcePlan,
    config: &DeploymentConfig,
    no_wait: bool,
) -> Result<()> {
    let reporter = LogReporter::new();
    // Ctrl-C stops provisioning at the next step or bake poll, then the frontend wait
    let cancel = cancel_on_ctrl_c();
    let provisioner = Provisioner::new(gcloud, plan, &reporter).with_cancel(&cancel);
    let wait = (!no_wait).then(|| FrontendWait {
        marker: &config.ready_marker,
        poll: PollConfig::unbounded(FRONTEND_POLL_INTERVAL),
        cancel: &cancel,
    });

    let report = run_setup(&provisioner, &reporter, wait).await?;

    println!("\n=== Setup Summary ===\n\n{}", setup_table(&report.steps));
    match (report.url(), report.ready_after) {
        (Some(url), Some(_)) => println!("\nLoad balancer is serving at {url}"),
        (Some(url), None) => println!("\nLoad balancer address: {url} (may take a few minutes to serve)"),
        (None, _) => println!("\nLoad balancer address not assigned yet; check `lbscale monitor --lb`"),
    }
    Ok(())
}

/// Handle the stress command
async fn handle_stress<R: CommandRunner>(
    gcloud: &Gcloud<R>,
    plan: &ResourcePlan,
    config: &DeploymentConfig,
    load: &LoadTestConfig,
) -> Result<()> {
    let client = http_client()?;
    let outcome = LoadGenerator::new(gcloud, plan, load, &config.ready_marker)
        .run(&client)
        .await?;

    println!("\n=== Benchmark Results ({}) ===\n\n{}", outcome.url, outcome.report.to_table());

    let groups = StatusReporter::new(gcloud, plan)
        .snapshot(StatusView::InstanceGroups)
        .await;
    println!("{}", render_snapshot(&groups));

    if load.follow {
        println!("Sampling {} every second, Ctrl-C to stop", outcome.url);
        let cancel = cancel_on_ctrl_c();
        let stats = follow(
            &client,
            &outcome.url,
            &config.ready_marker,
            Duration::from_secs(1),
            &cancel,
            |sample| println!("{}", render_probe(sample, &config.ready_marker)),
        )
        .await;
        if stats.is_empty() {
            warn!("No successful samples");
        } else {
            println!(
                "\n{} samples: min {:.1} ms, avg {:.1} ms, max {:.1} ms",
                stats.count, stats.min, stats.avg, stats.max
            );
        }
    }
    Ok(())
}

/// Handle the cleanup command
async fn handle_cleanup<R: CommandRunner, C: Confirm>(
    gcloud: &Gcloud<R>,
    plan: &ResourcePlan,
    confirm: &C,
) -> Result<()> {
    let report = Teardown::new(gcloud, plan, confirm).run().await?;

    if report.declined {
        println!("Nothing deleted.");
        return Ok(());
    }

    println!("\n=== Cleanup Report ===\n\n{}", teardown_table(&report));
    println!(
        "Deleted: {}  Already gone: {}  Kept: {}  Failed: {}",
        report.deleted(),
        report.already_deleted(),
        report.skipped(),
        report.failed()
    );

    if report.has_failures() {
        let names: Vec<&str> = report.failures().map(|d| d.name.as_str()).collect();
        anyhow::bail!(
            "{} deletion(s) failed ({}); delete them manually or re-run `lbscale cleanup`",
            names.len(),
            names.join(", ")
        );
    }
    Ok(())
}
