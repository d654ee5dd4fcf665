//! `script-deploy` command-line entry point.
//!
//! Logs go to stderr; stdout carries only the summary so `--format json`
//! output can be piped straight into other tools.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use script_deploy::{
    AuditLog, ClientSettings, CredentialsFile, DeployConfig, DeployError, Environment,
    EnvironmentBinding, FileAuditLog, HttpReadinessProbe, Orchestrator, PlanReport,
    PlatformBackend, PlatformClient, PoolSnapshot, RunSummary, WarmupReport, WarmupStatus,
};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// ═══════════════════════════════════════════════════════════════════
// ARGUMENTS
// ═══════════════════════════════════════════════════════════════════

#[derive(Parser, Debug)]
#[command(name = "script-deploy", version, about = "Deploy and warm up hosted script projects")]
struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/script-deploy/config.toml)
    #[arg(long, global = true, env = "SCRIPT_DEPLOY_CONFIG")]
    config: Option<PathBuf>,

    /// Summary format on stdout
    #[arg(long, value_enum, global = true, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Log level, overridden by RUST_LOG
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[arg(long, value_enum, global = true, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Drive the platform through this CLI tool instead of the REST API
    #[cfg(feature = "legacy-cli")]
    #[arg(long, global = true)]
    legacy_cli: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Evict, push, deploy and warm up
    Deploy {
        #[arg(long)]
        env: Environment,
        /// Description recorded on the version and deployment
        #[arg(long)]
        description: Option<String>,
        /// Deployments to retain when evicting
        #[arg(long)]
        keep: Option<usize>,
        /// Attempts per push/deploy phase
        #[arg(long)]
        max_attempts: Option<u32>,
        /// Attempts per warmup target
        #[arg(long)]
        warmup_attempts: Option<u32>,
        /// Print the eviction plan and exit without mutating anything
        #[arg(long)]
        dry_run: bool,
    },
    /// Print the eviction plan without mutating anything
    Plan {
        #[arg(long)]
        env: Environment,
        #[arg(long)]
        keep: Option<usize>,
    },
    /// Warm up an existing deployment URL
    Warmup {
        #[arg(long)]
        env: Environment,
        #[arg(long)]
        url: String,
        #[arg(long)]
        warmup_attempts: Option<u32>,
    },
    /// List versions and deployments of an environment
    Pool {
        #[arg(long)]
        env: Environment,
    },
}

impl Commands {
    fn env(&self) -> Environment {
        match self {
            Commands::Deploy { env, .. }
            | Commands::Plan { env, .. }
            | Commands::Warmup { env, .. }
            | Commands::Pool { env } => *env,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Commands::Deploy { .. } => "deploy",
            Commands::Plan { .. } => "plan",
            Commands::Warmup { .. } => "warmup",
            Commands::Pool { .. } => "pool",
        }
    }

    /// Fold command-line overrides into the loaded configuration.
    fn apply_overrides(&self, config: &mut DeployConfig) {
        match self {
            Commands::Deploy {
                keep,
                max_attempts,
                warmup_attempts,
                ..
            } => {
                if let Some(keep) = keep {
                    config.keep_count = *keep;
                }
                if let Some(attempts) = max_attempts {
                    config.retry.deploy_attempts = *attempts;
                }
                if let Some(attempts) = warmup_attempts {
                    config.retry.warmup_attempts = *attempts;
                }
            }
            Commands::Plan { keep: Some(keep), .. } => config.keep_count = *keep,
            Commands::Warmup {
                warmup_attempts: Some(attempts),
                ..
            } => config.retry.warmup_attempts = *attempts,
            _ => {}
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

// ═══════════════════════════════════════════════════════════════════
// ENTRY POINT
// ═══════════════════════════════════════════════════════════════════

#[tokio::main]
async fn main() -> Result<()> {
    let start = Instant::now();
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_logging(&cli.log_level, cli.log_format);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!(event = "cli.interrupted");
            on_signal.cancel();
        }
    });

    let exit_code = match dispatch(cli, cancel).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            classify_exit_code(&e)
        }
    };
    info!(event = "cli.finished", took_ms = %start.elapsed().as_millis(), exit_code);
    if exit_code != 0 {
        process::exit(exit_code);
    }
    Ok(())
}

fn init_logging(level: &str, format: LogFormat) {
    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let base = fmt::layer()
        .with_target(false)
        .with_timer(fmt::time::uptime())
        .with_writer(std::io::stderr);
    match format {
        LogFormat::Json => tracing_subscriber::registry().with(env).with(base.json()).init(),
        LogFormat::Text => tracing_subscriber::registry().with(env).with(base.compact()).init(),
    }
}

async fn dispatch(cli: Cli, cancel: CancellationToken) -> Result<i32> {
    let mut config = DeployConfig::load(cli.config.as_deref())?;
    cli.command.apply_overrides(&mut config);
    config.validate()?;
    let target = config.binding(cli.command.env())?;

    #[cfg(feature = "legacy-cli")]
    {
        if let Some(program) = &cli.legacy_cli {
            let backend = script_deploy::LegacyCliBackend::new(program, &config.source_dir)
                .with_timeout(config.timeouts.push());
            return execute(backend, target, cli.command, &config, cli.format, cancel).await;
        }
    }

    let credentials = CredentialsFile::new(config.credentials_path()?);
    let client =
        PlatformClient::from_credentials_file(ClientSettings::from_config(&config), credentials)
            .await?;
    execute(client, target, cli.command, &config, cli.format, cancel).await
}

async fn execute<B: PlatformBackend>(
    backend: B,
    target: EnvironmentBinding,
    command: Commands,
    config: &DeployConfig,
    format: OutputFormat,
    cancel: CancellationToken,
) -> Result<i32> {
    let audit: Box<dyn AuditLog> = Box::new(FileAuditLog::new_default().await?);
    let mut orchestrator = Orchestrator::new(
        backend,
        Arc::new(HttpReadinessProbe::new()?),
        target,
        config.bindings(),
        config.orchestrator_config()?,
        audit,
    )
    .with_cancellation(cancel);

    let span = info_span!("cmd", name = command.name(), environment = %command.env());
    run_command(&mut orchestrator, command, format).instrument(span).await
}

async fn run_command<B: PlatformBackend>(
    orchestrator: &mut Orchestrator<B, HttpReadinessProbe>,
    command: Commands,
    format: OutputFormat,
) -> Result<i32> {
    match command {
        Commands::Deploy { dry_run: true, .. } | Commands::Plan { .. } => {
            let plan = orchestrator.plan_only().await?;
            emit(format, &plan, print_plan)?;
            Ok(0)
        }
        Commands::Deploy { description, .. } => {
            let description = description.unwrap_or_else(default_description);
            let summary = orchestrator.run(&description).await;
            emit(format, &summary, print_summary)?;
            Ok(summary_exit_code(&summary))
        }
        Commands::Warmup { url, .. } => {
            let report = orchestrator.verify(&url).await?;
            emit(format, &report, print_warmup)?;
            Ok(warmup_exit_code(&report))
        }
        Commands::Pool { .. } => {
            let snapshot = orchestrator.inspect().await?;
            emit(format, &snapshot, print_pool)?;
            Ok(0)
        }
    }
}

fn default_description() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    format!("script-deploy {}", now)
}

// ═══════════════════════════════════════════════════════════════════
// EXIT CODES
// ═══════════════════════════════════════════════════════════════════

/// Exit code for an error class, keyed by [`DeployError::kind`].
fn exit_code_for_kind(kind: &str) -> i32 {
    match kind {
        "config" | "validation" => 2,
        "safety_violation" => 3,
        "auth" => 4,
        "capacity" => 5,
        "protocol" | "platform" | "not_found" => 6,
        "transient_network" => 7,
        "not_ready" => 8,
        "cancelled" => 9,
        _ => 20,
    }
}

fn summary_exit_code(summary: &RunSummary) -> i32 {
    if summary.success {
        return 0;
    }
    match &summary.error {
        Some(err) if err.kind == "cancelled" => 9,
        _ if summary.deployment_created => 8,
        Some(err) => exit_code_for_kind(&err.kind),
        None => 20,
    }
}

fn warmup_exit_code(report: &WarmupReport) -> i32 {
    if report.all_ready {
        0
    } else if report.cancelled {
        9
    } else {
        8
    }
}

fn classify_exit_code(e: &anyhow::Error) -> i32 {
    for cause in e.chain() {
        if let Some(err) = cause.downcast_ref::<DeployError>() {
            return exit_code_for_kind(err.kind());
        }
    }
    20
}

// ═══════════════════════════════════════════════════════════════════
// OUTPUT
// ═══════════════════════════════════════════════════════════════════

fn emit<T: serde::Serialize>(format: OutputFormat, value: &T, text: fn(&T)) -> Result<()> {
    match format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(value).context("failed to serialize output")?;
            println!("{}", json);
        }
        OutputFormat::Text => text(value),
    }
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!(
        "{} {} ({})",
        if summary.success { "OK" } else { "FAILED" },
        summary.environment,
        summary.project_id
    );
    println!("  description: {}", summary.description);
    if let Some(slot) = &summary.deployment {
        println!("  deployment:  {} @{}", slot.id, slot.version_number);
    }
    if let Some(url) = &summary.deployment_url {
        println!("  url:         {}", url);
    }
    if !summary.evicted.is_empty() {
        println!("  evicted:     {} ({})", summary.evicted.len(), summary.evicted.join(", "));
    }
    if !summary.pruned_versions.is_empty() {
        println!("  pruned:      {} versions", summary.pruned_versions.len());
    }
    for (id, reason) in &summary.rejected {
        println!("  rejected:    {} ({})", id, reason);
    }
    println!("  steps:");
    for timing in &summary.steps {
        println!("    {:<15} {:?} {}ms", timing.step.name(), timing.outcome, timing.elapsed_ms);
    }
    if let Some(report) = &summary.warmup {
        print_warmup(report);
    }
    if let Some(err) = &summary.error {
        if let Some(step) = summary.last_completed_step {
            println!("  last completed step: {}", step);
        }
        println!("  error ({}): {}", err.kind, err.message);
        println!("  next action: {}", err.next_action);
    }
}

fn print_warmup(report: &WarmupReport) {
    println!("  warmup: {}/{} ready", report.ready_count(), report.results.len());
    for target in &report.results {
        let status = match target.status {
            WarmupStatus::Ready => "ready",
            WarmupStatus::Failed => "failed",
            WarmupStatus::Pending => "pending",
        };
        print!("    {:<10} {:<8} attempts={}", target.tenant_id, status, target.attempts_used);
        if let Some(build) = &target.observed_build_id {
            print!(" build={}", build);
        }
        if let Some(err) = &target.last_error {
            print!(" last_error={}", err);
        }
        println!();
    }
}

fn print_plan(plan: &PlanReport) {
    println!("plan {} ({})", plan.environment, plan.project_id);
    println!(
        "  deployments: {} non-HEAD, headroom {}",
        plan.non_head_deployments, plan.deployment_headroom
    );
    println!("  versions:    {}", plan.versions);
    if plan.deployment_plan.is_empty() {
        println!("  evict:       nothing");
    } else {
        println!("  evict:       {}", plan.deployment_plan.ids.join(", "));
    }
    if !plan.version_plan.is_empty() {
        println!("  prune:       {}", plan.version_plan.ids.join(", "));
    }
    if plan.deployment_plan.is_short() {
        println!(
            "  warning: plan frees {} of {} required slots",
            plan.deployment_plan.len(),
            plan.deployment_plan.required
        );
    }
}

fn print_pool(snapshot: &PoolSnapshot) {
    println!(
        "pool {}: {} deployments (+HEAD), {} versions",
        snapshot.project_id,
        snapshot.non_head_count(),
        snapshot.versions.len()
    );
    for slot in &snapshot.deployments {
        let tag = if slot.is_head {
            "HEAD".to_string()
        } else {
            format!("@{}", slot.version_number)
        };
        println!("  {:<6} {} {}", tag, slot.id, slot.description);
    }
    println!(
        "  headroom: {} deployments, {} versions",
        snapshot.deployment_headroom(),
        snapshot.version_headroom()
    );
}
