//! rollguard - Entry Point
//!
//! Pushes a revision, waits for CI, verifies the service on the target and
//! escalates through self-heal and rollback when it is not healthy.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, Context};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::{error, info, warn};

use rollguard::app::options::AppOptions;
use rollguard::app::run::{self, cancel_on};
use rollguard::app::state::AppState;
use rollguard::filesys::file::File;
use rollguard::logs::{init_logging, LogLevel, LogOptions};
use rollguard::models::workflow::CiOutcome;
use rollguard::orchestrator::RunReport;
use rollguard::storage::layout::StorageLayout;
use rollguard::storage::settings::Settings;
use rollguard::utils::version_info;

#[derive(Parser)]
#[command(
    name = "rollguard",
    about = "Deployment controller with health probing, self-heal and rollback",
    version,
    propagate_version = true
)]
struct Cli {
    /// Settings file (default: <storage dir>/settings.json)
    #[arg(long, global = true, env = "ROLLGUARD_CONFIG")]
    config: Option<PathBuf>,

    /// Override a setting, e.g. --set ci.poll_interval_secs=10
    #[arg(long = "set", global = true, value_name = "KEY=VALUE")]
    overrides: Vec<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true)]
    log_level: Option<LogLevel>,

    /// Log as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish a revision and drive it to a verified or recovered state
    Run {
        /// Revision to publish (default: HEAD of the local working copy)
        #[arg(short, long)]
        revision: Option<String>,
        /// Branch CI watches
        #[arg(short, long)]
        branch: Option<String>,
    },
    /// Snapshot the live tree and deploy a revision over it
    Deploy {
        #[arg(short, long)]
        revision: Option<String>,
        #[arg(short, long)]
        branch: Option<String>,
    },
    /// Probe the service until healthy or out of attempts
    Health,
    /// Wait for the CI run of a revision
    Monitor {
        #[arg(short, long)]
        revision: Option<String>,
        #[arg(short, long)]
        branch: Option<String>,
    },
    /// Restore the previous deployment and restart it
    Rollback,
    /// Write a settings file with defaults
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Print version information as JSON
    Version,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match execute(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("{} {:#}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn execute(cli: Cli) -> anyhow::Result<ExitCode> {
    let layout = StorageLayout::default();
    let settings_file = match &cli.config {
        Some(path) => File::new(path),
        None => layout.settings_file(),
    };

    match &cli.command {
        Commands::Version => {
            println!("{}", serde_json::to_string_pretty(&version_info())?);
            return Ok(ExitCode::SUCCESS);
        }
        Commands::Init { force } => return init(&settings_file, *force).await,
        _ => {}
    }

    let mut settings = Settings::load(&settings_file)
        .await
        .with_context(|| format!("reading {}", settings_file.path().display()))?;
    for pair in &cli.overrides {
        let (key, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("--set expects KEY=VALUE, got {}", pair))?;
        settings.apply_override(key.trim(), value.trim())?;
    }
    if let Some(level) = cli.log_level.clone() {
        settings.log_level = level;
    }

    let log_dir = match layout.setup().await {
        Ok(()) => Some(layout.logs_dir().path().to_path_buf()),
        Err(_) => None,
    };
    let _log_guard = match init_logging(LogOptions {
        log_level: settings.log_level.clone(),
        stdout: true,
        log_dir,
        json_format: cli.json_logs,
    }) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("Failed to initialize logging: {e}");
            None
        }
    };

    settings.validate()?;
    let version = version_info();
    info!(version = %version.version, git_hash = %version.git_hash, "rollguard starting");

    let github_token = settings.ci.token.clone();
    let discord_webhook = settings.notify.discord_webhook_url.clone();
    let state = AppState::init(AppOptions::from_settings(&settings), github_token, discord_webhook)?;

    let (cancel, cancel_task) = cancel_on(await_shutdown_signal());
    let code = match cli.command {
        Commands::Run { revision, branch } => {
            let report = run::run_pipeline(&state, revision, branch, &cancel).await?;
            print_report(&report);
            exit_code(report.succeeded())
        }
        Commands::Deploy { revision, branch } => {
            match run::deploy(&state, revision, branch).await? {
                Some(snapshot) => println!(
                    "{} previous revision {} kept as backup",
                    "deployed".green().bold(),
                    snapshot.source_revision
                ),
                None => println!("{} first deployment, no backup taken", "deployed".green().bold()),
            }
            ExitCode::SUCCESS
        }
        Commands::Health => {
            let report = run::health(&state, &cancel).await;
            println!("{}", serde_json::to_string_pretty(&report)?);
            exit_code(report.is_healthy())
        }
        Commands::Monitor { revision, branch } => {
            let outcome = run::monitor(&state, revision, branch, &cancel).await?;
            let line = match &outcome {
                CiOutcome::Success => "success".green().bold(),
                CiOutcome::Failure(stage) => format!("failure: {}", stage).red().bold(),
                CiOutcome::TimedOut => "timed out".yellow().bold(),
                CiOutcome::Cancelled => "cancelled".yellow().bold(),
            };
            println!("CI {}", line);
            exit_code(outcome == CiOutcome::Success)
        }
        Commands::Rollback => {
            let outcome = run::rollback(&state, &cancel).await?;
            println!("rollback: {}", outcome.health_after.summary());
            exit_code(outcome.succeeded)
        }
        Commands::Init { .. } | Commands::Version => ExitCode::SUCCESS,
    };
    cancel_task.abort();
    Ok(code)
}

async fn init(file: &File, force: bool) -> anyhow::Result<ExitCode> {
    if file.exists().await && !force {
        warn!("Settings file already exists");
        eprintln!(
            "{} {} already exists, use --force to overwrite",
            "error:".red().bold(),
            file.path().display()
        );
        return Ok(ExitCode::FAILURE);
    }
    file.write_json(&Settings::default()).await?;
    file.set_permissions_600().await?;
    println!("wrote {}", file.path().display());
    Ok(ExitCode::SUCCESS)
}

fn exit_code(ok: bool) -> ExitCode {
    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn print_report(report: &RunReport) {
    let state = if report.succeeded() {
        report.state.as_str().green().bold()
    } else {
        report.state.as_str().red().bold()
    };
    println!("run {} {}", report.run_id.dimmed(), state);
    println!("{}", report.trail.render());
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                error!("Cannot listen for SIGTERM: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, cancelling...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, cancelling...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl+C received, cancelling...");
        }
    }
}
