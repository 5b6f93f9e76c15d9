//! Command line interface of the `pod` binary

use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{ArgAction, Parser, Subcommand};
use colored::Colorize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;

use crate::app::options::{DeployOptions, ServerOptions};
use crate::app::run::run;
use crate::errors::PodError;
use crate::lifecycle::format::format_line;
use crate::lifecycle::{StartResult, StopResult};
use crate::logs::{init_logging, LogLevel, LogOptions};
use crate::models::app::AppOptions;
use crate::orchestrator::{Activation, DeployReport, Orchestrator};
use crate::registry::config::resolve_config_path;
use crate::registry::{RegistryStore, StorageLayout};
use crate::supervisor::Pm2Supervisor;
use crate::utils::{parse_option, version_info};

#[derive(Parser, Debug)]
#[command(name = "pod")]
#[command(about = "Git push deployment for Node.js apps on top of pm2")]
pub struct Cli {
    /// Registry file (defaults to $POD_CONF, then ~/.podrc)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Log as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Write a default registry rooted at <root> and create its directories
    Init {
        root: PathBuf,
    },
    /// Register an app and prepare its repositories
    Create {
        name: String,

        /// GitHub shorthand (user/repo) or clone URL of a remote app
        #[arg(short, long)]
        remote: Option<String>,

        /// Branch to track, master when omitted
        #[arg(short, long)]
        branch: Option<String>,

        /// Entry script relative to the working copy
        #[arg(short, long)]
        script: Option<String>,

        /// Port passed to the app as PORT
        #[arg(short, long)]
        port: Option<u16>,

        /// Number of instances (cluster mode when above 1)
        #[arg(short, long)]
        instances: Option<u32>,

        /// Extra app option as key=value (repeatable)
        #[arg(short = 'o', long = "option", value_name = "KEY=VALUE")]
        options: Vec<String>,
    },
    /// Stop an app and delete its files
    Rm {
        name: String,
    },
    /// Start an app
    Start {
        name: String,
    },
    /// Stop an app
    Stop {
        name: String,
    },
    /// Restart a running app
    Restart {
        name: String,
    },
    /// Start every registered app
    Startall,
    /// Stop every registered app
    Stopall,
    /// Restart every running app
    Restartall,
    /// Show app status
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete files under the root that no registered app owns
    Prune,
    /// Rewrite the post-receive hooks of local apps
    Hooks,
    /// Run the deploy hook of an app (invoked by post-receive)
    Deploy {
        name: String,
    },
    /// Run the webhook and dashboard server in the foreground
    Serve,
    /// Print the registry
    Config,
    /// Print version information
    Version,
}

impl Cli {
    fn log_options(&self) -> LogOptions {
        let quiet = match &self.command {
            Commands::Serve | Commands::Deploy { .. } => LogLevel::Info,
            _ => LogLevel::Warn,
        };
        let log_level = match self.verbose {
            0 => quiet,
            1 => LogLevel::Info,
            2 => LogLevel::Debug,
            _ => LogLevel::Trace,
        };
        LogOptions {
            log_level,
            json_format: self.json_logs,
            ..Default::default()
        }
    }
}

/// Run a parsed command line
pub async fn execute(cli: Cli) -> anyhow::Result<()> {
    let mut log_options = cli.log_options();
    let config_path = resolve_config_path(cli.config.as_deref())?;

    match &cli.command {
        Commands::Version => {
            println!("{}", serde_json::to_string_pretty(&version_info())?);
            return Ok(());
        }
        Commands::Init { root } => {
            let _ = init_logging(log_options);
            let store = RegistryStore::init(&config_path, root.clone()).await?;
            let config = store.snapshot().await;
            success(&format!(
                "registry at {} rooted at {}",
                config_path.display(),
                config.root.display()
            ));
            return Ok(());
        }
        Commands::Serve => {
            let orchestrator = open(&config_path).await?;
            log_options.log_file = Some(orchestrator.layout().server_log());
            let _guard = init_logging(log_options)?;
            return serve(orchestrator).await;
        }
        _ => {
            let _ = init_logging(log_options);
        }
    }

    let orchestrator = open(&config_path).await?;
    match cli.command {
        Commands::Create {
            name,
            remote,
            branch,
            script,
            port,
            instances,
            options,
        } => {
            let mut app_options = AppOptions::new();
            insert_some(&mut app_options, "remote", remote.map(Value::from));
            insert_some(&mut app_options, "branch", branch.map(Value::from));
            insert_some(&mut app_options, "script", script.map(Value::from));
            insert_some(&mut app_options, "port", port.map(Value::from));
            insert_some(&mut app_options, "instances", instances.map(Value::from));
            for pair in &options {
                let (key, value) = parse_option(pair).map_err(PodError::ConfigError)?;
                app_options.insert(key, value);
            }
            for step in orchestrator.create(&name, app_options).await? {
                success(&step);
            }
        }
        Commands::Rm { name } => {
            orchestrator.remove(&name).await?;
            success(&format!("removed {}", name));
        }
        Commands::Start { name } => {
            let result = orchestrator.start(&name).await?;
            print_start(&name, &result);
        }
        Commands::Stop { name } => {
            let result = orchestrator.stop(&name).await?;
            print_stop(&name, &result);
        }
        Commands::Restart { name } => {
            let count = orchestrator.restart(&name).await?;
            success(&format!("{} restarted ({} instance(s))", name, count));
        }
        Commands::Startall => {
            let mut failed = None;
            for (name, result) in orchestrator.start_all().await {
                match result {
                    Ok(result) => print_start(&name, &result),
                    Err(e) => {
                        failure(&format!("{}: {}", name, e));
                        failed = Some(e);
                    }
                }
            }
            if let Some(e) = failed {
                return Err(e.into());
            }
        }
        Commands::Stopall => {
            let mut failed = None;
            for (name, result) in orchestrator.stop_all().await {
                match result {
                    Ok(result) => print_stop(&name, &result),
                    Err(e) => {
                        failure(&format!("{}: {}", name, e));
                        failed = Some(e);
                    }
                }
            }
            if let Some(e) = failed {
                return Err(e.into());
            }
        }
        Commands::Restartall => {
            let restarted = orchestrator.restart_all().await?;
            if restarted.is_empty() {
                notice("no running apps");
            }
            for instance in restarted {
                success(&format!("{} restarted (id {})", instance.name, instance.id));
            }
        }
        Commands::List { json } => {
            let views = orchestrator.list().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&views)?);
            } else if views.is_empty() {
                notice("no apps");
            } else {
                for view in &views {
                    println!("{}", format_line(view));
                }
            }
        }
        Commands::Prune => {
            let removed = orchestrator.prune().await?;
            if removed.is_empty() {
                notice("nothing to prune");
            }
            for path in removed {
                success(&format!("removed {}", path.display()));
            }
        }
        Commands::Hooks => {
            for name in orchestrator.update_hooks().await? {
                success(&format!("updated hook for {}", name));
            }
        }
        Commands::Deploy { name } => {
            let ref_lines = read_ref_lines().await?;
            let timeout = orchestrator.options().cli_timeout;
            match orchestrator.handle_local_push(&name, &ref_lines, timeout).await? {
                None => notice(&format!("{}: push does not touch the tracked branch", name)),
                Some(report) => print_deploy(&name, &report),
            }
        }
        Commands::Config => {
            let config = orchestrator.registry().snapshot().await;
            println!("{}", serde_json::to_string_pretty(&*config)?);
        }
        Commands::Init { .. } | Commands::Serve | Commands::Version => {}
    }

    Ok(())
}

async fn open(config_path: &Path) -> anyhow::Result<Arc<Orchestrator>> {
    let registry = RegistryStore::open(config_path)
        .await
        .with_context(|| format!("cannot open registry {} (run `pod init <root>` first)", config_path.display()))?;
    let layout = StorageLayout::new(&registry.snapshot().await.root);
    let supervisor = Arc::new(Pm2Supervisor::default().with_scratch_dir(layout.hooks_dir().path()));
    Ok(Orchestrator::new(Arc::new(registry), supervisor, DeployOptions::default()).await)
}

async fn serve(orchestrator: Arc<Orchestrator>) -> anyhow::Result<()> {
    let config = orchestrator.registry().snapshot().await;
    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(config.web.port);
    let options = ServerOptions {
        port,
        ..Default::default()
    };

    info!("Running pod {} with options: {:?}", version_info().version, options);
    run(options, orchestrator, await_shutdown_signal()).await?;
    Ok(())
}

/// Ref update lines (`<old> <new> <ref>`) piped in by a post-receive hook
async fn read_ref_lines() -> Result<Vec<String>, PodError> {
    if std::io::stdin().is_terminal() {
        return Ok(Vec::new());
    }
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut ref_lines = Vec::new();
    while let Some(line) = lines.next_line().await? {
        if !line.trim().is_empty() {
            ref_lines.push(line);
        }
    }
    Ok(ref_lines)
}

fn insert_some(options: &mut AppOptions, key: &str, value: Option<Value>) {
    if let Some(value) = value {
        options.insert(key.to_string(), value);
    }
}

fn print_start(name: &str, result: &StartResult) {
    match result {
        StartResult::Started { port, instances } => {
            let port = port.map(|p| p.to_string()).unwrap_or_else(|| "????".to_string());
            success(&format!("{} started on port {} ({} instance(s))", name, port, instances));
        }
        StartResult::Resumed { count } => {
            success(&format!("{} resumed ({} instance(s))", name, count));
        }
        StartResult::AlreadyRunning => notice(&format!("{} already running", name)),
    }
}

fn print_stop(name: &str, result: &StopResult) {
    match result {
        StopResult::Stopped { count } => success(&format!("{} stopped ({} instance(s))", name, count)),
        StopResult::NotRunning => notice(&format!("{} not running", name)),
    }
}

fn print_deploy(name: &str, report: &DeployReport) {
    match report {
        DeployReport::Pending => notice(&format!("{}: deploy still running in the background", name)),
        DeployReport::Deployed { outcome, activation } => {
            let commit = outcome.new_commit_hash.as_deref().unwrap_or("unknown");
            let how = match activation {
                Activation::Restarted { count } => format!("restarted {} instance(s)", count),
                Activation::Started(StartResult::Started { instances, .. }) => {
                    format!("started {} instance(s)", instances)
                }
                Activation::Started(StartResult::Resumed { count }) => {
                    format!("resumed {} instance(s)", count)
                }
                Activation::Started(StartResult::AlreadyRunning) => "already running".to_string(),
            };
            success(&format!("{} deployed at {}, {}", name, commit, how));
        }
    }
}

fn success(message: &str) {
    println!("{} {}", "pod".green().bold(), message);
}

fn notice(message: &str) {
    println!("{} {}", "pod".yellow().bold(), message);
}

fn failure(message: &str) {
    eprintln!("{} {}", "pod".red().bold(), message);
}

/// Resolves on SIGTERM or Ctrl+C
pub async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(sigterm) => sigterm,
            Err(e) => {
                tracing::error!("Cannot listen for SIGTERM: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, shutting down...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Ctrl+C received, shutting down...");
    }
}
