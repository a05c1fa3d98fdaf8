mod model;
mod plugin;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use model::config::AppConfig;
use plugin::PluginManager;
use plugin::runner::SystemRunner;

#[derive(Parser, Debug)]
#[command(name = "omz-plugins")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Oh My Zsh custom plugins directory
    #[arg(long, global = true)]
    target: Option<PathBuf>,

    /// Shell resource file that holds the plugins=() line
    #[arg(long, global = true)]
    rc: Option<PathBuf>,

    /// Do not echo the output of successful commands
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Clone missing plugins and add them to the plugins=() line (default)
    Install {
        /// Only install these plugins
        names: Vec<String>,

        /// Do not touch the rc file
        #[arg(long)]
        no_activate: bool,
    },
    /// Show configured plugins and whether they are installed
    List,
    /// Add installed plugins to the plugins=() line
    Activate,
    /// Print a plugins=() line for editing the rc file by hand
    Snippet,
}

fn main() -> Result<ExitCode> {
    let args = Args::parse();
    // Logs go to a file; stdout is for the user.
    let _guard = init_logging()?;

    tracing::info!("omz-plugins starting");

    let result = run(args);
    if let Err(err) = &result {
        tracing::error!("omz-plugins error: {err:?}");
    }
    result
}

fn init_logging() -> Result<WorkerGuard> {
    let log_dir = directories::ProjectDirs::from("", "", "omz-plugins")
        .map(|d| d.data_dir().to_path_buf())
        .unwrap_or_else(|| std::env::temp_dir().join("omz-plugins"));
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("creating log directory {}", log_dir.display()))?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "omz-plugins.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("omz_plugins=info"));
    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_env_filter(filter)
        .init();

    Ok(guard)
}

fn run(args: Args) -> Result<ExitCode> {
    let config = AppConfig::load()?;
    let plugins_dir = match args.target {
        Some(dir) => dir,
        None => config.plugins_dir()?,
    };
    let rc_path = match args.rc {
        Some(path) => path,
        None => config.rc_path()?,
    };
    let manager = PluginManager::new(&config, plugins_dir);

    let command = args.command.unwrap_or(Command::Install {
        names: Vec::new(),
        no_activate: false,
    });

    match command {
        Command::Install { names, no_activate } => {
            println!(
                "Installing {} plugin(s) into {}",
                if names.is_empty() {
                    manager.plugin_count()
                } else {
                    names.len()
                },
                manager.plugins_dir().display()
            );

            let report = manager.install(SystemRunner::new(!args.quiet), &names)?;
            for outcome in &report.outcomes {
                let row = PluginManager::outcome_notification(outcome);
                if outcome.is_installed() {
                    println!("{row}");
                } else {
                    eprintln!("{row}");
                }
                for warning in PluginManager::warning_notifications(outcome) {
                    eprintln!("{warning}");
                }
            }
            println!("{}", PluginManager::summary_notification(&report));

            if !no_activate {
                activate(&manager, &rc_path)?;
            }

            if report.has_failures() {
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::List => {
            for row in manager.list_notifications() {
                println!("{row}");
            }
        }
        Command::Activate => activate(&manager, &rc_path)?,
        Command::Snippet => println!("{}", manager.snippet()),
    }

    Ok(ExitCode::SUCCESS)
}

fn activate(manager: &PluginManager, rc_path: &std::path::Path) -> Result<()> {
    let added = manager.activate(rc_path)?;
    if added.is_empty() {
        println!("{} already lists every installed plugin", rc_path.display());
    } else {
        println!("Added to {}: {}", rc_path.display(), added.join(" "));
    }
    Ok(())
}
