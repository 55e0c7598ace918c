mod completion;
mod config;
mod flows;
mod lock;
mod render;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::error::ErrorKind;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use crate::config::EngineConfig;
use crate::flows::{
    run_downgrade_command, run_list_backups_command, run_upgrade_command, DowngradeRequest,
    UpgradeRequest,
};
use crate::render::{current_output_style, render_status_line};

#[derive(Parser, Debug)]
#[command(name = "uplift")]
#[command(about = "Release deployment and recovery engine", long_about = None)]
struct Cli {
    /// Root of the installed application tree
    #[arg(long, global = true, default_value = ".")]
    app_root: PathBuf,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Upgrade the installed application to a release fetched from a repository
    Upgrade {
        /// Source repository: an owner/name slug or a git URL
        #[arg(long)]
        repo: String,
        /// Branch, tag, or release tag to deploy
        #[arg(long)]
        r#ref: Option<String>,
        /// Resolve the newest published release instead of an explicit ref
        #[arg(long)]
        latest_release: bool,
        #[arg(long)]
        backup_dir: Option<PathBuf>,
        /// Extra comma-separated paths to preserve across the upgrade
        #[arg(long)]
        preserve: Option<String>,
    },
    /// Roll back to a previously recorded backup
    Downgrade {
        #[arg(long)]
        backup_id: Option<String>,
        /// Also restore the database dump recorded with the backup
        #[arg(long)]
        restore_db: bool,
        #[arg(long)]
        backup_dir: Option<PathBuf>,
        #[arg(long)]
        preserve: Option<String>,
    },
    /// Tabulate every recorded upgrade attempt
    ListBackups {
        #[arg(long)]
        backup_dir: Option<PathBuf>,
    },
    /// Generate shell completions
    Completions { shell: Shell },
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            let _ = err.print();
            if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) {
                return ExitCode::SUCCESS;
            }
            return ExitCode::FAILURE;
        }
    };

    let Some(command) = cli.command else {
        let _ = Cli::command().print_help();
        return ExitCode::SUCCESS;
    };

    match run(cli.app_root, command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let style = current_output_style();
            eprintln!("{}", render_status_line(style, "err", &format!("{err:#}")));
            ExitCode::FAILURE
        }
    }
}

fn run(app_root: PathBuf, command: Commands) -> Result<()> {
    match command {
        Commands::Upgrade {
            repo,
            r#ref,
            latest_release,
            backup_dir,
            preserve,
        } => {
            let config = EngineConfig::resolve(app_root, backup_dir, preserve.as_deref())?;
            run_upgrade_command(
                &config,
                &UpgradeRequest {
                    repo,
                    reference: r#ref,
                    latest_release,
                },
            )
        }
        Commands::Downgrade {
            backup_id,
            restore_db,
            backup_dir,
            preserve,
        } => {
            let config = EngineConfig::resolve(app_root, backup_dir, preserve.as_deref())?;
            run_downgrade_command(
                &config,
                &DowngradeRequest {
                    backup_id,
                    restore_db,
                },
            )
        }
        Commands::ListBackups { backup_dir } => {
            let config = EngineConfig::resolve(app_root, backup_dir, None)?;
            run_list_backups_command(&config)
        }
        Commands::Completions { shell } => {
            completion::write_completions(shell, &mut std::io::stdout());
            Ok(())
        }
    }
}
