//! # grayjay-installer
//!
//! Installs and maintains the Grayjay desktop bundle.
//!
//! - `install` fetches the archive and links the entry point, unless already installed
//! - `reinstall` does the same regardless of current state
//! - `update` syncs the installed tree to the remote archive (no-op when identical)
//! - `remove` deletes the installation after confirmation
//! - `check` reports the install state (exit 1 unless consistent)
//! - `repair-link` rewrites the binary link without downloading
//! - `clean` empties the scratch directory
//! - `paths` prints the resolved locations
//!
//! This CLI is built with [clap](https://docs.rs/clap).

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use std::process::ExitCode;

use grayjay_installer::{
    ScopeRequest, Session, cmd_check, cmd_clean, cmd_install, cmd_paths, cmd_reinstall,
    cmd_remove, cmd_repair_link, cmd_update,
};

/// Command-line interface definition.
#[derive(Parser, Debug)]
#[command(
    name = "grayjay-installer",
    version,
    about = "Install, update and remove the Grayjay desktop app",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    cmd: Cmd,

    /// Show debug output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Install for the current user (~/.local)
    #[arg(long, global = true, conflicts_with = "system")]
    user: bool,

    /// Install system-wide (/opt, /usr/local/bin); requires root
    #[arg(long, global = true)]
    system: bool,

    /// Read settings from this TOML file instead of the default location
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Download and install Grayjay if it is not installed yet
    Install,
    /// Download and install Grayjay even if it is already installed
    Reinstall,
    /// Replace the installed files when the remote archive has changed
    Update,
    /// Remove the installation directory and binary link
    Remove {
        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },
    /// Verify the installation (exit 1 unless consistent)
    Check,
    /// Delete leftover download/extraction files
    Clean,
    /// Point the binary link at the installed entry point
    RepairLink,
    /// Print resolved install locations
    Paths,
}

impl Cli {
    fn scope(&self) -> ScopeRequest {
        match (self.user, self.system) {
            (true, _) => ScopeRequest::User,
            (_, true) => ScopeRequest::System,
            _ => ScopeRequest::Auto,
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Warn
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .format_timestamp(None)
        .init();
}

fn run(cli: Cli) -> Result<u8> {
    let session = Session::open(cli.scope(), cli.config.as_deref(), cli.verbose)?;

    let outcome = match cli.cmd {
        Cmd::Install => cmd_install(&session)?,
        Cmd::Reinstall => cmd_reinstall(&session)?,
        Cmd::Update => cmd_update(&session)?,
        Cmd::Remove { yes } => cmd_remove(&session, yes)?,
        Cmd::Check => cmd_check(&session)?,
        Cmd::Clean => cmd_clean(&session)?,
        Cmd::RepairLink => cmd_repair_link(&session)?,
        Cmd::Paths => {
            cmd_paths(&session);
            return Ok(0);
        }
    };
    Ok(outcome.exit_code())
}

/// CLI entry point.
///
/// The only place that turns results into a process exit code:
/// 0 on success or no-op, 1 on any error (usage errors included).
fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    init_logging(cli.verbose);

    match run(cli) {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            // Installer errors already render their causes; `{:#}` would repeat them.
            eprintln!("{} {e}", "error:".red().bold());
            ExitCode::from(1)
        }
    }
}
