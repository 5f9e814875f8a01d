use colored::Colorize;
use std::io;
use std::path::{Path, PathBuf};

use crate::config::{Settings, load_settings};
use crate::error::{Error, FetchStage, Result};
use crate::fetch::HttpDownloader;
use crate::paths::{Environment, InstallPaths, InstallScope, ScopeRequest};
use crate::progress;
use crate::transition::{self, Context, Outcome};

/// Configuration for one invocation, resolved once at startup.
pub struct Session {
    pub settings: Settings,
    pub paths: InstallPaths,
    pub verbose: bool,
}

impl Session {
    /// Resolve scope, settings and paths from the live process environment.
    pub fn open(request: ScopeRequest, config: Option<&Path>, verbose: bool) -> Result<Self> {
        Self::with_env(request, config, &Environment::from_process(), verbose)
    }

    pub fn with_env(
        request: ScopeRequest,
        config: Option<&Path>,
        env: &Environment,
        verbose: bool,
    ) -> Result<Self> {
        let scope = InstallScope::select(request, env.elevated)?;
        let settings = load_settings(config, scope, env)?;
        let paths = InstallPaths::resolve(scope, env, &settings)?;
        log::debug!("resolved {paths:?}");
        Ok(Self {
            settings,
            paths,
            verbose,
        })
    }

    fn run_fetching(
        &self,
        start: &str,
        op: fn(&Context<'_>) -> Result<Outcome>,
    ) -> Result<Outcome> {
        let downloader =
            HttpDownloader::new(self.settings.timeout()).map_err(|source| Error::Fetch {
                stage: FetchStage::Download,
                target: self.settings.url.clone(),
                source,
            })?;
        let pb = progress::start(start, self.verbose);
        let ctx = Context {
            paths: &self.paths,
            url: &self.settings.url,
            downloader: &downloader,
            progress: &pb,
        };
        let res = op(&ctx);
        match &res {
            Ok(outcome) => progress::finish(&pb, true, &self.describe(outcome)),
            Err(_) => progress::finish(&pb, false, "failed"),
        }
        res
    }

    /// One-line human summary of an outcome.
    pub fn describe(&self, outcome: &Outcome) -> String {
        let p = &self.paths;
        match outcome {
            Outcome::Installed => format!(
                "installed {} ({} -> {})",
                p.install_dir.display(),
                p.binary_link.display(),
                p.link_target().display()
            ),
            Outcome::AlreadyInstalled => format!("already installed at {}", p.install_dir.display()),
            Outcome::Updated => format!("updated {}", p.install_dir.display()),
            Outcome::UpToDate => "already up to date".to_string(),
            Outcome::Removed => format!("removed {}", p.install_dir.display()),
            Outcome::Aborted => "Aborted.".to_string(),
            Outcome::Cleaned => format!("cleaned {}", p.scratch_dir.display()),
            Outcome::LinkRepaired => format!(
                "relinked {} -> {}",
                p.binary_link.display(),
                p.link_target().display()
            ),
            Outcome::LinkAlreadyCorrect => "link already correct".to_string(),
            Outcome::Checked(report) => format!("{:?}", report.state),
        }
    }
}

pub fn cmd_install(s: &Session) -> Result<Outcome> {
    s.run_fetching("checking installation…", transition::install)
}

pub fn cmd_reinstall(s: &Session) -> Result<Outcome> {
    s.run_fetching("reinstalling…", transition::reinstall)
}

pub fn cmd_update(s: &Session) -> Result<Outcome> {
    s.run_fetching("checking for updates…", transition::update)
}

/// Prompts on stdin unless `yes` is set.
pub fn cmd_remove(s: &Session, yes: bool) -> Result<Outcome> {
    let stdin = io::stdin();
    let outcome = transition::remove(&s.paths, yes, &mut stdin.lock(), &mut io::stdout())?;
    println!("{}", s.describe(&outcome));
    Ok(outcome)
}

pub fn cmd_clean(s: &Session) -> Result<Outcome> {
    let outcome = transition::clean(&s.paths);
    println!("{}", s.describe(&outcome));
    Ok(outcome)
}

pub fn cmd_repair_link(s: &Session) -> Result<Outcome> {
    let outcome = transition::repair_link(&s.paths)?;
    println!("{} {}", "✔".green(), s.describe(&outcome));
    Ok(outcome)
}

/// Print the diagnostic narrative; the exit code comes from the outcome.
pub fn cmd_check(s: &Session) -> Result<Outcome> {
    let outcome = transition::check(&s.paths);
    if let Outcome::Checked(report) = &outcome {
        let last = report.lines.len().saturating_sub(1);
        for (i, line) in report.lines.iter().enumerate() {
            if i == last && !report.state.is_consistent() {
                println!("{}", line.red());
            } else {
                println!("{line}");
            }
        }
        if report.state.is_consistent() {
            println!("{}", "OK".green().bold());
        }
    }
    Ok(outcome)
}

/// Print the resolved locations, one per line.
pub fn cmd_paths(s: &Session) {
    let rows: [(&str, PathBuf); 4] = [
        ("install_dir", s.paths.install_dir.clone()),
        ("binary_link", s.paths.binary_link.clone()),
        ("link_target", s.paths.link_target()),
        ("scratch_dir", s.paths.scratch_dir.clone()),
    ];
    println!("scope       {:?}", s.paths.scope);
    println!("url         {}", s.settings.url);
    for (k, v) in rows {
        println!("{k:<11} {}", v.display());
    }
}
