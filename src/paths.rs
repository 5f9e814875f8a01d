use std::env;
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::config::Settings;
use crate::error::{Error, Result};

/// Fixed system-wide locations.
const SYSTEM_DATA_DIR: &str = "/opt";
const SYSTEM_BIN_DIR: &str = "/usr/local/bin";

/// Where the application is installed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallScope {
    System,
    User,
}

/// The scope asked for on the command line; `Auto` follows the privilege level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScopeRequest {
    #[default]
    Auto,
    System,
    User,
}

impl InstallScope {
    /// Pick the scope for this invocation.
    ///
    /// Mismatches between the request and the effective privilege are rejected
    /// instead of coerced, so nothing lands in an unexpected location.
    pub fn select(request: ScopeRequest, elevated: bool) -> Result<Self> {
        match (request, elevated) {
            (ScopeRequest::Auto, true) | (ScopeRequest::System, true) => Ok(Self::System),
            (ScopeRequest::Auto, false) | (ScopeRequest::User, false) => Ok(Self::User),
            (ScopeRequest::System, false) => Err(Error::config(
                "system scope requires root privileges (re-run with sudo or pass --user)",
            )),
            (ScopeRequest::User, true) => Err(Error::config(
                "user scope requested while running as root (drop --user or run unprivileged)",
            )),
        }
    }
}

/// Snapshot of the process environment the installer depends on.
///
/// Taken once at startup; everything downstream reads from this instead of
/// calling `env::var` ad hoc.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Environment {
    pub home: Option<PathBuf>,
    pub xdg_data_home: Option<PathBuf>,
    pub xdg_config_home: Option<PathBuf>,
    pub url_override: Option<String>,
    pub elevated: bool,
}

impl Environment {
    pub fn from_process() -> Self {
        Self {
            home: absolute_var("HOME"),
            xdg_data_home: absolute_var("XDG_DATA_HOME"),
            xdg_config_home: absolute_var("XDG_CONFIG_HOME"),
            url_override: env::var("GRAYJAY_INSTALLER_URL")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            elevated: effective_root(),
        }
    }

    fn require_home(&self) -> Result<&Path> {
        self.home
            .as_deref()
            .ok_or_else(|| Error::config("HOME is not set; cannot resolve user-scope paths"))
    }

    /// Base directory for user data (`$XDG_DATA_HOME` or `~/.local/share`).
    pub fn user_data_dir(&self) -> Result<PathBuf> {
        match &self.xdg_data_home {
            Some(p) => Ok(p.clone()),
            None => Ok(self.require_home()?.join(".local").join("share")),
        }
    }

    /// Base directory for user config (`$XDG_CONFIG_HOME` or `~/.config`).
    pub fn user_config_dir(&self) -> Result<PathBuf> {
        match &self.xdg_config_home {
            Some(p) => Ok(p.clone()),
            None => Ok(self.require_home()?.join(".config")),
        }
    }
}

/// XDG variables must be absolute; relative values are ignored.
fn absolute_var(key: &str) -> Option<PathBuf> {
    env::var_os(key)
        .map(PathBuf::from)
        .filter(|p| p.is_absolute())
}

/// Whether the process runs with an effective uid of 0.
///
/// `/proc/self` is owned by the effective uid; `id -u` covers systems without procfs.
pub fn effective_root() -> bool {
    if let Ok(meta) = fs::metadata("/proc/self") {
        return meta.uid() == 0;
    }
    Command::new("id")
        .arg("-u")
        .output()
        .map(|out| String::from_utf8_lossy(&out.stdout).trim() == "0")
        .unwrap_or(false)
}

/// All filesystem locations the installer touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallPaths {
    pub scope: InstallScope,
    pub install_dir: PathBuf,
    pub binary_link: PathBuf,
    pub scratch_dir: PathBuf,
    pub entrypoint: String,
}

impl InstallPaths {
    /// Derive the paths for `scope`. Pure: nothing is created on disk.
    pub fn resolve(scope: InstallScope, env: &Environment, settings: &Settings) -> Result<Self> {
        let (data_dir, bin_dir) = match scope {
            InstallScope::System => (PathBuf::from(SYSTEM_DATA_DIR), PathBuf::from(SYSTEM_BIN_DIR)),
            InstallScope::User => {
                let home = env.require_home()?;
                (env.user_data_dir()?, home.join(".local").join("bin"))
            }
        };

        let paths = Self {
            scope,
            install_dir: data_dir.join(&settings.app_name),
            binary_link: bin_dir.join(&settings.link_name),
            scratch_dir: data_dir.join(format!(".{}.scratch", settings.app_name)),
            entrypoint: settings.entrypoint.clone(),
        };

        if scope == InstallScope::User {
            let system = Self::resolve(InstallScope::System, env, settings)?;
            if paths.overlaps(&system) {
                return Err(Error::config(format!(
                    "user-scope paths collide with system paths ({}); check HOME/XDG_DATA_HOME",
                    paths.install_dir.display()
                )));
            }
        }
        Ok(paths)
    }

    /// Where `binary_link` must point for the install to be consistent.
    pub fn link_target(&self) -> PathBuf {
        self.install_dir.join(&self.entrypoint)
    }

    fn overlaps(&self, other: &Self) -> bool {
        let mine = [&self.install_dir, &self.binary_link];
        let theirs = [&other.install_dir, &other.binary_link];
        mine.iter()
            .any(|a| theirs.iter().any(|b| a.starts_with(b) || b.starts_with(a)))
    }
}
