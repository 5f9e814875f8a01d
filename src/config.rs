use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::paths::{Environment, InstallScope};

/// Default download location of the Linux desktop bundle.
pub const DEFAULT_URL: &str =
    "https://updater.grayjay.app/Apps/Grayjay.Desktop/Grayjay.Desktop-linux-x64.zip";

/// Name of the executable inside the bundle that the binary link points at.
pub const DEFAULT_ENTRYPOINT: &str = "Grayjay";

const SYSTEM_CONFIG: &str = "/etc/grayjay-installer/config.toml";

/// Installer settings, loaded from an optional `config.toml`.
///
/// Every key is optional and falls back to the built-in default.
///
/// Example TOML:
/// ```toml
/// url          = "https://mirror.example.org/Grayjay.Desktop-linux-x64.zip"
/// entrypoint   = "Grayjay"
/// app_name     = "grayjay"
/// link_name    = "grayjay"
/// timeout_secs = 600
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub url: String,
    pub entrypoint: String,
    pub app_name: String,
    pub link_name: String,
    pub timeout_secs: Option<u64>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            url: DEFAULT_URL.to_string(),
            entrypoint: DEFAULT_ENTRYPOINT.to_string(),
            app_name: "grayjay".to_string(),
            link_name: "grayjay".to_string(),
            timeout_secs: None,
        }
    }
}

impl Settings {
    /// Overall download timeout, if one is configured.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_secs.map(Duration::from_secs)
    }

    /// Parse settings from TOML text and check them.
    pub fn from_toml(txt: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(txt)
            .map_err(|e| Error::config(format!("failed to parse config: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.url.starts_with("https://") || self.url.starts_with("http://")) {
            return Err(Error::config(format!(
                "url must be an http(s) URL, got '{}'",
                self.url
            )));
        }
        for (key, value) in [
            ("entrypoint", &self.entrypoint),
            ("app_name", &self.app_name),
            ("link_name", &self.link_name),
        ] {
            if !is_plain_name(value) {
                return Err(Error::config(format!(
                    "{key} must be a single path component, got '{value}'"
                )));
            }
        }
        if self.timeout_secs == Some(0) {
            return Err(Error::config("timeout_secs must be greater than zero"));
        }
        Ok(())
    }
}

fn is_plain_name(s: &str) -> bool {
    !s.is_empty() && s != "." && s != ".." && !s.contains('/') && !s.contains('\0')
}

/// Default config file location for `scope`.
pub fn default_config_path(scope: InstallScope, env: &Environment) -> Result<PathBuf> {
    match scope {
        InstallScope::System => Ok(PathBuf::from(SYSTEM_CONFIG)),
        InstallScope::User => Ok(env
            .user_config_dir()?
            .join("grayjay-installer")
            .join("config.toml")),
    }
}

/// Load settings for this invocation.
///
/// - An explicit path must exist.
/// - A missing default file means built-in defaults.
/// - `GRAYJAY_INSTALLER_URL` (captured in `env`) overrides `url`.
pub fn load_settings(
    explicit: Option<&Path>,
    scope: InstallScope,
    env: &Environment,
) -> Result<Settings> {
    let mut settings = match explicit {
        Some(path) => {
            let txt = fs::read_to_string(path).map_err(|e| {
                Error::config(format!("config not found: {} ({e})", path.display()))
            })?;
            Settings::from_toml(&txt)?
        }
        None => {
            let path = default_config_path(scope, env)?;
            match fs::read_to_string(&path) {
                Ok(txt) => Settings::from_toml(&txt)?,
                Err(e) if e.kind() == io::ErrorKind::NotFound => Settings::default(),
                Err(e) => {
                    return Err(Error::config(format!(
                        "cannot read {}: {e}",
                        path.display()
                    )));
                }
            }
        }
    };

    if let Some(url) = &env.url_override {
        log::debug!("url overridden by GRAYJAY_INSTALLER_URL");
        settings.url = url.clone();
    }
    settings.validate()?;
    Ok(settings)
}
