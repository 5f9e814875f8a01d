use std::fmt;
use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Which half of a fetch failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchStage {
    Download,
    Extract,
}

impl fmt::Display for FetchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Download => f.write_str("download"),
            Self::Extract => f.write_str("extraction"),
        }
    }
}

/// A named step inside an install or update transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Fetch,
    Compare,
    CreateDir,
    Commit,
    Link,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Fetch => "fetch",
            Self::Compare => "compare",
            Self::CreateDir => "create-dir",
            Self::Commit => "commit",
            Self::Link => "link",
        };
        f.write_str(s)
    }
}

/// Errors produced by the installer core.
///
/// Every variant is terminal for the current invocation; nothing is retried.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid scope/privilege combination, bad settings, or unusable environment.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The archive could not be downloaded or unpacked.
    #[error("{stage} failed for {target}: {source}")]
    Fetch {
        stage: FetchStage,
        target: String,
        #[source]
        source: io::Error,
    },

    #[error("install failed at step '{step}': {source}")]
    Install {
        step: Step,
        #[source]
        source: Box<Error>,
    },

    #[error("update failed at step '{step}': {source}")]
    Update {
        step: Step,
        #[source]
        source: Box<Error>,
    },

    /// Directory creation, copy, rename or link failure not classified elsewhere.
    #[error("failed to {action} {}: {source}", path.display())]
    Filesystem {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A commit failed and the old tree could not be put back in place.
    #[error("{source}; previous installation kept at {}", kept.display())]
    Preserved {
        kept: PathBuf,
        #[source]
        source: Box<Error>,
    },

    #[error("failed to read confirmation: {0}")]
    Prompt(#[source] io::Error),
}

impl Error {
    pub fn fs(action: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Filesystem {
            action,
            path: path.into(),
            source,
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Wrap `self` as the cause of a failed install step.
    pub fn during_install(self, step: Step) -> Self {
        Self::Install {
            step,
            source: Box::new(self),
        }
    }

    /// Wrap `self` as the cause of a failed update step.
    pub fn during_update(self, step: Step) -> Self {
        Self::Update {
            step,
            source: Box::new(self),
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
