//! Crate entry point for **grayjay-installer**.
//!
//! The library holds the installation-state machine behind the CLI:
//! path resolution, fetching, state inspection, tree comparison and the
//! install/update/remove transitions. Each submodule encapsulates one
//! responsibility; the `pub use` re-exports expose what the binary needs.

mod commands;
pub mod config;
pub mod diff;
pub mod error;
pub mod fetch;
pub mod paths;
mod progress;
pub mod scratch;
pub mod state;
pub mod transition;

pub use commands::{
    Session, cmd_check, cmd_clean, cmd_install, cmd_paths, cmd_reinstall, cmd_remove,
    cmd_repair_link, cmd_update,
};
pub use config::Settings;
pub use error::{Error, FetchStage, Step};
pub use paths::{Environment, InstallPaths, InstallScope, ScopeRequest};
pub use state::{Defect, InstallState, explain, inspect};
pub use transition::{Context, Outcome, Report};
