use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::paths::InstallPaths;

/// Why an existing installation is not consistent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Defect {
    MissingLink,
    /// Something other than a symlink sits at the binary-link path.
    NotALink,
    WrongTarget { found: PathBuf },
}

/// Install state as observed on disk. Recomputed on every call, never cached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallState {
    Absent,
    Consistent,
    Inconsistent(Defect),
}

impl InstallState {
    pub fn is_consistent(&self) -> bool {
        matches!(self, Self::Consistent)
    }
}

/// Classify the current installation.
pub fn inspect(paths: &InstallPaths) -> InstallState {
    explain(paths).0
}

/// Classify the installation and narrate each check performed.
///
/// Checks run in a fixed order (directory, link presence, link kind, link
/// target) and stop at the first failure, so the last line is always the
/// reason for the reported state.
pub fn explain(paths: &InstallPaths) -> (InstallState, Vec<String>) {
    let mut lines = Vec::new();

    if !paths.install_dir.is_dir() {
        lines.push(format!(
            "Not installed: {} does not exist",
            paths.install_dir.display()
        ));
        return (InstallState::Absent, lines);
    }
    lines.push(format!(
        "Installation directory: {}",
        paths.install_dir.display()
    ));

    let link = &paths.binary_link;
    let meta = match fs::symlink_metadata(link) {
        Ok(m) => m,
        Err(_) => {
            lines.push(format!("Missing link: {}", link.display()));
            return (InstallState::Inconsistent(Defect::MissingLink), lines);
        }
    };
    lines.push(format!("Link present: {}", link.display()));
    if !meta.file_type().is_symlink() {
        lines.push(format!("Not a link: {} is not a symbolic link", link.display()));
        return (InstallState::Inconsistent(Defect::NotALink), lines);
    }

    let expected = paths.link_target();
    let found = match fs::read_link(link) {
        Ok(t) => t,
        Err(e) => {
            lines.push(format!("Not a link: cannot read {}: {e}", link.display()));
            return (InstallState::Inconsistent(Defect::NotALink), lines);
        }
    };
    if !points_at(link, &found, &expected) {
        lines.push(format!(
            "Wrong link target: {} -> {} (expected {})",
            link.display(),
            found.display(),
            expected.display()
        ));
        return (
            InstallState::Inconsistent(Defect::WrongTarget { found }),
            lines,
        );
    }
    lines.push(format!("Link: {} -> {}", link.display(), found.display()));
    (InstallState::Consistent, lines)
}

/// Does the link whose raw target is `found` name `expected` itself?
///
/// Only the raw target is considered, so a link to another link is never
/// accepted. Symlinked parent directories are tolerated by canonicalizing
/// the parents alone.
fn points_at(link: &Path, found: &Path, expected: &Path) -> bool {
    let absolute = if found.is_absolute() {
        found.to_path_buf()
    } else {
        link.parent().unwrap_or(Path::new("/")).join(found)
    };
    let (absolute, expected) = (normalize(&absolute), normalize(expected));
    if absolute == expected {
        return true;
    }
    match (split_parent(&absolute), split_parent(&expected)) {
        (Some((pa, na)), Some((pb, nb))) if na == nb => {
            match (fs::canonicalize(pa), fs::canonicalize(pb)) {
                (Ok(a), Ok(b)) => a == b,
                _ => false,
            }
        }
        _ => false,
    }
}

fn split_parent(p: &Path) -> Option<(&Path, &std::ffi::OsStr)> {
    Some((p.parent()?, p.file_name()?))
}

/// Lexically drop `.` and resolve `..` components.
fn normalize(p: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for c in p.components() {
        match c {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}
