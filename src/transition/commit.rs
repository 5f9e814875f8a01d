use std::fs;
use std::io;
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result, Step};
use crate::scratch::Scratch;

/// Scratch entry holding the previous installation while the new one moves in.
const PREVIOUS_DIR: &str = "previous";
/// Scratch entry for the symlink that gets renamed over the binary link.
const LINK_TMP: &str = "link.new";

/// Swap `bundle` into place as `install_dir`.
///
/// - Create the parent of `install_dir`.
/// - Park an existing `install_dir` inside scratch.
/// - Move `bundle` to `install_dir`.
/// - On failure put the parked tree back.
///
/// `install_dir` is therefore either the old tree or the complete new one,
/// never a mix. Errors carry the step that failed.
pub(crate) fn commit_tree(
    bundle: &Path,
    install_dir: &Path,
    scratch: &Scratch,
) -> std::result::Result<(), (Step, Error)> {
    if let Some(parent) = install_dir.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| (Step::CreateDir, Error::fs("create directory", parent, e)))?;
    }

    let previous = scratch.join(PREVIOUS_DIR);
    let had_previous = exists(install_dir);
    if had_previous {
        fs::rename(install_dir, &previous).map_err(|e| {
            (
                Step::Commit,
                Error::fs("move aside previous installation", install_dir, e),
            )
        })?;
    }

    if let Err(e) = move_dir(bundle, install_dir) {
        let err = Error::fs("install files into", install_dir, e);
        if had_previous && let Some(kept) = restore_previous(&previous, install_dir, scratch) {
            return Err((
                Step::Commit,
                Error::Preserved {
                    kept,
                    source: Box::new(err),
                },
            ));
        }
        return Err((Step::Commit, err));
    }
    log::debug!("committed {} -> {}", bundle.display(), install_dir.display());
    Ok(())
}

/// Put the parked tree back at `install_dir`.
///
/// Returns `None` when restored. Otherwise the tree is moved next to
/// `install_dir` (or, failing that, left in a scratch directory that will not
/// be released) and the path holding it is returned.
fn restore_previous(previous: &Path, install_dir: &Path, scratch: &Scratch) -> Option<PathBuf> {
    let err = match fs::rename(previous, install_dir) {
        Ok(()) => return None,
        Err(e) => e,
    };
    log::error!(
        "could not restore previous installation from {}: {err}",
        previous.display()
    );

    let name = install_dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    if let Some(parent) = install_dir.parent() {
        for n in 0..16 {
            let kept = match n {
                0 => parent.join(format!(".{name}.previous")),
                n => parent.join(format!(".{name}.previous.{n}")),
            };
            if exists(&kept) {
                continue;
            }
            match fs::rename(previous, &kept) {
                Ok(()) => return Some(kept),
                Err(e) => log::debug!("cannot move previous installation to {}: {e}", kept.display()),
            }
        }
    }
    scratch.keep();
    Some(previous.to_path_buf())
}

/// Point `link` at `target`, replacing whatever is there.
///
/// The new link is created in scratch and renamed over `link`, so readers see
/// either the old link or the new one.
pub(crate) fn replace_link(target: &Path, link: &Path, scratch: &Scratch) -> Result<()> {
    if let Some(parent) = link.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::fs("create directory", parent, e))?;
    }
    fs::create_dir_all(scratch.path())
        .map_err(|e| Error::fs("create scratch directory", scratch.path(), e))?;

    let tmp = scratch.join(LINK_TMP);
    if exists(&tmp) {
        discard(&tmp);
    }
    symlink(target, &tmp).map_err(|e| Error::fs("create link", &tmp, e))?;

    match fs::rename(&tmp, link) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            discard(&tmp);
            remove_link(link)?;
            symlink(target, link).map_err(|e| Error::fs("create link", link, e))
        }
        Err(e) => {
            discard(&tmp);
            Err(Error::fs("replace link", link, e))
        }
    }
}

/// Remove a symlink or regular file at `link`; absence is fine.
pub(crate) fn remove_link(link: &Path) -> Result<()> {
    match fs::symlink_metadata(link) {
        Ok(m) if m.is_dir() => Err(Error::fs(
            "remove link",
            link,
            io::Error::other("path is a directory, refusing to delete it"),
        )),
        Ok(_) => fs::remove_file(link).map_err(|e| Error::fs("remove link", link, e)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(Error::fs("inspect", link, e)),
    }
}

fn discard(tmp: &Path) {
    if let Err(e) = fs::remove_file(tmp) {
        log::debug!("could not remove {}: {e}", tmp.display());
    }
}

fn exists(p: &Path) -> bool {
    fs::symlink_metadata(p).is_ok()
}

/// Rename, falling back to copy + delete across filesystems.
fn move_dir(src: &Path, dst: &Path) -> io::Result<()> {
    match fs::rename(src, dst) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            if let Err(e) = copy_tree(src, dst) {
                if let Err(cleanup) = fs::remove_dir_all(dst) {
                    log::debug!("could not remove partial copy {}: {cleanup}", dst.display());
                }
                return Err(e);
            }
            fs::remove_dir_all(src)
        }
        Err(e) => Err(e),
    }
}

fn copy_tree(src: &Path, dst: &Path) -> io::Result<()> {
    fs::create_dir(dst)?;
    fs::set_permissions(dst, fs::metadata(src)?.permissions())?;
    for ent in fs::read_dir(src)? {
        let ent = ent?;
        let from = ent.path();
        let to = dst.join(ent.file_name());
        let ft = ent.file_type()?;
        if ft.is_symlink() {
            symlink(fs::read_link(&from)?, &to)?;
        } else if ft.is_dir() {
            copy_tree(&from, &to)?;
        } else {
            fs::copy(&from, &to)?;
        }
    }
    Ok(())
}
