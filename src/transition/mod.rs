//! Install-state transitions.
//!
//! Each public function here is one command's worth of work. It inspects the
//! current state, decides whether anything needs doing, performs the change
//! and returns an [`Outcome`]. Every transition owns a [`Scratch`] guard and
//! releases it before returning, whatever the result.

mod commit;
mod prompt;

use indicatif::ProgressBar;
use std::fs;
use std::io::{self, BufRead, Write};

use crate::diff;
use crate::error::{Error, Result, Step};
use crate::fetch::{self, Download};
use crate::paths::InstallPaths;
use crate::scratch::Scratch;
use crate::state::{self, InstallState};

pub use prompt::confirm;

/// Everything a fetching transition needs.
pub struct Context<'a> {
    pub paths: &'a InstallPaths,
    pub url: &'a str,
    pub downloader: &'a dyn Download,
    pub progress: &'a ProgressBar,
}

/// Result of `check`: the state plus the diagnostic narrative behind it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub state: InstallState,
    pub lines: Vec<String>,
}

/// What a transition did. Errors are reported separately through [`Error`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Installed,
    AlreadyInstalled,
    Updated,
    UpToDate,
    Removed,
    Aborted,
    Cleaned,
    LinkRepaired,
    LinkAlreadyCorrect,
    Checked(Report),
}

impl Outcome {
    /// 0 for success and confirmed no-ops; 1 only for a failed `check`.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Checked(report) if !report.state.is_consistent() => 1,
            _ => 0,
        }
    }
}

/// Install the application unless it is already consistently installed.
///
/// Absent and Inconsistent installs both proceed; an Inconsistent tree is
/// replaced wholesale and its link rewritten.
pub fn install(ctx: &Context<'_>) -> Result<Outcome> {
    let scratch = Scratch::new(&ctx.paths.scratch_dir);
    let res = match state::inspect(ctx.paths) {
        InstallState::Consistent => Ok(Outcome::AlreadyInstalled),
        other => {
            log::debug!("install starting from {other:?}");
            deploy(ctx, &scratch).map(|()| Outcome::Installed)
        }
    };
    scratch.release();
    res
}

/// Fetch and install regardless of the current state.
pub fn reinstall(ctx: &Context<'_>) -> Result<Outcome> {
    let scratch = Scratch::new(&ctx.paths.scratch_dir);
    let res = deploy(ctx, &scratch).map(|()| Outcome::Installed);
    scratch.release();
    res
}

fn deploy(ctx: &Context<'_>, scratch: &Scratch) -> Result<()> {
    let paths = ctx.paths;

    ctx.progress.set_message(format!("downloading {}", ctx.url));
    let bundle = fetch::fetch(ctx.downloader, ctx.url, scratch, &paths.entrypoint)
        .map_err(|e| e.during_install(Step::Fetch))?;

    ctx.progress
        .set_message(format!("installing into {}", paths.install_dir.display()));
    commit::commit_tree(&bundle.root, &paths.install_dir, scratch)
        .map_err(|(step, e)| e.during_install(step))?;

    ctx.progress
        .set_message(format!("linking {}", paths.binary_link.display()));
    commit::replace_link(&paths.link_target(), &paths.binary_link, scratch)
        .map_err(|e| e.during_install(Step::Link))?;

    log::info!(
        "installed {} -> {}",
        paths.binary_link.display(),
        paths.link_target().display()
    );
    Ok(())
}

/// Bring the installed tree in line with the remote archive.
///
/// When the fetched content equals the installed tree nothing under
/// `install_dir` is written. The binary link is left alone.
pub fn update(ctx: &Context<'_>) -> Result<Outcome> {
    let scratch = Scratch::new(&ctx.paths.scratch_dir);
    let res = update_with(ctx, &scratch);
    scratch.release();
    res
}

fn update_with(ctx: &Context<'_>, scratch: &Scratch) -> Result<Outcome> {
    let paths = ctx.paths;

    ctx.progress.set_message(format!("downloading {}", ctx.url));
    let bundle = fetch::fetch(ctx.downloader, ctx.url, scratch, &paths.entrypoint)
        .map_err(|e| e.during_update(Step::Fetch))?;

    ctx.progress.set_message("comparing with installed files");
    let compare_err = |e| Error::fs("compare", &paths.install_dir, e).during_update(Step::Compare);
    if !diff::differs(&bundle.root, &paths.install_dir).map_err(compare_err)? {
        return Ok(Outcome::UpToDate);
    }
    if log::log_enabled!(log::Level::Debug) && paths.install_dir.is_dir() {
        for d in diff::differences(&bundle.root, &paths.install_dir).map_err(compare_err)? {
            log::debug!("changed: {d:?}");
        }
    }

    ctx.progress
        .set_message(format!("updating {}", paths.install_dir.display()));
    commit::commit_tree(&bundle.root, &paths.install_dir, scratch)
        .map_err(|(step, e)| e.during_update(step))?;

    if !state::inspect(paths).is_consistent() {
        log::warn!(
            "{} does not point at {}; run `repair-link` to fix it",
            paths.binary_link.display(),
            paths.link_target().display()
        );
    }
    Ok(Outcome::Updated)
}

/// Delete the installation directory and the binary link after confirmation.
///
/// Declining (the default) is a successful no-op. `assume_yes` skips the prompt.
pub fn remove(
    paths: &InstallPaths,
    assume_yes: bool,
    input: &mut impl BufRead,
    output: &mut impl Write,
) -> Result<Outcome> {
    let scratch = Scratch::new(&paths.scratch_dir);
    let res = remove_with(paths, assume_yes, input, output);
    scratch.release();
    res
}

fn remove_with(
    paths: &InstallPaths,
    assume_yes: bool,
    input: &mut impl BufRead,
    output: &mut impl Write,
) -> Result<Outcome> {
    if !assume_yes {
        let question = format!(
            "Remove {} and {}?",
            paths.install_dir.display(),
            paths.binary_link.display()
        );
        if !confirm(input, output, &question).map_err(Error::Prompt)? {
            return Ok(Outcome::Aborted);
        }
    }

    match fs::symlink_metadata(&paths.install_dir) {
        Ok(m) if m.is_dir() => fs::remove_dir_all(&paths.install_dir)
            .map_err(|e| Error::fs("remove", &paths.install_dir, e))?,
        Ok(_) => fs::remove_file(&paths.install_dir)
            .map_err(|e| Error::fs("remove", &paths.install_dir, e))?,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            log::debug!("{} already absent", paths.install_dir.display());
        }
        Err(e) => return Err(Error::fs("inspect", &paths.install_dir, e)),
    }
    commit::remove_link(&paths.binary_link)?;
    Ok(Outcome::Removed)
}

/// Remove everything in the scratch directory. Never fails.
pub fn clean(paths: &InstallPaths) -> Outcome {
    Scratch::new(&paths.scratch_dir).release();
    Outcome::Cleaned
}

/// Point the binary link at the installed entry point without fetching.
///
/// Needs an installation directory that already holds the entry point.
pub fn repair_link(paths: &InstallPaths) -> Result<Outcome> {
    let scratch = Scratch::new(&paths.scratch_dir);
    let res = repair_link_with(paths, &scratch);
    scratch.release();
    res
}

fn repair_link_with(paths: &InstallPaths, scratch: &Scratch) -> Result<Outcome> {
    let target = paths.link_target();
    if !target.is_file() {
        return Err(Error::fs(
            "find entry point",
            &target,
            io::Error::new(
                io::ErrorKind::NotFound,
                "not installed; run `install` or `reinstall` first",
            ),
        )
        .during_install(Step::Link));
    }
    if state::inspect(paths).is_consistent() {
        return Ok(Outcome::LinkAlreadyCorrect);
    }
    commit::replace_link(&target, &paths.binary_link, scratch)
        .map_err(|e| e.during_install(Step::Link))?;
    Ok(Outcome::LinkRepaired)
}

/// Inspect and narrate the current state. Read-only.
pub fn check(paths: &InstallPaths) -> Outcome {
    let (state, mut lines) = state::explain(paths);
    if state.is_consistent() && !paths.link_target().is_file() {
        lines.push(format!(
            "Note: entry point {} is missing; run `reinstall`",
            paths.link_target().display()
        ));
    }
    Outcome::Checked(Report { state, lines })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FetchStage;
    use crate::fetch::fakes::{FailingDownload, StaticDownload};
    use crate::fetch::testutil::zip_bytes;
    use crate::paths::InstallScope;
    use crate::state::Defect;
    use std::io::Cursor;
    use std::os::unix::fs::symlink;
    use std::path::Path;
    use tempfile::tempdir;

    const URL: &str = "https://example.invalid/Grayjay.zip";

    fn layout(root: &Path) -> InstallPaths {
        InstallPaths {
            scope: InstallScope::User,
            install_dir: root.join("share").join("grayjay"),
            binary_link: root.join("bin").join("grayjay"),
            scratch_dir: root.join("share").join(".grayjay.scratch"),
            entrypoint: "Grayjay".into(),
        }
    }

    fn v1() -> StaticDownload {
        StaticDownload(zip_bytes(&[
            ("Grayjay.Desktop-linux-x64/", ""),
            ("Grayjay.Desktop-linux-x64/Grayjay", "bin-v1"),
            ("Grayjay.Desktop-linux-x64/wwwroot/app.js", "js-v1"),
        ]))
    }

    fn v2() -> StaticDownload {
        StaticDownload(zip_bytes(&[
            ("Grayjay", "bin-v2"),
            ("wwwroot/app.js", "js-v2"),
        ]))
    }

    fn run<T>(
        paths: &InstallPaths,
        dl: &dyn Download,
        f: impl FnOnce(&Context<'_>) -> T,
    ) -> T {
        let pb = ProgressBar::hidden();
        let ctx = Context {
            paths,
            url: URL,
            downloader: dl,
            progress: &pb,
        };
        f(&ctx)
    }

    fn snapshot(root: &Path) -> Vec<(String, Vec<u8>)> {
        let mut out = Vec::new();
        fn go(base: &Path, dir: &Path, out: &mut Vec<(String, Vec<u8>)>) {
            let mut ents: Vec<_> = fs::read_dir(dir).unwrap().map(|e| e.unwrap()).collect();
            ents.sort_by_key(|e| e.file_name());
            for e in ents {
                let p = e.path();
                let rel = p.strip_prefix(base).unwrap().display().to_string();
                let ft = e.file_type().unwrap();
                if ft.is_symlink() {
                    out.push((rel, fs::read_link(&p).unwrap().into_os_string().into_encoded_bytes()));
                } else if ft.is_dir() {
                    out.push((rel, Vec::new()));
                    go(base, &p, out);
                } else {
                    out.push((rel, fs::read(&p).unwrap()));
                }
            }
        }
        go(root, root, &mut out);
        out
    }

    #[test]
    fn install_from_absent_becomes_consistent() {
        let td = tempdir().unwrap();
        let p = layout(td.path());
        assert_eq!(state::inspect(&p), InstallState::Absent);

        let out = run(&p, &v1(), install).unwrap();
        assert_eq!(out, Outcome::Installed);
        assert_eq!(state::inspect(&p), InstallState::Consistent);
        assert_eq!(fs::read(p.link_target()).unwrap(), b"bin-v1");
        assert!(!p.scratch_dir.exists());
    }

    #[test]
    fn install_when_consistent_is_a_no_op() {
        let td = tempdir().unwrap();
        let p = layout(td.path());
        run(&p, &v1(), install).unwrap();
        let before = snapshot(td.path());

        let out = run(&p, &v2(), install).unwrap();
        assert_eq!(out, Outcome::AlreadyInstalled);
        assert_eq!(snapshot(td.path()), before);
    }

    #[test]
    fn install_over_inconsistent_rewrites_link() {
        let td = tempdir().unwrap();
        let p = layout(td.path());
        run(&p, &v1(), install).unwrap();
        fs::remove_file(&p.binary_link).unwrap();
        symlink("/usr/bin/true", &p.binary_link).unwrap();

        let out = run(&p, &v2(), install).unwrap();
        assert_eq!(out, Outcome::Installed);
        assert_eq!(state::inspect(&p), InstallState::Consistent);
        assert_eq!(fs::read(p.link_target()).unwrap(), b"bin-v2");
    }

    #[test]
    fn install_fetch_failure_leaves_absent_and_clean_scratch() {
        let td = tempdir().unwrap();
        let p = layout(td.path());

        let err = run(&p, &FailingDownload, install).unwrap_err();
        match &err {
            Error::Install { step, source } => {
                assert_eq!(*step, Step::Fetch);
                assert!(matches!(
                    **source,
                    Error::Fetch {
                        stage: FetchStage::Download,
                        ..
                    }
                ));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(state::inspect(&p), InstallState::Absent);
        assert!(!p.install_dir.exists());
        assert!(!p.binary_link.exists());
        assert!(!p.scratch_dir.exists());
    }

    fn assert_untouched_after_extract_failure(p: &InstallPaths, err: &Error) {
        match err {
            Error::Install { step, source } => {
                assert_eq!(*step, Step::Fetch);
                assert!(matches!(
                    **source,
                    Error::Fetch {
                        stage: FetchStage::Extract,
                        ..
                    }
                ));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(state::inspect(p), InstallState::Absent);
        assert!(fs::symlink_metadata(&p.binary_link).is_err());
        assert!(!p.scratch_dir.exists());
    }

    #[test]
    fn install_of_corrupt_archive_leaves_absent() {
        let td = tempdir().unwrap();
        let p = layout(td.path());

        let err = run(&p, &StaticDownload(b"not a zip".to_vec()), install).unwrap_err();
        assert_untouched_after_extract_failure(&p, &err);
    }

    #[test]
    fn install_without_entrypoint_leaves_absent() {
        let td = tempdir().unwrap();
        let p = layout(td.path());
        let dl = StaticDownload(zip_bytes(&[("Other", "bin"), ("wwwroot/app.js", "js")]));

        let err = run(&p, &dl, install).unwrap_err();
        assert!(err.to_string().contains("entry point 'Grayjay'"), "{err}");
        assert_untouched_after_extract_failure(&p, &err);
    }

    #[test]
    fn failed_reinstall_keeps_previous_tree() {
        let td = tempdir().unwrap();
        let p = layout(td.path());
        run(&p, &v1(), install).unwrap();
        let before = snapshot(td.path());

        let bad = StaticDownload(b"not a zip".to_vec());
        let err = run(&p, &bad, reinstall).unwrap_err();
        assert!(matches!(err, Error::Install { step: Step::Fetch, .. }));
        assert_eq!(snapshot(td.path()), before);
    }

    #[test]
    fn reinstall_replaces_consistent_install() {
        let td = tempdir().unwrap();
        let p = layout(td.path());
        run(&p, &v1(), install).unwrap();

        assert_eq!(run(&p, &v2(), reinstall).unwrap(), Outcome::Installed);
        assert_eq!(fs::read(p.link_target()).unwrap(), b"bin-v2");
        assert!(!p.install_dir.join("Grayjay.Desktop-linux-x64").exists());
    }

    #[test]
    fn update_with_identical_content_writes_nothing() {
        let td = tempdir().unwrap();
        let p = layout(td.path());
        run(&p, &v1(), install).unwrap();
        let before = snapshot(&p.install_dir);
        let mtime = fs::metadata(p.link_target()).unwrap().modified().unwrap();

        assert_eq!(run(&p, &v1(), update).unwrap(), Outcome::UpToDate);
        assert_eq!(snapshot(&p.install_dir), before);
        assert_eq!(
            fs::metadata(p.link_target()).unwrap().modified().unwrap(),
            mtime
        );
        assert!(!p.scratch_dir.exists());
    }

    #[test]
    fn update_mirrors_fetched_tree() {
        let td = tempdir().unwrap();
        let p = layout(td.path());
        run(&p, &v1(), install).unwrap();
        fs::write(p.install_dir.join("leftover.log"), "x").unwrap();

        assert_eq!(run(&p, &v2(), update).unwrap(), Outcome::Updated);
        assert!(!p.install_dir.join("leftover.log").exists());
        assert_eq!(
            fs::read(p.install_dir.join("wwwroot/app.js")).unwrap(),
            b"js-v2"
        );
        assert_eq!(state::inspect(&p), InstallState::Consistent);

        // fetch again and compare: nothing left to sync
        assert_eq!(run(&p, &v2(), update).unwrap(), Outcome::UpToDate);
    }

    #[test]
    fn update_on_absent_creates_tree_without_link() {
        let td = tempdir().unwrap();
        let p = layout(td.path());
        assert_eq!(run(&p, &v2(), update).unwrap(), Outcome::Updated);
        assert_eq!(
            state::inspect(&p),
            InstallState::Inconsistent(Defect::MissingLink)
        );
    }

    #[test]
    fn update_failure_is_update_error() {
        let td = tempdir().unwrap();
        let p = layout(td.path());
        let err = run(&p, &FailingDownload, update).unwrap_err();
        assert!(matches!(err, Error::Update { step: Step::Fetch, .. }));
        assert!(!p.scratch_dir.exists());
    }

    #[test]
    fn remove_declined_changes_nothing() {
        let td = tempdir().unwrap();
        let p = layout(td.path());
        run(&p, &v1(), install).unwrap();
        let before = snapshot(td.path());

        let mut out = Vec::new();
        let res = remove(&p, false, &mut Cursor::new(&b"\n"[..]), &mut out).unwrap();
        assert_eq!(res, Outcome::Aborted);
        assert_eq!(res.exit_code(), 0);
        assert_eq!(snapshot(td.path()), before);
    }

    #[test]
    fn remove_confirmed_deletes_everything() {
        let td = tempdir().unwrap();
        let p = layout(td.path());
        run(&p, &v1(), install).unwrap();
        fs::create_dir_all(p.scratch_dir.join("stale")).unwrap();

        let mut out = Vec::new();
        let res = remove(&p, false, &mut Cursor::new(&b"yes\n"[..]), &mut out).unwrap();
        assert_eq!(res, Outcome::Removed);
        assert_eq!(state::inspect(&p), InstallState::Absent);
        assert!(fs::symlink_metadata(&p.binary_link).is_err());
        assert!(!p.scratch_dir.exists());
    }

    #[test]
    fn remove_handles_regular_file_link_and_missing_dir() {
        let td = tempdir().unwrap();
        let p = layout(td.path());
        fs::create_dir_all(p.binary_link.parent().unwrap()).unwrap();
        fs::write(&p.binary_link, "#!/bin/sh").unwrap();

        let mut out = Vec::new();
        let res = remove(&p, true, &mut io::empty(), &mut out).unwrap();
        assert_eq!(res, Outcome::Removed);
        assert!(!p.binary_link.exists());
        assert!(out.is_empty());
    }

    #[test]
    fn clean_always_succeeds() {
        let td = tempdir().unwrap();
        let p = layout(td.path());
        assert_eq!(clean(&p), Outcome::Cleaned);

        fs::create_dir_all(p.scratch_dir.join("bundle")).unwrap();
        fs::write(p.scratch_dir.join("download.zip"), "zip").unwrap();
        assert_eq!(clean(&p), Outcome::Cleaned);
        assert!(!p.scratch_dir.exists());
    }

    #[test]
    fn repair_link_fixes_missing_link_only() {
        let td = tempdir().unwrap();
        let p = layout(td.path());
        run(&p, &v1(), install).unwrap();
        fs::remove_file(&p.binary_link).unwrap();
        let tree = snapshot(&p.install_dir);

        assert_eq!(repair_link(&p).unwrap(), Outcome::LinkRepaired);
        assert_eq!(state::inspect(&p), InstallState::Consistent);
        assert_eq!(snapshot(&p.install_dir), tree);
        assert_eq!(repair_link(&p).unwrap(), Outcome::LinkAlreadyCorrect);
    }

    #[test]
    fn repair_link_requires_installed_entrypoint() {
        let td = tempdir().unwrap();
        let p = layout(td.path());
        let err = repair_link(&p).unwrap_err();
        assert!(matches!(err, Error::Install { step: Step::Link, .. }));
        assert!(fs::symlink_metadata(&p.binary_link).is_err());
    }

    #[test]
    fn check_exit_codes_follow_state() {
        let td = tempdir().unwrap();
        let p = layout(td.path());
        assert_eq!(check(&p).exit_code(), 1);

        run(&p, &v1(), install).unwrap();
        assert_eq!(check(&p).exit_code(), 0);

        fs::remove_file(&p.binary_link).unwrap();
        let Outcome::Checked(report) = check(&p) else {
            panic!("check must return a report");
        };
        assert!(report.lines.iter().any(|l| l.starts_with("Missing link")));
    }
}
