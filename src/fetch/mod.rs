//! Download and unpack the application archive into the scratch directory.
//!
//! The network client and the zip reader are hidden behind this module;
//! callers only see a [`FetchResult`] or a [`FetchStage`]-tagged error.

mod archive;
mod download;

use std::fs;
use std::io;
use std::path::PathBuf;

use crate::error::{Error, FetchStage, Result};
use crate::scratch::Scratch;

pub use archive::make_executable;
pub use download::{Download, HttpDownloader};

#[cfg(test)]
pub(crate) use archive::testutil;

/// File name of the raw archive inside the scratch directory.
pub const ARCHIVE_FILE: &str = "download.zip";
/// Directory inside scratch holding the unpacked bundle.
pub const BUNDLE_DIR: &str = "bundle";

/// An unpacked bundle living inside the scratch directory.
///
/// Removed together with the scratch directory at the end of the command.
#[derive(Debug)]
pub struct FetchResult {
    pub root: PathBuf,
}

/// Fetch `url` into `scratch` and unpack it.
///
/// Steps:
/// 1. Reset the scratch directory.
/// 2. Download to `<scratch>/download.zip`.
/// 3. Extract into `<scratch>/bundle` and delete the archive.
/// 4. Flatten a single top-level wrapper directory, if present.
/// 5. Require `entrypoint` at the bundle root and mark it executable.
///
/// On any failure the scratch directory is cleared before returning.
pub fn fetch(
    downloader: &dyn Download,
    url: &str,
    scratch: &Scratch,
    entrypoint: &str,
) -> Result<FetchResult> {
    scratch.reset()?;
    let res = fetch_into(downloader, url, scratch, entrypoint);
    if res.is_err() {
        scratch.release();
    }
    res
}

fn fetch_into(
    downloader: &dyn Download,
    url: &str,
    scratch: &Scratch,
    entrypoint: &str,
) -> Result<FetchResult> {
    let archive = scratch.join(ARCHIVE_FILE);
    log::info!("downloading {url}");
    downloader
        .download(url, &archive)
        .map_err(|source| Error::Fetch {
            stage: FetchStage::Download,
            target: url.to_string(),
            source,
        })?;

    let extract_err = |source: io::Error| Error::Fetch {
        stage: FetchStage::Extract,
        target: archive.display().to_string(),
        source,
    };

    let root = scratch.join(BUNDLE_DIR);
    let n = archive::extract_zip(&archive, &root).map_err(extract_err)?;
    log::debug!("extracted {n} files into {}", root.display());
    fs::remove_file(&archive).map_err(extract_err)?;

    if archive::flatten_single_wrapper(&root).map_err(extract_err)? {
        log::debug!("flattened single top-level directory");
    }

    let exe = root.join(entrypoint);
    if !exe.is_file() {
        return Err(extract_err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("archive does not contain entry point '{entrypoint}'"),
        )));
    }
    make_executable(&exe).map_err(extract_err)?;

    Ok(FetchResult { root })
}
