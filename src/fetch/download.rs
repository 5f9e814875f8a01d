use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::{Client, Response};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

/// Something that can place the bytes behind `url` into `dest`.
///
/// The fetcher only needs to know whether this succeeded; the HTTP client is
/// one implementation and tests plug in their own.
pub trait Download {
    fn download(&self, url: &str, dest: &Path) -> io::Result<()>;
}

/// Blocking HTTP(S) downloader backed by `reqwest`.
pub struct HttpDownloader {
    client: Client,
}

impl HttpDownloader {
    /// Build a client; `timeout` bounds the whole request, body included.
    pub fn new(timeout: Option<Duration>) -> io::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("grayjay-installer/", env!("CARGO_PKG_VERSION"))),
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(io::Error::other)?;
        Ok(Self { client })
    }
}

impl Download for HttpDownloader {
    fn download(&self, url: &str, dest: &Path) -> io::Result<()> {
        let mut resp: Response = self
            .client
            .get(url)
            .send()
            .and_then(Response::error_for_status)
            .map_err(io::Error::other)?;
        let mut out = fs::File::create(dest)?;
        let n = io::copy(&mut resp, &mut out)?;
        out.sync_all()?;
        log::debug!("downloaded {n} bytes from {url} to {}", dest.display());
        Ok(())
    }
}
