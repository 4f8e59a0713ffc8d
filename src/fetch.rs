// src/fetch.rs

//! Streaming fetch with on-the-fly digest computation.
//!
//! A fetch lands in a uniquely named file under the root's `tmp/`
//! directory and the SHA-256 of the body is computed while streaming,
//! so the caller never reads the payload twice. Anything that is not
//! an `http(s)` URL is treated as a local filesystem path and copied
//! through the same interface, which lets the registry client consume
//! either transparently.
//!
//! No timeout and no retry at this layer: the process is synchronous
//! and blocking, and retries are a caller concern. A failed fetch
//! removes its partial file; files orphaned by a crash carry the
//! `dl-` prefix and are reaped by the startup recovery sweep.

use crate::error::{Error, Result};
use crate::hash::{Sha256Digest, Sha256Stream};
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const STREAM_CHUNK: usize = 64 * 1024;

/// Prefix for in-flight download files under `tmp/`.
pub const DOWNLOAD_PREFIX: &str = "dl-";

/// A completed fetch: the temp file and the digest of its contents.
#[derive(Debug)]
pub struct Download {
    pub path: PathBuf,
    pub digest: Sha256Digest,
}

/// Blocking fetcher writing into a fixed temp directory.
pub struct Fetcher {
    client: reqwest::blocking::Client,
    tmp_dir: PathBuf,
}

impl Fetcher {
    pub fn new(tmp_dir: impl Into<PathBuf>) -> Result<Self> {
        let tmp_dir = tmp_dir.into();
        fs::create_dir_all(&tmp_dir)?;
        let client = reqwest::blocking::Client::builder()
            .build()
            .map_err(|e| Error::Internal(format!("failed to create HTTP client: {e}")))?;
        Ok(Self { client, tmp_dir })
    }

    /// Stream `url` to a fresh temp file, returning its path and the
    /// digest of the whole body. The digest is only produced on
    /// whole-body success; any transport failure deletes the partial
    /// file and surfaces as `FetchFailed`.
    pub fn fetch(&self, url: &str) -> Result<Download> {
        debug!(%url, "fetching");
        let tmp = tempfile::Builder::new()
            .prefix(DOWNLOAD_PREFIX)
            .tempfile_in(&self.tmp_dir)?;

        let digest = if is_remote(url) {
            self.stream_http(url, tmp.as_file())?
        } else {
            stream_local(Path::new(url), tmp.as_file())?
        };

        // success: detach the file from auto-delete
        let (_file, path) = tmp
            .keep()
            .map_err(|e| Error::Internal(format!("failed to keep temp file: {e}")))?;

        info!(%url, digest = %digest, "fetched");
        Ok(Download { path, digest })
    }

    fn stream_http(&self, url: &str, out: &File) -> Result<Sha256Digest> {
        let fetch_err = |reason: String| Error::FetchFailed {
            url: url.to_string(),
            reason,
        };

        let mut response = self
            .client
            .get(url)
            .send()
            .map_err(|e| fetch_err(e.to_string()))?;

        if !response.status().is_success() {
            return Err(fetch_err(format!("HTTP {}", response.status())));
        }

        let mut out = out;
        let mut hasher = Sha256Stream::new();
        let mut buf = vec![0u8; STREAM_CHUNK];
        loop {
            let n = response
                .read(&mut buf)
                .map_err(|e| fetch_err(format!("body read failed: {e}")))?;
            if n == 0 {
                break;
            }
            out.write_all(&buf[..n])?;
            hasher.update(&buf[..n]);
        }
        out.flush()?;
        Ok(hasher.finalize())
    }
}

fn is_remote(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

fn stream_local(src: &Path, out: &File) -> Result<Sha256Digest> {
    let mut input = File::open(src).map_err(|e| Error::FetchFailed {
        url: src.display().to_string(),
        reason: e.to_string(),
    })?;

    let mut out = out;
    let mut hasher = Sha256Stream::new();
    let mut buf = vec![0u8; STREAM_CHUNK];
    loop {
        let n = input.read(&mut buf).map_err(|e| Error::FetchFailed {
            url: src.display().to_string(),
            reason: e.to_string(),
        })?;
        if n == 0 {
            break;
        }
        out.write_all(&buf[..n])?;
        hasher.update(&buf[..n]);
    }
    out.flush()?;
    Ok(hasher.finalize())
}
