// src/error.rs

//! Crate-wide error type.
//!
//! Each variant is a caller-visible failure kind; they do not overlap.
//! Library code constructs and propagates these, only the CLI layer
//! formats them for a terminal.

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// Required configuration key or environment variable absent.
    #[error("missing configuration: {0}")]
    ConfigMissing(String),

    /// Config, manifest, or index could not be parsed.
    #[error("parse failed: {0}")]
    ParseFailed(String),

    /// Package or version absent from the index.
    #[error("package {name}@{version} not found in index")]
    NotFound { name: String, version: String },

    /// Network transport error or local read failure while fetching.
    #[error("fetch failed for {url}: {reason}")]
    FetchFailed { url: String, reason: String },

    /// Computed digest does not match what the manifest asserted.
    #[error("sha256 mismatch: expected {expected}, computed {actual}")]
    HashMismatch { expected: String, actual: String },

    /// Path-safety validation rejected an unpacked tree.
    #[error("unsafe archive: {0}")]
    UnsafeArchive(String),

    /// Version already published in the store with a different digest.
    #[error("store already holds {name}@{version} with digest {existing}")]
    StoreConflict {
        name: String,
        version: String,
        existing: String,
    },

    /// Two profile entries map to the same normalized relative path.
    #[error("profile conflict on '{path}': {first} vs {second}")]
    ProfileConflict {
        path: String,
        first: String,
        second: String,
    },

    /// A profile entry references a target that does not exist.
    #[error("profile target missing: {0}")]
    ProfileMissingTarget(PathBuf),

    /// Malformed name, version, relpath, or hex string.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Detached signature did not verify against any trusted key.
    #[error("signature verification failed: {0}")]
    SignatureInvalid(String),

    /// An OS call failed in a way not attributable to user input.
    #[error("internal error: {0}")]
    Internal(String),

    /// I/O failure carried through unchanged; classified as internal.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for the two kinds a caller may treat as "benign on reinstall":
    /// the entry is already there, byte for byte.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Error::StoreConflict { .. } | Error::ProfileConflict { .. })
    }
}
