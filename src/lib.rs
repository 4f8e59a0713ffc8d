// src/lib.rs

//! Pandora Package Manager
//!
//! Single-user, home-directory package manager. Packages are fetched
//! from a registry, verified, and materialized into an immutable
//! content-addressed store; selected `(name, version)` sets are exposed
//! through symlink-forest profiles swapped atomically and kept for
//! rollback.
//!
//! # Architecture
//!
//! - Immutable store: `store/<name>/<version>` published by a single
//!   rename, never mutated afterwards
//! - Atomic profiles: assembled in hidden temp directories, made live
//!   by swapping the `vir` pointer
//! - Crash discipline: temp-then-rename everywhere, a whole-program
//!   mutation lock, and a startup recovery sweep
//! - Untrusted input: archive paths normalized, unpacked trees
//!   validated, digests compared in constant time

pub mod archive;
pub mod config;
mod error;
pub mod fetch;
pub mod hash;
pub mod ident;
pub mod layout;
pub mod lock;
pub mod paths;
pub mod profile;
pub mod registry;
pub mod signature;
pub mod store;

pub use error::{Error, Result};
pub use hash::{sha256, Sha256Digest, Sha256Stream};
pub use ident::PackageId;
pub use layout::{PandoraRoot, RecoverySummary};
pub use lock::MutationLock;
pub use profile::ProfileEntry;
pub use registry::{Manifest, RegistryClient};
pub use signature::SignatureVerifier;
