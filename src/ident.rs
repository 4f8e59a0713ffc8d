// src/ident.rs

//! Package identity.
//!
//! A package is identified by the pair `name@version`. The pair is the
//! primary key everywhere: in the index, in manifests, in the store
//! layout `store/<name>/<version>`, and in profile diagnostics.
//!
//! Both halves are short non-empty strings. Because they become path
//! components under the store, neither may contain `/`, a NUL byte, or
//! a `..` component.

use crate::error::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// An exact `(name, version)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageId {
    pub name: String,
    pub version: String,
}

impl PackageId {
    /// Build an id from validated components.
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let version = version.into();
        validate_atom("package name", &name)?;
        validate_atom("package version", &version)?;
        Ok(Self { name, version })
    }

    /// Parse the `name@version` spelling used on the command line and
    /// in manifest `deps` lists.
    pub fn parse(s: &str) -> Result<Self> {
        let (name, version) = s
            .split_once('@')
            .ok_or_else(|| Error::InvalidInput(format!("expected name@version, got '{s}'")))?;
        Self::new(name, version)
    }

    /// The `<name>-<version>` spelling used in on-disk file names.
    pub fn file_stem(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

impl FromStr for PackageId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        PackageId::parse(s)
    }
}

/// Reject anything that could change meaning as a path component.
fn validate_atom(what: &str, s: &str) -> Result<()> {
    if s.is_empty() {
        return Err(Error::InvalidInput(format!("{what} is empty")));
    }
    if s.len() > 255 {
        return Err(Error::InvalidInput(format!("{what} is too long")));
    }
    if s.contains('/') || s.contains('\0') || s.contains("..") {
        return Err(Error::InvalidInput(format!(
            "{what} '{s}' contains a path separator, NUL, or '..'"
        )));
    }
    if s == "." {
        return Err(Error::InvalidInput(format!("{what} '{s}' is a dot component")));
    }
    Ok(())
}
