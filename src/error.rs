// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Error handling. */

use {
    crate::{dependency::DependencyError, package_version::VersionError},
    std::path::PathBuf,
    thiserror::Error,
};

/// Primary crate error type.
///
/// Variants group into the five classes the rest of the crate reasons
/// about: input errors (malformed archives, fields, versions), constraint
/// errors (planner rejections), resource errors (I/O, locking), script
/// errors (maintainer/hook scripts), and state errors (administrative
/// database inconsistencies discovered at read time).
#[derive(Debug, Error)]
pub enum WpkgError {
    #[error("I/O error: {0:?}")]
    Io(#[from] std::io::Error),

    #[error("integer parsing error: {0:?}")]
    ParseInt(#[from] std::num::ParseIntError),

    #[error("version error: {0}")]
    Version(#[from] VersionError),

    #[error("dependency error: {0}")]
    Dependency(#[from] DependencyError),

    #[error("control file parse error: {0}")]
    ControlParse(String),

    #[error("required control field missing: {0}")]
    ControlRequiredFieldMissing(&'static str),

    #[error("invalid package name: {0}")]
    InvalidPackageName(String),

    #[error("invalid architecture: {0}")]
    InvalidArchitecture(String),

    #[error("malformed archive: {0}")]
    ArchiveFormat(String),

    #[error("unknown compression extension in archive member: {0}")]
    UnknownCompression(String),

    #[error("unknown member in package archive: {0}")]
    UnknownArchiveMember(String),

    #[error("unsupported binary package format version: {0:?}")]
    UnsupportedFormatVersion(String),

    #[error("plan rejected:\n{0}")]
    PlanRejected(crate::planner::PlanErrors),

    #[error("another process holds the database lock: {0}")]
    LockHeld(PathBuf),

    #[error("path escapes the installation root: {0}")]
    PathEscapesRoot(PathBuf),

    #[error("package {package} script {script} exited with {status}")]
    ScriptFailed {
        package: String,
        script: String,
        status: i32,
    },

    #[error("hook {hook} exited with {status}")]
    HookFailed { hook: String, status: i32 },

    #[error("administrative database error: {0}")]
    StatusParse(String),

    #[error("administrative database inconsistent: {0}")]
    StateInconsistent(String),

    #[error("admin directory not initialized: {0}")]
    AdminDirMissing(PathBuf),

    #[error("invalid path substitution: {0}")]
    InvalidSubstitution(String),

    #[error("md5sums mismatch for {path}: expected {expected}, found {found}")]
    Md5Mismatch {
        path: PathBuf,
        expected: String,
        found: String,
    },

    #[error("transaction cancelled")]
    Cancelled,
}

/// Result wrapper for this crate.
pub type Result<T> = std::result::Result<T, WpkgError>;
