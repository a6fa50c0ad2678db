// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Structured requests.

The core consumes a list of verb/operand pairs plus flags. Producing
this structure (command-line parsing, GUI actions) is the caller's
concern.
*/

use {
    crate::package_version::PackageVersion,
    std::path::PathBuf,
};

/// An action requested of the core.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Verb {
    Install,
    Unpack,
    Configure,
    Remove,
    Purge,
    Upgrade,
    AutoRemove,
}

/// The target of a verb.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Operand {
    /// A package name.
    Name(String),
    /// A package name pinned to a version.
    NameVersion(String, PackageVersion),
    /// An archive file supplied directly.
    ArchivePath(PathBuf),
    /// No target (auto-remove).
    None,
}

/// One requested operation.
#[derive(Clone, Debug)]
pub struct Operation {
    pub verb: Verb,
    pub operand: Operand,
}

impl Operation {
    pub fn new(verb: Verb, operand: Operand) -> Self {
        Self { verb, operand }
    }
}

/// A complete structured request.
#[derive(Clone, Debug, Default)]
pub struct Request {
    pub operations: Vec<Operation>,
}

impl Request {
    /// Add an operation to this request.
    pub fn push(&mut self, verb: Verb, operand: Operand) -> &mut Self {
        self.operations.push(Operation::new(verb, operand));
        self
    }
}

/// Outcome of executing a plan, mapped to process exit codes by the
/// caller: 0 success, 1 plan rejected or at least one unit failed,
/// 2 reserved for usage errors upstream of the core.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ExecutionSummary {
    /// Units that committed.
    pub succeeded: Vec<String>,
    /// Units that failed (plan halted at the first).
    pub failed: Vec<String>,
    /// Units skipped due to an earlier failure or cancellation.
    pub skipped: Vec<String>,
}

impl ExecutionSummary {
    /// Whether every unit committed.
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }

    /// The exit code the conventional command-line front end reports.
    pub fn exit_code(&self) -> i32 {
        if self.is_success() {
            0
        } else {
            1
        }
    }
}
