// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Core of a Debian-style binary package manager.

This crate implements the subsystem that, given a set of on-disk
package archives and a persistent administrative database, computes a
valid installation plan and executes it atomically against a target
filesystem.

# A Tour of Functionality

Package archives are an outer `!<arch>` container wrapping a format
version member, a `control.tar`, and a `data.tar`. Readers and writers
live in the [archive] module: [archive::PackageArchive] opens and
streams an archive, [archive::PackageBuilder] creates one.

Control stanzas are `Field: value` paragraphs. Low-level primitives are
in [control] ([control::ControlParagraph], [control::ControlParagraphReader]);
[binary_control::BinaryControl] layers the mandatory-field rules of a
binary package on top.

[package_version::PackageVersion] implements version parsing and the
ordering algebra, including the tilde rule. [dependency] implements the
dependency expression grammar (`a (>= 1.0) | b [linux-amd64], c`).

The persistent state of a target system lives under an admin directory
managed by [admin_db::AdminDb]: the `status` file, per-package info
files, the updates journal, and registered hooks. Mutations are guarded
by an exclusive [lock::DatabaseLock].

[repository::RepositoryIndex] catalogs the `*.deb` archives of a local
repository directory. [planner::Planner] combines the database
snapshot, repository index, and explicitly supplied archives into a
validated, totally ordered [planner::Plan].
[installer::Executor] executes a plan unit by unit, honoring the
conffile protocol and maintainer-script rollback sequences, invoking
[hooks::HookManager] around every action.

Callers hand the core a structured [request::Request] (verbs plus
operands) together with a [context::Context] naming the target root,
admin directory, architecture, and force flags. Logging goes through
the `log` facade; this crate never installs a logger.
*/

pub mod admin_db;
pub mod architecture;
pub mod archive;
pub mod binary_control;
pub mod context;
pub mod control;
pub mod dependency;
pub mod error;
pub mod hooks;
pub mod installer;
pub mod lock;
pub mod md5sums;
pub mod package_version;
pub mod planner;
pub mod repository;
pub mod request;
pub mod subst;

pub use crate::{
    context::{Context, ForceFlags},
    error::{Result, WpkgError},
    request::{ExecutionSummary, Operand, Operation, Request, Verb},
};

use std::path::Path;

/// Plan and execute a request against a repository directory.
///
/// This is the high-level entry point behind the install/remove verb
/// family: snapshot the database and repository, load any archives the
/// request names directly, plan, and execute. Administrative verbs
/// (`create-admindir`, `create-index`, `add-hooks`, …) map onto the
/// component APIs instead.
pub fn run_request(
    ctx: &Context,
    repository: Option<&Path>,
    request: &Request,
) -> Result<ExecutionSummary> {
    let db = admin_db::AdminDb::open(ctx.admin_dir())?;

    let mut planner = planner::Planner::new(ctx, &db)?;

    if let Some(repository) = repository {
        let index = repository::RepositoryIndex::load(repository, true)?;
        planner.load_repository(&index)?;
    }

    for operation in &request.operations {
        if let Operand::ArchivePath(path) = &operation.operand {
            planner.load_archive(path)?;
        }
    }

    let plan = planner.plan(request)?;

    let mut executor = installer::Executor::new(ctx, db);
    executor.execute(&plan)
}
