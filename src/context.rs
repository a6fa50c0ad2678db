// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Transaction context.

All components receive an explicit [Context] instead of reaching for
global state. The context carries the target root, the administrative
directory, the target architecture, force flags, the path substitution
table, and the cancellation flag checked between plan units.
*/

use {
    crate::{architecture::Architecture, error::Result, subst::SubstTable},
    std::{
        path::{Path, PathBuf},
        sync::{
            atomic::{AtomicBool, Ordering},
            Arc,
        },
    },
};

/// Force flags, each demoting one specific fatal error to a warning.
#[derive(Clone, Copy, Debug, Default)]
pub struct ForceFlags {
    /// Overwrite a file owned by another package without `Replaces`.
    pub overwrite: bool,
    /// Install despite a declared `Conflicts`.
    pub conflicts: bool,
    /// Install despite a declared `Breaks`.
    pub breaks: bool,
    /// Change the version of a held package.
    pub hold: bool,
    /// Remove an essential package.
    pub remove_essential: bool,
    /// Ignore a distribution mismatch.
    pub distribution: bool,
    /// Skip the `Minimum-Upgradable-Version` gate.
    pub upgrade_any_version: bool,
    /// Proceed with unsatisfied dependencies.
    pub depends: bool,
    /// Install an older version over a newer one.
    pub downgrade: bool,
    /// Install despite an architecture mismatch.
    pub architecture: bool,
}

/// The explicit context passed into every component constructor.
#[derive(Clone, Debug)]
pub struct Context {
    root: PathBuf,
    admin_dir: PathBuf,
    architecture: Architecture,
    flags: ForceFlags,
    subst: SubstTable,
    distribution: Option<String>,
    cancel: Arc<AtomicBool>,
}

impl Context {
    /// Create a context for a target root and admin directory.
    ///
    /// The substitution table is read from the environment; an invalid
    /// definition rejects the transaction here, before any work starts.
    pub fn new(
        root: impl AsRef<Path>,
        admin_dir: impl AsRef<Path>,
        architecture: Architecture,
    ) -> Result<Self> {
        Ok(Self {
            root: root.as_ref().to_path_buf(),
            admin_dir: admin_dir.as_ref().to_path_buf(),
            architecture,
            flags: ForceFlags::default(),
            subst: SubstTable::from_env()?,
            distribution: None,
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// The filesystem root packages install into.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The administrative directory.
    pub fn admin_dir(&self) -> &Path {
        &self.admin_dir
    }

    /// The architecture of the target system.
    pub fn architecture(&self) -> &Architecture {
        &self.architecture
    }

    /// The force flags in effect.
    pub fn flags(&self) -> &ForceFlags {
        &self.flags
    }

    /// Replace the force flags.
    pub fn set_flags(&mut self, flags: ForceFlags) {
        self.flags = flags;
    }

    /// The path substitution table.
    pub fn subst(&self) -> &SubstTable {
        &self.subst
    }

    /// Replace the substitution table (tests, embedders).
    pub fn set_subst(&mut self, subst: SubstTable) {
        self.subst = subst;
    }

    /// The expected distribution, when distribution gating is on.
    pub fn distribution(&self) -> Option<&str> {
        self.distribution.as_deref()
    }

    /// Enable distribution gating against the given name.
    pub fn set_distribution(&mut self, distribution: Option<String>) {
        self.distribution = distribution;
    }

    /// A handle that can cancel the transaction from another thread.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    /// Whether cancellation was requested.
    ///
    /// Observed only between plan units; a unit in flight always runs
    /// to completion so the on-disk state stays coherent.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_flag() -> Result<()> {
        let ctx = Context::new("/", "/var/lib/wpkg", "linux-amd64".parse()?)?;
        assert!(!ctx.is_cancelled());

        ctx.cancel_handle().store(true, Ordering::Relaxed);
        assert!(ctx.is_cancelled());

        Ok(())
    }
}
