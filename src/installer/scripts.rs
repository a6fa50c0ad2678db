// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Maintainer script invocation.

Scripts run with the working directory at the target root and the
process environment extended with `WPKG_ROOT` and `WPKG_ADMINDIR`. On a
Unix-family target only extensionless scripts run; on a Windows-family
target only `.bat` scripts. A nonzero exit is a [ScriptError] and sends
the executor into the protocol's rollback sequence.
*/

use {
    crate::{
        admin_db::AdminDb,
        context::Context,
        error::{Result, WpkgError},
    },
    std::{
        fs,
        path::{Path, PathBuf},
        process::Command,
    },
};

/// Runs maintainer scripts out of the admin database or a staging tree.
pub struct ScriptRunner<'a> {
    ctx: &'a Context,
}

impl<'a> ScriptRunner<'a> {
    pub fn new(ctx: &'a Context) -> Self {
        Self { ctx }
    }

    /// The script file name for the target architecture's family.
    fn script_name(&self, base: &str) -> String {
        if self.ctx.architecture().is_windows_family() {
            format!("{}.bat", base)
        } else {
            base.to_string()
        }
    }

    /// Locate an installed package's script, `None` when not shipped.
    pub fn installed_script(&self, db: &AdminDb, package: &str, base: &str) -> Option<PathBuf> {
        let path = db.info_path(package, &self.script_name(base));

        if path.is_file() {
            Some(path)
        } else {
            None
        }
    }

    /// Run an installed package's script.
    ///
    /// Returns `Ok(false)` when the package does not ship the script,
    /// which counts as success for every protocol step.
    pub fn run_installed(
        &self,
        db: &AdminDb,
        package: &str,
        base: &str,
        args: &[&str],
    ) -> Result<bool> {
        match self.installed_script(db, package, base) {
            Some(path) => {
                self.run_script(&path, package, base, args)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Run a script materialized in a staging directory (the incoming
    /// package's scripts before its database record exists).
    pub fn run_staged(
        &self,
        staging: &Path,
        package: &str,
        base: &str,
        args: &[&str],
    ) -> Result<bool> {
        let path = staging.join(self.script_name(base));

        if !path.is_file() {
            return Ok(false);
        }

        self.run_script(&path, package, base, args)?;

        Ok(true)
    }

    fn run_script(&self, path: &Path, package: &str, base: &str, args: &[&str]) -> Result<()> {
        log::debug!(
            "running {} {} for {}",
            path.display(),
            args.join(" "),
            package
        );

        set_executable(path)?;

        let status = Command::new(path)
            .args(args)
            .current_dir(self.ctx.root())
            .env("WPKG_ROOT", self.ctx.root())
            .env("WPKG_ADMINDIR", self.ctx.admin_dir())
            .status()?;

        if status.success() {
            Ok(())
        } else {
            Err(WpkgError::ScriptFailed {
                package: package.to_string(),
                script: format!("{} {}", base, args.join(" ")),
                status: status.code().unwrap_or(-1),
            })
        }
    }
}

pub(crate) fn set_executable(path: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        let mut perms = fs::metadata(path)?.permissions();
        perms.set_mode(perms.mode() | 0o755);
        fs::set_permissions(path, perms)?;
    }

    #[cfg(not(unix))]
    let _ = path;

    Ok(())
}
