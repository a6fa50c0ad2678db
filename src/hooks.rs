// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Hook subsystem.

Hooks are scripts invoked around every package action with the
positional arguments `<action> <package> <version>`. Global hooks are
registered explicitly and copied into `<admin>/hooks/`; package hooks
ship inside an archive's control member prefixed `<package>_` and are
installed into the same directory at unpack time.

A failing `validate` hook aborts the plan before any mutation. Failing
non-validate hooks are logged as errors but do not roll back units that
already committed.
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

/// Manages hook registration and invocation.
pub struct HookManager<'a> {
    ctx: &'a Context,
    hooks_dir: PathBuf,
}

impl<'a> HookManager<'a> {
    pub fn new(ctx: &'a Context, db: &AdminDb) -> Self {
        Self {
            ctx,
            hooks_dir: db.hooks_dir(),
        }
    }

    /// Register global hook scripts (`add-hooks`).
    ///
    /// Each script is copied into the hooks directory under its own
    /// base name.
    pub fn add_hooks(&self, scripts: &[PathBuf]) -> Result<()> {
        for script in scripts {
            if !script.is_file() {
                return Err(WpkgError::StateInconsistent(format!(
                    "hook script {} is not a regular file",
                    script.display()
                )));
            }

            let name = script
                .file_name()
                .ok_or_else(|| {
                    WpkgError::StateInconsistent(format!(
                        "hook script {} has no file name",
                        script.display()
                    ))
                })?
                .to_string_lossy()
                .to_string();

            let destination = self.hooks_dir.join(&name);
            fs::copy(script, &destination)?;
            set_executable(&destination)?;

            log::info!("registered hook {}", name);
        }

        Ok(())
    }

    /// Install a package hook shipped in a control member (`<pkg>_<hook>`).
    pub fn install_package_hook(&self, name: &str, data: &[u8]) -> Result<()> {
        let destination = self.hooks_dir.join(name);
        fs::write(&destination, data)?;
        set_executable(&destination)?;

        Ok(())
    }

    /// Unregister a global hook by name (`remove-hooks`).
    pub fn remove_hook(&self, name: &str) -> Result<bool> {
        if name.contains('/') || name.contains('\\') {
            return Err(WpkgError::StateInconsistent(format!(
                "hook name cannot include a path: {}",
                name
            )));
        }

        match fs::remove_file(self.hooks_dir.join(name)) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove every hook installed by a package (purge).
    pub fn remove_package_hooks(&self, package: &str) -> Result<()> {
        let prefix = format!("{}_", package);

        for name in self.list_hooks()? {
            if name.starts_with(&prefix) {
                fs::remove_file(self.hooks_dir.join(&name))?;
            }
        }

        Ok(())
    }

    /// Enumerate registered hook names, sorted (`list-hooks`).
    pub fn list_hooks(&self) -> Result<Vec<String>> {
        let mut names = vec![];

        for entry in fs::read_dir(&self.hooks_dir)? {
            let entry = entry?;

            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }

        names.sort();

        Ok(names)
    }

    /// Hooks runnable on the target architecture.
    ///
    /// Windows-family targets run `.bat` hooks, Unix-family targets run
    /// extensionless hooks.
    fn runnable_hooks(&self) -> Result<Vec<PathBuf>> {
        let windows = self.ctx.architecture().is_windows_family();

        Ok(self
            .list_hooks()?
            .into_iter()
            .filter(|name| name.ends_with(".bat") == windows)
            .map(|name| self.hooks_dir.join(name))
            .collect())
    }

    /// Run every `validate` hook; the first nonzero exit aborts.
    pub fn run_validate_hooks(&self, package: &str, version: &str) -> Result<()> {
        for hook in self.runnable_hooks()? {
            if !hook_matches(&hook, "validate") {
                continue;
            }

            let status = self.invoke(&hook, "validate", package, version)?;

            if status != 0 {
                return Err(WpkgError::HookFailed {
                    hook: hook.file_name().unwrap_or_default().to_string_lossy().to_string(),
                    status,
                });
            }
        }

        Ok(())
    }

    /// Run non-validate hooks for an action.
    ///
    /// Failures are logged and counted but never unwind the action.
    pub fn run_action_hooks(&self, action: &str, package: &str, version: &str) -> Result<usize> {
        let mut failures = 0;

        for hook in self.runnable_hooks()? {
            if hook_matches(&hook, "validate") {
                continue;
            }

            match self.invoke(&hook, action, package, version) {
                Ok(0) => {}
                Ok(status) => {
                    log::error!(
                        "hook {} failed with status {} for {} {}",
                        hook.display(),
                        status,
                        action,
                        package
                    );
                    failures += 1;
                }
                Err(e) => {
                    log::error!("hook {} could not run: {}", hook.display(), e);
                    failures += 1;
                }
            }
        }

        Ok(failures)
    }

    fn invoke(&self, hook: &Path, action: &str, package: &str, version: &str) -> Result<i32> {
        log::debug!("running hook {} {} {} {}", hook.display(), action, package, version);

        let status = Command::new(hook)
            .arg(action)
            .arg(package)
            .arg(version)
            .current_dir(self.ctx.root())
            .env("WPKG_ROOT", self.ctx.root())
            .env("WPKG_ADMINDIR", self.ctx.admin_dir())
            .status()?;

        Ok(status.code().unwrap_or(-1))
    }
}

/// Whether a hook file name names the given function.
///
/// Hook names follow `<unique-name>_<function>[.bat]`.
fn hook_matches(path: &Path, function: &str) -> bool {
    let name = match path.file_name() {
        Some(name) => name.to_string_lossy().to_string(),
        None => return false,
    };

    let base = name.strip_suffix(".bat").unwrap_or(&name);

    base.rsplit_once('_')
        .map_or(false, |(_, suffix)| suffix == function)
}

fn set_executable(path: &Path) -> Result<()> {
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

#[cfg(all(test, unix))]
mod tests {
    use {super::*, tempfile::TempDir};

    fn fixture() -> (TempDir, Context, AdminDb) {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("root");
        fs::create_dir_all(&root).unwrap();

        let db = AdminDb::create(dir.path().join("admin")).unwrap();
        let ctx = Context::new(&root, db.admin_dir(), "linux-amd64".parse().unwrap()).unwrap();

        (dir, ctx, db)
    }

    fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        set_executable(&path).unwrap();
        path
    }

    #[test]
    fn register_list_remove() -> Result<()> {
        let (dir, ctx, db) = fixture();
        let hooks = HookManager::new(&ctx, &db);

        let script = write_script(dir.path(), "audit_report", "exit 0");
        hooks.add_hooks(&[script])?;

        assert_eq!(hooks.list_hooks()?, vec!["audit_report".to_string()]);

        assert!(hooks.remove_hook("audit_report")?);
        assert!(!hooks.remove_hook("audit_report")?);
        assert!(hooks.remove_hook("../escape").is_err());
        assert!(hooks.list_hooks()?.is_empty());

        Ok(())
    }

    #[test]
    fn action_hooks_receive_arguments() -> Result<()> {
        let (dir, ctx, db) = fixture();
        let hooks = HookManager::new(&ctx, &db);

        let out = dir.path().join("out.txt");
        let script = write_script(
            dir.path(),
            "trace_log",
            &format!("echo \"$1 $2 $3\" >> {}", out.display()),
        );
        hooks.add_hooks(&[script])?;

        let failures = hooks.run_action_hooks("install", "t1", "1.0")?;
        assert_eq!(failures, 0);
        assert_eq!(fs::read_to_string(&out)?.trim(), "install t1 1.0");

        Ok(())
    }

    #[test]
    fn failing_validate_hook_aborts() -> Result<()> {
        let (dir, ctx, db) = fixture();
        let hooks = HookManager::new(&ctx, &db);

        let script = write_script(dir.path(), "gate_validate", "exit 3");
        hooks.add_hooks(&[script])?;

        match hooks.run_validate_hooks("t1", "1.0") {
            Err(WpkgError::HookFailed { hook, status }) => {
                assert_eq!(hook, "gate_validate");
                assert_eq!(status, 3);
            }
            other => panic!("expected HookFailed, got {:?}", other.err()),
        }

        Ok(())
    }

    #[test]
    fn failing_action_hook_does_not_abort() -> Result<()> {
        let (dir, ctx, db) = fixture();
        let hooks = HookManager::new(&ctx, &db);

        let script = write_script(dir.path(), "broken_notify", "exit 1");
        hooks.add_hooks(&[script])?;

        let failures = hooks.run_action_hooks("remove", "t1", "1.0")?;
        assert_eq!(failures, 1);

        Ok(())
    }

    #[test]
    fn package_hooks_removed_on_purge() -> Result<()> {
        let (_dir, ctx, db) = fixture();
        let hooks = HookManager::new(&ctx, &db);

        hooks.install_package_hook("t1_notify", b"#!/bin/sh\nexit 0\n")?;
        hooks.install_package_hook("t2_notify", b"#!/bin/sh\nexit 0\n")?;

        hooks.remove_package_hooks("t1")?;

        assert_eq!(hooks.list_hooks()?, vec!["t2_notify".to_string()]);

        Ok(())
    }
}
