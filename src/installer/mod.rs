// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Transactional executor.

Executes a [Plan] unit by unit. Each unit walks the phase protocol
(prerm, extract, preinst, file promotion, unpacked record, postinst,
installed record, hooks) and records a marker under `<admin>/updates/`
after every committed phase, so an interrupted transaction can be
resumed or undone on the next invocation.

On a unit failure the matching rollback script runs and the plan halts;
units that already committed are not rolled back. Cancellation is
observed only between units.
*/

use {
    crate::{
        admin_db::{AdminDb, FileKind, FileListEntry, PackageState, Selection, StatusRecord},
        archive::{strip_dot_slash, PackageArchive},
        context::Context,
        error::{Result, WpkgError},
        hooks::HookManager,
        lock::DatabaseLock,
        md5sums,
        planner::{Plan, PlanAction, PlanUnit},
        request::ExecutionSummary,
    },
    std::{
        collections::{BTreeMap, HashMap, HashSet},
        fs,
        path::{Path, PathBuf},
    },
};

pub mod conffile;
pub mod scripts;

pub use conffile::{decide as decide_conffile, ConffileAction, CONFFILE_SIBLINGS};
pub use scripts::ScriptRunner;

/// Environment marker set on the re-executed copy during self-upgrade.
pub const REEXEC_ENV: &str = "WPKG_REEXEC";

/// Phase names recorded in the updates journal, in protocol order.
const INSTALL_PHASES: &[&str] = &["prerm", "extract", "preinst", "unpacked", "installed"];

/// The transactional executor.
pub struct Executor<'a> {
    ctx: &'a Context,
    db: AdminDb,
}

impl<'a> Executor<'a> {
    pub fn new(ctx: &'a Context, db: AdminDb) -> Self {
        Self { ctx, db }
    }

    /// Execute a plan to completion or first failure.
    pub fn execute(&mut self, plan: &Plan) -> Result<ExecutionSummary> {
        // Self-upgrade is decided before the lock so the re-executed
        // copy can acquire it.
        if std::env::var_os(REEXEC_ENV).is_none() {
            if let Some(unit) = self.self_upgrade_unit(plan)? {
                log::info!(
                    "{} owns the running executor; re-executing from a temporary copy",
                    unit
                );
                self.self_upgrade_handoff()?;
            }
        }

        let _lock = DatabaseLock::acquire(self.ctx.admin_dir())?;

        self.recover()?;
        self.validate_phase(plan)?;

        let hooks = HookManager::new(self.ctx, &self.db);
        let mut summary = ExecutionSummary::default();
        let mut halted = false;

        for unit in &plan.units {
            if halted || self.ctx.is_cancelled() {
                summary.skipped.push(unit.package.clone());
                continue;
            }

            let result = match &unit.action {
                PlanAction::Install {
                    archive,
                    replaces,
                    auto_installed,
                    configure,
                } => self.install_unit(unit, archive, replaces.as_ref(), *auto_installed, *configure),
                PlanAction::Configure => self.configure_unit(&unit.package),
                PlanAction::Remove { purge } => self.remove_unit(&unit.package, *purge),
            };

            match result {
                Ok(()) => {
                    let action = match &unit.action {
                        PlanAction::Install { replaces: Some(_), .. } => "upgrade",
                        PlanAction::Install { .. } => "install",
                        PlanAction::Configure => "configure",
                        PlanAction::Remove { purge: true } => "purge",
                        PlanAction::Remove { purge: false } => "remove",
                    };

                    hooks.run_action_hooks(action, &unit.package, &unit.version.to_string())?;
                    summary.succeeded.push(unit.package.clone());
                }
                Err(e) => {
                    log::error!("{}: {}", unit.package, e);
                    summary.failed.push(unit.package.clone());
                    halted = true;
                }
            }
        }

        log::info!(
            "{} unit(s) succeeded, {} failed, {} skipped",
            summary.succeeded.len(),
            summary.failed.len(),
            summary.skipped.len()
        );

        Ok(summary)
    }

    /// Run every validate script and validate hook before any mutation.
    fn validate_phase(&self, plan: &Plan) -> Result<()> {
        let runner = ScriptRunner::new(self.ctx);

        for name in self.db.load_status()?.keys() {
            runner.run_installed(&self.db, name, "validate", &["validate"])?;
        }

        let hooks = HookManager::new(self.ctx, &self.db);

        for unit in &plan.units {
            hooks.run_validate_hooks(&unit.package, &unit.version.to_string())?;
        }

        Ok(())
    }

    /// Handle leftovers of an interrupted transaction.
    ///
    /// Units that never reached the unpacked record are undone by
    /// discarding their staging trees; units at or past unpacked keep
    /// their database record (the package shows as unpacked and can be
    /// configured).
    pub fn recover(&mut self) -> Result<()> {
        let mut by_seq: BTreeMap<u64, Vec<(String, String)>> = BTreeMap::new();

        for (seq, phase, package) in self.db.pending_phases()? {
            by_seq.entry(seq).or_default().push((phase, package));
        }

        for (seq, phases) in by_seq {
            let package = phases
                .first()
                .map(|(_, package)| package.clone())
                .unwrap_or_default();

            let reached_unpacked = phases.iter().any(|(phase, _)| {
                INSTALL_PHASES
                    .iter()
                    .position(|p| *p == phase.as_str())
                    .map_or(false, |pos| pos >= 3)
            });

            if reached_unpacked {
                log::warn!(
                    "{}: interrupted after unpack; left unpacked for configure",
                    package
                );
            } else {
                log::warn!("{}: interrupted before unpack; undoing", package);
            }

            let staging = self.db.staging_dir(seq);
            if staging.exists() {
                fs::remove_dir_all(&staging)?;
            }

            self.db.clear_phases(seq)?;
        }

        Ok(())
    }

    // ----- install ------------------------------------------------------

    fn install_unit(
        &mut self,
        unit: &PlanUnit,
        archive_path: &Path,
        replaces: Option<&crate::package_version::PackageVersion>,
        auto_installed: bool,
        configure: bool,
    ) -> Result<()> {
        let package = &unit.package;
        let new_version = unit.version.to_string();

        let archive = PackageArchive::open(archive_path)?;
        let control = archive.control()?;
        let control_files = archive.control_files()?;
        let conffile_paths = archive.conffiles()?;

        let runner = ScriptRunner::new(self.ctx);
        let records = self.db.load_status()?;
        let old_record = records.get(package);

        let old_version = replaces.map(|v| v.to_string());
        let old_configured = old_record
            .filter(|r| r.state == PackageState::Installed)
            .map(|r| r.version.to_string())
            .unwrap_or_default();

        let seq = self.db.next_seq()?;
        let staging = self.db.staging_dir(seq);
        let staging_data = staging.join("data");
        let staging_control = staging.join("control");
        fs::create_dir_all(&staging_data)?;
        fs::create_dir_all(&staging_control)?;

        let cleanup = |db: &AdminDb| {
            let _ = fs::remove_dir_all(db.staging_dir(seq));
            let _ = db.clear_phases(seq);
        };

        // a. The outgoing version gets a chance to veto the upgrade.
        if let Some(old_version) = &old_version {
            if let Err(e) = runner.run_installed(
                &self.db,
                package,
                "prerm",
                &["upgrade", new_version.as_str()],
            ) {
                let _ = runner.run_installed(
                    &self.db,
                    package,
                    "postinst",
                    &["abort-upgrade", old_version.as_str()],
                );
                cleanup(&self.db);
                return Err(e);
            }
        }
        self.db.record_phase(seq, "prerm", package)?;

        // b. Extract the data tree into staging.
        let entries = match self.extract_data(&archive, &staging_data) {
            Ok(entries) => entries,
            Err(e) => {
                cleanup(&self.db);
                return Err(e);
            }
        };
        self.db.record_phase(seq, "extract", package)?;

        // c. The incoming version's preinst runs from staging.
        for (name, data) in &control_files {
            fs::write(staging_control.join(name), data)?;
        }

        let preinst_args: Vec<&str> = match &old_version {
            Some(old) => vec!["upgrade", old.as_str()],
            None => vec!["install"],
        };

        if let Err(e) = runner.run_staged(&staging_control, package, "preinst", &preinst_args) {
            if let Some(old) = &old_version {
                let _ = runner.run_installed(
                    &self.db,
                    package,
                    "postinst",
                    &["abort-upgrade", old.as_str()],
                );
            }
            cleanup(&self.db);
            return Err(e);
        }
        self.db.record_phase(seq, "preinst", package)?;

        // d. Promote staged files into the target root.
        let mut record = StatusRecord::new(&control, PackageState::HalfInstalled, Selection::Install)?;
        record.auto_installed =
            auto_installed || old_record.map_or(false, |r| r.auto_installed);
        let old_selection = old_record.map(|r| r.selection);
        if let Some(Selection::Hold) = old_selection {
            record.selection = Selection::Hold;
        }
        self.db.upsert_record(record.clone())?;

        let old_files = self.db.read_file_list(package)?;
        let old_conffile_digests = self.db.read_conffile_digests(package)?;
        let old_paths: HashSet<String> =
            old_files.iter().map(|e| e.path.clone()).collect();

        let promotion = self.promote_files(
            package,
            &staging_data,
            &entries,
            &conffile_paths,
            &old_conffile_digests,
            &old_paths,
            &records,
        );

        let new_conffile_digests = match promotion {
            Ok(digests) => digests,
            Err(e) => {
                cleanup(&self.db);
                return Err(e);
            }
        };

        // Database reflects the unpacked tree: info files, scripts,
        // hooks, file list, conffile digests.
        if let Some(data) = control_files.get("control") {
            self.db.write_info_file(package, "control", data)?;
        }
        if let Some(data) = control_files.get("md5sums") {
            self.db.write_info_file(package, "md5sums", data)?;
        }

        for script in crate::archive::MAINTAINER_SCRIPTS {
            for name in [script.to_string(), format!("{}.bat", script)] {
                if let Some(data) = control_files.get(&name) {
                    self.db.write_info_file(package, &name, data)?;
                }
            }
        }

        let hooks = HookManager::new(self.ctx, &self.db);
        let hook_prefix = format!("{}_", package);
        for (name, data) in &control_files {
            if name.starts_with(&hook_prefix) {
                hooks.install_package_hook(name, data)?;
            }
        }

        self.db.write_file_list(package, &entries)?;
        self.db
            .write_conffile_digests(package, &new_conffile_digests)?;

        record.state = PackageState::Unpacked;
        self.db.upsert_record(record.clone())?;
        self.db.record_phase(seq, "unpacked", package)?;

        // Obsolete files of the outgoing version disappear once the new
        // tree is in place.
        self.remove_obsolete(&old_files, &entries, &conffile_paths)?;

        // e. Configure.
        if configure {
            record.state = PackageState::HalfConfigured;
            self.db.upsert_record(record.clone())?;

            if let Err(e) = runner.run_installed(
                &self.db,
                package,
                "postinst",
                &["configure", old_configured.as_str()],
            ) {
                cleanup(&self.db);
                return Err(e);
            }

            record.state = PackageState::Installed;
            self.db.upsert_record(record)?;
        }

        self.db.record_phase(seq, "installed", package)?;
        cleanup(&self.db);

        log::info!("{} {} {}", if old_version.is_some() { "upgraded" } else { "installed" }, package, new_version);

        Ok(())
    }

    /// Extract the archive's data tree into the staging directory,
    /// recording one file-list entry per member.
    fn extract_data(
        &self,
        archive: &PackageArchive,
        staging_data: &Path,
    ) -> Result<Vec<FileListEntry>> {
        let mut data = archive.stream_data()?;
        let mut entries = vec![];

        for entry in data.entries()? {
            let mut entry = entry?;
            let rel = strip_dot_slash(&entry.path()?.to_string_lossy()).to_string();

            if rel.is_empty() {
                continue;
            }

            safe_relative_path(&rel)?;

            let header = entry.header();
            let kind = match header.entry_type() {
                tar::EntryType::Directory => FileKind::Directory,
                tar::EntryType::Symlink | tar::EntryType::Link => FileKind::Symlink,
                tar::EntryType::Regular | tar::EntryType::GNUSparse => FileKind::File,
                other => {
                    log::warn!("{}: skipping unsupported entry type {:?}", rel, other);
                    continue;
                }
            };

            let list_entry = FileListEntry {
                kind,
                mode: header.mode()? & 0o7777,
                uid: header.uid()?,
                gid: header.gid()?,
                path: rel.clone(),
                target: entry
                    .link_name()?
                    .map(|t| t.to_string_lossy().to_string()),
            };

            // unpack_in refuses paths escaping the staging directory.
            if !entry.unpack_in(staging_data)? {
                return Err(WpkgError::PathEscapesRoot(PathBuf::from(rel)));
            }

            entries.push(list_entry);
        }

        Ok(entries)
    }

    /// Move staged files into the target root, applying the conffile
    /// protocol, and return the new conffile digest table.
    fn promote_files(
        &self,
        package: &str,
        staging_data: &Path,
        entries: &[FileListEntry],
        conffile_paths: &[String],
        old_conffile_digests: &BTreeMap<String, String>,
        old_paths: &HashSet<String>,
        records: &BTreeMap<String, StatusRecord>,
    ) -> Result<BTreeMap<String, String>> {
        let owners = self.ownership_map(records, package)?;
        let canonical_root = self.ctx.root().canonicalize()?;
        let mut new_digests = BTreeMap::new();

        for entry in entries {
            let staged = staging_data.join(&entry.path);
            let dest = self.ctx.root().join(&entry.path);

            match entry.kind {
                FileKind::Directory => {
                    fs::create_dir_all(&dest)?;
                    continue;
                }
                FileKind::Symlink | FileKind::File => {
                    if let Some(parent) = dest.parent() {
                        fs::create_dir_all(parent)?;
                    }
                    ensure_within_root(&canonical_root, &dest)?;
                }
            }

            if entry.kind == FileKind::Symlink {
                if dest.symlink_metadata().is_ok() {
                    fs::remove_file(&dest)?;
                }

                promote_symlink(&staged, &dest)?;
                continue;
            }

            if conffile_paths.contains(&entry.path) {
                let new_digest = md5sums::digest_file(&staged)?;

                let on_disk = if dest.is_file() {
                    Some(md5sums::digest_file(&dest)?)
                } else {
                    None
                };

                let action = decide_conffile(
                    on_disk.as_deref(),
                    old_conffile_digests.get(&entry.path).map(|s| s.as_str()),
                    &new_digest,
                );

                match action {
                    ConffileAction::Install => {
                        promote_file(&staged, &dest, entry.mode)?;
                    }
                    ConffileAction::NoChange | ConffileAction::Adopt => {
                        fs::remove_file(&staged)?;
                    }
                    ConffileAction::KeepUser => {
                        let parked = sibling_path(&dest, ".wpkg-new");
                        promote_file(&staged, &parked, entry.mode)?;
                        log::warn!(
                            "{}: keeping user version of {}; new version at {}",
                            package,
                            entry.path,
                            parked.display()
                        );
                    }
                }

                new_digests.insert(entry.path.clone(), new_digest);
            } else {
                // A pre-existing file is fine when we owned it in the
                // previous version; anything else is an overwrite of
                // another package's file or of a user file.
                if dest.symlink_metadata().is_ok() && !old_paths.contains(&entry.path) {
                    let owner = owners
                        .get(entry.path.as_str())
                        .map(|s| s.as_str())
                        .unwrap_or("no package");

                    if self.ctx.flags().overwrite {
                        log::warn!(
                            "{} overwrites {} (owned by {}, forced)",
                            package,
                            entry.path,
                            owner
                        );
                    } else {
                        return Err(WpkgError::StateInconsistent(format!(
                            "{} would overwrite {} (owned by {})",
                            package, entry.path, owner
                        )));
                    }
                }

                promote_file(&staged, &dest, entry.mode)?;
            }
        }

        Ok(new_digests)
    }

    /// Map of path to owning package, excluding one package.
    fn ownership_map(
        &self,
        records: &BTreeMap<String, StatusRecord>,
        exclude: &str,
    ) -> Result<HashMap<String, String>> {
        let mut owners = HashMap::new();

        for name in records.keys() {
            if name == exclude {
                continue;
            }

            for entry in self.db.read_file_list(name)? {
                if entry.kind != FileKind::Directory {
                    owners.insert(entry.path, name.clone());
                }
            }
        }

        Ok(owners)
    }

    /// Delete files the outgoing version owned and the incoming one
    /// does not, then prune empty parents.
    fn remove_obsolete(
        &self,
        old_files: &[FileListEntry],
        new_files: &[FileListEntry],
        new_conffiles: &[String],
    ) -> Result<()> {
        let kept: std::collections::HashSet<&str> =
            new_files.iter().map(|e| e.path.as_str()).collect();

        let mut obsolete = old_files
            .iter()
            .filter(|e| e.kind != FileKind::Directory)
            .filter(|e| !kept.contains(e.path.as_str()))
            .filter(|e| !new_conffiles.contains(&e.path))
            .collect::<Vec<_>>();

        // Deepest first so directories empty out.
        obsolete.sort_by(|a, b| b.path.cmp(&a.path));

        for entry in &obsolete {
            let path = self.ctx.root().join(&entry.path);

            match fs::remove_file(&path) {
                Ok(()) => log::debug!("removed obsolete {}", entry.path),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }

            if let Some(parent) = path.parent() {
                // Only empties go; failure means the directory is
                // shared.
                let _ = fs::remove_dir(parent);
            }
        }

        Ok(())
    }

    // ----- configure ----------------------------------------------------

    fn configure_unit(&mut self, package: &str) -> Result<()> {
        let mut records = self.db.load_status()?;

        let record = records.get_mut(package).ok_or_else(|| {
            WpkgError::StateInconsistent(format!("{} has no database record", package))
        })?;

        let runner = ScriptRunner::new(self.ctx);

        record.state = PackageState::HalfConfigured;
        self.db.upsert_record(record.clone())?;

        runner.run_installed(&self.db, package, "postinst", &["configure", ""])?;

        record.state = PackageState::Installed;
        self.db.upsert_record(record.clone())?;

        log::info!("configured {}", package);

        Ok(())
    }

    // ----- remove / purge -----------------------------------------------

    fn remove_unit(&mut self, package: &str, purge: bool) -> Result<()> {
        let mut records = self.db.load_status()?;

        let mut record = records.remove(package).ok_or_else(|| {
            WpkgError::StateInconsistent(format!("{} has no database record", package))
        })?;

        let runner = ScriptRunner::new(self.ctx);
        let seq = self.db.next_seq()?;

        let had_files = record.state.has_files();

        if had_files {
            // a. prerm remove; on failure the package stays installed.
            if let Err(e) = runner.run_installed(&self.db, package, "prerm", &["remove"]) {
                let _ = runner.run_installed(&self.db, package, "postinst", &["abort-remove"]);
                return Err(e);
            }
            self.db.record_phase(seq, "remove", package)?;

            record.state = PackageState::HalfConfigured;
            self.db.upsert_record(record.clone())?;

            // b. Delete owned files, conffiles excepted.
            let conffiles = self.db.read_conffile_digests(package)?;
            let files = self.db.read_file_list(package)?;

            let canonical_root = self.ctx.root().canonicalize()?;

            let mut removable = files
                .iter()
                .filter(|e| e.kind != FileKind::Directory)
                .filter(|e| !conffiles.contains_key(&e.path))
                .collect::<Vec<_>>();
            removable.sort_by(|a, b| b.path.cmp(&a.path));

            for entry in &removable {
                let path = self.ctx.root().join(&entry.path);

                // A conffile the user already deleted, or a file whose
                // parent is gone, is simply absent.
                if path.symlink_metadata().is_err() {
                    log::debug!("{}: {} already absent", package, entry.path);
                    continue;
                }

                ensure_within_root(&canonical_root, &path)?;

                match fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }

                if let Some(parent) = path.parent() {
                    let _ = fs::remove_dir(parent);
                }
            }

            record.state = PackageState::HalfInstalled;
            self.db.upsert_record(record.clone())?;

            // c. postrm remove.
            runner.run_installed(&self.db, package, "postrm", &["remove"])?;

            record.state = PackageState::ConfigFiles;
            self.db.upsert_record(record.clone())?;
        }

        if purge {
            // d. Conffiles and their reserved siblings disappear.
            let conffiles = self.db.read_conffile_digests(package)?;

            for path in conffiles.keys() {
                let dest = self.ctx.root().join(path);

                for candidate in std::iter::once(dest.clone())
                    .chain(CONFFILE_SIBLINGS.iter().map(|ext| sibling_path(&dest, ext)))
                {
                    match fs::remove_file(&candidate) {
                        Ok(()) => {}
                        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                        Err(e) => return Err(e.into()),
                    }
                }

                if let Some(parent) = dest.parent() {
                    let _ = fs::remove_dir(parent);
                }
            }

            runner.run_installed(&self.db, package, "postrm", &["purge"])?;

            let hooks = HookManager::new(self.ctx, &self.db);
            hooks.remove_package_hooks(package)?;
            self.db.remove_info_files(package)?;

            record.state = PackageState::NotInstalled;
            self.db.upsert_record(record)?;
        }

        self.db.clear_phases(seq)?;

        log::info!("{} {}", if purge { "purged" } else { "removed" }, package);

        Ok(())
    }

    // ----- self-upgrade -------------------------------------------------

    /// Name of the install unit whose file list contains the running
    /// executor binary, if any.
    fn self_upgrade_unit(&self, plan: &Plan) -> Result<Option<String>> {
        let exe = match std::env::current_exe().and_then(|p| p.canonicalize()) {
            Ok(exe) => exe,
            // Without a resolvable self path there is nothing to guard.
            Err(_) => return Ok(None),
        };

        let canonical_root = match self.ctx.root().canonicalize() {
            Ok(root) => root,
            Err(_) => return Ok(None),
        };

        let rel = match exe.strip_prefix(&canonical_root) {
            Ok(rel) => rel.to_string_lossy().to_string(),
            Err(_) => return Ok(None),
        };

        for unit in &plan.units {
            if let PlanAction::Install { archive, .. } = &unit.action {
                if plan_archive_owns(archive, &rel)? {
                    return Ok(Some(unit.package.clone()));
                }
            }
        }

        Ok(None)
    }

    /// Copy the running binary to a temporary location and re-execute
    /// the invocation from there; the copy replaces us entirely.
    fn self_upgrade_handoff(&self) -> Result<()> {
        let exe = std::env::current_exe()?;
        let copy = std::env::temp_dir().join(format!("wpkg-reexec-{}", std::process::id()));

        fs::copy(&exe, &copy)?;
        scripts::set_executable(&copy)?;

        let status = std::process::Command::new(&copy)
            .args(std::env::args_os().skip(1))
            .env(REEXEC_ENV, "1")
            .status()?;

        let _ = fs::remove_file(&copy);

        std::process::exit(status.code().unwrap_or(1));
    }
}

/// Whether an archive's data tree contains the given relative path.
fn plan_archive_owns(archive_path: &Path, rel: &str) -> Result<bool> {
    let archive = PackageArchive::open(archive_path)?;
    let mut data = archive.stream_data()?;

    for entry in data.entries()? {
        let entry = entry?;
        let path = strip_dot_slash(&entry.path()?.to_string_lossy()).to_string();

        if path == rel {
            return Ok(true);
        }
    }

    Ok(false)
}

/// Reject archive paths that are absolute or traverse upward.
fn safe_relative_path(rel: &str) -> Result<()> {
    let path = Path::new(rel);

    let bad = path.is_absolute()
        || path.components().any(|c| {
            matches!(
                c,
                std::path::Component::ParentDir | std::path::Component::Prefix(_)
            )
        });

    if bad {
        Err(WpkgError::PathEscapesRoot(path.to_path_buf()))
    } else {
        Ok(())
    }
}

/// Re-check after symlink resolution that a destination stays inside
/// the target root.
fn ensure_within_root(canonical_root: &Path, dest: &Path) -> Result<()> {
    let parent = dest
        .parent()
        .ok_or_else(|| WpkgError::PathEscapesRoot(dest.to_path_buf()))?;

    let resolved = parent.canonicalize()?;

    if resolved.starts_with(canonical_root) {
        Ok(())
    } else {
        Err(WpkgError::PathEscapesRoot(dest.to_path_buf()))
    }
}

/// `<path>.ext` sibling of a path.
fn sibling_path(path: &Path, extension: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(extension);
    PathBuf::from(name)
}

/// Move a staged file into place, falling back to copy when the
/// staging area lives on another filesystem.
fn promote_file(staged: &Path, dest: &Path, mode: u32) -> Result<()> {
    if fs::rename(staged, dest).is_err() {
        fs::copy(staged, dest)?;
        fs::remove_file(staged)?;
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(dest, fs::Permissions::from_mode(mode))?;
    }

    #[cfg(not(unix))]
    let _ = mode;

    Ok(())
}

/// Recreate a staged symlink at the destination.
fn promote_symlink(staged: &Path, dest: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        let target = fs::read_link(staged)?;
        std::os::unix::fs::symlink(target, dest)?;
        let _ = fs::remove_file(staged);
    }

    #[cfg(not(unix))]
    {
        let _ = staged;
        log::warn!("symlink {} skipped on this platform", dest.display());
    }

    Ok(())
}
