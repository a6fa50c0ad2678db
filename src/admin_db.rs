// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Administrative database.

Persistent per-package installation state lives under the admin
directory:

- `status` — concatenated stanzas, one per known package;
- `info/<name>.<ext>` — per-package control, md5sums, list, conffiles,
  and maintainer scripts;
- `updates/` — phase markers for in-progress transactions;
- `hooks/` — registered global hook scripts;
- `lock` — the transaction lock.

Every file write goes through a write-rename discipline: the content is
written to `<path>.wpkg-new`, fsynced, then renamed over the final
path. The status file is rewritten in full after each phase, so readers
observe either the pre- or post-state, never a torn file.
*/

use {
    crate::{
        architecture::Architecture,
        binary_control::BinaryControl,
        control::{ControlFile, ControlParagraph, ControlParagraphReader},
        error::{Result, WpkgError},
        package_version::PackageVersion,
    },
    std::{
        collections::BTreeMap,
        fmt::{Display, Formatter},
        fs,
        io::Write,
        path::{Path, PathBuf},
        str::FromStr,
    },
};

/// Current installation state of a package.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PackageState {
    NotInstalled,
    ConfigFiles,
    HalfInstalled,
    Unpacked,
    HalfConfigured,
    TriggersAwaited,
    TriggersPending,
    Installed,
}

impl Display for PackageState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::NotInstalled => "not-installed",
            Self::ConfigFiles => "config-files",
            Self::HalfInstalled => "half-installed",
            Self::Unpacked => "unpacked",
            Self::HalfConfigured => "half-configured",
            Self::TriggersAwaited => "triggers-awaited",
            Self::TriggersPending => "triggers-pending",
            Self::Installed => "installed",
        };

        write!(f, "{}", s)
    }
}

impl FromStr for PackageState {
    type Err = WpkgError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "not-installed" => Ok(Self::NotInstalled),
            "config-files" => Ok(Self::ConfigFiles),
            "half-installed" => Ok(Self::HalfInstalled),
            "unpacked" => Ok(Self::Unpacked),
            "half-configured" => Ok(Self::HalfConfigured),
            "triggers-awaited" => Ok(Self::TriggersAwaited),
            "triggers-pending" => Ok(Self::TriggersPending),
            "installed" => Ok(Self::Installed),
            other => Err(WpkgError::StatusParse(format!(
                "unknown package state: {}",
                other
            ))),
        }
    }
}

impl PackageState {
    /// Whether package files are expected on disk in this state.
    pub fn has_files(&self) -> bool {
        !matches!(self, Self::NotInstalled | Self::ConfigFiles)
    }
}

/// User-level intent for a package, orthogonal to its state.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Selection {
    Install,
    Hold,
    Deinstall,
    Purge,
}

impl Display for Selection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Install => "install",
            Self::Hold => "hold",
            Self::Deinstall => "deinstall",
            Self::Purge => "purge",
        };

        write!(f, "{}", s)
    }
}

impl FromStr for Selection {
    type Err = WpkgError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "install" => Ok(Self::Install),
            "hold" => Ok(Self::Hold),
            "deinstall" => Ok(Self::Deinstall),
            "purge" => Ok(Self::Purge),
            other => Err(WpkgError::StatusParse(format!(
                "unknown selection: {}",
                other
            ))),
        }
    }
}

/// The kind of a recorded filesystem entry.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FileKind {
    File,
    Directory,
    Symlink,
}

impl Display for FileKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::File => "file",
            Self::Directory => "dir",
            Self::Symlink => "link",
        };

        write!(f, "{}", s)
    }
}

impl FromStr for FileKind {
    type Err = WpkgError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "file" => Ok(Self::File),
            "dir" => Ok(Self::Directory),
            "link" => Ok(Self::Symlink),
            other => Err(WpkgError::StatusParse(format!(
                "unknown file kind: {}",
                other
            ))),
        }
    }
}

/// One entry of a package's recorded file list.
///
/// Serialized as tab-separated `kind mode uid gid path [target]` so
/// paths containing spaces survive the round trip.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct FileListEntry {
    pub kind: FileKind,
    pub mode: u32,
    pub uid: u64,
    pub gid: u64,
    /// Path relative to the target root.
    pub path: String,
    /// Link target for symlink entries.
    pub target: Option<String>,
}

impl Display for FileListEntry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}\t{:o}\t{}\t{}\t{}",
            self.kind, self.mode, self.uid, self.gid, self.path
        )?;

        if let Some(target) = &self.target {
            write!(f, "\t{}", target)?;
        }

        Ok(())
    }
}

impl FromStr for FileListEntry {
    type Err = WpkgError;

    fn from_str(s: &str) -> Result<Self> {
        let mut parts = s.split('\t');

        let mut next = || {
            parts
                .next()
                .ok_or_else(|| WpkgError::StatusParse(format!("short file list line: {}", s)))
        };

        let kind = next()?.parse::<FileKind>()?;
        let mode = u32::from_str_radix(next()?, 8)
            .map_err(|_| WpkgError::StatusParse(format!("bad mode in file list line: {}", s)))?;
        let uid = next()?
            .parse::<u64>()
            .map_err(|_| WpkgError::StatusParse(format!("bad uid in file list line: {}", s)))?;
        let gid = next()?
            .parse::<u64>()
            .map_err(|_| WpkgError::StatusParse(format!("bad gid in file list line: {}", s)))?;
        let path = next()?.to_string();
        let target = parts.next().map(str::to_string);

        Ok(Self {
            kind,
            mode,
            uid,
            gid,
            path,
            target,
        })
    }
}

/// The persisted record of one known package.
#[derive(Clone, Debug)]
pub struct StatusRecord {
    pub name: String,
    pub version: PackageVersion,
    pub architecture: Architecture,
    pub state: PackageState,
    pub selection: Selection,
    /// Whether the package entered the system only as a dependency.
    pub auto_installed: bool,
    /// The package's control stanza, verbatim.
    pub control: ControlParagraph<'static>,
}

impl StatusRecord {
    /// Construct a record from a control stanza and initial state.
    pub fn new(
        control: &BinaryControl<'static>,
        state: PackageState,
        selection: Selection,
    ) -> Result<Self> {
        Ok(Self {
            name: control.package()?.to_string(),
            version: control.version()?,
            architecture: control.architecture()?,
            state,
            selection,
            auto_installed: false,
            control: control.clone().into(),
        })
    }

    /// Render the record as a status-file stanza.
    fn to_paragraph(&self) -> ControlParagraph<'static> {
        let mut para = self.control.clone();

        // Status metadata wins over whatever the control stanza held.
        para.set_field_from_string("Package".into(), self.name.clone().into());
        para.set_field_from_string(
            "Status".into(),
            format!("{} ok {}", self.selection, self.state).into(),
        );
        para.set_field_from_string("Version".into(), self.version.to_string().into());
        para.set_field_from_string(
            "Architecture".into(),
            self.architecture.to_string().into(),
        );

        if self.auto_installed {
            para.set_field_from_string("Auto-Installed".into(), "yes".into());
        } else {
            para.remove_field("Auto-Installed");
        }

        para
    }

    /// Reconstruct a record from a status-file stanza.
    fn from_paragraph(para: ControlParagraph<'static>) -> Result<Self> {
        let name = para
            .field_str("Package")
            .ok_or_else(|| WpkgError::StatusParse("stanza lacks Package".into()))?
            .to_string();

        let status = para
            .field_str("Status")
            .ok_or_else(|| WpkgError::StatusParse(format!("{}: stanza lacks Status", name)))?;

        let mut words = status.split_ascii_whitespace();
        let (selection, ok, state) = match (words.next(), words.next(), words.next(), words.next())
        {
            (Some(selection), Some(ok), Some(state), None) => (selection, ok, state),
            _ => {
                return Err(WpkgError::StatusParse(format!(
                    "{}: malformed Status: {}",
                    name, status
                )))
            }
        };

        if ok != "ok" {
            return Err(WpkgError::StatusParse(format!(
                "{}: malformed Status: {}",
                name, status
            )));
        }

        let selection = selection.parse::<Selection>()?;
        let state = state.parse::<PackageState>()?;

        let version = PackageVersion::parse(
            para.field_str("Version")
                .ok_or_else(|| WpkgError::StatusParse(format!("{}: stanza lacks Version", name)))?,
        )?;

        let architecture = para
            .field_str("Architecture")
            .ok_or_else(|| {
                WpkgError::StatusParse(format!("{}: stanza lacks Architecture", name))
            })?
            .parse::<Architecture>()?;

        let auto_installed = para.field_bool("Auto-Installed").unwrap_or(false);

        Ok(Self {
            name,
            version,
            architecture,
            state,
            selection,
            auto_installed,
            control: para,
        })
    }
}

/// Write a file atomically: `<path>.wpkg-new`, fsync, rename.
pub fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let tmp_path = {
        let mut name = path.as_os_str().to_os_string();
        name.push(".wpkg-new");
        PathBuf::from(name)
    };

    let mut file = fs::File::create(&tmp_path)?;
    file.write_all(content)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp_path, path)?;

    Ok(())
}

/// Info-file extensions managed per package.
pub const INFO_EXTENSIONS: &[&str] = &[
    "control",
    "md5sums",
    "list",
    "conffiles",
    "preinst",
    "postinst",
    "prerm",
    "postrm",
    "validate",
];

/// Handle to the administrative database.
#[derive(Clone, Debug)]
pub struct AdminDb {
    admin_dir: PathBuf,
}

impl AdminDb {
    /// Initialize a fresh admin directory layout (`create-admindir`).
    pub fn create(admin_dir: impl AsRef<Path>) -> Result<Self> {
        let admin_dir = admin_dir.as_ref();

        fs::create_dir_all(admin_dir.join("info"))?;
        fs::create_dir_all(admin_dir.join("updates"))?;
        fs::create_dir_all(admin_dir.join("hooks"))?;

        let status = admin_dir.join("status");
        if !status.exists() {
            write_atomic(&status, b"")?;
        }

        log::info!("initialized admin directory at {}", admin_dir.display());

        Self::open(admin_dir)
    }

    /// Open an existing admin directory.
    pub fn open(admin_dir: impl AsRef<Path>) -> Result<Self> {
        let admin_dir = admin_dir.as_ref();

        if !admin_dir.join("status").is_file() || !admin_dir.join("info").is_dir() {
            return Err(WpkgError::AdminDirMissing(admin_dir.to_path_buf()));
        }

        Ok(Self {
            admin_dir: admin_dir.to_path_buf(),
        })
    }

    /// The admin directory path.
    pub fn admin_dir(&self) -> &Path {
        &self.admin_dir
    }

    /// The hooks directory path.
    pub fn hooks_dir(&self) -> PathBuf {
        self.admin_dir.join("hooks")
    }

    /// The updates (phase journal) directory path.
    pub fn updates_dir(&self) -> PathBuf {
        self.admin_dir.join("updates")
    }

    /// Staging directory for a unit in flight.
    pub fn staging_dir(&self, seq: u64) -> PathBuf {
        self.admin_dir.join(format!("staging/{}", seq))
    }

    /// Load all status records, keyed by package name.
    ///
    /// Invariant I1 is enforced at read time: a duplicate record for one
    /// (name, architecture) pair is a state error.
    pub fn load_status(&self) -> Result<BTreeMap<String, StatusRecord>> {
        let file = fs::File::open(self.admin_dir.join("status"))?;
        let reader = std::io::BufReader::new(file);

        let mut records = BTreeMap::new();

        for para in ControlParagraphReader::new(reader) {
            let record = StatusRecord::from_paragraph(para?)?;

            if record.state == PackageState::NotInstalled {
                continue;
            }

            let key = record.name.clone();
            if records.insert(key, record).is_some() {
                return Err(WpkgError::StateInconsistent(format!(
                    "duplicate status record in {}",
                    self.admin_dir.join("status").display()
                )));
            }
        }

        Ok(records)
    }

    /// Rewrite the status file in full from the given records.
    ///
    /// Records in state not-installed are dropped; that is how a purge
    /// erases a package from the database.
    pub fn write_status(&self, records: &BTreeMap<String, StatusRecord>) -> Result<()> {
        let mut control = ControlFile::default();

        for record in records.values() {
            if record.state == PackageState::NotInstalled {
                continue;
            }

            control.add_paragraph(record.to_paragraph());
        }

        let mut buffer = vec![];
        control.write(&mut buffer)?;

        write_atomic(&self.admin_dir.join("status"), &buffer)
    }

    /// Update (or insert) one record and persist the status file.
    pub fn upsert_record(&self, record: StatusRecord) -> Result<()> {
        let mut records = self.load_status()?;
        records.insert(record.name.clone(), record);
        self.write_status(&records)
    }

    /// Change a package's selection (`set-selection`).
    ///
    /// Selection is user intent, orthogonal to the package's state; it
    /// survives upgrades and is consulted by the planner (hold) and by
    /// cleanup passes (deinstall, purge).
    pub fn set_selection(&self, package: &str, selection: Selection) -> Result<()> {
        let mut records = self.load_status()?;

        let record = records.get_mut(package).ok_or_else(|| {
            WpkgError::StateInconsistent(format!("{} has no database record", package))
        })?;

        record.selection = selection;
        self.write_status(&records)
    }

    /// Path of a per-package info file.
    pub fn info_path(&self, package: &str, extension: &str) -> PathBuf {
        self.admin_dir
            .join("info")
            .join(format!("{}.{}", package, extension))
    }

    /// Write a per-package info file through the rename discipline.
    pub fn write_info_file(&self, package: &str, extension: &str, content: &[u8]) -> Result<()> {
        write_atomic(&self.info_path(package, extension), content)
    }

    /// Read a per-package info file, `None` when absent.
    pub fn read_info_file(&self, package: &str, extension: &str) -> Result<Option<Vec<u8>>> {
        match fs::read(self.info_path(package, extension)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete every info file of a package (purge).
    pub fn remove_info_files(&self, package: &str) -> Result<()> {
        for extension in INFO_EXTENSIONS {
            let path = self.info_path(package, extension);

            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        // Script flavors carry a .bat suffix on top of the extension.
        for script in ["preinst", "postinst", "prerm", "postrm", "validate"] {
            let path = self.info_path(package, &format!("{}.bat", script));

            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        Ok(())
    }

    /// Persist a package's file list.
    pub fn write_file_list(&self, package: &str, entries: &[FileListEntry]) -> Result<()> {
        let mut doc = entries
            .iter()
            .map(|e| e.to_string())
            .collect::<Vec<_>>()
            .join("\n");

        if !doc.is_empty() {
            doc.push('\n');
        }

        self.write_info_file(package, "list", doc.as_bytes())
    }

    /// Load a package's file list, empty when absent.
    pub fn read_file_list(&self, package: &str) -> Result<Vec<FileListEntry>> {
        match self.read_info_file(package, "list")? {
            Some(data) => String::from_utf8_lossy(&data)
                .lines()
                .filter(|l| !l.trim().is_empty())
                .map(|l| l.parse::<FileListEntry>())
                .collect(),
            None => Ok(vec![]),
        }
    }

    /// Persist a package's conffile digest table.
    ///
    /// Lines are `<md5hex>  <path>` where the digest is that of the
    /// *packaged* version of the conffile.
    pub fn write_conffile_digests(
        &self,
        package: &str,
        digests: &BTreeMap<String, String>,
    ) -> Result<()> {
        let mut doc = String::new();

        for (path, digest) in digests {
            doc.push_str(&format!("{}  {}\n", digest, path));
        }

        self.write_info_file(package, "conffiles", doc.as_bytes())
    }

    /// Load a package's conffile digest table, empty when absent.
    pub fn read_conffile_digests(&self, package: &str) -> Result<BTreeMap<String, String>> {
        let mut digests = BTreeMap::new();

        if let Some(data) = self.read_info_file(package, "conffiles")? {
            for line in String::from_utf8_lossy(&data).lines() {
                let line = line.trim();

                if line.is_empty() {
                    continue;
                }

                let (digest, path) = line.split_once("  ").ok_or_else(|| {
                    WpkgError::StatusParse(format!("{}: malformed conffiles line: {}", package, line))
                })?;

                digests.insert(path.to_string(), digest.to_string());
            }
        }

        Ok(digests)
    }

    /// Record a phase marker for a unit in flight.
    ///
    /// The marker file is `updates/<seq>.<phase>` and contains the
    /// package name; its presence lets the next invocation resume or
    /// undo after a crash.
    pub fn record_phase(&self, seq: u64, phase: &str, package: &str) -> Result<()> {
        write_atomic(
            &self.updates_dir().join(format!("{:08}.{}", seq, phase)),
            format!("{}\n", package).as_bytes(),
        )
    }

    /// Remove every phase marker for a unit (clean commit).
    pub fn clear_phases(&self, seq: u64) -> Result<()> {
        let prefix = format!("{:08}.", seq);

        for entry in fs::read_dir(self.updates_dir())? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();

            if name.starts_with(&prefix) {
                fs::remove_file(entry.path())?;
            }
        }

        Ok(())
    }

    /// Enumerate pending phase markers as (seq, phase, package) tuples.
    pub fn pending_phases(&self) -> Result<Vec<(u64, String, String)>> {
        let mut pending = vec![];

        for entry in fs::read_dir(self.updates_dir())? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();

            if let Some((seq, phase)) = name.split_once('.') {
                if let Ok(seq) = seq.parse::<u64>() {
                    let package = fs::read_to_string(entry.path())?.trim().to_string();
                    pending.push((seq, phase.to_string(), package));
                }
            }
        }

        pending.sort();

        Ok(pending)
    }

    /// Next unused unit sequence number.
    pub fn next_seq(&self) -> Result<u64> {
        Ok(self
            .pending_phases()?
            .iter()
            .map(|(seq, _, _)| *seq)
            .max()
            .map(|max| max + 1)
            .unwrap_or(1))
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::control::ControlFile,
        tempfile::TempDir,
    };

    fn control(package: &str, version: &str) -> BinaryControl<'static> {
        let text = format!(
            "Package: {}\nVersion: {}\nArchitecture: linux-amd64\nMaintainer: m\nDescription: d\n",
            package, version
        );

        ControlFile::parse_str(&text)
            .unwrap()
            .into_paragraphs()
            .next()
            .unwrap()
            .into()
    }

    #[test]
    fn create_layout() -> Result<()> {
        let dir = TempDir::new()?;
        let db = AdminDb::create(dir.path())?;

        assert!(db.admin_dir().join("status").is_file());
        assert!(db.admin_dir().join("info").is_dir());
        assert!(db.updates_dir().is_dir());
        assert!(db.hooks_dir().is_dir());

        assert!(AdminDb::open(dir.path()).is_ok());
        assert!(AdminDb::open(dir.path().join("missing")).is_err());

        Ok(())
    }

    #[test]
    fn status_round_trip() -> Result<()> {
        let dir = TempDir::new()?;
        let db = AdminDb::create(dir.path())?;

        let mut record =
            StatusRecord::new(&control("t1", "1.0"), PackageState::Installed, Selection::Install)?;
        record.auto_installed = true;
        db.upsert_record(record)?;

        let record =
            StatusRecord::new(&control("held", "2.0"), PackageState::Unpacked, Selection::Hold)?;
        db.upsert_record(record)?;

        let records = db.load_status()?;
        assert_eq!(records.len(), 2);

        let t1 = records.get("t1").unwrap();
        assert_eq!(t1.state, PackageState::Installed);
        assert_eq!(t1.selection, Selection::Install);
        assert!(t1.auto_installed);
        assert_eq!(t1.version, PackageVersion::parse("1.0")?);
        assert_eq!(t1.control.field_str("Maintainer"), Some("m"));

        let held = records.get("held").unwrap();
        assert_eq!(held.selection, Selection::Hold);
        assert_eq!(held.state, PackageState::Unpacked);
        assert!(!held.auto_installed);

        // Raw file shape.
        let raw = fs::read_to_string(db.admin_dir().join("status"))?;
        assert!(raw.contains("Status: install ok installed\n"));
        assert!(raw.contains("Status: hold ok unpacked\n"));

        Ok(())
    }

    #[test]
    fn set_selection_updates_record() -> Result<()> {
        let dir = TempDir::new()?;
        let db = AdminDb::create(dir.path())?;

        let record =
            StatusRecord::new(&control("t1", "1.0"), PackageState::Installed, Selection::Install)?;
        db.upsert_record(record)?;

        db.set_selection("t1", Selection::Hold)?;
        assert_eq!(
            db.load_status()?.get("t1").unwrap().selection,
            Selection::Hold
        );

        assert!(db.set_selection("unknown", Selection::Hold).is_err());

        Ok(())
    }

    #[test]
    fn not_installed_records_dropped() -> Result<()> {
        let dir = TempDir::new()?;
        let db = AdminDb::create(dir.path())?;

        let mut record =
            StatusRecord::new(&control("gone", "1.0"), PackageState::Installed, Selection::Purge)?;
        db.upsert_record(record.clone())?;
        assert_eq!(db.load_status()?.len(), 1);

        record.state = PackageState::NotInstalled;
        db.upsert_record(record)?;
        assert_eq!(db.load_status()?.len(), 0);

        Ok(())
    }

    #[test]
    fn file_list_round_trip() -> Result<()> {
        let dir = TempDir::new()?;
        let db = AdminDb::create(dir.path())?;

        let entries = vec![
            FileListEntry {
                kind: FileKind::Directory,
                mode: 0o755,
                uid: 0,
                gid: 0,
                path: "usr/bin".into(),
                target: None,
            },
            FileListEntry {
                kind: FileKind::File,
                mode: 0o755,
                uid: 0,
                gid: 0,
                path: "usr/bin/t 1".into(),
                target: None,
            },
            FileListEntry {
                kind: FileKind::Symlink,
                mode: 0o777,
                uid: 0,
                gid: 0,
                path: "usr/bin/alias".into(),
                target: Some("t 1".into()),
            },
        ];

        db.write_file_list("t1", &entries)?;
        assert_eq!(db.read_file_list("t1")?, entries);

        assert!(db.read_file_list("unknown")?.is_empty());

        Ok(())
    }

    #[test]
    fn conffile_digest_round_trip() -> Result<()> {
        let dir = TempDir::new()?;
        let db = AdminDb::create(dir.path())?;

        let mut digests = BTreeMap::new();
        digests.insert(
            "etc/t1.conf".to_string(),
            "d41d8cd98f00b204e9800998ecf8427e".to_string(),
        );

        db.write_conffile_digests("t1", &digests)?;
        assert_eq!(db.read_conffile_digests("t1")?, digests);

        Ok(())
    }

    #[test]
    fn phase_journal() -> Result<()> {
        let dir = TempDir::new()?;
        let db = AdminDb::create(dir.path())?;

        assert_eq!(db.next_seq()?, 1);

        db.record_phase(1, "extract", "t1")?;
        db.record_phase(1, "unpacked", "t1")?;
        db.record_phase(2, "extract", "t2")?;

        let pending = db.pending_phases()?;
        assert_eq!(pending.len(), 3);
        assert_eq!(pending[0], (1, "extract".to_string(), "t1".to_string()));
        assert_eq!(db.next_seq()?, 3);

        db.clear_phases(1)?;
        let pending = db.pending_phases()?;
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].0, 2);

        Ok(())
    }

    #[test]
    fn write_atomic_leaves_no_temp() -> Result<()> {
        let dir = TempDir::new()?;
        let path = dir.path().join("status");

        write_atomic(&path, b"first")?;
        write_atomic(&path, b"second")?;

        assert_eq!(fs::read(&path)?, b"second");
        assert!(!dir.path().join("status.wpkg-new").exists());

        Ok(())
    }

    #[test]
    fn info_files_removed_on_purge() -> Result<()> {
        let dir = TempDir::new()?;
        let db = AdminDb::create(dir.path())?;

        db.write_info_file("t1", "control", b"Package: t1\n")?;
        db.write_info_file("t1", "postinst", b"#!/bin/sh\n")?;
        db.write_info_file("t1", "postinst.bat", b"@echo off\n")?;

        db.remove_info_files("t1")?;

        assert!(db.read_info_file("t1", "control")?.is_none());
        assert!(db.read_info_file("t1", "postinst")?.is_none());
        assert!(db.read_info_file("t1", "postinst.bat")?.is_none());

        Ok(())
    }
}
