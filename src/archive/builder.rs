// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Package archive creation. */

use {
    crate::{
        archive::{
            Compression, CONTROL_TAR_MEMBER, DATA_TAR_MEMBER, FORMAT_VERSION,
            FORMAT_VERSION_MEMBER, MAINTAINER_SCRIPTS,
        },
        binary_control::BinaryControl,
        error::{Result, WpkgError},
    },
    md5::{Digest, Md5},
    std::{
        collections::BTreeMap,
        io::{BufWriter, Read, Write},
        path::{Path, PathBuf},
        time::SystemTime,
    },
};

/// An entry in a tar tree under construction.
#[derive(Clone, Debug)]
enum TreeEntry {
    File { data: Vec<u8>, mode: u32 },
    Symlink { target: PathBuf },
}

/// An in-memory file tree destined for a tar stream.
///
/// Backed by a BTreeMap so iteration, and therefore archive layout, is
/// deterministic.
#[derive(Clone, Debug, Default)]
struct TreeManifest {
    entries: BTreeMap<PathBuf, TreeEntry>,
}

impl TreeManifest {
    fn add_file(&mut self, path: impl AsRef<Path>, data: Vec<u8>, mode: u32) {
        self.entries
            .insert(path.as_ref().to_path_buf(), TreeEntry::File { data, mode });
    }

    fn add_symlink(&mut self, path: impl AsRef<Path>, target: impl AsRef<Path>) {
        self.entries.insert(
            path.as_ref().to_path_buf(),
            TreeEntry::Symlink {
                target: target.as_ref().to_path_buf(),
            },
        );
    }

    /// All parent directories of tracked entries, shallowest first.
    fn relative_directories(&self) -> Vec<PathBuf> {
        let mut dirs = self
            .entries
            .keys()
            .flat_map(|path| path.ancestors().skip(1))
            .filter(|p| !p.as_os_str().is_empty())
            .map(|p| p.to_path_buf())
            .collect::<Vec<_>>();

        dirs.sort();
        dirs.dedup();
        dirs
    }
}

fn new_tar_header(mtime: u64) -> Result<tar::Header> {
    let mut header = tar::Header::new_gnu();
    header.set_uid(0);
    header.set_gid(0);
    header.set_username("root")?;
    header.set_groupname("root")?;
    header.set_mtime(mtime);

    Ok(header)
}

/// Set the name of a tar header to `./<path>`, emitting a GNU long-name
/// entry when the name does not fit the fixed 100-byte field.
fn set_header_path(
    builder: &mut tar::Builder<impl Write>,
    header: &mut tar::Header,
    path: &Path,
    is_directory: bool,
) -> Result<()> {
    // Archives in the wild carry names beginning with `./` and
    // directories ending with `/`. `header.set_path()` normalizes the
    // leading `./` away, so the name field is written directly.
    let value = format!(
        "./{}{}",
        path.display(),
        if is_directory { "/" } else { "" }
    );
    let value_bytes = value.as_bytes();

    let name_buffer = &mut header.as_old_mut().name;

    if value_bytes.len() <= name_buffer.len() {
        name_buffer[0..value_bytes.len()].copy_from_slice(value_bytes);
    } else {
        // Emit a ././@LongLink entry carrying the full name, then
        // truncate the name field.
        let mut long_header = tar::Header::new_gnu();
        let long_name = b"././@LongLink";
        long_header.as_gnu_mut().expect("gnu header").name[..long_name.len()]
            .copy_from_slice(long_name);
        long_header.set_mode(0o644);
        long_header.set_uid(0);
        long_header.set_gid(0);
        long_header.set_mtime(0);
        long_header.set_size(value_bytes.len() as u64 + 1);
        long_header.set_entry_type(tar::EntryType::new(b'L'));
        long_header.set_cksum();

        let mut data = value_bytes.chain(std::io::repeat(0).take(1));
        builder.append(&long_header, &mut data)?;

        let truncated = &value_bytes[0..name_buffer.len()];
        name_buffer.copy_from_slice(truncated);
    }

    Ok(())
}

/// Write a tar stream for a [TreeManifest], directories first.
fn write_tree_tar<W: Write>(writer: W, tree: &TreeManifest, mtime: u64) -> Result<()> {
    let mut builder = tar::Builder::new(writer);

    let mut header = new_tar_header(mtime)?;
    header.set_path(Path::new("./"))?;
    header.set_entry_type(tar::EntryType::Directory);
    header.set_mode(0o755);
    header.set_size(0);
    header.set_cksum();
    builder.append(&header, &*vec![])?;

    for directory in tree.relative_directories() {
        let mut header = new_tar_header(mtime)?;
        set_header_path(&mut builder, &mut header, &directory, true)?;
        header.set_entry_type(tar::EntryType::Directory);
        header.set_mode(0o755);
        header.set_size(0);
        header.set_cksum();
        builder.append(&header, &*vec![])?;
    }

    for (rel_path, entry) in &tree.entries {
        let mut header = new_tar_header(mtime)?;
        set_header_path(&mut builder, &mut header, rel_path, false)?;

        match entry {
            TreeEntry::File { data, mode } => {
                header.set_entry_type(tar::EntryType::Regular);
                header.set_mode(*mode);
                header.set_size(data.len() as u64);
                header.set_cksum();
                builder.append(&header, data.as_slice())?;
            }
            TreeEntry::Symlink { target } => {
                header.set_entry_type(tar::EntryType::Symlink);
                header.set_mode(0o777);
                header.set_size(0);
                header.set_link_name(target)?;
                header.set_cksum();
                builder.append(&header, &*vec![])?;
            }
        }
    }

    builder.finish()?;

    Ok(())
}

/// A builder for the `control.tar` member.
pub struct ControlTarBuilder<'a> {
    control: BinaryControl<'a>,
    /// Maintainer scripts, hook scripts, and other extra members.
    extra_files: TreeManifest,
    /// Conffile paths, one per line in the `conffiles` member.
    conffiles: Vec<String>,
    /// Accumulated `md5sums` lines for data files.
    md5sums: Vec<String>,
    mtime: u64,
}

impl<'a> ControlTarBuilder<'a> {
    /// Create a new instance from a binary control stanza.
    pub fn new(control: BinaryControl<'a>) -> Self {
        Self {
            control,
            extra_files: TreeManifest::default(),
            conffiles: vec![],
            md5sums: vec![],
            mtime: 0,
        }
    }

    /// Add a maintainer script.
    ///
    /// `name` must be one of the recognized script names, optionally
    /// carrying a `.bat` extension for the Windows flavor.
    pub fn add_maintainer_script(&mut self, name: &str, data: Vec<u8>) -> Result<()> {
        let base = name.strip_suffix(".bat").unwrap_or(name);

        if !MAINTAINER_SCRIPTS.contains(&base) {
            return Err(WpkgError::UnknownArchiveMember(name.to_string()));
        }

        self.extra_files.add_file(name, data, 0o755);

        Ok(())
    }

    /// Add a package hook script, stored as `<package>_<hook>`.
    pub fn add_hook_script(&mut self, hook: &str, data: Vec<u8>) -> Result<()> {
        let package = self.control.package()?.to_string();
        self.extra_files
            .add_file(format!("{}_{}", package, hook), data, 0o755);

        Ok(())
    }

    /// Record a conffile path for the `conffiles` member.
    pub fn add_conffile_path(&mut self, path: &str) {
        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{}", path)
        };

        self.conffiles.push(path);
    }

    /// Record the digest of a data file for the `md5sums` member.
    pub fn add_data_file_digest(&mut self, path: &Path, data: &[u8]) {
        let digest = Md5::digest(data);

        self.md5sums
            .push(format!("{}  {}\n", hex::encode(digest), path.display()));
    }

    pub fn set_mtime(&mut self, mtime: u64) {
        self.mtime = mtime;
    }

    /// Write the `control.tar` stream to a writer.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        self.control.validate()?;

        let mut control_buffer = BufWriter::new(Vec::new());
        self.control.write(&mut control_buffer)?;
        let control_data = control_buffer.into_inner().map_err(|e| e.into_error())?;

        let mut tree = self.extra_files.clone();
        tree.add_file("control", control_data, 0o644);
        tree.add_file("md5sums", self.md5sums.concat().into_bytes(), 0o644);

        if !self.conffiles.is_empty() {
            let mut doc = self.conffiles.join("\n");
            doc.push('\n');
            tree.add_file("conffiles", doc.into_bytes(), 0o644);
        }

        write_tree_tar(writer, &tree, self.mtime)
    }
}

/// A builder for a complete package archive.
pub struct PackageBuilder<'a> {
    control_builder: ControlTarBuilder<'a>,
    compression: Compression,
    data_files: TreeManifest,
    mtime: Option<SystemTime>,
}

impl<'a> PackageBuilder<'a> {
    /// Construct a new instance from a binary control stanza.
    ///
    /// The stanza is validated immediately; a missing mandatory field is
    /// fatal at package creation time.
    pub fn new(control: BinaryControl<'a>) -> Result<Self> {
        control.validate()?;

        Ok(Self {
            control_builder: ControlTarBuilder::new(control),
            compression: Compression::Gzip,
            data_files: TreeManifest::default(),
            mtime: None,
        })
    }

    /// Set the compression format applied to the tar members.
    pub fn set_compression(&mut self, compression: Compression) {
        self.compression = compression;
    }

    /// Clamp archive member timestamps for deterministic output.
    pub fn set_mtime(&mut self, time: Option<SystemTime>) {
        self.mtime = time;
        let mtime = self.mtime_seconds();
        self.control_builder.set_mtime(mtime);
    }

    fn mtime_seconds(&self) -> u64 {
        self.mtime
            .unwrap_or_else(SystemTime::now)
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0)
    }

    /// Register a file to be installed by this package.
    ///
    /// `path` is relative to the filesystem root, e.g. `usr/bin/t1`.
    /// The content lands in the data member and its checksum in the
    /// control member's `md5sums`.
    pub fn install_file(&mut self, path: impl AsRef<Path>, data: Vec<u8>, mode: u32) {
        self.control_builder
            .add_data_file_digest(path.as_ref(), &data);
        self.data_files.add_file(path, data, mode);
    }

    /// Register a configuration file.
    ///
    /// Same as [Self::install_file] but also listed in the `conffiles`
    /// control member so the installer applies the conffile protocol.
    pub fn install_conffile(&mut self, path: impl AsRef<Path>, data: Vec<u8>) {
        self.control_builder
            .add_conffile_path(&path.as_ref().to_string_lossy());
        self.install_file(path, data, 0o644);
    }

    /// Register a symbolic link. Links carry a target and no payload.
    pub fn install_symlink(&mut self, path: impl AsRef<Path>, target: impl AsRef<Path>) {
        self.data_files.add_symlink(path, target);
    }

    /// Add a maintainer script to the control member.
    pub fn add_maintainer_script(&mut self, name: &str, data: Vec<u8>) -> Result<()> {
        self.control_builder.add_maintainer_script(name, data)
    }

    /// Add a package hook script to the control member.
    pub fn add_hook_script(&mut self, hook: &str, data: Vec<u8>) -> Result<()> {
        self.control_builder.add_hook_script(hook, data)
    }

    /// Write the archive to a writer.
    ///
    /// Members are emitted in required order with size headers matching
    /// their payloads and the configured compression applied uniformly
    /// per tar member.
    pub fn write<W: Write>(&self, writer: &mut W) -> Result<()> {
        let mtime = self.mtime_seconds();
        let mut ar_builder = ar::Builder::new(writer);

        let data: &[u8] = FORMAT_VERSION.as_bytes();
        let mut header = ar::Header::new(FORMAT_VERSION_MEMBER.as_bytes().to_vec(), data.len() as u64);
        header.set_mode(0o644);
        header.set_mtime(mtime);
        header.set_uid(0);
        header.set_gid(0);
        ar_builder.append(&header, data)?;

        let mut control_writer = BufWriter::new(Vec::new());
        self.control_builder.write(&mut control_writer)?;
        let control_tar = control_writer.into_inner().map_err(|e| e.into_error())?;
        let control_tar = self
            .compression
            .compress(&mut std::io::Cursor::new(control_tar))?;

        let mut header = ar::Header::new(
            format!("{}{}", CONTROL_TAR_MEMBER, self.compression.extension()).into_bytes(),
            control_tar.len() as u64,
        );
        header.set_mode(0o644);
        header.set_mtime(mtime);
        header.set_uid(0);
        header.set_gid(0);
        ar_builder.append(&header, &*control_tar)?;

        let mut data_writer = BufWriter::new(Vec::new());
        write_tree_tar(&mut data_writer, &self.data_files, mtime)?;
        let data_tar = data_writer.into_inner().map_err(|e| e.into_error())?;
        let data_tar = self
            .compression
            .compress(&mut std::io::Cursor::new(data_tar))?;

        let mut header = ar::Header::new(
            format!("{}{}", DATA_TAR_MEMBER, self.compression.extension()).into_bytes(),
            data_tar.len() as u64,
        );
        header.set_mode(0o644);
        header.set_mtime(mtime);
        header.set_uid(0);
        header.set_gid(0);
        ar_builder.append(&header, &*data_tar)?;

        Ok(())
    }

    /// Write the archive to a path.
    pub fn write_to_path(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut file = std::fs::File::create(path)?;
        self.write(&mut file)?;
        file.sync_all()?;

        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use {
        super::*,
        crate::control::ControlFile,
    };

    pub(crate) fn test_control(package: &str, version: &str) -> BinaryControl<'static> {
        let text = format!(
            "Package: {}\nVersion: {}\nArchitecture: linux-amd64\nMaintainer: Alexis <alexis@m2osw.example>\nDescription: test package\n",
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
    fn control_tar_member_order() -> Result<()> {
        let mut builder = ControlTarBuilder::new(test_control("t1", "1.0"));
        builder.add_maintainer_script("prerm", b"#!/bin/sh\nexit 0\n".to_vec())?;
        builder.add_data_file_digest(Path::new("usr/bin/t1"), b"data");
        builder.add_conffile_path("etc/t1.conf");

        let mut buffer = vec![];
        builder.write(&mut buffer)?;

        let mut archive = tar::Archive::new(std::io::Cursor::new(buffer));
        let paths = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().into_owned())
            .collect::<Vec<_>>();

        assert_eq!(
            paths,
            vec![
                PathBuf::from("./"),
                PathBuf::from("./conffiles"),
                PathBuf::from("./control"),
                PathBuf::from("./md5sums"),
                PathBuf::from("./prerm"),
            ]
        );

        Ok(())
    }

    #[test]
    fn rejects_unknown_script_name() {
        let mut builder = ControlTarBuilder::new(test_control("t1", "1.0"));
        assert!(builder
            .add_maintainer_script("postconfigure", vec![])
            .is_err());
        assert!(builder
            .add_maintainer_script("postinst.bat", vec![])
            .is_ok());
    }

    #[test]
    fn rejects_incomplete_control() {
        let text = "Package: t1\nVersion: 1.0\n";
        let control: BinaryControl = ControlFile::parse_str(text)
            .unwrap()
            .into_paragraphs()
            .next()
            .unwrap()
            .into();

        assert!(PackageBuilder::new(control).is_err());
    }

    #[test]
    fn member_order_and_compression_extension() -> Result<()> {
        let mut builder = PackageBuilder::new(test_control("t1", "1.0"))?;
        builder.set_compression(Compression::Xz);
        builder.set_mtime(Some(std::time::UNIX_EPOCH));
        builder.install_file("usr/bin/t1", b"#!/bin/sh\n".to_vec(), 0o755);

        let mut buffer = vec![];
        builder.write(&mut buffer)?;

        let mut archive = ar::Archive::new(std::io::Cursor::new(buffer));

        let entry = archive.next_entry().unwrap().unwrap();
        assert_eq!(entry.header().identifier(), b"debian-binary");
        drop(entry);

        let entry = archive.next_entry().unwrap().unwrap();
        assert_eq!(entry.header().identifier(), b"control.tar.xz");
        drop(entry);

        let entry = archive.next_entry().unwrap().unwrap();
        assert_eq!(entry.header().identifier(), b"data.tar.xz");
        drop(entry);

        assert!(archive.next_entry().is_none());

        Ok(())
    }

    #[test]
    fn data_tar_directories_and_symlinks() -> Result<()> {
        let mut tree = TreeManifest::default();
        tree.add_file("usr/bin/t1", b"x".to_vec(), 0o755);
        tree.add_symlink("usr/bin/t1-alias", "t1");
        tree.add_file("usr/share/doc/t1/README", vec![], 0o644);

        let mut buffer = vec![];
        write_tree_tar(&mut buffer, &tree, 2)?;

        let mut archive = tar::Archive::new(std::io::Cursor::new(buffer));
        let mut paths = vec![];
        let mut symlink_target = None;

        for entry in archive.entries().unwrap() {
            let entry = entry.unwrap();
            paths.push(entry.path().unwrap().into_owned());

            if entry.header().entry_type() == tar::EntryType::Symlink {
                symlink_target = entry.link_name().unwrap().map(|p| p.into_owned());
            }
        }

        assert_eq!(
            paths,
            vec![
                PathBuf::from("./"),
                PathBuf::from("./usr/"),
                PathBuf::from("./usr/bin/"),
                PathBuf::from("./usr/share/"),
                PathBuf::from("./usr/share/doc/"),
                PathBuf::from("./usr/share/doc/t1/"),
                PathBuf::from("./usr/bin/t1"),
                PathBuf::from("./usr/bin/t1-alias"),
                PathBuf::from("./usr/share/doc/t1/README"),
            ]
        );
        assert_eq!(symlink_target, Some(PathBuf::from("t1")));

        Ok(())
    }

    #[test]
    fn long_path_uses_longlink() -> Result<()> {
        let long_path = format!("usr/share/{}/file.txt", "d".repeat(150));

        let mut tree = TreeManifest::default();
        tree.add_file(&long_path, b"x".to_vec(), 0o644);

        let mut buffer = vec![];
        write_tree_tar(&mut buffer, &tree, 2)?;

        let mut archive = tar::Archive::new(std::io::Cursor::new(buffer));
        let mut found = false;

        for entry in archive.entries().unwrap() {
            let entry = entry.unwrap();
            let path = entry.path().unwrap().into_owned();

            if path == Path::new(&format!("./{}", long_path)) {
                found = true;
            }
        }

        assert!(found, "long path resolved through @LongLink entry");

        Ok(())
    }
}
