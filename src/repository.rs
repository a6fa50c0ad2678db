// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Repository index.

A repository is a directory of `*.deb` archives. The index is a single
`index.tar.gz` holding one control stanza per candidate under
`index/<pkg>_<ver>_<arch>.ctrl`; a `Filename` field added to each
stanza records the archive path relative to the repository root.

The index is rebuilt implicitly when absent or older than any archive,
and explicitly through [RepositoryIndex::build] (the `create-index`
operation). Consumers may pin to the index for speed or force a re-scan
for validated reads.
*/

use {
    crate::{
        archive::PackageArchive,
        binary_control::BinaryControl,
        control::ControlFile,
        error::{Result, WpkgError},
    },
    std::{
        io::{Read, Write},
        path::{Path, PathBuf},
        time::SystemTime,
    },
};

/// Name of the index file inside a repository directory.
pub const INDEX_FILE: &str = "index.tar.gz";

/// One candidate archive described by the index.
#[derive(Clone, Debug)]
pub struct IndexEntry {
    /// The candidate's control stanza.
    pub control: BinaryControl<'static>,
    /// Absolute path of the archive.
    pub archive_path: PathBuf,
}

/// A loaded repository index.
#[derive(Clone, Debug, Default)]
pub struct RepositoryIndex {
    entries: Vec<IndexEntry>,
}

impl RepositoryIndex {
    /// Enumerate `*.deb` files under the repository root, sorted by
    /// path so downstream tie-breaking is deterministic.
    fn enumerate_archives(repository: &Path) -> Result<Vec<PathBuf>> {
        let mut archives = vec![];

        for entry in std::fs::read_dir(repository)? {
            let entry = entry?;
            let path = entry.path();

            if path.extension().map_or(false, |e| e == "deb") && path.is_file() {
                archives.push(path);
            }
        }

        archives.sort();

        Ok(archives)
    }

    /// Whether the index is missing or older than any archive.
    pub fn is_stale(repository: &Path) -> Result<bool> {
        let index_path = repository.join(INDEX_FILE);

        let index_mtime = match std::fs::metadata(&index_path) {
            Ok(meta) => meta.modified()?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(true),
            Err(e) => return Err(e.into()),
        };

        for archive in Self::enumerate_archives(repository)? {
            let mtime = std::fs::metadata(&archive)?
                .modified()
                .unwrap_or(SystemTime::UNIX_EPOCH);

            if mtime > index_mtime {
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Build the index by scanning every archive (`create-index`).
    pub fn build(repository: &Path) -> Result<Self> {
        let mut entries = vec![];
        let mut tar_buffer = vec![];

        {
            let mut builder = tar::Builder::new(&mut tar_buffer);

            for archive_path in Self::enumerate_archives(repository)? {
                let archive = PackageArchive::open(&archive_path)?;
                let control = archive.control()?;

                let relative = archive_path
                    .strip_prefix(repository)
                    .unwrap_or(&archive_path)
                    .to_string_lossy()
                    .to_string();

                let mut stored = control.clone();
                stored.set_field_from_string("Filename".into(), relative.into());

                let member_name = format!(
                    "index/{}_{}_{}.ctrl",
                    control.package()?,
                    control.version_str()?,
                    control.architecture_str()?
                );

                let mut stanza = vec![];
                stored.write(&mut stanza)?;

                let mut header = tar::Header::new_gnu();
                header.set_path(&member_name)?;
                header.set_mode(0o644);
                header.set_uid(0);
                header.set_gid(0);
                header.set_mtime(0);
                header.set_size(stanza.len() as u64);
                header.set_cksum();
                builder.append(&header, stanza.as_slice())?;

                entries.push(IndexEntry {
                    control,
                    archive_path,
                });
            }

            builder.finish()?;
        }

        let mut compressed = vec![];
        {
            let mut encoder = libflate::gzip::Encoder::new(&mut compressed)?;
            encoder.write_all(&tar_buffer)?;
            encoder.finish().into_result()?;
        }

        crate::admin_db::write_atomic(&repository.join(INDEX_FILE), &compressed)?;

        log::info!(
            "indexed {} archive(s) under {}",
            entries.len(),
            repository.display()
        );

        Ok(Self { entries })
    }

    /// Read an existing index file without touching the archives.
    fn read(repository: &Path) -> Result<Self> {
        let file = std::fs::File::open(repository.join(INDEX_FILE))?;
        let decoder = libflate::gzip::Decoder::new(file)?;
        let mut archive = tar::Archive::new(decoder);

        let mut entries = vec![];

        for entry in archive.entries()? {
            let mut entry = entry?;

            if !entry.header().entry_type().is_file() {
                continue;
            }

            let mut text = String::new();
            entry.read_to_string(&mut text)?;

            let control: BinaryControl = ControlFile::parse_str(&text)?
                .into_paragraphs()
                .next()
                .ok_or_else(|| {
                    WpkgError::ControlParse("empty stanza in repository index".into())
                })?
                .into();

            let filename = control
                .field_str("Filename")
                .ok_or_else(|| {
                    WpkgError::ControlParse("index stanza lacks Filename".into())
                })?
                .to_string();

            entries.push(IndexEntry {
                archive_path: repository.join(filename),
                control,
            });
        }

        Ok(Self { entries })
    }

    /// Load the index for a repository.
    ///
    /// With `pin` set, an existing fresh-enough index is used as-is
    /// (fast path). Otherwise, or when the index is stale or absent,
    /// the archives are re-scanned and the index rewritten.
    pub fn load(repository: &Path, pin: bool) -> Result<Self> {
        if pin && !Self::is_stale(repository)? {
            Self::read(repository)
        } else {
            Self::build(repository)
        }
    }

    /// Candidate entries in the index.
    pub fn entries(&self) -> &[IndexEntry] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::archive::{builder::tests::test_control, PackageBuilder},
        tempfile::TempDir,
    };

    fn write_package(dir: &Path, name: &str, version: &str) -> PathBuf {
        let mut builder = PackageBuilder::new(test_control(name, version)).unwrap();
        builder.set_mtime(Some(std::time::UNIX_EPOCH));
        builder.install_file(format!("usr/bin/{}", name), b"#!/bin/sh\n".to_vec(), 0o755);

        let path = dir.join(format!("{}_{}_linux-amd64.deb", name, version));
        builder.write_to_path(&path).unwrap();
        path
    }

    #[test]
    fn build_and_read_index() -> Result<()> {
        let dir = TempDir::new()?;
        write_package(dir.path(), "t1", "1.0");
        write_package(dir.path(), "t2", "2.0");

        let built = RepositoryIndex::build(dir.path())?;
        assert_eq!(built.entries().len(), 2);
        assert!(dir.path().join(INDEX_FILE).is_file());

        let read = RepositoryIndex::load(dir.path(), true)?;
        assert_eq!(read.entries().len(), 2);

        let entry = &read.entries()[0];
        assert_eq!(entry.control.package().unwrap(), "t1");
        assert_eq!(
            entry.archive_path,
            dir.path().join("t1_1.0_linux-amd64.deb")
        );

        Ok(())
    }

    #[test]
    fn staleness_detection() -> Result<()> {
        let dir = TempDir::new()?;
        write_package(dir.path(), "t1", "1.0");

        assert!(RepositoryIndex::is_stale(dir.path())?);

        RepositoryIndex::build(dir.path())?;
        assert!(!RepositoryIndex::is_stale(dir.path())?);

        // A new archive invalidates the index.
        std::thread::sleep(std::time::Duration::from_millis(20));
        write_package(dir.path(), "t3", "1.0");
        assert!(RepositoryIndex::is_stale(dir.path())?);

        // load() with pin rebuilds when stale.
        let index = RepositoryIndex::load(dir.path(), true)?;
        assert_eq!(index.entries().len(), 2);
        assert!(!RepositoryIndex::is_stale(dir.path())?);

        Ok(())
    }

    #[test]
    fn empty_repository_indexes_cleanly() -> Result<()> {
        let dir = TempDir::new()?;

        let index = RepositoryIndex::build(dir.path())?;
        assert!(index.entries().is_empty());

        let index = RepositoryIndex::load(dir.path(), true)?;
        assert!(index.entries().is_empty());

        Ok(())
    }
}
