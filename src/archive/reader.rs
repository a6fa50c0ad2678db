// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Package archive reading. */

use {
    crate::{
        archive::{
            strip_dot_slash, Compression, CONTROL_TAR_MEMBER, DATA_TAR_MEMBER, FORMAT_VERSION,
            FORMAT_VERSION_MEMBER,
        },
        binary_control::BinaryControl,
        control::ControlFile,
        error::{Result, WpkgError},
    },
    std::{
        collections::HashMap,
        io::Read,
        ops::{Deref, DerefMut},
        path::{Path, PathBuf},
    },
};

/// Size of the outer container's global header (`!<arch>\n`).
const GLOBAL_HEADER_LEN: u64 = 8;

/// Size of each member's fixed header.
const MEMBER_HEADER_LEN: u64 = 60;

/// Metadata for one outer-container member.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ArchiveMemberInfo {
    /// Member name as stored.
    pub name: String,
    /// Byte offset of the member payload within the archive.
    pub offset: u64,
    /// Payload size in bytes.
    pub size: u64,
}

/// Enumerate outer members without materializing payloads.
pub fn read_index<R: Read>(reader: R) -> Result<Vec<ArchiveMemberInfo>> {
    let mut archive = ar::Archive::new(reader);
    let mut members = vec![];
    let mut header_offset = GLOBAL_HEADER_LEN;

    while let Some(entry) = archive.next_entry() {
        let entry = entry?;
        let size = entry.header().size();
        let name = String::from_utf8_lossy(entry.header().identifier()).to_string();

        members.push(ArchiveMemberInfo {
            name,
            offset: header_offset + MEMBER_HEADER_LEN,
            size,
        });

        // Member payloads are padded to even offsets.
        header_offset += MEMBER_HEADER_LEN + size + (size & 1);
    }

    Ok(members)
}

/// A reader of package archives.
///
/// Iterating with [Self::next_member] yields each outer member converted
/// to a typed representation. Member payloads are read into memory;
/// inner tar streams decompress lazily from there.
pub struct PackageReader<R: Read> {
    archive: ar::Archive<R>,
}

impl<R: Read> PackageReader<R> {
    /// Construct a new instance from a reader.
    pub fn new(reader: R) -> Self {
        Self {
            archive: ar::Archive::new(reader),
        }
    }

    /// Obtain the next member of the outer container.
    pub fn next_member(&mut self) -> Option<Result<PackageMember>> {
        let entry = match self.archive.next_entry()? {
            Ok(entry) => entry,
            Err(e) => return Some(Err(e.into())),
        };

        let mut entry = entry;
        // Member names are ASCII in well-formed archives.
        let filename = String::from_utf8_lossy(entry.header().identifier()).to_string();

        let mut data = vec![];
        if let Err(e) = entry.read_to_end(&mut data) {
            return Some(Err(e.into()));
        }

        if filename == FORMAT_VERSION_MEMBER {
            let version = String::from_utf8_lossy(&data).to_string();

            if version != FORMAT_VERSION {
                return Some(Err(WpkgError::UnsupportedFormatVersion(version)));
            }

            Some(Ok(PackageMember::FormatVersion(version)))
        } else if let Some(tail) = filename.strip_prefix(CONTROL_TAR_MEMBER) {
            Some(
                Compression::from_extension(tail)
                    .and_then(|c| c.decompressor(std::io::Cursor::new(data)))
                    .map(|r| PackageMember::Control(ControlTarReader::new(r))),
            )
        } else if let Some(tail) = filename.strip_prefix(DATA_TAR_MEMBER) {
            Some(
                Compression::from_extension(tail)
                    .and_then(|c| c.decompressor(std::io::Cursor::new(data)))
                    .map(|r| PackageMember::Data(DataTarReader::new(r))),
            )
        } else {
            Some(Err(WpkgError::UnknownArchiveMember(filename)))
        }
    }
}

/// A typed member of the outer container.
pub enum PackageMember {
    /// The `debian-binary` member (already validated as `2.0\n`).
    FormatVersion(String),
    /// The `control.tar*` member.
    Control(ControlTarReader),
    /// The `data.tar*` member.
    Data(DataTarReader),
}

/// A lazy reader over the `control.tar` member.
pub struct ControlTarReader {
    archive: tar::Archive<Box<dyn Read + 'static>>,
}

impl ControlTarReader {
    fn new(reader: Box<dyn Read + 'static>) -> Self {
        Self {
            archive: tar::Archive::new(reader),
        }
    }
}

impl Deref for ControlTarReader {
    type Target = tar::Archive<Box<dyn Read + 'static>>;

    fn deref(&self) -> &Self::Target {
        &self.archive
    }
}

impl DerefMut for ControlTarReader {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.archive
    }
}

/// A lazy reader over the `data.tar` member.
pub struct DataTarReader {
    archive: tar::Archive<Box<dyn Read + 'static>>,
}

impl DataTarReader {
    fn new(reader: Box<dyn Read + 'static>) -> Self {
        Self {
            archive: tar::Archive::new(reader),
        }
    }
}

impl Deref for DataTarReader {
    type Target = tar::Archive<Box<dyn Read + 'static>>;

    fn deref(&self) -> &Self::Target {
        &self.archive
    }
}

impl DerefMut for DataTarReader {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.archive
    }
}

/// A package archive addressed by filesystem path.
///
/// Each streaming accessor opens the file afresh, so the lazy member
/// streams are independently consumable (though each individual stream
/// is forward-only and not restartable).
#[derive(Clone, Debug)]
pub struct PackageArchive {
    path: PathBuf,
}

impl PackageArchive {
    /// Open an archive, verifying the format version member.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let archive = Self {
            path: path.as_ref().to_path_buf(),
        };

        let mut reader = archive.reader()?;
        match reader.next_member() {
            Some(Ok(PackageMember::FormatVersion(_))) => Ok(archive),
            Some(Err(e)) => Err(e),
            Some(Ok(_)) => Err(WpkgError::ArchiveFormat(format!(
                "{}: first member is not {}",
                archive.path.display(),
                FORMAT_VERSION_MEMBER
            ))),
            None => Err(WpkgError::ArchiveFormat(format!(
                "{}: empty archive",
                archive.path.display()
            ))),
        }
    }

    /// The archive's filesystem path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn reader(&self) -> Result<PackageReader<std::fs::File>> {
        Ok(PackageReader::new(std::fs::File::open(&self.path)?))
    }

    /// Enumerate the outer members with offsets and sizes.
    pub fn read_index(&self) -> Result<Vec<ArchiveMemberInfo>> {
        read_index(std::fs::File::open(&self.path)?)
    }

    /// Obtain a lazy stream over the control member.
    pub fn stream_control(&self) -> Result<ControlTarReader> {
        let mut reader = self.reader()?;

        while let Some(member) = reader.next_member() {
            if let PackageMember::Control(control) = member? {
                return Ok(control);
            }
        }

        Err(WpkgError::ArchiveFormat(format!(
            "{}: no control member",
            self.path.display()
        )))
    }

    /// Obtain a lazy stream over the data member.
    pub fn stream_data(&self) -> Result<DataTarReader> {
        let mut reader = self.reader()?;

        while let Some(member) = reader.next_member() {
            if let PackageMember::Data(data) = member? {
                return Ok(data);
            }
        }

        Err(WpkgError::ArchiveFormat(format!(
            "{}: no data member",
            self.path.display()
        )))
    }

    /// Materialize every file in the control member.
    ///
    /// Keys are member names with the leading `./` stripped.
    pub fn control_files(&self) -> Result<HashMap<String, Vec<u8>>> {
        let mut control = self.stream_control()?;
        let mut files = HashMap::new();

        for entry in control.entries()? {
            let mut entry = entry?;

            if !entry.header().entry_type().is_file() {
                continue;
            }

            let name = strip_dot_slash(&entry.path()?.to_string_lossy()).to_string();

            let mut data = vec![];
            entry.read_to_end(&mut data)?;
            files.insert(name, data);
        }

        Ok(files)
    }

    /// Parse the binary control stanza from the control member.
    pub fn control(&self) -> Result<BinaryControl<'static>> {
        let files = self.control_files()?;

        let data = files
            .get("control")
            .ok_or_else(|| WpkgError::ControlParse("archive lacks a control member".into()))?;

        let text = String::from_utf8_lossy(data);
        let control: BinaryControl = ControlFile::parse_str(&text)?
            .into_paragraphs()
            .next()
            .ok_or_else(|| WpkgError::ControlParse("empty control stanza".into()))?
            .into();

        control.validate()?;

        Ok(control)
    }

    /// Conffile paths declared by the archive, leading `/` stripped.
    pub fn conffiles(&self) -> Result<Vec<String>> {
        let files = self.control_files()?;

        Ok(match files.get("conffiles") {
            Some(data) => String::from_utf8_lossy(data)
                .lines()
                .map(|l| l.trim())
                .filter(|l| !l.is_empty())
                .map(|l| l.trim_start_matches('/').to_string())
                .collect(),
            None => vec![],
        })
    }
}
