// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Package archive container format.

A package archive is an outer `!<arch>` container wrapping three members
in fixed order: `debian-binary` (the format version, `2.0\n`),
`control.tar[.gz|.bz2|.xz]` (metadata, scripts, hooks), and
`data.tar[.gz|.bz2|.xz]` (the file tree). Inner members are ustar
streams; paths of 100 bytes or more use the GNU long-name extension.
*/

use {
    crate::error::{Result, WpkgError},
    std::io::Read,
};

pub mod builder;
pub mod reader;

pub use {
    builder::{ControlTarBuilder, PackageBuilder},
    reader::{
        ArchiveMemberInfo, ControlTarReader, DataTarReader, PackageArchive, PackageMember,
        PackageReader,
    },
};

/// Name of the format version member.
pub const FORMAT_VERSION_MEMBER: &str = "debian-binary";

/// Contents of the format version member.
pub const FORMAT_VERSION: &str = "2.0\n";

/// Base name of the control member, before the compression extension.
pub const CONTROL_TAR_MEMBER: &str = "control.tar";

/// Base name of the data member, before the compression extension.
pub const DATA_TAR_MEMBER: &str = "data.tar";

/// Maintainer script names recognized in the control member.
pub const MAINTAINER_SCRIPTS: &[&str] = &["preinst", "postinst", "prerm", "postrm", "validate"];

/// Compression format applied to an archive member.
///
/// The format is a capability selected at construction: encoding and
/// decoding go through `compress`/`decompressor` regardless of which
/// physical format is in use.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Compression {
    /// No compression (no extension).
    None,
    /// Gzip compression (`.gz`).
    Gzip,
    /// Bzip2 compression (`.bz2`).
    Bzip2,
    /// XZ compression (`.xz`).
    Xz,
}

impl Compression {
    /// Filename extension for members compressed in this format.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::None => "",
            Self::Gzip => ".gz",
            Self::Bzip2 => ".bz2",
            Self::Xz => ".xz",
        }
    }

    /// Resolve a member filename extension to a compression format.
    pub fn from_extension(extension: &str) -> Result<Self> {
        match extension {
            "" => Ok(Self::None),
            ".gz" => Ok(Self::Gzip),
            ".bz2" => Ok(Self::Bzip2),
            ".xz" => Ok(Self::Xz),
            _ => Err(WpkgError::UnknownCompression(extension.to_string())),
        }
    }

    /// Compress the input data to a buffer.
    pub fn compress(&self, reader: &mut impl Read) -> Result<Vec<u8>> {
        let mut buffer = vec![];

        match self {
            Self::None => {
                std::io::copy(reader, &mut buffer)?;
            }
            Self::Gzip => {
                let mut encoder = libflate::gzip::Encoder::new(&mut buffer)?;
                std::io::copy(reader, &mut encoder)?;
                encoder.finish().into_result()?;
            }
            Self::Bzip2 => {
                let mut encoder =
                    bzip2::write::BzEncoder::new(buffer, bzip2::Compression::default());
                std::io::copy(reader, &mut encoder)?;
                buffer = encoder.finish()?;
            }
            Self::Xz => {
                let mut encoder = xz2::write::XzEncoder::new(buffer, 6);
                std::io::copy(reader, &mut encoder)?;
                buffer = encoder.finish()?;
            }
        }

        Ok(buffer)
    }

    /// Wrap a reader with transparent decompression.
    pub fn decompressor<'a, R: Read + 'a>(&self, reader: R) -> Result<Box<dyn Read + 'a>> {
        Ok(match self {
            Self::None => Box::new(reader),
            Self::Gzip => Box::new(libflate::gzip::Decoder::new(reader)?),
            Self::Bzip2 => Box::new(bzip2::read::BzDecoder::new(reader)),
            Self::Xz => Box::new(xz2::read::XzDecoder::new(reader)),
        })
    }
}

/// Strip the conventional leading `./` from an inner archive path.
pub fn strip_dot_slash(path: &str) -> &str {
    let path = path.strip_prefix("./").unwrap_or(path);
    path.strip_suffix('/').unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_round_trip() {
        for compression in [
            Compression::None,
            Compression::Gzip,
            Compression::Bzip2,
            Compression::Xz,
        ] {
            assert_eq!(
                Compression::from_extension(compression.extension()).unwrap(),
                compression
            );
        }

        assert!(Compression::from_extension(".zst").is_err());
    }

    #[test]
    fn compress_round_trip() -> Result<()> {
        let payload = b"some payload that compresses".repeat(64);

        for compression in [
            Compression::None,
            Compression::Gzip,
            Compression::Bzip2,
            Compression::Xz,
        ] {
            let compressed = compression.compress(&mut std::io::Cursor::new(&payload))?;

            let mut decoded = vec![];
            compression
                .decompressor(std::io::Cursor::new(compressed))?
                .read_to_end(&mut decoded)?;

            assert_eq!(decoded, payload);
        }

        Ok(())
    }

    #[test]
    fn dot_slash_stripping() {
        assert_eq!(strip_dot_slash("./usr/bin/t1"), "usr/bin/t1");
        assert_eq!(strip_dot_slash("usr/bin/t1"), "usr/bin/t1");
        assert_eq!(strip_dot_slash("./usr/"), "usr");
        assert_eq!(strip_dot_slash("./"), "");
    }
}
