// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Architecture triplet handling.

An architecture is `os[-vendor]-cpu` with OS and CPU required and the
vendor optional. `all` (architecture-independent) and `source` are
recognized as special values. A missing vendor matches any vendor.
*/

use {
    crate::error::{Result, WpkgError},
    std::fmt::{Display, Formatter},
    std::str::FromStr,
};

/// Operating systems considered part of the Windows family.
///
/// Packages targeting these run `.bat` maintainer scripts; everything
/// else runs extensionless scripts.
const WINDOWS_OS_NAMES: &[&str] = &["mswindows", "win32", "win64"];

/// A package or target architecture.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Architecture {
    /// Architecture-independent (`all`).
    All,
    /// Source package placeholder (`source`).
    Source,
    /// A concrete `os[-vendor]-cpu` triplet.
    Triplet {
        os: String,
        vendor: Option<String>,
        cpu: String,
    },
}

impl FromStr for Architecture {
    type Err = WpkgError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "all" => return Ok(Self::All),
            "source" => return Ok(Self::Source),
            _ => {}
        }

        let parts = s.split('-').collect::<Vec<_>>();

        let (os, vendor, cpu) = match parts.as_slice() {
            [os, cpu] => (*os, None, *cpu),
            [os, vendor, cpu] => (*os, Some(*vendor), *cpu),
            _ => return Err(WpkgError::InvalidArchitecture(s.to_string())),
        };

        if os.is_empty() || cpu.is_empty() || vendor.map_or(false, str::is_empty) {
            return Err(WpkgError::InvalidArchitecture(s.to_string()));
        }

        Ok(Self::Triplet {
            os: os.to_string(),
            vendor: vendor.map(str::to_string),
            cpu: cpu.to_string(),
        })
    }
}

impl Display for Architecture {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::Source => write!(f, "source"),
            Self::Triplet { os, vendor, cpu } => {
                if let Some(vendor) = vendor {
                    write!(f, "{}-{}-{}", os, vendor, cpu)
                } else {
                    write!(f, "{}-{}", os, cpu)
                }
            }
        }
    }
}

impl Architecture {
    /// Whether a package of this architecture installs on `target`.
    ///
    /// `all` installs anywhere. A concrete triplet requires matching OS
    /// and CPU; a side missing its vendor matches any vendor.
    pub fn compatible_with(&self, target: &Architecture) -> bool {
        match (self, target) {
            (Self::All, _) => true,
            (Self::Source, _) | (_, Self::Source) => false,
            (_, Self::All) => false,
            (
                Self::Triplet { os, vendor, cpu },
                Self::Triplet {
                    os: t_os,
                    vendor: t_vendor,
                    cpu: t_cpu,
                },
            ) => {
                os == t_os
                    && cpu == t_cpu
                    && match (vendor, t_vendor) {
                        (Some(a), Some(b)) => a == b,
                        _ => true,
                    }
            }
        }
    }

    /// Whether a dependency arch qualifier names this architecture.
    ///
    /// The qualifier may itself omit the vendor, in which case it
    /// matches any vendor on our side.
    pub fn matches_qualifier(&self, qualifier: &str) -> bool {
        if let Ok(pattern) = qualifier.parse::<Architecture>() {
            match (&pattern, self) {
                (Architecture::All, Architecture::All) => true,
                (Architecture::Source, Architecture::Source) => true,
                (Architecture::Triplet { .. }, Architecture::Triplet { .. }) => {
                    pattern.compatible_with(self) || self.compatible_with(&pattern)
                }
                _ => false,
            }
        } else {
            // Not a parseable triplet; fall back to exact text.
            qualifier == self.to_string()
        }
    }

    /// Whether this architecture runs Windows-family maintainer scripts.
    pub fn is_windows_family(&self) -> bool {
        match self {
            Self::Triplet { os, .. } => WINDOWS_OS_NAMES.contains(&os.as_str()),
            _ => false,
        }
    }

    /// Whether this architecture runs Unix-family maintainer scripts.
    pub fn is_unix_family(&self) -> bool {
        match self {
            Self::Triplet { .. } => !self.is_windows_family(),
            _ => false,
        }
    }
}
