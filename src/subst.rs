// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Path substitution table.

The `WPKG_SUBST` environment variable defines drive-letter or path
substitutions as a colon-separated list of `letter=dir[|dir…]` entries.
The permitted character set is letters, digits, underscore, hyphen,
plus, dot, slash, and backslash; anything else rejects the transaction.
Paths are stored unchanged; substitution and drive-letter rewriting
apply at display and lookup time only.
*/

use {
    crate::error::{Result, WpkgError},
    std::collections::BTreeMap,
};

/// Name of the environment variable holding substitutions.
pub const SUBST_VARIABLE: &str = "WPKG_SUBST";

fn valid_subst_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '+' | '.' | '/' | '\\')
}

/// A parsed substitution table.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct SubstTable {
    entries: BTreeMap<char, Vec<String>>,
}

impl SubstTable {
    /// Parse a table from a `letter=dir[|dir…]:…` definition string.
    pub fn parse(s: &str) -> Result<Self> {
        let mut entries = BTreeMap::new();

        for item in s.split(':').filter(|i| !i.is_empty()) {
            let (letter, dirs) = item
                .split_once('=')
                .ok_or_else(|| WpkgError::InvalidSubstitution(item.to_string()))?;

            let mut letters = letter.chars();
            let letter = match (letters.next(), letters.next()) {
                (Some(c), None) if c.is_ascii_alphabetic() => c.to_ascii_lowercase(),
                _ => return Err(WpkgError::InvalidSubstitution(item.to_string())),
            };

            let dirs = dirs
                .split('|')
                .map(|dir| {
                    if dir.is_empty() || !dir.chars().all(valid_subst_char) {
                        Err(WpkgError::InvalidSubstitution(item.to_string()))
                    } else {
                        Ok(dir.to_string())
                    }
                })
                .collect::<Result<Vec<_>>>()?;

            entries.insert(letter, dirs);
        }

        Ok(Self { entries })
    }

    /// Parse the table from the process environment.
    ///
    /// An unset variable yields an empty table; an invalid value is an
    /// error so the transaction is rejected early.
    pub fn from_env() -> Result<Self> {
        match std::env::var(SUBST_VARIABLE) {
            Ok(value) => Self::parse(&value),
            Err(std::env::VarError::NotPresent) => Ok(Self::default()),
            Err(std::env::VarError::NotUnicode(_)) => Err(WpkgError::InvalidSubstitution(
                format!("{} is not valid unicode", SUBST_VARIABLE),
            )),
        }
    }

    /// Whether the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Candidate expansions for a `/<letter>/…` path, in table order.
    pub fn expand(&self, path: &str) -> Vec<String> {
        if let Some((letter, rest)) = drive_letter_split(path) {
            if let Some(dirs) = self.entries.get(&letter.to_ascii_lowercase()) {
                return dirs
                    .iter()
                    .map(|dir| format!("{}/{}", dir.trim_end_matches('/'), rest))
                    .collect();
            }
        }

        vec![path.to_string()]
    }
}

/// Split a `/<letter>/rest` path into its letter and remainder.
fn drive_letter_split(path: &str) -> Option<(char, &str)> {
    let rest = path.strip_prefix('/')?;
    let mut chars = rest.chars();

    match (chars.next(), chars.next()) {
        (Some(letter), Some('/')) if letter.is_ascii_alphabetic() => {
            Some((letter, &rest[2..]))
        }
        _ => None,
    }
}

/// Rewrite a stored `/<letter>/…` path to `<LETTER>:/…` for display.
///
/// Only applied when the package carries `X-Drive-Letter: Yes`; stored
/// paths are never modified.
pub fn display_with_drive_letter(path: &str) -> String {
    match drive_letter_split(path) {
        Some((letter, rest)) => format!("{}:/{}", letter.to_ascii_uppercase(), rest),
        None => path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_single_and_multi_dir() -> Result<()> {
        let table = SubstTable::parse("c=/opt/win")?;
        assert_eq!(table.expand("/c/Program+Files"), vec!["/opt/win/Program+Files"]);

        let table = SubstTable::parse("c=/opt/a|/opt/b:d=/mnt/d")?;
        assert_eq!(table.expand("/c/x"), vec!["/opt/a/x", "/opt/b/x"]);
        assert_eq!(table.expand("/d/y"), vec!["/mnt/d/y"]);

        Ok(())
    }

    #[test]
    fn unmatched_paths_pass_through() -> Result<()> {
        let table = SubstTable::parse("c=/opt/win")?;
        assert_eq!(table.expand("/usr/bin/t1"), vec!["/usr/bin/t1"]);
        assert_eq!(table.expand("/z/unmapped"), vec!["/z/unmapped"]);

        Ok(())
    }

    #[test]
    fn invalid_definitions_rejected() {
        assert!(SubstTable::parse("noequals").is_err());
        assert!(SubstTable::parse("cc=/opt").is_err());
        assert!(SubstTable::parse("1=/opt").is_err());
        assert!(SubstTable::parse("c=/opt with space").is_err());
        assert!(SubstTable::parse("c=/opt;semicolon").is_err());
        assert!(SubstTable::parse("c=").is_err());
    }

    #[test]
    fn drive_letter_display() {
        assert_eq!(display_with_drive_letter("/c/tools/t1"), "C:/tools/t1");
        assert_eq!(display_with_drive_letter("/usr/bin/t1"), "/usr/bin/t1");
        assert_eq!(display_with_drive_letter("relative"), "relative");
    }
}
