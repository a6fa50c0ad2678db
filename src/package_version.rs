// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Package version string handling.

Versions take the form `[epoch:]upstream[-revision]`. Comparison proceeds
left to right: epochs numerically, then upstream and revision by
repeatedly peeling (non-digit run, digit run) pairs. Within a non-digit
run, ASCII letters sort before non-letters and `~` sorts before anything,
including the end of the part, which is what makes `1.0~rc1` a
pre-release of `1.0`.
*/

use {
    std::{
        cmp::Ordering,
        fmt::{Display, Formatter},
        num::ParseIntError,
        str::FromStr,
    },
    thiserror::Error,
};

#[derive(Clone, Debug, Error)]
pub enum VersionError {
    #[error("error parsing string to integer: {0}")]
    ParseInt(#[from] ParseIntError),

    #[error("the epoch component has non-digit characters: {0}")]
    EpochNonNumeric(String),

    #[error("upstream component has illegal character: {0}")]
    UpstreamIllegalChar(String),

    #[error("revision component has illegal character: {0}")]
    RevisionIllegalChar(String),

    #[error("unknown version relationship operator: {0}")]
    UnknownOperator(String),
}

pub type Result<T> = std::result::Result<T, VersionError>;

/// A version relationship operator.
///
/// The canonical forms are `<<`, `<=`, `=`, `>=`, `>>`. The textual
/// synonyms `lt`, `le`, `eq`, `ge`, `gt` and the non-Debian forms `<`,
/// `==`, `>` are accepted on parse; `<` and `>` map to the strict
/// relationships.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum VersionRelation {
    StrictlyEarlier,
    EarlierOrEqual,
    ExactlyEqual,
    LaterOrEqual,
    StrictlyLater,
}

impl Display for VersionRelation {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        match self {
            Self::StrictlyEarlier => write!(f, "<<"),
            Self::EarlierOrEqual => write!(f, "<="),
            Self::ExactlyEqual => write!(f, "="),
            Self::LaterOrEqual => write!(f, ">="),
            Self::StrictlyLater => write!(f, ">>"),
        }
    }
}

impl FromStr for VersionRelation {
    type Err = VersionError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "<<" | "lt" | "<" => Ok(Self::StrictlyEarlier),
            "<=" | "le" => Ok(Self::EarlierOrEqual),
            "=" | "eq" | "==" => Ok(Self::ExactlyEqual),
            ">=" | "ge" => Ok(Self::LaterOrEqual),
            ">>" | "gt" | ">" => Ok(Self::StrictlyLater),
            other => Err(VersionError::UnknownOperator(other.to_string())),
        }
    }
}

impl VersionRelation {
    /// Whether an ordering outcome satisfies this relation.
    pub fn matches(&self, ordering: Ordering) -> bool {
        matches!(
            (ordering, self),
            (
                Ordering::Equal,
                Self::ExactlyEqual | Self::EarlierOrEqual | Self::LaterOrEqual,
            ) | (
                Ordering::Less,
                Self::StrictlyEarlier | Self::EarlierOrEqual,
            ) | (
                Ordering::Greater,
                Self::StrictlyLater | Self::LaterOrEqual,
            )
        )
    }
}

/// A package version.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct PackageVersion {
    epoch: Option<u32>,
    upstream: String,
    revision: Option<String>,
}

impl PackageVersion {
    /// Construct an instance by parsing a version string.
    pub fn parse(s: &str) -> Result<Self> {
        // Epoch is the part before a colon, if present. upstream and
        // revision are discovered by splitting on the last hyphen.
        let (epoch, remainder) = if let Some(pos) = s.find(':') {
            (Some(&s[0..pos]), &s[pos + 1..])
        } else {
            (None, s)
        };

        let (upstream, revision) = if let Some(pos) = remainder.rfind('-') {
            (&remainder[0..pos], Some(&remainder[pos + 1..]))
        } else {
            (remainder, None)
        };

        let epoch = if let Some(epoch) = epoch {
            if !epoch.chars().all(|c| c.is_ascii_digit()) {
                return Err(VersionError::EpochNonNumeric(s.to_string()));
            }

            Some(u32::from_str(epoch)?)
        } else {
            None
        };

        // The upstream component may contain only alphanumerics and
        // . + ~ and, when a revision is present, hyphens.
        if !upstream.chars().all(|c| match c {
            c if c.is_ascii_alphanumeric() => true,
            '.' | '+' | '~' => true,
            '-' => revision.is_some(),
            _ => false,
        }) {
            return Err(VersionError::UpstreamIllegalChar(s.to_string()));
        }

        let revision = if let Some(revision) = revision {
            if !revision.chars().all(|c| match c {
                c if c.is_ascii_alphanumeric() => true,
                '+' | '.' | '~' => true,
                _ => false,
            }) {
                return Err(VersionError::RevisionIllegalChar(s.to_string()));
            }

            Some(revision.to_string())
        } else {
            None
        };

        Ok(Self {
            epoch,
            upstream: upstream.to_string(),
            revision,
        })
    }

    /// The `epoch` component, if explicitly present.
    pub fn epoch(&self) -> Option<u32> {
        self.epoch
    }

    /// The epoch value with the default of `0` applied.
    pub fn epoch_assumed(&self) -> u32 {
        self.epoch.unwrap_or(0)
    }

    /// The `upstream` component.
    pub fn upstream(&self) -> &str {
        &self.upstream
    }

    /// The `revision` component, if present.
    pub fn revision(&self) -> Option<&str> {
        self.revision.as_deref()
    }

    /// Whether a candidate version satisfies `candidate <relation> self`.
    ///
    /// e.g. for the constraint `(>= 1.2)`, call
    /// `constraint_version.satisfied_by(relation, candidate)`.
    pub fn satisfied_by(&self, relation: VersionRelation, candidate: &PackageVersion) -> bool {
        relation.matches(candidate.cmp(self))
    }

    /// Compare two version strings, tolerating empty strings.
    ///
    /// An empty string sorts strictly before any non-empty version. This
    /// is the entry point behind the `compare-versions` verb, where
    /// callers may hand us the empty string to mean "no version".
    pub fn compare_strings(a: &str, b: &str) -> Result<Ordering> {
        match (a.is_empty(), b.is_empty()) {
            (true, true) => Ok(Ordering::Equal),
            (true, false) => Ok(Ordering::Less),
            (false, true) => Ok(Ordering::Greater),
            (false, false) => Ok(Self::parse(a)?.cmp(&Self::parse(b)?)),
        }
    }
}

impl Display for PackageVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if let Some(epoch) = self.epoch {
            write!(f, "{}:", epoch)?;
        }
        write!(f, "{}", self.upstream)?;
        if let Some(revision) = &self.revision {
            write!(f, "-{}", revision)?;
        }

        Ok(())
    }
}

/// Split a string before its first digit character.
fn split_first_digit(s: &str) -> (&str, &str) {
    match s.chars().position(|c| c.is_ascii_digit()) {
        Some(0) => ("", s),
        Some(pos) => (&s[0..pos], &s[pos..]),
        None => (s, ""),
    }
}

/// Split a string before its first non-digit character.
fn split_first_nondigit(s: &str) -> (&str, &str) {
    match s.chars().position(|c| !c.is_ascii_digit()) {
        Some(0) => ("", s),
        Some(pos) => (&s[0..pos], &s[pos..]),
        None => (s, ""),
    }
}

/// Compare two digit runs numerically without bounding their length.
///
/// Leading zeros are ignored; after that, a longer run is larger and
/// equal-length runs compare lexically. An empty run counts as 0.
fn compare_digit_runs(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');

    match a.len().cmp(&b.len()) {
        Ordering::Equal => a.cmp(b),
        res => res,
    }
}

/// Sort weight of a character within a non-digit run.
///
/// `~` sorts before everything including end-of-string (weight of an
/// absent character is 0), letters sort before non-letters.
fn char_weight(c: Option<char>) -> i32 {
    match c {
        Some('~') => -1,
        None => 0,
        Some(c) if c.is_ascii_alphabetic() => c as i32,
        // Push non-letters past every letter.
        Some(c) => c as i32 + 0x100,
    }
}

/// Compare two non-digit runs using the modified lexical ordering.
fn lexical_compare(a: &str, b: &str) -> Ordering {
    let mut a_chars = a.chars();
    let mut b_chars = b.chars();

    loop {
        let (x, y) = (a_chars.next(), b_chars.next());

        if x.is_none() && y.is_none() {
            return Ordering::Equal;
        }

        match char_weight(x).cmp(&char_weight(y)) {
            Ordering::Equal => {}
            res => return res,
        }
    }
}

/// Compare one version component (upstream or revision).
fn compare_component(a: &str, b: &str) -> Ordering {
    let mut a_remaining = a;
    let mut b_remaining = b;

    loop {
        let (a_nondigit, a_rest) = split_first_digit(a_remaining);
        let (b_nondigit, b_rest) = split_first_digit(b_remaining);

        match lexical_compare(a_nondigit, b_nondigit) {
            Ordering::Equal => {}
            res => return res,
        }

        let (a_digits, a_rest) = split_first_nondigit(a_rest);
        let (b_digits, b_rest) = split_first_nondigit(b_rest);

        match compare_digit_runs(a_digits, b_digits) {
            Ordering::Equal => {}
            res => return res,
        }

        if a_rest.is_empty() && b_rest.is_empty() {
            return Ordering::Equal;
        }

        a_remaining = a_rest;
        b_remaining = b_rest;
    }
}

impl PartialOrd<Self> for PackageVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PackageVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        // Epoch numerically, then upstream, then revision. A missing
        // revision compares as "0", which makes it equal to an explicit
        // revision of 0 and earlier than any other.
        match self.epoch_assumed().cmp(&other.epoch_assumed()) {
            Ordering::Equal => {}
            res => return res,
        }

        match compare_component(&self.upstream, &other.upstream) {
            Ordering::Equal => {}
            res => return res,
        }

        let a = self.revision.as_deref().unwrap_or("0");
        let b = other.revision.as_deref().unwrap_or("0");

        compare_component(a, b)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn v(s: &str) -> PackageVersion {
        PackageVersion::parse(s).unwrap()
    }

    #[test]
    fn parse() -> Result<()> {
        assert_eq!(
            PackageVersion::parse("1:4.7.0+dfsg1-2")?,
            PackageVersion {
                epoch: Some(1),
                upstream: "4.7.0+dfsg1".into(),
                revision: Some("2".into()),
            }
        );
        assert_eq!(
            PackageVersion::parse("3.3.2.final~rc2")?,
            PackageVersion {
                epoch: None,
                upstream: "3.3.2.final~rc2".into(),
                revision: None,
            }
        );
        assert_eq!(
            PackageVersion::parse("0.18.0+dfsg-2+b1")?,
            PackageVersion {
                epoch: None,
                upstream: "0.18.0+dfsg".into(),
                revision: Some("2+b1".into())
            }
        );

        assert!(PackageVersion::parse("a:1.0").is_err());
        assert!(PackageVersion::parse("1.0 beta").is_err());
        assert!(PackageVersion::parse("1.0-r_1").is_err());

        Ok(())
    }

    #[test]
    fn format_round_trip() -> Result<()> {
        for s in ["1:4.7.0+dfsg1-2", "3.3.2.final~rc2", "0.18.0+dfsg-2+b1"] {
            assert_eq!(format!("{}", PackageVersion::parse(s)?), s);
        }

        Ok(())
    }

    #[test]
    fn tilde_ordering() {
        // 1.0~~ < 1.0~ < 1.0 < 1.0a
        assert!(v("1.0~~") < v("1.0~"));
        assert!(v("1.0~") < v("1.0"));
        assert!(v("1.0") < v("1.0a"));
        assert!(v("1.0~rc1") < v("1.0"));
        assert!(v("1.0~beta1~svn1245") < v("1.0~beta1"));
    }

    #[test]
    fn letters_before_nonletters() {
        // In the modified lexical ordering all letters sort before all
        // non-letters.
        assert_eq!(compare_component("a", "+"), Ordering::Less);
        assert_eq!(compare_component("1z", "1+"), Ordering::Less);
        assert!(v("1b") > v("1a"));
    }

    #[test]
    fn numeric_runs() {
        assert!(v("1.2") < v("1.10"));
        assert_eq!(v("3:5.2").cmp(&v("3:5.02")), Ordering::Equal);
        assert!(v("2:1.0") > v("1:9.9"));
        assert!(v("1.0-1") < v("1.0-2"));
        assert_eq!(v("1.0").cmp(&v("1.0-0")), Ordering::Equal);

        // Digit runs are unbounded; no integer conversion involved.
        assert!(v("1.99999999999999999999999") > v("1.9"));
        assert!(v("1.18446744073709551616") > v("1.18446744073709551615"));
    }

    #[test]
    fn compare_strings_empty() -> Result<()> {
        assert_eq!(
            PackageVersion::compare_strings("", "0.1")?,
            Ordering::Less
        );
        assert_eq!(
            PackageVersion::compare_strings("0.1", "")?,
            Ordering::Greater
        );
        assert_eq!(PackageVersion::compare_strings("", "")?, Ordering::Equal);
        assert_eq!(
            PackageVersion::compare_strings("1.0~", "1.0")?,
            Ordering::Less
        );

        Ok(())
    }

    #[test]
    fn total_order_properties() {
        let versions = ["1.0~~", "1.0~", "1.0", "1.0a", "1.0-1", "2:0.1", "1.2.3"];

        for a in versions {
            for b in versions {
                let ab = v(a).cmp(&v(b));
                let ba = v(b).cmp(&v(a));
                assert_eq!(ab, ba.reverse(), "{} vs {}", a, b);

                for c in versions {
                    // Transitivity over <=.
                    if v(a) <= v(b) && v(b) <= v(c) {
                        assert!(v(a) <= v(c), "{} <= {} <= {}", a, b, c);
                    }
                }
            }
        }
    }

    #[test]
    fn relation_parse_and_matches() -> Result<()> {
        for (s, rel) in [
            ("<<", VersionRelation::StrictlyEarlier),
            ("lt", VersionRelation::StrictlyEarlier),
            ("<", VersionRelation::StrictlyEarlier),
            ("<=", VersionRelation::EarlierOrEqual),
            ("le", VersionRelation::EarlierOrEqual),
            ("=", VersionRelation::ExactlyEqual),
            ("==", VersionRelation::ExactlyEqual),
            ("eq", VersionRelation::ExactlyEqual),
            (">=", VersionRelation::LaterOrEqual),
            ("ge", VersionRelation::LaterOrEqual),
            (">>", VersionRelation::StrictlyLater),
            ("gt", VersionRelation::StrictlyLater),
            (">", VersionRelation::StrictlyLater),
        ] {
            assert_eq!(s.parse::<VersionRelation>()?, rel, "operator {}", s);
        }

        assert!("~=".parse::<VersionRelation>().is_err());

        let constraint = v("2.4");
        assert!(constraint.satisfied_by(VersionRelation::LaterOrEqual, &v("2.5")));
        assert!(constraint.satisfied_by(VersionRelation::LaterOrEqual, &v("2.4")));
        assert!(!constraint.satisfied_by(VersionRelation::LaterOrEqual, &v("2.3")));
        assert!(constraint.satisfied_by(VersionRelation::StrictlyEarlier, &v("2.3")));
        assert!(!constraint.satisfied_by(VersionRelation::StrictlyEarlier, &v("2.4")));

        Ok(())
    }
}
