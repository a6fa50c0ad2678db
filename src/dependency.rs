// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Package dependency expression handling.

A dependency list is a comma-delimited series of clauses (AND). Each
clause is one or more alternatives delimited by `|` (OR). Each
alternative is `name [(op version)] [[!]arch …]` where the optional
bracketed architecture qualifier is a whitespace list whose items must
all carry the same sense (all negated or none).
*/

use {
    crate::{
        architecture::Architecture,
        control::ControlParagraph,
        package_version::{PackageVersion, VersionError, VersionRelation},
    },
    once_cell::sync::Lazy,
    regex::Regex,
    std::fmt::{Display, Formatter},
    std::ops::{Deref, DerefMut},
    thiserror::Error,
};

/// Regular expression matching a single dependency alternative.
static RE_DEPENDENCY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?x)
        ^
        # Package name terminates at whitespace, ( or [.
        (?P<package>[^\s\[(]+)
        \s*
        # Optional parenthesized version restriction.
        (?:\(
            \s*
            # Longer operators first so << is not read as two <.
            (?P<relop>(<<|<=|==|<|>=|>>|>|=|lt|le|eq|ge|gt))
            \s*
            (?P<version>[^\s)]+)
            \s*
        \))?
        \s*
        # Optional bracketed architecture qualifier list.
        (?:\[
            (?P<arches>[^\]]+)
        \])?
        \s*
        $
        "#,
    )
    .expect("static regex compiles")
});

/// Errors related to dependency handling.
#[derive(Debug, Error)]
pub enum DependencyError {
    #[error("failed to parse dependency expression: {0}")]
    DependencyParse(String),

    #[error("architecture qualifier mixes negated and plain items: {0}")]
    MixedArchSense(String),

    #[error("version parsing error: {0}")]
    Version(#[from] VersionError),
}

/// Result type for dependency handling.
pub type Result<T> = std::result::Result<T, DependencyError>;

/// An architecture qualifier on a dependency alternative.
///
/// Either a positive list ("only on these") or a negative list
/// ("everywhere but these").
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ArchQualifier {
    pub negated: bool,
    pub arches: Vec<String>,
}

impl ArchQualifier {
    fn parse(s: &str) -> Result<Self> {
        let mut negated = None;
        let mut arches = vec![];

        for item in s.split_ascii_whitespace() {
            let (this_negated, name) = match item.strip_prefix('!') {
                Some(name) => (true, name),
                None => (false, item),
            };

            match negated {
                None => negated = Some(this_negated),
                Some(sense) if sense != this_negated => {
                    return Err(DependencyError::MixedArchSense(s.to_string()));
                }
                Some(_) => {}
            }

            arches.push(name.to_string());
        }

        if arches.is_empty() {
            return Err(DependencyError::DependencyParse(s.to_string()));
        }

        Ok(Self {
            negated: negated.unwrap_or(false),
            arches,
        })
    }

    /// Whether this qualifier applies to the given architecture.
    pub fn applies_to(&self, arch: &Architecture) -> bool {
        let named = self.arches.iter().any(|q| arch.matches_qualifier(q));

        if self.negated {
            !named
        } else {
            named
        }
    }
}

impl Display for ArchQualifier {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        let rendered = self
            .arches
            .iter()
            .map(|a| {
                if self.negated {
                    format!("!{}", a)
                } else {
                    a.clone()
                }
            })
            .collect::<Vec<_>>()
            .join(" ");

        write!(f, "[{}]", rendered)
    }
}

/// A single dependency alternative.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SingleDependency {
    /// Package the dependency is on.
    pub package: String,
    /// Optional version restriction.
    pub constraint: Option<(VersionRelation, PackageVersion)>,
    /// Optional architecture qualifier.
    pub architectures: Option<ArchQualifier>,
}

impl Display for SingleDependency {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(f, "{}", self.package)?;
        if let Some((rel, version)) = &self.constraint {
            write!(f, " ({} {})", rel, version)?;
        }
        if let Some(arches) = &self.architectures {
            write!(f, " {}", arches)?;
        }

        Ok(())
    }
}

impl SingleDependency {
    /// Parse a single dependency expression.
    pub fn parse(s: &str) -> Result<Self> {
        let caps = RE_DEPENDENCY
            .captures(s)
            .ok_or_else(|| DependencyError::DependencyParse(s.to_string()))?;

        let package = caps["package"].to_string();

        let constraint = match (caps.name("relop"), caps.name("version")) {
            (Some(relop), Some(version)) => {
                let relop = relop
                    .as_str()
                    .parse::<VersionRelation>()
                    .map_err(DependencyError::Version)?;
                let version = PackageVersion::parse(version.as_str())?;

                Some((relop, version))
            }
            _ => None,
        };

        let architectures = match caps.name("arches") {
            Some(arches) => Some(ArchQualifier::parse(arches.as_str())?),
            None => None,
        };

        Ok(Self {
            package,
            constraint,
            architectures,
        })
    }

    /// Evaluate whether a concrete package satisfies this expression.
    pub fn satisfied_by(
        &self,
        package: &str,
        version: &PackageVersion,
        arch: &Architecture,
    ) -> bool {
        if self.package != package {
            return false;
        }

        if let Some(qualifier) = &self.architectures {
            if !qualifier.applies_to(arch) {
                return false;
            }
        }

        match &self.constraint {
            Some((relation, wanted)) => wanted.satisfied_by(*relation, version),
            None => true,
        }
    }

    /// Evaluate whether a virtual package provided at `provided` (or at
    /// an unspecified version) satisfies this expression.
    ///
    /// An unversioned `Provides` satisfies only unversioned constraints.
    pub fn satisfied_by_virtual(&self, package: &str, provided: Option<&PackageVersion>) -> bool {
        if self.package != package {
            return false;
        }

        match (&self.constraint, provided) {
            (None, _) => true,
            (Some(_), None) => false,
            (Some((relation, wanted)), Some(provided)) => {
                wanted.satisfied_by(*relation, provided)
            }
        }
    }
}

/// The `|`-separated alternatives of one clause.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DependencyAlternatives(Vec<SingleDependency>);

impl Display for DependencyAlternatives {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "{}",
            self.0
                .iter()
                .map(|x| x.to_string())
                .collect::<Vec<_>>()
                .join(" | ")
        )
    }
}

impl Deref for DependencyAlternatives {
    type Target = Vec<SingleDependency>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for DependencyAlternatives {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

impl DependencyAlternatives {
    /// Whether any alternative is satisfied by the given package.
    pub fn satisfied_by(
        &self,
        package: &str,
        version: &PackageVersion,
        arch: &Architecture,
    ) -> bool {
        self.0
            .iter()
            .any(|alt| alt.satisfied_by(package, version, arch))
    }
}

/// An ordered list of dependency clauses, comma-delimited on parse.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DependencyList {
    clauses: Vec<DependencyAlternatives>,
}

impl Display for DependencyList {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "{}",
            self.clauses
                .iter()
                .map(|x| x.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        )
    }
}

impl DependencyList {
    /// Parse a dependency list from a string.
    pub fn parse(s: &str) -> Result<Self> {
        let mut clauses = vec![];

        for clause in s.split(',') {
            let clause = clause.trim();

            if clause.is_empty() {
                continue;
            }

            let mut alternatives = DependencyAlternatives::default();

            for alt in clause.split('|') {
                alternatives.push(SingleDependency::parse(alt.trim())?);
            }

            clauses.push(alternatives);
        }

        Ok(Self { clauses })
    }

    /// Obtain the clauses constituting this list.
    pub fn requirements(&self) -> impl Iterator<Item = &DependencyAlternatives> {
        self.clauses.iter()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Whether at least one clause is satisfied by the given package.
    pub fn any_satisfied_by(
        &self,
        package: &str,
        version: &PackageVersion,
        arch: &Architecture,
    ) -> bool {
        self.clauses
            .iter()
            .any(|alts| alts.satisfied_by(package, version, arch))
    }
}

/// The parsed dependency-bearing fields of a binary package.
#[derive(Clone, Debug, Default)]
pub struct PackageRelationships {
    /// `Depends`.
    pub depends: Option<DependencyList>,

    /// `Pre-Depends`.
    pub pre_depends: Option<DependencyList>,

    /// `Recommends`.
    pub recommends: Option<DependencyList>,

    /// `Suggests`.
    pub suggests: Option<DependencyList>,

    /// `Enhances`.
    pub enhances: Option<DependencyList>,

    /// `Conflicts`.
    pub conflicts: Option<DependencyList>,

    /// `Breaks`.
    pub breaks: Option<DependencyList>,

    /// `Provides`.
    pub provides: Option<DependencyList>,

    /// `Replaces`.
    pub replaces: Option<DependencyList>,

    /// `Built-Using`.
    pub built_using: Option<DependencyList>,
}

impl PackageRelationships {
    /// Construct an instance from a control paragraph.
    pub fn from_paragraph(para: &ControlParagraph) -> Result<Self> {
        let get_field = |field| -> Result<Option<DependencyList>> {
            para.field_str(field)
                .map(DependencyList::parse)
                .transpose()
        };

        Ok(Self {
            depends: get_field("Depends")?,
            pre_depends: get_field("Pre-Depends")?,
            recommends: get_field("Recommends")?,
            suggests: get_field("Suggests")?,
            enhances: get_field("Enhances")?,
            conflicts: get_field("Conflicts")?,
            breaks: get_field("Breaks")?,
            provides: get_field("Provides")?,
            replaces: get_field("Replaces")?,
            built_using: get_field("Built-Using")?,
        })
    }
}
