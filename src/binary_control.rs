// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Typed view of a binary package control stanza.

Wraps a [ControlParagraph] and provides accessors for the well-known
fields. Mandatory fields (Package, Version, Architecture, Maintainer,
Description) have getters returning [Result]; optional fields return
[Option]. Unknown fields are retained verbatim by the underlying
paragraph.
*/

use {
    crate::{
        architecture::Architecture,
        control::ControlParagraph,
        dependency::{DependencyList, PackageRelationships},
        error::{Result, WpkgError},
        package_version::PackageVersion,
    },
    std::ops::{Deref, DerefMut},
};

/// Fields that must be present on every binary package.
pub const MANDATORY_FIELDS: &[&str] = &[
    "Package",
    "Version",
    "Architecture",
    "Maintainer",
    "Description",
];

/// Validate a package name against `[a-z0-9][a-z0-9+.-]*`.
pub fn validate_package_name(name: &str) -> Result<()> {
    let mut chars = name.chars();

    let valid = match chars.next() {
        Some(first) if first.is_ascii_lowercase() || first.is_ascii_digit() => chars.all(|c| {
            c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '+' | '.' | '-')
        }),
        _ => false,
    };

    if valid {
        Ok(())
    } else {
        Err(WpkgError::InvalidPackageName(name.to_string()))
    }
}

/// A binary package control stanza with typed accessors.
#[derive(Clone, Debug, Default, Eq, Hash, PartialEq)]
pub struct BinaryControl<'a> {
    paragraph: ControlParagraph<'a>,
}

impl<'a> Deref for BinaryControl<'a> {
    type Target = ControlParagraph<'a>;

    fn deref(&self) -> &Self::Target {
        &self.paragraph
    }
}

impl<'a> DerefMut for BinaryControl<'a> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.paragraph
    }
}

impl<'a> From<ControlParagraph<'a>> for BinaryControl<'a> {
    fn from(paragraph: ControlParagraph<'a>) -> Self {
        Self { paragraph }
    }
}

impl<'a> From<BinaryControl<'a>> for ControlParagraph<'a> {
    fn from(control: BinaryControl<'a>) -> Self {
        control.paragraph
    }
}

impl<'a> BinaryControl<'a> {
    fn required_field_str(&self, name: &'static str) -> Result<&str> {
        self.paragraph
            .field_str(name)
            .ok_or(WpkgError::ControlRequiredFieldMissing(name))
    }

    /// The `Package` field value.
    pub fn package(&self) -> Result<&str> {
        self.required_field_str("Package")
    }

    /// The `Version` field as its original string.
    pub fn version_str(&self) -> Result<&str> {
        self.required_field_str("Version")
    }

    /// The `Version` field parsed into a [PackageVersion].
    pub fn version(&self) -> Result<PackageVersion> {
        Ok(PackageVersion::parse(self.version_str()?)?)
    }

    /// The `Architecture` field as its original string.
    pub fn architecture_str(&self) -> Result<&str> {
        self.required_field_str("Architecture")
    }

    /// The `Architecture` field parsed into an [Architecture].
    pub fn architecture(&self) -> Result<Architecture> {
        self.architecture_str()?.parse()
    }

    /// The `Maintainer` field.
    pub fn maintainer(&self) -> Result<&str> {
        self.required_field_str("Maintainer")
    }

    /// The `Description` field.
    pub fn description(&self) -> Result<&str> {
        self.required_field_str("Description")
    }

    /// The `Essential` field evaluated as a boolean.
    pub fn essential(&self) -> bool {
        self.paragraph.field_bool("Essential").unwrap_or(false)
    }

    /// The `X-Drive-Letter` field evaluated as a boolean.
    pub fn drive_letter(&self) -> bool {
        self.paragraph.field_bool("X-Drive-Letter").unwrap_or(false)
    }

    /// The `Distribution` field.
    pub fn distribution(&self) -> Option<&str> {
        self.paragraph.field_str("Distribution")
    }

    /// The `Minimum-Upgradable-Version` field, parsed.
    pub fn minimum_upgradable_version(&self) -> Option<Result<PackageVersion>> {
        self.paragraph
            .field_str("Minimum-Upgradable-Version")
            .map(|v| Ok(PackageVersion::parse(v)?))
    }

    /// The `Installed-Size` field, parsed.
    pub fn installed_size(&self) -> Option<Result<i64>> {
        self.paragraph.field_i64("Installed-Size")
    }

    /// The `Depends` field, parsed.
    pub fn depends(&self) -> Option<Result<DependencyList>> {
        self.field_dependency_list("Depends")
    }

    /// The `Pre-Depends` field, parsed.
    pub fn pre_depends(&self) -> Option<Result<DependencyList>> {
        self.field_dependency_list("Pre-Depends")
    }

    fn field_dependency_list(&self, name: &str) -> Option<Result<DependencyList>> {
        self.paragraph
            .field_str(name)
            .map(|v| DependencyList::parse(v).map_err(WpkgError::Dependency))
    }

    /// Parsed values of all dependency-bearing fields.
    pub fn relationships(&self) -> Result<PackageRelationships> {
        Ok(PackageRelationships::from_paragraph(&self.paragraph)?)
    }

    /// Validate this stanza as a complete binary package control.
    ///
    /// Enforced at package creation and again at install-time. Checks
    /// mandatory-field presence, the package name grammar, and that the
    /// version, architecture, and dependency fields parse.
    pub fn validate(&self) -> Result<()> {
        for field in MANDATORY_FIELDS {
            if !self.paragraph.has_field(field) {
                return Err(WpkgError::ControlRequiredFieldMissing(field));
            }
        }

        validate_package_name(self.package()?)?;
        self.version()?;
        self.architecture()?;
        self.relationships()?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::ControlFile;

    fn stanza(text: &str) -> BinaryControl<'static> {
        ControlFile::parse_str(text)
            .unwrap()
            .into_paragraphs()
            .next()
            .unwrap()
            .into()
    }

    const COMPLETE: &str = "Package: t1\nVersion: 1.0\nArchitecture: linux-amd64\nMaintainer: Alexis <alexis@m2osw.example>\nDescription: test package\n";

    #[test]
    fn package_name_grammar() {
        assert!(validate_package_name("t1").is_ok());
        assert!(validate_package_name("lib-foo+bar.baz").is_ok());
        assert!(validate_package_name("0ad").is_ok());

        assert!(validate_package_name("").is_err());
        assert!(validate_package_name("Upper").is_err());
        assert!(validate_package_name("-dash").is_err());
        assert!(validate_package_name("with space").is_err());
        assert!(validate_package_name("under_score").is_err());
    }

    #[test]
    fn complete_stanza_validates() {
        let control = stanza(COMPLETE);
        assert!(control.validate().is_ok());
        assert_eq!(control.package().unwrap(), "t1");
        assert_eq!(
            control.version().unwrap(),
            PackageVersion::parse("1.0").unwrap()
        );
        assert!(!control.essential());
    }

    #[test]
    fn missing_mandatory_field_is_fatal() {
        let control = stanza("Package: t1\nVersion: 1.0\nArchitecture: all\n");
        match control.validate() {
            Err(WpkgError::ControlRequiredFieldMissing(name)) => {
                assert_eq!(name, "Maintainer");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn malformed_version_is_fatal() {
        let control = stanza(
            "Package: t1\nVersion: not a version\nArchitecture: all\nMaintainer: m\nDescription: d\n",
        );
        assert!(control.validate().is_err());
    }

    #[test]
    fn essential_and_drive_letter_flags() {
        let control = stanza(&format!("{}Essential: yes\nX-Drive-Letter: Yes\n", COMPLETE));
        assert!(control.essential());
        assert!(control.drive_letter());
    }

    #[test]
    fn dependency_fields_parse_through_grammar() {
        let control = stanza(&format!("{}Depends: a (>= 1.0), b | c\n", COMPLETE));
        let rel = control.relationships().unwrap();
        assert_eq!(rel.depends.unwrap().requirements().count(), 2);

        let control = stanza(&format!("{}Depends: a (~~ 1.0)\n", COMPLETE));
        assert!(control.validate().is_err());
    }
}
