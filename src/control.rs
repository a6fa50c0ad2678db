// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Control file primitives.

A control stanza is a sequence of `Field-Name: value` lines where
continuation lines begin with whitespace. Field names are
case-insensitive; the canonical rendering is Title-Case. A paragraph
holds each field at most once.
*/

use {
    crate::error::{Result, WpkgError},
    std::{
        borrow::Cow,
        io::{BufRead, Write},
    },
};

/// Produce the canonical Title-Case rendering of a field name.
///
/// Each hyphen-separated word has its first character upcased and the
/// rest downcased, so `pre-depends` becomes `Pre-Depends`.
pub fn canonical_field_name(name: &str) -> String {
    name.split('-')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// A field in a control stanza.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ControlField<'a> {
    name: Cow<'a, str>,
    value: Cow<'a, str>,
}

impl<'a> ControlField<'a> {
    /// Construct an instance from a field name and value.
    pub fn new(name: Cow<'a, str>, value: Cow<'a, str>) -> Self {
        Self { name, value }
    }

    /// The name of this field as stored.
    pub fn name(&self) -> &str {
        self.name.as_ref()
    }

    /// The value, with original formatting (continuation newlines and
    /// leading whitespace) preserved.
    pub fn value_str(&self) -> &str {
        self.value.as_ref()
    }

    /// Iterate over lines in the value, leading whitespace stripped.
    pub fn iter_lines(&self) -> impl Iterator<Item = &str> {
        self.value.lines().map(|x| x.trim_start())
    }

    /// Iterate over whitespace-delimited words in the value.
    pub fn iter_words(&self) -> impl Iterator<Item = &str> {
        self.value.split_ascii_whitespace()
    }

    /// Write this field to a writer using the canonical name rendering.
    pub fn write<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(canonical_field_name(&self.name).as_bytes())?;
        writer.write_all(b": ")?;
        writer.write_all(self.value.as_bytes())?;
        writer.write_all(b"\n")
    }
}

/// A control stanza: an ordered series of fields.
///
/// Field names compare case-insensitively on read and are preserved as
/// set. Setting a field that already exists replaces the old value.
#[derive(Clone, Debug, Default, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ControlParagraph<'a> {
    fields: Vec<ControlField<'a>>,
}

impl<'a> ControlParagraph<'a> {
    /// Whether the paragraph has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Set the value of a field, replacing any existing value.
    pub fn set_field(&mut self, field: ControlField<'a>) {
        self.fields
            .retain(|cf| !cf.name.eq_ignore_ascii_case(&field.name));
        self.fields.push(field);
    }

    /// Set the value of a field from name and value strings.
    pub fn set_field_from_string(&mut self, name: Cow<'a, str>, value: Cow<'a, str>) {
        self.set_field(ControlField::new(name, value));
    }

    /// Whether a named field is present.
    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Iterate over fields in insertion order.
    pub fn iter_fields(&self) -> impl Iterator<Item = &ControlField<'a>> {
        self.fields.iter()
    }

    /// Obtain the field with the given name.
    pub fn field(&self, name: &str) -> Option<&ControlField<'a>> {
        self.fields
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Remove the field with the given name, returning whether it existed.
    pub fn remove_field(&mut self, name: &str) -> bool {
        let before = self.fields.len();
        self.fields.retain(|f| !f.name.eq_ignore_ascii_case(name));
        before != self.fields.len()
    }

    /// Obtain the raw string value of the named field.
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.field(name).map(|f| f.value_str())
    }

    /// Obtain the value of a field evaluated as a boolean.
    ///
    /// `yes` and `true` (case-insensitive) are true; `no` and `false`
    /// are false; anything else is `None`.
    pub fn field_bool(&self, name: &str) -> Option<bool> {
        self.field_str(name)
            .and_then(|v| match v.to_ascii_lowercase().as_str() {
                "yes" | "true" => Some(true),
                "no" | "false" => Some(false),
                _ => None,
            })
    }

    /// Obtain the value of a field parsed as a signed decimal integer.
    pub fn field_i64(&self, name: &str) -> Option<Result<i64>> {
        self.field_str(name)
            .map(|v| v.trim().parse::<i64>().map_err(WpkgError::ParseInt))
    }

    /// Obtain an iterator of lines in the named field.
    pub fn field_iter_lines(&self, name: &str) -> Option<impl Iterator<Item = &str>> {
        self.field(name).map(|f| f.iter_lines())
    }

    /// Obtain an iterator of words in the named field.
    pub fn field_iter_words(&self, name: &str) -> Option<impl Iterator<Item = &str>> {
        self.field(name).map(|f| f.iter_words())
    }

    /// Serialize the paragraph to a writer.
    ///
    /// A trailing newline is written as part of the final field but no
    /// blank separator line is emitted.
    pub fn write<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        for field in &self.fields {
            field.write(writer)?;
        }

        Ok(())
    }

    /// Serialize the paragraph to a string.
    pub fn to_string_content(&self) -> String {
        let mut buf = Vec::new();
        self.write(&mut buf).expect("write to Vec cannot fail");
        String::from_utf8(buf).expect("control data is UTF-8")
    }
}

/// Incremental parser for control stanzas.
///
/// Fed lines of text; emits a [ControlParagraph] whenever an empty line
/// (or the end of input) completes one.
#[derive(Clone, Debug, Default)]
pub struct ControlFileParser {
    paragraph: ControlParagraph<'static>,
    field: Option<String>,
}

impl ControlFileParser {
    /// Write a line to the parser.
    ///
    /// Returns a completed paragraph when the line terminates one.
    pub fn write_line(&mut self, line: &str) -> Result<Option<ControlParagraph<'static>>> {
        let is_empty_line = line.trim().is_empty();
        let is_continuation = (line.starts_with(' ') || line.starts_with('\t')) && !is_empty_line;

        let current_field = self.field.take();

        if is_empty_line {
            if let Some(field) = current_field {
                self.flush_field(field)?;
            }

            return Ok(if self.paragraph.is_empty() {
                None
            } else {
                Some(std::mem::take(&mut self.paragraph))
            });
        }

        match (current_field, is_continuation) {
            // An unindented line while a field is pending starts a new
            // field; flush the pending one.
            (Some(v), false) => {
                self.flush_field(v)?;
                self.field = Some(line.trim_end_matches('\n').to_string());
                Ok(None)
            }
            (None, false) => {
                self.field = Some(line.trim_end_matches('\n').to_string());
                Ok(None)
            }
            (Some(v), true) => {
                self.field = Some(v + "\n" + line.trim_end_matches('\n'));
                Ok(None)
            }
            (None, true) => Err(WpkgError::ControlParse(format!(
                "continuation line without a field: {:?}",
                line
            ))),
        }
    }

    /// Finish parsing, consuming self.
    pub fn finish(mut self) -> Result<Option<ControlParagraph<'static>>> {
        if let Some(field) = self.field.take() {
            self.flush_field(field)?;
        }

        Ok(if self.paragraph.is_empty() {
            None
        } else {
            Some(self.paragraph)
        })
    }

    fn flush_field(&mut self, v: String) -> Result<()> {
        let (name, value) = v.split_once(':').ok_or_else(|| {
            WpkgError::ControlParse(format!("field line {:?} is missing a colon", v))
        })?;

        if name.trim().is_empty() || name.contains(char::is_whitespace) {
            return Err(WpkgError::ControlParse(format!(
                "invalid field name in line {:?}",
                v
            )));
        }

        self.paragraph.set_field_from_string(
            Cow::Owned(name.to_string()),
            Cow::Owned(value.trim().to_string()),
        );

        Ok(())
    }
}

/// Streaming reader of [ControlParagraph] from a [BufRead] source.
///
/// Can be consumed as an iterator; each step reads one full paragraph.
pub struct ControlParagraphReader<R: BufRead> {
    reader: R,
    parser: Option<ControlFileParser>,
}

impl<R: BufRead> ControlParagraphReader<R> {
    /// Create a new instance bound to a reader.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            parser: Some(ControlFileParser::default()),
        }
    }

    /// Consume the instance, returning the original reader.
    pub fn into_inner(self) -> R {
        self.reader
    }

    fn get_next(&mut self) -> Result<Option<ControlParagraph<'static>>> {
        let mut parser = self.parser.take().expect("parser present when iterating");

        loop {
            let mut line = String::new();

            if self.reader.read_line(&mut line)? != 0 {
                if let Some(paragraph) = parser.write_line(&line)? {
                    self.parser.replace(parser);
                    return Ok(Some(paragraph));
                }
            } else {
                return parser.finish();
            }
        }
    }
}

impl<R: BufRead> Iterator for ControlParagraphReader<R> {
    type Item = Result<ControlParagraph<'static>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.parser.is_none() {
            None
        } else {
            match self.get_next() {
                Ok(Some(para)) => Some(Ok(para)),
                Ok(None) => None,
                Err(e) => Some(Err(e)),
            }
        }
    }
}

/// A control file: an ordered series of paragraphs.
#[derive(Clone, Debug, Default)]
pub struct ControlFile<'a> {
    paragraphs: Vec<ControlParagraph<'a>>,
}

impl<'a> ControlFile<'a> {
    /// Construct an instance by parsing data from a reader.
    pub fn parse_reader<R: BufRead>(reader: &mut R) -> Result<Self> {
        let mut paragraphs = Vec::new();
        let mut parser = ControlFileParser::default();

        loop {
            let mut line = String::new();
            if reader.read_line(&mut line)? == 0 {
                break;
            }

            if let Some(paragraph) = parser.write_line(&line)? {
                paragraphs.push(paragraph);
            }
        }

        if let Some(paragraph) = parser.finish()? {
            paragraphs.push(paragraph);
        }

        Ok(Self { paragraphs })
    }

    /// Parse a control file from a string.
    pub fn parse_str(s: &str) -> Result<Self> {
        let mut reader = std::io::BufReader::new(s.as_bytes());
        Self::parse_reader(&mut reader)
    }

    /// Add a paragraph to this control file.
    pub fn add_paragraph(&mut self, p: ControlParagraph<'a>) {
        self.paragraphs.push(p);
    }

    /// Obtain paragraphs in this control file.
    pub fn paragraphs(&self) -> impl Iterator<Item = &ControlParagraph<'a>> {
        self.paragraphs.iter()
    }

    /// Obtain paragraphs, consuming self.
    pub fn into_paragraphs(self) -> impl Iterator<Item = ControlParagraph<'a>> {
        self.paragraphs.into_iter()
    }

    /// Serialize the control file to a writer.
    ///
    /// Paragraphs are separated by a blank line.
    pub fn write<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        for p in &self.paragraphs {
            p.write(writer)?;
            writer.write_all(b"\n")?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_case_canonicalization() {
        assert_eq!(canonical_field_name("package"), "Package");
        assert_eq!(canonical_field_name("pre-depends"), "Pre-Depends");
        assert_eq!(canonical_field_name("MD5SUMS"), "Md5sums");
        assert_eq!(canonical_field_name("X-Drive-Letter"), "X-Drive-Letter");
    }

    #[test]
    fn field_set_semantics() {
        let mut p = ControlParagraph::default();

        p.set_field_from_string("foo".into(), "bar".into());
        p.set_field_from_string("foo".into(), "baz".into());
        assert_eq!(p.field_str("foo"), Some("baz"));

        // Different case replaces too.
        p.set_field_from_string("FOO".into(), "bar".into());
        assert_eq!(p.field_str("foo"), Some("bar"));
        assert_eq!(p.field_str("FOO"), Some("bar"));
        assert_eq!(p.iter_fields().count(), 1);
    }

    #[test]
    fn bool_and_int_fields() {
        let mut p = ControlParagraph::default();
        p.set_field_from_string("Essential".into(), "Yes".into());
        p.set_field_from_string("Flag".into(), "FALSE".into());
        p.set_field_from_string("Installed-Size".into(), "-12".into());
        p.set_field_from_string("Bad".into(), "maybe".into());

        assert_eq!(p.field_bool("Essential"), Some(true));
        assert_eq!(p.field_bool("Flag"), Some(false));
        assert_eq!(p.field_bool("Bad"), None);
        assert_eq!(p.field_i64("Installed-Size").unwrap().unwrap(), -12);
    }

    #[test]
    fn parse_stanza_with_continuations() -> Result<()> {
        let text = "Package: t1\nVersion: 1.0\nDescription: short\n long line one\n long line two\n\nPackage: t2\nVersion: 2.0\n";

        let paragraphs = ControlParagraphReader::new(std::io::Cursor::new(text))
            .collect::<Result<Vec<_>>>()?;

        assert_eq!(paragraphs.len(), 2);
        assert_eq!(paragraphs[0].field_str("package"), Some("t1"));

        let desc = paragraphs[0].field("Description").unwrap();
        assert_eq!(
            desc.iter_lines().collect::<Vec<_>>(),
            vec!["short", "long line one", "long line two"]
        );

        assert_eq!(paragraphs[1].field_str("Package"), Some("t2"));

        Ok(())
    }

    #[test]
    fn unknown_fields_round_trip() -> Result<()> {
        let text = "Package: t1\nX-Custom-Marker: kept verbatim\n";
        let cf = ControlFile::parse_str(text)?;
        let para = cf.paragraphs().next().unwrap();

        assert_eq!(para.field_str("x-custom-marker"), Some("kept verbatim"));

        let mut out = Vec::new();
        para.write(&mut out).unwrap();
        let rendered = String::from_utf8(out).unwrap();
        assert!(rendered.contains("X-Custom-Marker: kept verbatim\n"));

        Ok(())
    }

    #[test]
    fn missing_colon_is_fatal() {
        let mut parser = ControlFileParser::default();
        parser.write_line("Package t1\n").unwrap();
        assert!(parser.finish().is_err());
    }

    #[test]
    fn continuation_without_field_is_fatal() {
        let mut parser = ControlFileParser::default();
        assert!(parser.write_line(" dangling\n").is_err());
    }
}
