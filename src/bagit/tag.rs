use log::info;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;
use std::slice::Iter;
use std::vec::IntoIter;

use snafu::ResultExt;

use crate::bagit::consts::*;
use crate::bagit::encoding::TagFileEncoding;
use crate::bagit::error::*;
use crate::bagit::io::{is_space_or_tab, LineReader};

/// A single `label: value` entry from a tag file, in file order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tag {
    label: String,
    value: String,
}

impl Tag {
    pub fn new<L: AsRef<str>, V: AsRef<str>>(label: L, value: V) -> Result<Self> {
        let label = label.as_ref();
        if label.contains(':') || label.trim().is_empty() {
            return InvalidTagSnafu {
                label,
                details: "label must be non-empty and must not contain ':'",
            }
            .fail();
        }

        Ok(Self {
            label: label.to_string(),
            value: value.as_ref().to_string(),
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

/// An ordered, possibly-repeating collection of tags, as found in
/// `bagit.txt`, `bag-info.txt`/`package-info.txt`, or a `tagmanifest` entry's
/// metadata. File order is preserved on both read and write.
#[derive(Debug, Default, Clone)]
pub struct TagList {
    tags: Vec<Tag>,
}

impl TagList {
    pub fn new() -> Self {
        Self { tags: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            tags: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    /// Appends a tag, rejecting it if its label is invalid, and if the label
    /// is a reserved, non-repeatable one that's already present.
    pub fn add_tag<L: AsRef<str>, V: AsRef<str>>(&mut self, label: L, value: V) -> Result<()> {
        let label = label.as_ref();
        if !Self::is_repeatable(label) && self.get(label).is_some() {
            return InvalidTagSnafu {
                label,
                details: "this tag may only appear once",
            }
            .fail();
        }

        self.tags.push(Tag::new(label, value)?);
        Ok(())
    }

    /// Appends a tag without enforcing the repeatability rule. Used while
    /// reading an existing bag, where a non-standard-compliant duplicate
    /// should still surface as a validation warning/error rather than a
    /// hard parse failure.
    pub fn push_unchecked(&mut self, tag: Tag) {
        self.tags.push(tag);
    }

    pub fn remove_tags<S: AsRef<str>>(&mut self, label: S) {
        let label = label.as_ref();
        self.tags.retain(|e| !e.label.eq_ignore_ascii_case(label));
    }

    /// Returns the first value associated with `label`, matched
    /// case-insensitively, as most bag-info lookups expect.
    pub fn get(&self, label: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|t| t.label.eq_ignore_ascii_case(label))
            .map(|t| t.value.as_str())
    }

    /// Returns every value associated with `label`, in file order.
    pub fn get_all(&self, label: &str) -> Vec<&str> {
        self.tags
            .iter()
            .filter(|t| t.label.eq_ignore_ascii_case(label))
            .map(|t| t.value.as_str())
            .collect()
    }

    pub fn contains(&self, label: &str) -> bool {
        self.get(label).is_some()
    }

    /// Counts occurrences of every label, used to detect accidental
    /// duplicates of non-repeatable reserved headers while loading.
    pub fn label_counts(&self) -> HashMap<String, usize> {
        let mut counts = HashMap::new();
        for tag in &self.tags {
            *counts.entry(tag.label.to_ascii_lowercase()).or_insert(0) += 1;
        }
        counts
    }

    fn is_repeatable(label: &str) -> bool {
        let lower = label.to_ascii_lowercase();
        LABEL_REPEATABLE
            .iter()
            .find(|(name, _)| *name == lower)
            .map(|(_, repeatable)| *repeatable)
            .unwrap_or(true)
    }
}

impl IntoIterator for TagList {
    type Item = Tag;
    type IntoIter = IntoIter<Self::Item>;

    fn into_iter(self) -> Self::IntoIter {
        self.tags.into_iter()
    }
}

impl<'a> IntoIterator for &'a TagList {
    type Item = &'a Tag;
    type IntoIter = Iter<'a, Tag>;

    fn into_iter(self) -> Self::IntoIter {
        self.tags.iter()
    }
}

/// Reads and writes BagIt tag files: RFC 2822-style `label: value` entries,
/// with line folding on continuation lines and blank lines ignored.
pub struct TagCodec;

impl TagCodec {
    /// Writes `tags` to `destination` as UTF-8, with headers sorted
    /// lexicographically (a stable sort, so a repeated header's values keep
    /// their relative order) and any embedded CR/LF in a value replaced with
    /// a space rather than folded onto a continuation line, matching
    /// `original_source/bagit_modules/tagging.py::make_tag_file`.
    pub fn emit<P: AsRef<Path>>(tags: &TagList, destination: P) -> Result<()> {
        let destination = destination.as_ref();
        info!("Writing tag file {}", destination.display());

        let mut writer = BufWriter::new(
            File::create(destination).context(IoCreateSnafu { path: destination })?,
        );

        let mut sorted: Vec<&Tag> = tags.into_iter().collect();
        sorted.sort_by(|a, b| a.label.cmp(&b.label));

        for tag in sorted {
            let value = strip_line_endings(&tag.value);
            writeln!(writer, "{}: {value}", tag.label).context(IoWriteSnafu { path: destination })?;
        }

        Ok(())
    }

    /// Reads a tag file's raw bytes, decoding them per `encoding` (stripping
    /// a leading BOM if present) and parsing the result into a [`TagList`].
    /// Returns the parsed tags plus whether a BOM was stripped.
    pub fn load_bytes(bytes: &[u8], encoding: TagFileEncoding) -> Result<(TagList, bool)> {
        let (text, had_bom) = encoding.decode_with_bom(bytes);
        let tags = Self::parse(text.as_bytes())?;
        Ok((tags, had_bom))
    }

    /// Parses already-decoded UTF-8 tag file content.
    pub fn parse<R: Read>(reader: R) -> Result<TagList> {
        let mut tags = TagList::new();

        for (num, folded) in FilteredFold::new(reader).enumerate() {
            let folded = folded?;
            let (label, value) = Self::split_entry(&folded).ok_or_else(|| {
                Error::InvalidTagLine {
                    details: format!("entry {} (\"{folded}\") is missing a ':' separator", num + 1),
                }
            })?;
            tags.push_unchecked(Tag::new(label, value)?);
        }

        Ok(tags)
    }

    fn split_entry(line: &str) -> Option<(&str, &str)> {
        let idx = line.find(':')?;
        let label = line[..idx].trim();
        let value = line[idx + 1..].trim();
        Some((label, value))
    }
}

/// Replaces every `\r\n` or lone `\n` with a single space; a lone `\r` is
/// left untouched. Matches Python's `re.sub(r"\r?\n", " ", txt)`.
fn strip_line_endings(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '\r' && chars.peek() == Some(&'\n') {
            chars.next();
            out.push(' ');
        } else if c == '\n' {
            out.push(' ');
        } else {
            out.push(c);
        }
    }

    out
}

/// Folds continuation lines the way RFC 2822 headers do (a line starting
/// with whitespace continues the previous one), except a blank or
/// all-whitespace physical line is dropped entirely rather than folded
/// into the previous or next entry, matching how tag files tolerate blank
/// lines in practice.
struct FilteredFold<R: Read> {
    reader: LineReader<R>,
    next: Option<String>,
}

impl<R: Read> FilteredFold<R> {
    fn new(reader: R) -> Self {
        Self {
            reader: LineReader::new(reader),
            next: None,
        }
    }
}

impl<R: Read> Iterator for FilteredFold<R> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut current = self.next.take();

        loop {
            match self.reader.next() {
                Some(Err(e)) => return Some(Err(e)),
                None => {
                    return current.map(Ok);
                }
                Some(Ok(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }

                    if current.is_some() && line.starts_with(is_space_or_tab) {
                        let current = current.as_mut().unwrap();
                        current.push(' ');
                        current.push_str(line.trim_start_matches(is_space_or_tab));
                    } else if current.is_some() {
                        self.next = Some(line);
                        return current.map(Ok);
                    } else {
                        current = Some(line);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_tag_rejects_colon_in_label() {
        let mut tags = TagList::new();
        assert!(tags.add_tag("Bad:Label", "value").is_err());
    }

    #[test]
    fn add_tag_rejects_duplicate_non_repeatable_label() {
        let mut tags = TagList::new();
        tags.add_tag(LABEL_BAGGING_DATE, "2024-01-01").unwrap();
        assert!(tags.add_tag(LABEL_BAGGING_DATE, "2024-01-02").is_err());
    }

    #[test]
    fn add_tag_allows_duplicate_repeatable_label() {
        let mut tags = TagList::new();
        tags.add_tag(LABEL_CONTACT_NAME, "Alice").unwrap();
        tags.add_tag(LABEL_CONTACT_NAME, "Bob").unwrap();
        assert_eq!(tags.get_all(LABEL_CONTACT_NAME), vec!["Alice", "Bob"]);
    }

    #[test]
    fn get_is_case_insensitive() {
        let mut tags = TagList::new();
        tags.add_tag("Source-Organization", "Example Org").unwrap();
        assert_eq!(tags.get("source-organization"), Some("Example Org"));
    }

    #[test]
    fn parse_skips_blank_lines_and_folds_continuations() {
        let input = "Tag-1: normal tag\n\nTag-2: first\n  second\n\t third\nTag-3: end";
        let tags = TagCodec::parse(input.as_bytes()).unwrap();

        assert_eq!(tags.get("Tag-1"), Some("normal tag"));
        assert_eq!(tags.get("Tag-2"), Some("first second third"));
        assert_eq!(tags.get("Tag-3"), Some("end"));
    }

    #[test]
    fn parse_rejects_entry_without_colon() {
        let input = "not a valid entry";
        assert!(TagCodec::parse(input.as_bytes()).is_err());
    }

    #[test]
    fn emit_then_parse_round_trips_multiline_value() {
        let mut tags = TagList::new();
        tags.add_tag("External-Description", "line one\nline two").unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bag-info.txt");
        TagCodec::emit(&tags, &path).unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let (parsed, had_bom) = TagCodec::load_bytes(&bytes, TagFileEncoding::utf8()).unwrap();

        assert!(!had_bom);
        assert_eq!(parsed.get("External-Description"), Some("line one line two"));
    }

    #[test]
    fn emit_writes_headers_sorted_lexicographically() {
        let mut tags = TagList::new();
        tags.add_tag("Zebra", "z").unwrap();
        tags.add_tag("Apple", "a").unwrap();
        tags.add_tag(LABEL_CONTACT_NAME, "Alice").unwrap();
        tags.add_tag(LABEL_CONTACT_NAME, "Bob").unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bag-info.txt");
        TagCodec::emit(&tags, &path).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        let labels: Vec<&str> = written
            .lines()
            .map(|line| line.split_once(':').unwrap().0)
            .collect();

        assert_eq!(
            labels,
            vec!["Apple", LABEL_CONTACT_NAME, LABEL_CONTACT_NAME, "Zebra"]
        );
        assert!(written.contains("Alice"));
        assert!(written.contains("Bob"));
        assert!(written.find("Alice").unwrap() < written.find("Bob").unwrap());
    }

    #[test]
    fn strip_line_endings_replaces_crlf_and_lf_but_not_lone_cr() {
        assert_eq!(strip_line_endings("a\r\nb\nc\rd"), "a b c\rd");
    }
}
