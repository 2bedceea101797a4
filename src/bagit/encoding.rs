use crate::bagit::consts::*;
use crate::bagit::error::*;
use encoding_rs::Encoding;
use once_cell::sync::Lazy;
use regex::Regex;
use std::borrow::Cow;

const CR_ENCODED: &str = "%0D";
const LF_ENCODED: &str = "%0A";
const PERCENT_ENCODED: &str = "%25";

static PERCENT_SEQUENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)%0d|%0a|%25").unwrap());

/// Percent encodes any CR, LF, or % characters in the input string
pub fn percent_encode(value: &str) -> Cow<str> {
    if let Some(i) = value.find(|c: char| c == CR || c == LF || c == '%') {
        let mut encoded = Vec::with_capacity(value.len() + 2);
        encoded.extend_from_slice(value[..i].as_bytes());

        let search = value[i..].bytes();

        for c in search {
            match c {
                CR_B => encoded.extend_from_slice(CR_ENCODED.as_bytes()),
                LF_B => encoded.extend_from_slice(LF_ENCODED.as_bytes()),
                b'%' => encoded.extend_from_slice(PERCENT_ENCODED.as_bytes()),
                _ => encoded.push(c),
            }
        }

        // This is fine because the original value is known to be valid UTF-8
        Cow::Owned(unsafe { String::from_utf8_unchecked(encoded) })
    } else {
        value.into()
    }
}

/// Reverses [`percent_encode`]. `%0D`, `%0A`, and `%25` are decoded
/// case-insensitively back to CR, LF, and `%`; any other `%XX` sequence is
/// left untouched, since only those three are ever produced by the encoder.
pub fn percent_decode(value: &str) -> Cow<str> {
    if !value.contains('%') {
        return value.into();
    }

    PERCENT_SEQUENCE.replace_all(value, |caps: &regex::Captures| {
        let matched = &caps[0];
        if matched.eq_ignore_ascii_case(CR_ENCODED) {
            CR.to_string()
        } else if matched.eq_ignore_ascii_case(LF_ENCODED) {
            LF.to_string()
        } else {
            "%".to_string()
        }
    })
}

/// A tag file's declared character encoding, per the `bagit.txt` tag
/// `Tag-File-Character-Encoding`. Only UTF-8 is written by this crate, but
/// bags produced by other tools may declare others, so reading honors
/// whatever is declared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TagFileEncoding(&'static Encoding);

impl TagFileEncoding {
    pub fn utf8() -> Self {
        Self(encoding_rs::UTF_8)
    }

    pub fn lookup(label: &str) -> Result<Self> {
        Encoding::for_label(label.as_bytes())
            .map(Self)
            .ok_or_else(|| UnsupportedEncodingSnafu { encoding: label }.build())
    }

    pub fn name(&self) -> &'static str {
        self.0.name()
    }

    /// Decodes `bytes` using this encoding, stripping a leading BOM if one
    /// is present. Returns whether a BOM was present: callers treat it as
    /// warning-worthy for an ordinary tag file, but fatal for `bagit.txt`.
    ///
    /// Uses `decode_without_bom_handling` rather than `decode`: the latter
    /// sniffs and silently strips a BOM itself (and can even override the
    /// declared encoding based on it), which would make BOM detection here
    /// always see `None`.
    pub fn decode_with_bom(&self, bytes: &[u8]) -> (String, bool) {
        let (text, _had_errors) = self.0.decode_without_bom_handling(bytes);
        match text.strip_prefix('\u{FEFF}') {
            Some(rest) => (rest.to_string(), true),
            None => (text.into_owned(), false),
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::bagit::encoding::{percent_decode, percent_encode, TagFileEncoding};

    #[test]
    fn test_percent_encoding() {
        assert_eq!(
            "a\tbc%25123%0Dqwe%0A%25%25asd%0D%0A !",
            percent_encode("a\tbc%123\rqwe\n%%asd\r\n !")
        );
        assert_eq!("nothing to see here", percent_encode("nothing to see here"));
    }

    #[test]
    fn test_percent_decoding_round_trips() {
        let original = "a\tbc%123\rqwe\n%%asd\r\n !";
        let encoded = percent_encode(original);
        assert_eq!(percent_decode(&encoded), original);
    }

    #[test]
    fn test_percent_decoding_is_case_insensitive() {
        assert_eq!(percent_decode("a%0db%0An"), "a\rb\nn");
    }

    #[test]
    fn utf8_encoding_resolves() {
        let enc = TagFileEncoding::utf8();
        assert_eq!(enc.name(), "UTF-8");
    }

    #[test]
    fn unknown_encoding_label_is_rejected() {
        assert!(TagFileEncoding::lookup("not-a-real-encoding").is_err());
    }

    #[test]
    fn utf8_bom_is_stripped_and_reported() {
        let enc = TagFileEncoding::utf8();
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice("BagIt-Version: 1.0".as_bytes());
        let (text, had_bom) = enc.decode_with_bom(&bytes);
        assert_eq!(text, "BagIt-Version: 1.0");
        assert!(had_bom);
    }
}
