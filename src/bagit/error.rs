use snafu::prelude::*;
use std::path::PathBuf;
use std::string::FromUtf8Error;

pub type Result<T, E = Error> = core::result::Result<T, E>;

/// A single failure folded into a `BagValidation` error's detail list. Kept
/// separate from `Error` so a validation pass can accumulate many of these
/// before deciding whether to fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationDetail {
    ChecksumMismatch {
        path: String,
        algorithm: String,
        expected: String,
        found: String,
    },
    FileMissing {
        path: String,
    },
    UnexpectedFile {
        path: String,
    },
}

impl std::fmt::Display for ValidationDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationDetail::ChecksumMismatch {
                path,
                algorithm,
                expected,
                found,
            } => write!(
                f,
                r#"{path} {algorithm} validation failed: expected="{expected}" found="{found}""#
            ),
            ValidationDetail::FileMissing { path } => {
                write!(f, "{path} exists in manifest but was not found on filesystem")
            }
            ValidationDetail::UnexpectedFile { path } => {
                write!(f, "{path} exists on filesystem but is not in the manifest")
            }
        }
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("IO error: {}", source))]
    IoGeneral { source: std::io::Error },
    #[snafu(display("Error creating file {}: {}", path.display(), source))]
    IoCreate {
        source: std::io::Error,
        path: PathBuf,
    },
    #[snafu(display("Error writing to file {}: {}", path.display(), source))]
    IoWrite {
        source: std::io::Error,
        path: PathBuf,
    },
    #[snafu(display("Error reading file {}: {}", path.display(), source))]
    IoRead {
        source: std::io::Error,
        path: PathBuf,
    },
    #[snafu(display("Error reading directory {}: {}", path.display(), source))]
    IoReadDir {
        source: std::io::Error,
        path: PathBuf,
    },
    #[snafu(display("Failed to move {} to {}: {}", from.display(), to.display(), source))]
    IoMove {
        source: std::io::Error,
        from: PathBuf,
        to: PathBuf,
    },
    #[snafu(display("Failed to copy {} to {}: {}", from.display(), to.display(), source))]
    IoCopy {
        source: std::io::Error,
        from: PathBuf,
        to: PathBuf,
    },
    #[snafu(display("Failed to delete {}: {}", path.display(), source))]
    IoDelete {
        source: std::io::Error,
        path: PathBuf,
    },
    #[snafu(display("Failed to stat {}: {}", path.display(), source))]
    IoStat {
        source: std::io::Error,
        path: PathBuf,
    },
    #[snafu(display("Error walking files: {}", source))]
    WalkFile { source: walkdir::Error },
    #[snafu(display("Encountered an unsupported file type at {}", path.display()))]
    UnsupportedFile { path: PathBuf },
    #[snafu(display("Path {} in {} is unsafe", path, context))]
    UnsafePath { path: String, context: String },
    #[snafu(display("Invalid tag line: {details}"))]
    InvalidTagLine { details: String },
    #[snafu(display("Tag number {num} in file {} is invalid: {details}", path.display()))]
    InvalidTagLineWithRef {
        path: PathBuf,
        num: u32,
        details: String,
    },
    #[snafu(display("Invalid tag with label '{label}': {details}"))]
    InvalidTag { label: String, details: String },
    #[snafu(display("Invalid BagIt version: {value}"))]
    InvalidBagItVersion { value: String },
    #[snafu(display("Missing required tag {tag}"))]
    MissingTag { tag: String },
    #[snafu(display("Unsupported BagIt version {major}.{minor}"))]
    UnsupportedVersion { major: u8, minor: u8 },
    #[snafu(display("Unsupported file encoding {encoding}"))]
    UnsupportedEncoding { encoding: String },
    #[snafu(display("Failed to decode string: {source}"))]
    InvalidString { source: FromUtf8Error },
    #[snafu(display("Path {} is not valid UTF-8", path.display()))]
    InvalidUtf8Path { path: PathBuf },
    #[snafu(display("{message}"))]
    Bag { message: String },
    #[snafu(display(
        "Expected the same file count and byte count across every digest algorithm, but they disagreed"
    ))]
    ManifestInconsistent,
    #[snafu(display("Fast validation requires bag-info.txt to include Payload-Oxum"))]
    FastRequiresOxum,
    #[snafu(display(
        "Payload-Oxum validation failed. Expected {expected_files} files and {expected_bytes} \
         bytes but found {found_files} files and {found_bytes} bytes"
    ))]
    OxumMismatch {
        expected_files: u64,
        expected_bytes: u64,
        found_files: u64,
        found_bytes: u64,
    },
    #[snafu(display("Malformed Payload-Oxum value: {value}"))]
    MalformedOxum { value: String },
    #[snafu(display("Malformed URL in fetch.txt: {url}"))]
    MalformedFetchUrl { url: String },
    #[snafu(display(r#"Unicode normalization conflict for file "{file_a}" and "{file_b}""#))]
    FileNormalizationConflict { file_a: String, file_b: String },
    #[snafu(display(
        "{message}: {}",
        details.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
    ))]
    BagValidation {
        message: String,
        details: Vec<ValidationDetail>,
    },
}

impl Error {
    /// Convenience constructor for the catch-all `Bag` variant, mirroring the
    /// original implementation's generic `BagError(message)`.
    pub fn bag<S: Into<String>>(message: S) -> Self {
        Error::Bag {
            message: message.into(),
        }
    }

    pub fn validation<S: Into<String>>(message: S, details: Vec<ValidationDetail>) -> Self {
        Error::BagValidation {
            message: message.into(),
            details,
        }
    }
}
