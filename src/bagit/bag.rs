use std::ffi::OsStr;
use std::fmt::{Display, Formatter};
use std::fs;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Local;
use log::{error, info};
use regex::Regex;
use snafu::ResultExt;
use url::Url;
use walkdir::{DirEntry, WalkDir};

use crate::bagit::consts::*;
use crate::bagit::digest::DigestAlgorithm;
use crate::bagit::encoding::TagFileEncoding;
use crate::bagit::error::*;
use crate::bagit::io::PermissionScanner;
use crate::bagit::manifest::{self, ManifestEntry};
use crate::bagit::path_policy;
use crate::bagit::tag::{Tag, TagCodec, TagList};
use crate::bagit::validate::{self, ValidationResult};

/// A parsed `<major>.<minor>` version number from `bagit.txt`'s
/// `BagIt-Version` tag (e.g. `0.96` or `1.0`).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd)]
pub struct BagItVersion {
    major: u8,
    minor: u8,
}

impl BagItVersion {
    pub const fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    pub fn major(&self) -> u8 {
        self.major
    }

    pub fn minor(&self) -> u8 {
        self.minor
    }

    /// Whether this version is at least BagIt 1.0, the threshold at which
    /// several leniencies of earlier versions (duplicate manifest entries,
    /// `package-info.txt`) become errors instead of warnings.
    pub fn is_1_0_or_later(&self) -> bool {
        *self >= BagItVersion::from(BAGIT_1_0)
    }

    /// Whether this version's bags carry tagmanifests, per spec.md §4.9.4:
    /// `tagmanifest-<alg>.txt` discovery (and therefore the tag-file
    /// completeness check) only applies from 0.97 onward.
    pub fn supports_tag_manifests(&self) -> bool {
        *self >= BagItVersion::from(BAGIT_0_97)
    }

    /// The reserved tag-file name this version uses for bag metadata:
    /// `package-info.txt` for 0.93-0.95, `bag-info.txt` from 0.96 onward.
    pub fn info_file_name(&self) -> &'static str {
        if self.major == 0 && self.minor < 96 {
            PACKAGE_INFO_TXT
        } else {
            BAG_INFO_TXT
        }
    }
}

impl From<(u8, u8)> for BagItVersion {
    fn from(value: (u8, u8)) -> Self {
        Self::new(value.0, value.1)
    }
}

impl Display for BagItVersion {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for BagItVersion {
    type Err = Error;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        let (major, minor) = value.split_once('.').ok_or_else(|| Error::InvalidBagItVersion {
            value: value.to_string(),
        })?;
        let major = major
            .parse::<u8>()
            .map_err(|_| Error::InvalidBagItVersion {
                value: value.to_string(),
            })?;
        let minor = minor
            .parse::<u8>()
            .map_err(|_| Error::InvalidBagItVersion {
                value: value.to_string(),
            })?;
        Ok(BagItVersion::new(major, minor))
    }
}

/// A single `fetch.txt` entry: a URL a payload file can be retrieved from
/// instead of being stored directly in `data/`.
#[derive(Debug, Clone)]
pub struct FetchEntry {
    pub url: String,
    pub length: Option<u64>,
    pub path: String,
}

/// A BagIt bag, opened from or just written to disk.
#[derive(Debug)]
pub struct Bag {
    base_dir: PathBuf,
    version: BagItVersion,
    encoding: TagFileEncoding,
    info: TagList,
    algorithms: Vec<DigestAlgorithm>,
}

#[derive(Debug)]
pub struct BagUpdater {
    bag: Bag,
    recalculate_payload_manifests: bool,
    algorithms: Vec<DigestAlgorithm>,
    bagging_date: Option<String>,
    software_agent: Option<String>,
    processes: usize,
}

impl Bag {
    fn new(
        base_dir: PathBuf,
        version: BagItVersion,
        encoding: TagFileEncoding,
        info: TagList,
        algorithms: Vec<DigestAlgorithm>,
    ) -> Self {
        Self {
            base_dir,
            version,
            encoding,
            info,
            algorithms,
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn version(&self) -> BagItVersion {
        self.version
    }

    pub fn encoding(&self) -> TagFileEncoding {
        self.encoding
    }

    pub fn info(&self) -> &TagList {
        &self.info
    }

    pub fn info_mut(&mut self) -> &mut TagList {
        &mut self.info
    }

    pub fn algorithms(&self) -> &[DigestAlgorithm] {
        &self.algorithms
    }

    /// Parses `fetch.txt`, if present. Every line is
    /// `<url> <length-or-dash> <path>`, where `<path>` is whitespace-split
    /// leniently (at most 3 fields) so it may itself contain spaces.
    pub fn fetch_entries(&self) -> Result<Option<Vec<FetchEntry>>> {
        let fetch_path = self.base_dir.join(FETCH_TXT);
        if !fetch_path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(&fetch_path).context(IoReadSnafu { path: &fetch_path })?;
        let mut entries = Vec::new();

        for (num, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            let mut parts = line.splitn(3, char::is_whitespace);
            let url = parts.next().unwrap_or("").trim();
            let length = parts.next().unwrap_or("").trim();
            let path = parts.next().unwrap_or("").trim();

            if url.is_empty() || path.is_empty() {
                return Err(Error::InvalidTagLineWithRef {
                    path: fetch_path,
                    num: (num + 1) as u32,
                    details: "fetch.txt line must have a url, length, and path".to_string(),
                });
            }

            Url::parse(url).map_err(|_| Error::MalformedFetchUrl { url: url.to_string() })?;

            let length = if length == "-" || length.is_empty() {
                None
            } else {
                Some(length.parse::<u64>().map_err(|_| Error::InvalidTagLineWithRef {
                    path: self.base_dir.join(FETCH_TXT),
                    num: (num + 1) as u32,
                    details: format!("'{length}' is not a valid length"),
                })?)
            };

            entries.push(FetchEntry {
                url: url.to_string(),
                length,
                path: path.to_string(),
            });
        }

        Ok(Some(entries))
    }

    /// Creates a `BagUpdater` that's used to update an existing bag
    pub fn update(self) -> BagUpdater {
        BagUpdater::new(self)
    }
}

impl BagUpdater {
    pub fn new(bag: Bag) -> Self {
        Self {
            bag,
            recalculate_payload_manifests: true,
            algorithms: Vec::new(),
            bagging_date: None,
            software_agent: None,
            processes: 0,
        }
    }

    pub fn with_algorithm(mut self, algorithm: DigestAlgorithm) -> Self {
        self.algorithms.push(algorithm);
        self
    }

    pub fn with_algorithms(mut self, algorithms: &[DigestAlgorithm]) -> Self {
        self.algorithms.clear();
        self.algorithms.extend_from_slice(algorithms);
        self
    }

    pub fn with_bagging_date(mut self, bagging_date: Option<String>) -> Self {
        self.bagging_date = bagging_date;
        self
    }

    pub fn with_software_agent(mut self, software_agent: Option<String>) -> Self {
        self.software_agent = software_agent;
        self
    }

    pub fn with_processes(mut self, processes: usize) -> Self {
        self.processes = processes;
        self
    }

    pub fn recalculate_payload_manifests(mut self, recalculate: bool) -> Self {
        self.recalculate_payload_manifests = recalculate;
        self
    }

    /// Writes the changes to disk and recalculates manifests.
    pub fn finalize(mut self) -> Result<Bag> {
        let base_dir = self.bag.base_dir.clone();

        let algorithms = if !self.recalculate_payload_manifests || self.algorithms.is_empty() {
            self.bag.algorithms.clone()
        } else {
            self.algorithms.sort();
            self.algorithms.dedup();
            self.algorithms.clone()
        };

        self.bag.info.remove_tags(LABEL_BAGGING_DATE);
        self.bag
            .info
            .add_tag(
                LABEL_BAGGING_DATE,
                self.bagging_date.unwrap_or_else(current_date_str),
            )?;

        self.bag.info.remove_tags(LABEL_SOFTWARE_AGENT);
        self.bag
            .info
            .add_tag(
                LABEL_SOFTWARE_AGENT,
                self.software_agent.unwrap_or_else(bagr_software_agent),
            )?;

        if self.recalculate_payload_manifests {
            delete_manifests(&base_dir, &PAYLOAD_MANIFEST_MATCHER)?;
            let entries = manifest::hash_tree(
                &base_dir.join(DATA),
                DATA,
                &algorithms,
                self.processes,
                |_| false,
            )?;
            check_no_dangerous_paths(&base_dir, &entries)?;
            if let Some((a, b)) = path_policy::find_normalization_conflict(
                &entries.iter().map(|e| e.path.clone()).collect::<Vec<_>>(),
            ) {
                return Err(Error::FileNormalizationConflict { file_a: a, file_b: b });
            }
            manifest::write_manifests(&base_dir, PAYLOAD_MANIFEST_PREFIX, &algorithms, &entries)?;

            self.bag.info.remove_tags(LABEL_PAYLOAD_OXUM);
            self.bag
                .info
                .add_tag(LABEL_PAYLOAD_OXUM, manifest::payload_oxum(&entries))?;
        }

        let info_file = self.bag.version.info_file_name();
        TagCodec::emit(&self.bag.info, base_dir.join(info_file))?;

        delete_manifests(&base_dir, &TAG_MANIFEST_MATCHER)?;
        write_tag_manifests(&base_dir, &algorithms, self.processes)?;

        self.bag.algorithms = algorithms;

        Ok(self.bag)
    }
}

/// Creates a new bag in place by moving the contents of `base_dir` into the
/// bag's payload and then writing all of the necessary tag files and
/// manifests. The end result is that `base_dir` contains a fully formed
/// bag. If `src_dir` differs from `base_dir`, `src_dir`'s contents are
/// copied rather than moved, leaving `src_dir` untouched.
///
/// `algorithms` are the digest algorithms used to calculate manifests. An
/// empty slice defaults to `sha512`. `include_hidden_files` controls
/// whether dotfiles are bagged or (when not bagging in place) deleted from
/// the source tree.
#[allow(clippy::too_many_arguments)]
pub fn create_bag<S: AsRef<Path>, D: AsRef<Path>>(
    src_dir: S,
    dst_dir: D,
    mut info: TagList,
    algorithms: &[DigestAlgorithm],
    include_hidden_files: bool,
    version: BagItVersion,
    processes: usize,
) -> Result<Bag> {
    let src_dir = src_dir.as_ref();
    let dst_dir = dst_dir.as_ref();

    info!("Creating bag in {}", dst_dir.display());

    check_bag_preconditions(src_dir)?;

    let in_place = src_dir == dst_dir;
    let algorithms = defaulted_algorithms(algorithms);

    if !in_place {
        fs::create_dir_all(dst_dir).context(IoCreateSnafu { path: dst_dir })?;
    }

    let temp_name = format!("temp-{}", epoch_seconds());
    let temp_dir = dst_dir.join(&temp_name);
    fs::create_dir(&temp_dir).context(IoCreateSnafu { path: &temp_dir })?;

    move_into_dir(!in_place, src_dir, &temp_dir, include_hidden_files, |f| {
        f.file_name() != temp_name.as_str()
            && !(!include_hidden_files && !in_place && is_hidden_file(f.file_name()))
    })?;

    let data_dir = dst_dir.join(DATA);
    rename(&temp_dir, &data_dir)?;

    let entries = manifest::hash_tree(&data_dir, DATA, &algorithms, processes, |_| false)?;
    check_no_dangerous_paths(dst_dir, &entries)?;
    if let Some((a, b)) = path_policy::find_normalization_conflict(
        &entries.iter().map(|e| e.path.clone()).collect::<Vec<_>>(),
    ) {
        return Err(Error::FileNormalizationConflict { file_a: a, file_b: b });
    }

    manifest::write_manifests(dst_dir, PAYLOAD_MANIFEST_PREFIX, &algorithms, &entries)?;

    let encoding = TagFileEncoding::utf8();
    write_bagit_declaration(dst_dir, version, encoding)?;

    if info.get(LABEL_BAGGING_DATE).is_none() {
        info.add_tag(LABEL_BAGGING_DATE, current_date_str())?;
    }
    if info.get(LABEL_SOFTWARE_AGENT).is_none() {
        info.add_tag(LABEL_SOFTWARE_AGENT, bagr_software_agent())?;
    }
    info.remove_tags(LABEL_PAYLOAD_OXUM);
    info.add_tag(LABEL_PAYLOAD_OXUM, manifest::payload_oxum(&entries))?;

    TagCodec::emit(&info, dst_dir.join(version.info_file_name()))?;

    write_tag_manifests(dst_dir, &algorithms, processes)?;

    Ok(Bag::new(
        dst_dir.to_path_buf(),
        version,
        encoding,
        info,
        algorithms,
    ))
}

/// Opens a BagIt bag that already exists in the specified directory.
pub fn open_bag<P: AsRef<Path>>(base_dir: P) -> Result<Bag> {
    let base_dir = base_dir.as_ref();
    info!("Opening bag at {}", base_dir.display());

    let (version, encoding) = read_bagit_declaration(base_dir)?;
    let algorithms = manifest::detect_algorithms(base_dir, &PAYLOAD_MANIFEST_MATCHER)?;

    let info_path = base_dir.join(version.info_file_name());
    let info = if info_path.exists() {
        let bytes = fs::read(&info_path).context(IoReadSnafu { path: &info_path })?;
        let (tags, _) = TagCodec::load_bytes(&bytes, encoding)?;
        tags
    } else {
        TagList::new()
    };

    Ok(Bag::new(
        base_dir.to_path_buf(),
        version,
        encoding,
        info,
        algorithms,
    ))
}

/// Validates the bag at the specified path. See [`validate::validate_bag`].
pub fn validate_bag<P: AsRef<Path>>(
    base_dir: P,
    integrity_check: bool,
) -> Result<ValidationResult> {
    info!("Validating bag at {}", base_dir.as_ref().display());
    validate::validate_bag(base_dir, integrity_check)
}

fn write_bagit_declaration(
    base_dir: &Path,
    version: BagItVersion,
    encoding: TagFileEncoding,
) -> Result<()> {
    let mut tags = TagList::with_capacity(2);
    tags.add_tag(LABEL_BAGIT_VERSION, version.to_string())?;
    tags.add_tag(LABEL_FILE_ENCODING, encoding.name())?;
    TagCodec::emit(&tags, base_dir.join(BAGIT_TXT))
}

fn read_bagit_declaration(base_dir: &Path) -> Result<(BagItVersion, TagFileEncoding)> {
    let path = base_dir.join(BAGIT_TXT);
    let bytes = fs::read(&path).context(IoReadSnafu { path: &path })?;
    let (tags, _) = TagCodec::load_bytes(&bytes, TagFileEncoding::utf8())?;

    let version_str = tags
        .get(LABEL_BAGIT_VERSION)
        .ok_or_else(|| Error::MissingTag {
            tag: LABEL_BAGIT_VERSION.to_string(),
        })?;
    let version: BagItVersion = version_str.parse()?;

    let encoding_label = tags
        .get(LABEL_FILE_ENCODING)
        .ok_or_else(|| Error::MissingTag {
            tag: LABEL_FILE_ENCODING.to_string(),
        })?;
    let encoding = TagFileEncoding::lookup(encoding_label)?;

    Ok((version, encoding))
}

/// Copies/moves the contents of `src_dir` into `dst_dir`. If `copy_op` is
/// true the files are copied, otherwise they're moved.
fn move_into_dir<S, D, P>(
    copy_op: bool,
    src_dir: S,
    dst_dir: D,
    include_hidden_files: bool,
    predicate: P,
) -> Result<()>
where
    S: AsRef<Path>,
    D: AsRef<Path>,
    P: FnMut(&DirEntry) -> bool,
{
    let src_dir = src_dir.as_ref();
    let dst_dir = dst_dir.as_ref();

    let mut dirs = Vec::new();

    for file in WalkDir::new(src_dir).into_iter().filter_entry(predicate) {
        let file = file.context(WalkFileSnafu {})?;

        if !include_hidden_files && is_hidden_file(file.file_name()) {
            info!("Deleting hidden file {}", file.path().display());
            if file.file_type().is_dir() {
                fs::remove_dir_all(file.path()).context(IoDeleteSnafu {
                    path: file.path().to_path_buf(),
                })?;
            } else {
                fs::remove_file(file.path()).context(IoDeleteSnafu {
                    path: file.path().to_path_buf(),
                })?;
            }
            continue;
        }

        if file.file_type().is_file() {
            let relative = file.path().strip_prefix(src_dir).unwrap();
            let file_dst = dst_dir.join(relative);

            fs::create_dir_all(file_dst.parent().unwrap())
                .context(IoCreateSnafu { path: &file_dst })?;

            if copy_op {
                copy(file.path(), &file_dst)?;
            } else {
                rename(file.path(), &file_dst)?;
            }
        } else if file.file_type().is_dir() {
            if !copy_op {
                dirs.push(file.path().to_path_buf());
            }
        } else {
            return Err(Error::UnsupportedFile {
                path: file.path().to_path_buf(),
            });
        }
    }

    for dir in dirs {
        if dir == src_dir {
            continue;
        }
        if let Err(e) = fs::remove_dir_all(&dir) {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(Error::IoDelete {
                    path: dir,
                    source: e,
                });
            }
        }
    }

    Ok(())
}

fn write_tag_manifests(base_dir: &Path, algorithms: &[DigestAlgorithm], processes: usize) -> Result<()> {
    let entries = manifest::hash_tree(
        base_dir,
        "",
        algorithms,
        processes,
        manifest::is_tag_manifest_input_excluded,
    )?;
    manifest::write_tag_manifests(base_dir, algorithms, &entries)
}

fn delete_manifests(base_dir: &Path, matcher: &Regex) -> Result<()> {
    for entry in fs::read_dir(base_dir).context(IoReadDirSnafu { path: base_dir })? {
        let entry = entry.context(IoReadDirSnafu { path: base_dir })?;
        if !entry
            .file_type()
            .context(IoStatSnafu { path: entry.path() })?
            .is_file()
        {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if matcher.is_match(name) {
                info!("Deleting file {}", entry.path().display());
                if let Err(e) = fs::remove_file(entry.path()) {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        error!("Failed to delete file {}", entry.path().display());
                    }
                }
            }
        }
    }
    Ok(())
}

/// Verifies the preconditions `make_bag` requires before it touches the
/// filesystem: `dir` must exist and be a directory, it must not be an
/// ancestor of the current working directory (bagging a parent of where the
/// process is running would delete the ground it's standing on), and every
/// entry under it must be both readable and writable.
fn check_bag_preconditions(dir: &Path) -> Result<()> {
    if !dir.is_dir() {
        return Err(Error::bag(format!("{} is not a directory", dir.display())));
    }

    if let (Ok(canonical_dir), Ok(cwd)) = (dir.canonicalize(), std::env::current_dir()) {
        if cwd.starts_with(&canonical_dir) {
            return Err(Error::bag(format!(
                "cannot bag {} because it is an ancestor of the current working directory",
                dir.display()
            )));
        }
    }

    let (unreadable_dirs, unreadable_files) = PermissionScanner::can_read(dir);
    if !unreadable_dirs.is_empty() || !unreadable_files.is_empty() {
        return Err(Error::bag(format!(
            "cannot read every file under {}: {} director{} and {} file{} are unreadable",
            dir.display(),
            unreadable_dirs.len(),
            if unreadable_dirs.len() == 1 { "y" } else { "ies" },
            unreadable_files.len(),
            if unreadable_files.len() == 1 { "" } else { "s" },
        )));
    }

    let unwritable = PermissionScanner::can_bag(dir);
    if !unwritable.is_empty() {
        return Err(Error::bag(format!(
            "cannot write to {} entr{} under {}",
            unwritable.len(),
            if unwritable.len() == 1 { "y" } else { "ies" },
            dir.display(),
        )));
    }

    Ok(())
}

/// Rejects entries whose manifest path would be unsafe once re-joined to
/// `base_dir`, e.g. an absolute path or one that escapes the bag via `..`.
fn check_no_dangerous_paths(base_dir: &Path, entries: &[ManifestEntry]) -> Result<()> {
    for entry in entries {
        if path_policy::is_dangerous(base_dir, &entry.path) {
            return Err(Error::UnsafePath {
                path: entry.path.clone(),
                context: "payload manifest".to_string(),
            });
        }
    }
    Ok(())
}

fn rename<F: AsRef<Path>, T: AsRef<Path>>(from: F, to: T) -> Result<()> {
    let from = from.as_ref();
    let to = to.as_ref();
    info!("Moving {} to {}", from.display(), to.display());
    fs::rename(from, to).context(IoMoveSnafu { from, to })
}

fn copy<F: AsRef<Path>, T: AsRef<Path>>(from: F, to: T) -> Result<()> {
    let from = from.as_ref();
    let to = to.as_ref();
    info!("Copying {} to {}", from.display(), to.display());
    fs::copy(from, to).map(|_| ()).context(IoCopySnafu { from, to })
}

/// If the input is empty a new vec with the default algorithm is returned.
/// Otherwise, the input is deduped and a new vec is returned.
fn defaulted_algorithms(algorithms: &[DigestAlgorithm]) -> Vec<DigestAlgorithm> {
    if algorithms.is_empty() {
        vec![DEFAULT_ALGORITHM]
    } else {
        let mut new = Vec::from(algorithms);
        new.sort();
        new.dedup();
        new
    }
}

fn bagr_software_agent() -> String {
    format!("bagr v{} <{}>", BAGR_VERSION, BAGR_SRC_URL)
}

fn current_date_str() -> String {
    Local::now().date_naive().format("%Y-%m-%d").to_string()
}

fn epoch_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is set before the Unix epoch")
        .as_secs()
}

fn is_hidden_file(name: &OsStr) -> bool {
    name.to_str()
        .map(|name| name.starts_with('.') && name != "." && name != "..")
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_parses_and_displays() {
        let version: BagItVersion = "1.0".parse().unwrap();
        assert_eq!(version, BagItVersion::new(1, 0));
        assert_eq!(version.to_string(), "1.0");
    }

    #[test]
    fn version_rejects_malformed_input() {
        assert!("garbage".parse::<BagItVersion>().is_err());
        assert!("1".parse::<BagItVersion>().is_err());
    }

    #[test]
    fn pre_096_versions_use_package_info_txt() {
        assert_eq!(BagItVersion::new(0, 93).info_file_name(), PACKAGE_INFO_TXT);
        assert_eq!(BagItVersion::new(0, 95).info_file_name(), PACKAGE_INFO_TXT);
    }

    #[test]
    fn post_096_versions_use_bag_info_txt() {
        assert_eq!(BagItVersion::new(0, 96).info_file_name(), BAG_INFO_TXT);
        assert_eq!(BagItVersion::new(1, 0).info_file_name(), BAG_INFO_TXT);
    }

    #[test]
    fn is_1_0_or_later_compares_correctly() {
        assert!(!BagItVersion::new(0, 97).is_1_0_or_later());
        assert!(BagItVersion::new(1, 0).is_1_0_or_later());
    }

    #[test]
    fn create_bag_then_open_bag_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hello.txt"), b"hello world").unwrap();

        let bag = create_bag(
            dir.path(),
            dir.path(),
            TagList::new(),
            &[DigestAlgorithm::Sha256],
            false,
            BagItVersion::from(BAGIT_1_0),
            1,
        )
        .unwrap();

        assert_eq!(bag.version(), BagItVersion::new(1, 0));
        assert!(bag.base_dir().join(DATA).join("hello.txt").exists());
        assert!(bag.info().contains(LABEL_PAYLOAD_OXUM));

        let reopened = open_bag(dir.path()).unwrap();
        assert_eq!(reopened.version(), BagItVersion::new(1, 0));
        assert_eq!(
            reopened.info().get(LABEL_PAYLOAD_OXUM),
            bag.info().get(LABEL_PAYLOAD_OXUM)
        );
    }

    #[test]
    fn fetch_entries_parses_url_length_and_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(FETCH_TXT),
            "https://example.org/a.txt 123 data/a.txt\nhttps://example.org/b.txt - data/b with spaces.txt\n",
        )
        .unwrap();

        let bag = Bag::new(
            dir.path().to_path_buf(),
            BagItVersion::from(BAGIT_1_0),
            TagFileEncoding::utf8(),
            TagList::new(),
            vec![DigestAlgorithm::Sha256],
        );

        let entries = bag.fetch_entries().unwrap().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].length, Some(123));
        assert_eq!(entries[0].path, "data/a.txt");
        assert_eq!(entries[1].length, None);
        assert_eq!(entries[1].path, "data/b with spaces.txt");
    }

    #[test]
    fn fetch_entries_rejects_malformed_url() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(FETCH_TXT), "not-a-url 123 data/a.txt\n").unwrap();

        let bag = Bag::new(
            dir.path().to_path_buf(),
            BagItVersion::from(BAGIT_1_0),
            TagFileEncoding::utf8(),
            TagList::new(),
            vec![DigestAlgorithm::Sha256],
        );

        assert!(bag.fetch_entries().is_err());
    }

    #[test]
    fn create_bag_rejects_a_nonexistent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");

        let result = create_bag(
            &missing,
            &missing,
            TagList::new(),
            &[DigestAlgorithm::Sha256],
            false,
            BagItVersion::from(BAGIT_1_0),
            1,
        );

        assert!(result.is_err());
    }

    #[cfg(unix)]
    #[test]
    fn create_bag_rejects_an_unwritable_directory() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("hello.txt"), b"hello").unwrap();

        let original = std::fs::metadata(dir.path()).unwrap().permissions();
        std::fs::set_permissions(dir.path(), std::fs::Permissions::from_mode(0o500)).unwrap();

        let result = create_bag(
            dir.path(),
            dir.path(),
            TagList::new(),
            &[DigestAlgorithm::Sha256],
            false,
            BagItVersion::from(BAGIT_1_0),
            1,
        );

        std::fs::set_permissions(dir.path(), original).unwrap();

        assert!(result.is_err());
    }
}
