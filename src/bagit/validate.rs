use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::Path;

use log::info;
use snafu::ResultExt;
use unicode_normalization::UnicodeNormalization;
use url::Url;

use crate::bagit::bag::{self, BagItVersion};
use crate::bagit::consts::*;
use crate::bagit::digest::hash_file;
use crate::bagit::error::*;
use crate::bagit::io::Walker;
use crate::bagit::manifest::{self, read_manifest};
use crate::bagit::path_policy;

#[derive(Debug)]
pub struct ValidationResult {
    verdict: ValidationVerdict,
    issues: Vec<ValidationIssue>,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ValidationVerdict {
    /// Every checksum was recomputed and matched.
    Valid,
    /// The bag is structurally complete, but fixity was not checked.
    Complete,
    /// At least one error-level issue was found.
    Invalid,
}

#[derive(Debug)]
pub struct ValidationIssue {
    level: IssueLevel,
    message: String,
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum IssueLevel {
    Error,
    Warn,
}

impl ValidationResult {
    pub fn new_valid() -> Self {
        Self {
            verdict: ValidationVerdict::Valid,
            issues: Vec::new(),
        }
    }

    pub fn new_complete() -> Self {
        Self {
            verdict: ValidationVerdict::Complete,
            issues: Vec::new(),
        }
    }

    pub fn verdict(&self) -> ValidationVerdict {
        self.verdict
    }

    pub fn issues(&self) -> &[ValidationIssue] {
        &self.issues
    }

    pub fn is_valid(&self) -> bool {
        self.verdict != ValidationVerdict::Invalid
    }

    pub fn invalid(&mut self) {
        self.verdict = ValidationVerdict::Invalid;
    }

    pub fn error<S: AsRef<str>>(&mut self, message: S) {
        self.invalid();
        self.issues.push(ValidationIssue::error(message));
    }

    pub fn warn<S: AsRef<str>>(&mut self, message: S) {
        self.issues.push(ValidationIssue::warn(message));
    }
}

impl ValidationIssue {
    pub fn error<S: AsRef<str>>(message: S) -> Self {
        Self {
            level: IssueLevel::Error,
            message: message.as_ref().into(),
        }
    }

    pub fn warn<S: AsRef<str>>(message: S) -> Self {
        Self {
            level: IssueLevel::Warn,
            message: message.as_ref().into(),
        }
    }

    pub fn level(&self) -> IssueLevel {
        self.level
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Options controlling how deeply a bag is validated. Mirrors
/// `original_source/bagit_modules/bag.py::validate`'s `fast`/
/// `completeness_only` parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidateOptions {
    /// Skip recomputing fixity and instead trust the declared
    /// `Payload-Oxum` (file count + byte total). Requires `Payload-Oxum`
    /// to be present.
    pub fast: bool,
    /// Only check structure and completeness; never recompute digests,
    /// even when `fast` is false and `Payload-Oxum` is present.
    pub completeness_only: bool,
    /// Number of worker threads used while recomputing fixity. 0 uses
    /// rayon's default parallelism.
    pub processes: usize,
}

/// Validates the bag at `base_dir`. If `integrity_check` is true every
/// payload and tag manifest checksum is recomputed and compared; otherwise
/// the bag is only checked for structural completeness. Equivalent to
/// `validate_bag_with_options(base_dir, ValidateOptions { fast: false,
/// completeness_only: !integrity_check, ..Default::default() })`.
pub fn validate_bag<P: AsRef<Path>>(base_dir: P, integrity_check: bool) -> Result<ValidationResult> {
    validate_bag_with_options(
        base_dir,
        ValidateOptions {
            fast: false,
            completeness_only: !integrity_check,
            processes: 0,
        },
    )
}

/// Runs the full five-phase validation pipeline: structure, `bagit.txt`
/// BOM, `fetch.txt`, `Payload-Oxum`, completeness, and (unless skipped)
/// fixity. Every phase that can detect more than one problem keeps going
/// and aggregates every issue it finds rather than stopping at the first.
pub fn validate_bag_with_options<P: AsRef<Path>>(
    base_dir: P,
    options: ValidateOptions,
) -> Result<ValidationResult> {
    let base_dir = base_dir.as_ref();
    info!("Validating bag at {}", base_dir.display());

    let mut result = if options.completeness_only {
        ValidationResult::new_complete()
    } else {
        ValidationResult::new_valid()
    };

    // Phase 1: structure (bagit.txt, data dir, at least one payload manifest)
    let declaration = match read_declaration(base_dir, &mut result)? {
        Some(d) => d,
        None => return Ok(result),
    };
    let (version, had_bom) = declaration;

    // Phase 2: bagit.txt BOM. Unlike an ordinary tag file (where a UTF-8 BOM
    // is only warning-worthy), `bagit.txt` itself must never carry one.
    if had_bom {
        result.error(format!("{BAGIT_TXT} must not contain a byte-order mark"));
        return Ok(result);
    }

    if !base_dir.join(DATA).is_dir() {
        result.error(format!("{DATA} directory does not exist"));
        return Ok(result);
    }

    let payload_algorithms = manifest::detect_algorithms(base_dir, &PAYLOAD_MANIFEST_MATCHER)?;
    if payload_algorithms.is_empty() {
        result.error("bag does not contain any payload manifests");
        return Ok(result);
    }

    // Phase 3: fetch.txt
    validate_fetch(base_dir, &mut result)?;

    // Phase 4: Payload-Oxum
    let info_path = base_dir.join(version.info_file_name());
    let declared_oxum = if info_path.exists() {
        let bytes = std::fs::read(&info_path).context(IoReadSnafu { path: &info_path })?;
        let (tags, _) =
            crate::bagit::tag::TagCodec::load_bytes(&bytes, declaration_encoding(base_dir)?)?;
        tags.get(LABEL_PAYLOAD_OXUM).map(|v| v.to_string())
    } else {
        None
    };

    if let Some(oxum) = &declared_oxum {
        validate_oxum(base_dir, oxum, &mut result)?;
    } else if options.fast {
        return Err(Error::FastRequiresOxum);
    }

    if options.fast {
        return Ok(result);
    }

    // Tag manifests are discovered up front (version >= 0.97 per spec.md
    // §4.9.4) since both the completeness phase (missing tag files, even
    // under `completeness_only`) and the fixity phase need them.
    let tag_algorithms = if version.supports_tag_manifests() {
        manifest::detect_algorithms(base_dir, &TAG_MANIFEST_MATCHER)?
    } else {
        Vec::new()
    };
    let tag_loaded = if tag_algorithms.is_empty() {
        None
    } else {
        Some(load_manifests(base_dir, &tag_algorithms, TAG_MANIFEST_PREFIX, false)?)
    };
    let tag_manifest_paths: HashSet<String> = tag_loaded
        .as_ref()
        .map(|(manifests, _)| manifests.values().flat_map(|m| m.keys().cloned()).collect())
        .unwrap_or_default();

    // Phase 5: completeness
    let (payload_manifests, payload_duplicates) =
        load_manifests(base_dir, &payload_algorithms, PAYLOAD_MANIFEST_PREFIX, true)?;
    validate_completeness(
        base_dir,
        &payload_manifests,
        &payload_duplicates,
        &tag_manifest_paths,
        version,
        &mut result,
    )?;

    if options.completeness_only {
        return Ok(result);
    }

    // Phase 6: fixity
    validate_fixity(base_dir, &payload_manifests, options.processes, &mut result)?;

    if let Some((tag_manifests, tag_duplicates)) = tag_loaded {
        for (algorithm, paths) in &tag_duplicates {
            for path in paths {
                let message =
                    format!("{path} is listed more than once in the {algorithm} tag manifest");
                if version.is_1_0_or_later() {
                    result.error(message);
                } else {
                    result.warn(message);
                }
            }
        }
        validate_fixity(base_dir, &tag_manifests, options.processes, &mut result)?;
    }

    Ok(result)
}

type Manifests = std::collections::HashMap<
    crate::bagit::digest::DigestAlgorithm,
    std::collections::HashMap<String, String>,
>;

/// Per-algorithm lists of paths that appeared more than once in that
/// algorithm's manifest, in file order.
type Duplicates = std::collections::HashMap<crate::bagit::digest::DigestAlgorithm, Vec<String>>;

fn load_manifests(
    base_dir: &Path,
    algorithms: &[crate::bagit::digest::DigestAlgorithm],
    prefix: &str,
    escaped: bool,
) -> Result<(Manifests, Duplicates)> {
    let mut manifests = Manifests::with_capacity(algorithms.len());
    let mut duplicates = Duplicates::with_capacity(algorithms.len());
    for algorithm in algorithms {
        let path = base_dir.join(format!("{prefix}-{algorithm}.txt"));
        let parsed = read_manifest(&path, escaped)?;
        manifests.insert(*algorithm, parsed.entries);
        duplicates.insert(*algorithm, parsed.duplicate_paths);
    }

    manifest::check_consistency(&manifests)?;
    Ok((manifests, duplicates))
}

fn read_declaration(
    base_dir: &Path,
    result: &mut ValidationResult,
) -> Result<Option<(BagItVersion, bool)>> {
    let path = base_dir.join(BAGIT_TXT);

    let bytes = match std::fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            result.error(format!("{BAGIT_TXT} does not exist"));
            return Ok(None);
        }
        Err(e) if e.kind() == ErrorKind::PermissionDenied => {
            result.error(format!("{BAGIT_TXT} cannot be read"));
            return Ok(None);
        }
        Err(e) => return Err(e).context(IoReadSnafu { path }),
    };

    let (tags, had_bom) = crate::bagit::tag::TagCodec::load_bytes(
        &bytes,
        crate::bagit::encoding::TagFileEncoding::utf8(),
    )?;

    let version_str = match tags.get(LABEL_BAGIT_VERSION) {
        Some(v) => v,
        None => {
            result.error(format!("{BAGIT_TXT} is missing required tag '{LABEL_BAGIT_VERSION}'"));
            return Ok(None);
        }
    };

    let version: BagItVersion = match version_str.parse() {
        Ok(v) => v,
        Err(_) => {
            result.error(format!(
                "{BAGIT_TXT} contains an invalid {LABEL_BAGIT_VERSION}: {version_str}"
            ));
            return Ok(None);
        }
    };

    if tags.get(LABEL_FILE_ENCODING).is_none() {
        result.error(format!(
            "{BAGIT_TXT} is missing required tag '{LABEL_FILE_ENCODING}'"
        ));
        return Ok(None);
    }

    Ok(Some((version, had_bom)))
}

fn declaration_encoding(base_dir: &Path) -> Result<crate::bagit::encoding::TagFileEncoding> {
    let path = base_dir.join(BAGIT_TXT);
    let bytes = std::fs::read(&path).context(IoReadSnafu { path: &path })?;
    let (tags, _) = crate::bagit::tag::TagCodec::load_bytes(
        &bytes,
        crate::bagit::encoding::TagFileEncoding::utf8(),
    )?;
    let label = tags.get(LABEL_FILE_ENCODING).ok_or_else(|| Error::MissingTag {
        tag: LABEL_FILE_ENCODING.to_string(),
    })?;
    crate::bagit::encoding::TagFileEncoding::lookup(label)
}

fn validate_fetch(base_dir: &Path, result: &mut ValidationResult) -> Result<()> {
    let bag = bag::open_bag(base_dir)?;
    match bag.fetch_entries() {
        Ok(Some(entries)) => {
            for entry in entries {
                if path_policy::is_dangerous(base_dir, &entry.path) {
                    result.error(format!(
                        "{FETCH_TXT} references an unsafe path: {}",
                        entry.path
                    ));
                } else if !entry.path.starts_with(&format!("{DATA}/")) {
                    result.error(format!(
                        "{FETCH_TXT} may only reference payload files: {}",
                        entry.path
                    ));
                }

                if !has_scheme_and_authority(&entry.url) {
                    result.error(format!(
                        "{FETCH_TXT} entry has a malformed URL (missing scheme or authority): {}",
                        entry.url
                    ));
                }
            }
        }
        Ok(None) => {}
        Err(e) => result.error(format!("{FETCH_TXT} is invalid: {e}")),
    }
    Ok(())
}

/// Returns true if `url` parses and has both a non-empty scheme (guaranteed
/// by any successful parse) and a non-empty authority (host), per spec.md
/// §4.10's fetch.txt validation rule.
fn has_scheme_and_authority(url: &str) -> bool {
    match Url::parse(url) {
        Ok(parsed) => !parsed.scheme().is_empty()
            && parsed.host_str().map(|h| !h.is_empty()).unwrap_or(false),
        Err(_) => false,
    }
}

fn validate_oxum(base_dir: &Path, declared: &str, result: &mut ValidationResult) -> Result<()> {
    let (bytes_str, files_str) = declared
        .split_once('.')
        .ok_or_else(|| Error::MalformedOxum { value: declared.to_string() })?;
    let expected_bytes: u64 = bytes_str
        .parse()
        .map_err(|_| Error::MalformedOxum { value: declared.to_string() })?;
    let expected_files: u64 = files_str
        .parse()
        .map_err(|_| Error::MalformedOxum { value: declared.to_string() })?;

    let data_dir = base_dir.join(DATA);
    let paths = Walker::walk_files(&data_dir)?;
    let mut found_bytes = 0u64;
    for path in &paths {
        let meta = std::fs::metadata(data_dir.join(path)).context(IoStatSnafu {
            path: data_dir.join(path),
        })?;
        found_bytes += meta.len();
    }
    let found_files = paths.len() as u64;

    if found_files != expected_files || found_bytes != expected_bytes {
        result.error(
            Error::OxumMismatch {
                expected_files,
                expected_bytes,
                found_files,
                found_bytes,
            }
            .to_string(),
        );
    }

    Ok(())
}

fn validate_completeness(
    base_dir: &Path,
    manifests: &Manifests,
    duplicates: &Duplicates,
    tag_manifest_paths: &HashSet<String>,
    version: BagItVersion,
    result: &mut ValidationResult,
) -> Result<()> {
    let data_dir = base_dir.join(DATA);
    let fs_paths: Vec<String> = Walker::walk_files(&data_dir)?
        .into_iter()
        .map(|p| format!("{DATA}/{p}"))
        .collect();

    let manifest_paths: HashSet<String> = manifests
        .values()
        .flat_map(|m| m.keys().cloned())
        .collect();

    let fs_normalized = path_policy::normalized_lookup(&fs_paths);
    let manifest_list: Vec<String> = manifest_paths.iter().cloned().collect();
    let manifest_normalized = path_policy::normalized_lookup(&manifest_list);

    for path in &fs_paths {
        let nfc: String = path.as_str().nfc().collect();
        if !manifest_paths.contains(path) && !manifest_normalized.contains_key(&nfc) {
            result.error(format!("{path} exists on filesystem but is not in any manifest"));
        }
    }

    for path in &manifest_paths {
        let nfc: String = path.as_str().nfc().collect();
        if !fs_paths.contains(path) && !fs_normalized.contains_key(&nfc) {
            result.error(format!("{path} is listed in a manifest but was not found on filesystem"));
        }
    }

    // Tag files are only ever checked for the "missing from disk" direction
    // (spec.md §4.10): a tag file present on disk but absent from every
    // tagmanifest isn't itself a completeness failure.
    for path in tag_manifest_paths {
        if !base_dir.join(path).is_file() {
            result.error(format!("{path} is listed in a tag manifest but was not found on filesystem"));
        }
    }

    // Duplicate manifest entries are a hard error under BagIt 1.0, but were
    // tolerated (just worth a warning) by earlier versions.
    for (algorithm, paths) in duplicates {
        for path in paths {
            let message = format!("{path} is listed more than once in the {algorithm} manifest");
            if version.is_1_0_or_later() {
                result.error(message);
            } else {
                result.warn(message);
            }
        }
    }

    Ok(())
}

fn validate_fixity(
    base_dir: &Path,
    manifests: &Manifests,
    processes: usize,
    result: &mut ValidationResult,
) -> Result<()> {
    let mut pool_builder = rayon::ThreadPoolBuilder::new();
    if processes > 0 {
        pool_builder = pool_builder.num_threads(processes);
    }
    let pool = pool_builder
        .build()
        .map_err(|e| Error::bag(format!("failed to start fixity thread pool: {e}")))?;

    let mut all_paths: HashSet<&String> = HashSet::new();
    for entries in manifests.values() {
        all_paths.extend(entries.keys());
    }

    use rayon::iter::{IntoParallelIterator, ParallelIterator};

    let failures: Vec<String> = pool.install(|| {
        all_paths
            .into_par_iter()
            .flat_map_iter(|path| {
                let mut issues = Vec::new();
                let full_path = base_dir.join(path);

                if !full_path.is_file() {
                    return issues.into_iter();
                }

                let algorithms: Vec<_> = manifests
                    .iter()
                    .filter(|(_, m)| m.contains_key(path))
                    .map(|(a, _)| *a)
                    .collect();

                match hash_file(&full_path, &algorithms) {
                    Ok((digests, _)) => {
                        for algorithm in &algorithms {
                            let expected = &manifests[algorithm][path];
                            if let Some(found) = digests.get(algorithm) {
                                if !found.eq_ignore_ascii_case(expected) {
                                    issues.push(
                                        ValidationDetail::ChecksumMismatch {
                                            path: path.clone(),
                                            algorithm: algorithm.to_string(),
                                            expected: expected.clone(),
                                            found: found.clone(),
                                        }
                                        .to_string(),
                                    );
                                }
                            }
                        }
                    }
                    Err(e) => issues.push(format!("failed to hash {path}: {e}")),
                }

                issues.into_iter()
            })
            .collect()
    });

    for failure in failures {
        result.error(failure);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bagit::bag::create_bag;
    use crate::bagit::consts::BAGIT_1_0;
    use crate::bagit::digest::DigestAlgorithm;
    use crate::bagit::tag::TagList;

    fn bag_one_file(dir: &Path) {
        std::fs::write(dir.join("hello.txt"), b"hello\n").unwrap();
        create_bag(
            dir,
            dir,
            TagList::new(),
            &[DigestAlgorithm::Sha256],
            false,
            BagItVersion::from(BAGIT_1_0),
            1,
        )
        .unwrap();
    }

    #[test]
    fn valid_bag_validates_successfully() {
        let dir = tempfile::tempdir().unwrap();
        bag_one_file(dir.path());

        let result = validate_bag_with_options(dir.path(), ValidateOptions::default()).unwrap();
        assert_eq!(result.verdict(), ValidationVerdict::Valid);
    }

    #[test]
    fn mutated_payload_fails_fixity() {
        let dir = tempfile::tempdir().unwrap();
        bag_one_file(dir.path());
        std::fs::write(dir.path().join("data/hello.txt"), b"goodbye\n").unwrap();

        let result = validate_bag_with_options(dir.path(), ValidateOptions::default()).unwrap();
        assert_eq!(result.verdict(), ValidationVerdict::Invalid);
        assert!(result
            .issues()
            .iter()
            .any(|i| i.message().contains("validation failed")));
    }

    #[test]
    fn missing_payload_file_fails_completeness_only() {
        let dir = tempfile::tempdir().unwrap();
        bag_one_file(dir.path());
        std::fs::remove_file(dir.path().join("data/hello.txt")).unwrap();

        let result = validate_bag_with_options(
            dir.path(),
            ValidateOptions {
                completeness_only: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(result.verdict(), ValidationVerdict::Invalid);
        assert!(result
            .issues()
            .iter()
            .any(|i| i.message().contains("not found on filesystem")));
    }

    #[test]
    fn extra_payload_file_fails_completeness_only() {
        let dir = tempfile::tempdir().unwrap();
        bag_one_file(dir.path());
        std::fs::write(dir.path().join("data/extra.txt"), b"surprise").unwrap();

        let result = validate_bag_with_options(
            dir.path(),
            ValidateOptions {
                completeness_only: true,
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(result.verdict(), ValidationVerdict::Invalid);
        assert!(result
            .issues()
            .iter()
            .any(|i| i.message().contains("is not in any manifest")));
    }

    #[test]
    fn fast_validation_requires_payload_oxum() {
        let dir = tempfile::tempdir().unwrap();
        bag_one_file(dir.path());

        let info_path = dir.path().join("bag-info.txt");
        let text = std::fs::read_to_string(&info_path).unwrap();
        let stripped: String = text
            .lines()
            .filter(|l| !l.starts_with("Payload-Oxum"))
            .map(|l| format!("{l}\n"))
            .collect();
        std::fs::write(&info_path, stripped).unwrap();

        let err = validate_bag_with_options(
            dir.path(),
            ValidateOptions {
                fast: true,
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, Error::FastRequiresOxum));
    }

    #[test]
    fn bagit_txt_with_bom_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        bag_one_file(dir.path());

        let bagit_path = dir.path().join(BAGIT_TXT);
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice(&std::fs::read(&bagit_path).unwrap());
        std::fs::write(&bagit_path, bytes).unwrap();

        let result = validate_bag_with_options(dir.path(), ValidateOptions::default()).unwrap();
        assert_eq!(result.verdict(), ValidationVerdict::Invalid);
        assert!(result
            .issues()
            .iter()
            .any(|i| i.message().contains("must not contain a byte-order mark")));
    }

    #[test]
    fn fetch_entry_with_no_authority_fails() {
        assert!(!has_scheme_and_authority("mailto:nobody@example.org"));
        assert!(!has_scheme_and_authority("not a url at all"));
        assert!(has_scheme_and_authority("https://example.org/file.txt"));
    }

    #[test]
    fn missing_bagit_txt_fails_structure_phase() {
        let dir = tempfile::tempdir().unwrap();

        let result = validate_bag_with_options(dir.path(), ValidateOptions::default()).unwrap();
        assert_eq!(result.verdict(), ValidationVerdict::Invalid);
        assert!(result
            .issues()
            .iter()
            .any(|i| i.message().contains("bagit.txt does not exist")));
    }
}
