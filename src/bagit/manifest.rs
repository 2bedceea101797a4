use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use log::info;
use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use rayon::{ThreadPool, ThreadPoolBuilder};
use snafu::ResultExt;

use crate::bagit::consts::*;
use crate::bagit::digest::{hash_file, DigestAlgorithm, HexDigest};
use crate::bagit::encoding::{percent_decode, percent_encode};
use crate::bagit::error::*;
use crate::bagit::io::Walker;

/// One file's digest record, ready to be written into every requested
/// manifest. `path` is `/`-separated and relative to the bag's base
/// directory (e.g. `data/images/cat.jpg`).
#[derive(Debug, Clone)]
pub struct ManifestEntry {
    pub path: String,
    pub size_bytes: u64,
    pub digests: HashMap<DigestAlgorithm, HexDigest>,
}

/// Builds a pool of worker threads used to hash files in parallel. Mirrors
/// `original_source/bagit_modules/concurrency.py`'s
/// `posix_multiprocessing_worker_initializer`: workers ignore SIGINT so a
/// Ctrl-C is handled once, by the main thread, instead of being delivered to
/// every worker and producing a flood of interrupted-hash warnings.
fn build_pool(processes: usize) -> Result<ThreadPool> {
    let mut builder = ThreadPoolBuilder::new();
    if processes > 0 {
        builder = builder.num_threads(processes);
    }
    #[cfg(unix)]
    {
        builder = builder.start_handler(|_| unsafe {
            libc::signal(libc::SIGINT, libc::SIG_IGN);
        });
    }
    builder
        .build()
        .map_err(|e| Error::bag(format!("failed to start hashing thread pool: {e}")))
}

/// Hashes every regular file under `root` (used with `root` set to either
/// the bag's `data/` directory or the bag's base directory, depending on
/// whether payload or tag manifests are being built), in parallel across
/// `processes` worker threads (0 meaning rayon's default parallelism).
///
/// `path_prefix` is prepended to every returned entry's path (`"data"` for
/// payload files, empty for tag files), and `exclude` filters out relative
/// paths — e.g. tag manifests exclude `data/` and the tagmanifest files
/// themselves so they don't try to hash themselves mid-write.
pub fn hash_tree<F>(
    root: &Path,
    path_prefix: &str,
    algorithms: &[DigestAlgorithm],
    processes: usize,
    exclude: F,
) -> Result<Vec<ManifestEntry>>
where
    F: Fn(&str) -> bool,
{
    let relative_paths: Vec<String> = Walker::walk_files(root)?
        .into_iter()
        .filter(|p| !exclude(p))
        .collect();

    let pool = build_pool(processes)?;

    let results: Vec<Result<ManifestEntry>> = pool.install(|| {
        relative_paths
            .par_iter()
            .map(|relative| {
                info!("Calculating digests for {relative}");
                let full_path = root.join(relative);
                let (digests, size_bytes) = hash_file(&full_path, algorithms)?;

                let manifest_path = if path_prefix.is_empty() {
                    relative.clone()
                } else {
                    format!("{path_prefix}/{relative}")
                };

                Ok(ManifestEntry {
                    path: manifest_path,
                    size_bytes,
                    digests,
                })
            })
            .collect()
    });

    results.into_iter().collect()
}

/// Excludes `data/` and any `tagmanifest-*.txt` file, the predicate used
/// when walking the base directory to build tag manifests.
pub fn is_tag_manifest_input_excluded(relative: &str) -> bool {
    relative == DATA
        || relative.starts_with(&format!("{DATA}/"))
        || relative
            .rsplit('/')
            .next()
            .map(|name| TAG_MANIFEST_MATCHER.is_match(name))
            .unwrap_or(false)
}

/// Writes one `<prefix>-<algorithm>.txt` payload manifest per algorithm,
/// with entries sorted by path for reproducibility and CR/LF in filenames
/// percent-escaped, per spec.md §4.6 (two spaces between digest and name).
pub fn write_manifests(
    base_dir: &Path,
    prefix: &str,
    algorithms: &[DigestAlgorithm],
    entries: &[ManifestEntry],
) -> Result<()> {
    write_manifest_lines(base_dir, prefix, "  ", algorithms, entries, |path| {
        percent_encode(path).into_owned()
    })
}

/// Writes one `tagmanifest-<algorithm>.txt` per algorithm. Unlike payload
/// manifests, tag-manifest lines use a single space between digest and
/// filename and never escape the filename, per spec.md §4.7 and
/// `original_source/bagit_modules/manifests.py::make_tagmanifest_file`.
pub fn write_tag_manifests(
    base_dir: &Path,
    algorithms: &[DigestAlgorithm],
    entries: &[ManifestEntry],
) -> Result<()> {
    write_manifest_lines(
        base_dir,
        TAG_MANIFEST_PREFIX,
        " ",
        algorithms,
        entries,
        |path| path.to_string(),
    )
}

fn write_manifest_lines<F>(
    base_dir: &Path,
    prefix: &str,
    separator: &str,
    algorithms: &[DigestAlgorithm],
    entries: &[ManifestEntry],
    format_name: F,
) -> Result<()>
where
    F: Fn(&str) -> String,
{
    let mut sorted: Vec<&ManifestEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| a.path.cmp(&b.path));

    let mut writers = HashMap::with_capacity(algorithms.len());
    for algorithm in algorithms {
        let manifest_path = base_dir.join(format!("{prefix}-{algorithm}.txt"));
        info!("Writing manifest {}", manifest_path.display());
        let file = File::create(&manifest_path).context(IoCreateSnafu {
            path: &manifest_path,
        })?;
        writers.insert(*algorithm, BufWriter::new(file));
    }

    for entry in &sorted {
        let name = format_name(&entry.path);

        for algorithm in algorithms {
            let digest = entry
                .digests
                .get(algorithm)
                .expect("hash_tree computed every requested algorithm for every entry");
            let writer = writers
                .get_mut(algorithm)
                .expect("writer created for every requested algorithm above");
            writeln!(writer, "{digest}{separator}{name}").context(IoGeneralSnafu {})?;
        }
    }

    Ok(())
}

/// A manifest parsed back off disk: the path -> digest map (last occurrence
/// wins, as a `HashMap` requires), plus every path that appeared more than
/// once, in file order, so callers can apply the BagIt-version-gated
/// duplicate-entry rule themselves.
pub struct ParsedManifest {
    pub entries: HashMap<String, HexDigest>,
    pub duplicate_paths: Vec<String>,
}

/// Reads back an existing `<prefix>-<algorithm>.txt` manifest into a map of
/// path -> digest. Used both when opening an existing bag and when
/// validating fixity. `escaped` selects whether names are percent-decoded:
/// true for payload manifests (spec.md §4.6), false for tag manifests,
/// whose names are never escaped (spec.md §4.7).
pub fn read_manifest(path: &Path, escaped: bool) -> Result<ParsedManifest> {
    let content = std::fs::read_to_string(path).context(IoReadSnafu { path })?;
    let mut entries = HashMap::new();
    let mut duplicate_paths = Vec::new();

    for (num, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }

        let (digest, encoded_path) = line.split_once("  ").or_else(|| line.split_once(' '))
            .ok_or_else(|| Error::InvalidTagLineWithRef {
                path: path.to_path_buf(),
                num: (num + 1) as u32,
                details: "manifest line must be '<digest>  <path>'".to_string(),
            })?;

        let trimmed_name = encoded_path.trim();
        let decoded_path = if escaped {
            percent_decode(trimmed_name).into_owned()
        } else {
            trimmed_name.to_string()
        };
        if entries
            .insert(decoded_path.clone(), digest.trim().to_ascii_lowercase())
            .is_some()
        {
            duplicate_paths.push(decoded_path);
        }
    }

    Ok(ParsedManifest {
        entries,
        duplicate_paths,
    })
}

/// Returns every digest algorithm declared by manifests matching the given
/// file-name regex directly under `base_dir` (e.g. all payload manifests'
/// algorithms, via [`PAYLOAD_MANIFEST_MATCHER`]).
pub fn detect_algorithms(base_dir: &Path, matcher: &regex::Regex) -> Result<Vec<DigestAlgorithm>> {
    let mut algorithms = Vec::new();

    for entry in std::fs::read_dir(base_dir).context(IoReadDirSnafu { path: base_dir })? {
        let entry = entry.context(IoReadDirSnafu { path: base_dir })?;
        if !entry
            .file_type()
            .context(IoStatSnafu { path: entry.path() })?
            .is_file()
        {
            continue;
        }

        if let Some(name) = entry.file_name().to_str() {
            if let Some(captures) = matcher.captures(name) {
                let algorithm_str = captures.get(1).unwrap().as_str();
                match algorithm_str.parse::<DigestAlgorithm>() {
                    Ok(algorithm) => algorithms.push(algorithm),
                    Err(_) => {
                        log::warn!("Ignoring manifest with unsupported algorithm: {name}")
                    }
                }
            }
        }
    }

    algorithms.sort();
    algorithms.dedup();
    Ok(algorithms)
}

/// Computes the `Payload-Oxum` value (`<total bytes>.<file count>`) for a
/// set of payload manifest entries.
pub fn payload_oxum(entries: &[ManifestEntry]) -> String {
    let byte_count: u64 = entries.iter().map(|e| e.size_bytes).sum();
    format!("{byte_count}.{}", entries.len())
}

/// Verifies every algorithm's manifest agrees on which files exist and how
/// large they are, per `original_source/bagit_modules/manifests.py`'s
/// cross-algorithm consistency check (`byte_value_set`/`file_count_set`
/// both being singletons). `entries` must have been produced by a single
/// [`hash_tree`] call, which by construction can't disagree, so this exists
/// to protect callers building `ManifestEntry`s from independently-read
/// manifests (i.e. while validating an existing bag).
pub fn check_consistency(
    algorithm_entries: &HashMap<DigestAlgorithm, HashMap<String, HexDigest>>,
) -> Result<()> {
    let mut file_sets = algorithm_entries.values().map(|m| {
        let mut keys: Vec<&String> = m.keys().collect();
        keys.sort();
        keys
    });

    if let Some(first) = file_sets.next() {
        for other in file_sets {
            if other != first {
                return Err(Error::ManifestInconsistent);
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str, size: u64, alg: DigestAlgorithm, digest: &str) -> ManifestEntry {
        let mut digests = HashMap::new();
        digests.insert(alg, digest.to_string());
        ManifestEntry {
            path: path.to_string(),
            size_bytes: size,
            digests,
        }
    }

    #[test]
    fn hash_tree_computes_every_file_under_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        std::fs::create_dir(dir.path().join("sub")).unwrap();
        std::fs::write(dir.path().join("sub/b.txt"), b"world").unwrap();

        let entries = hash_tree(
            dir.path(),
            DATA,
            &[DigestAlgorithm::Sha256],
            1,
            |_| false,
        )
        .unwrap();

        let mut paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
        paths.sort();
        assert_eq!(paths, vec!["data/a.txt", "data/sub/b.txt"]);
    }

    #[test]
    fn write_then_read_manifest_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let entries = vec![entry(
            "data/a.txt",
            5,
            DigestAlgorithm::Sha256,
            "deadbeef",
        )];

        write_manifests(dir.path(), "manifest", &[DigestAlgorithm::Sha256], &entries).unwrap();

        let read_back = read_manifest(&dir.path().join("manifest-sha256.txt"), true).unwrap();
        assert_eq!(
            read_back.entries.get("data/a.txt"),
            Some(&"deadbeef".to_string())
        );
        assert!(read_back.duplicate_paths.is_empty());
    }

    #[test]
    fn read_manifest_reports_duplicate_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest-sha256.txt");
        std::fs::write(&path, "aaa  data/a.txt\nbbb  data/a.txt\n").unwrap();

        let read_back = read_manifest(&path, true).unwrap();
        assert_eq!(read_back.duplicate_paths, vec!["data/a.txt".to_string()]);
        assert_eq!(read_back.entries.get("data/a.txt"), Some(&"bbb".to_string()));
    }

    #[test]
    fn write_tag_manifests_uses_single_space_and_does_not_escape_names() {
        let dir = tempfile::tempdir().unwrap();
        let entries = vec![entry("bag-info.txt", 5, DigestAlgorithm::Sha256, "deadbeef")];

        write_tag_manifests(dir.path(), &[DigestAlgorithm::Sha256], &entries).unwrap();

        let written =
            std::fs::read_to_string(dir.path().join("tagmanifest-sha256.txt")).unwrap();
        assert_eq!(written, "deadbeef bag-info.txt\n");

        let read_back =
            read_manifest(&dir.path().join("tagmanifest-sha256.txt"), false).unwrap();
        assert_eq!(
            read_back.entries.get("bag-info.txt"),
            Some(&"deadbeef".to_string())
        );
    }

    #[test]
    fn payload_oxum_sums_bytes_and_counts_files() {
        let entries = vec![
            entry("data/a.txt", 10, DigestAlgorithm::Sha256, "x"),
            entry("data/b.txt", 20, DigestAlgorithm::Sha256, "y"),
        ];
        assert_eq!(payload_oxum(&entries), "30.2");
    }

    #[test]
    fn check_consistency_detects_disagreement() {
        let mut sha256 = HashMap::new();
        sha256.insert("data/a.txt".to_string(), "x".to_string());
        let mut md5 = HashMap::new();
        md5.insert("data/a.txt".to_string(), "y".to_string());
        md5.insert("data/b.txt".to_string(), "z".to_string());

        let mut by_alg = HashMap::new();
        by_alg.insert(DigestAlgorithm::Sha256, sha256);
        by_alg.insert(DigestAlgorithm::Md5, md5);

        assert!(check_consistency(&by_alg).is_err());
    }

    #[test]
    fn tag_manifest_input_excludes_data_dir_and_tagmanifests() {
        assert!(is_tag_manifest_input_excluded("data/a.txt"));
        assert!(is_tag_manifest_input_excluded("tagmanifest-sha256.txt"));
        assert!(!is_tag_manifest_input_excluded("bag-info.txt"));
    }
}
