use std::collections::HashMap;
use std::path::{Component, Path};

use unicode_normalization::UnicodeNormalization;

use crate::bagit::consts::ENV_VAR_MATCHER;

/// Returns true if `path` (a manifest-relative path, using `/` separators)
/// would, once joined to `root`, escape `root`, reference the user's home
/// directory, or contain an environment variable reference that could cause
/// it to resolve somewhere else depending on the shell or process
/// environment that later reads the bag.
///
/// Mirrors `original_source/bagit_modules/bag.py::_path_is_dangerous`.
pub fn is_dangerous(root: &Path, path: &str) -> bool {
    if path.is_empty() {
        return true;
    }

    if Path::new(path).is_absolute() {
        return true;
    }

    if path.starts_with('~') {
        return true;
    }

    if ENV_VAR_MATCHER.is_match(path) {
        return true;
    }

    let joined = root.join(path);
    !is_contained(root, &joined)
}

/// Returns true if `candidate`, once lexically normalized (`.`/`..`
/// components resolved without touching the filesystem), stays within
/// `root`. Falls back to lexical normalization rather than
/// `fs::canonicalize` because payload paths frequently don't exist yet
/// when this check runs (e.g. before a file is moved into `data/`).
fn is_contained(root: &Path, candidate: &Path) -> bool {
    let normalized_root = normalize_lexically(root);
    let normalized_candidate = normalize_lexically(candidate);
    normalized_candidate.starts_with(&normalized_root)
}

fn normalize_lexically(path: &Path) -> std::path::PathBuf {
    let mut out = std::path::PathBuf::new();
    for component in path.components() {
        match component {
            Component::ParentDir => {
                out.pop();
            }
            Component::CurDir => {}
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Builds a bidirectional lookup from each path's NFC-normalized form back
/// to its original spelling, returning the first pair of distinct original
/// paths that collide once normalized. BagIt requires comparing filesystem
/// names against manifest names in their normalized form (since macOS
/// commonly produces NFD-decomposed names), but two *different* original
/// names that happen to normalize to the same string make that comparison
/// ambiguous, so it's treated as an error rather than silently picking one.
pub fn find_normalization_conflict(paths: &[String]) -> Option<(String, String)> {
    let mut seen: HashMap<String, &String> = HashMap::with_capacity(paths.len());

    for path in paths {
        let normalized: String = path.nfc().collect();
        if let Some(other) = seen.get(&normalized) {
            if *other != path {
                return Some(((*other).clone(), path.clone()));
            }
        } else {
            seen.insert(normalized, path);
        }
    }

    None
}

/// Returns a lookup table from NFC-normalized path to original path. Used to
/// compare a manifest's listed paths against the filesystem's actual paths
/// without being tripped up by differing Unicode normalization forms.
pub fn normalized_lookup(paths: &[String]) -> HashMap<String, String> {
    paths
        .iter()
        .map(|p| (p.nfc().collect::<String>(), p.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn absolute_path_is_dangerous() {
        assert!(is_dangerous(Path::new("/bag"), "/etc/passwd"));
    }

    #[test]
    fn home_relative_path_is_dangerous() {
        assert!(is_dangerous(Path::new("/bag"), "~/secrets.txt"));
    }

    #[test]
    fn env_var_reference_is_dangerous() {
        assert!(is_dangerous(Path::new("/bag"), "data/$HOME/file.txt"));
        assert!(is_dangerous(Path::new("/bag"), "data/${HOME}/file.txt"));
    }

    #[test]
    fn parent_dir_escape_is_dangerous() {
        assert!(is_dangerous(Path::new("/bag"), "data/../../etc/passwd"));
    }

    #[test]
    fn ordinary_relative_path_is_safe() {
        assert!(!is_dangerous(Path::new("/bag"), "data/file.txt"));
    }

    #[test]
    fn normalize_lexically_resolves_parent_refs() {
        let out = normalize_lexically(&PathBuf::from("/bag/data/../escape"));
        assert_eq!(out, PathBuf::from("/bag/escape"));
    }

    #[test]
    fn find_normalization_conflict_detects_distinct_names_with_same_nfc_form() {
        let nfc = "\u{00e9}".to_string(); // é (precomposed)
        let nfd = "e\u{0301}".to_string(); // e + combining acute accent
        let paths = vec![nfc.clone(), nfd.clone()];

        let conflict = find_normalization_conflict(&paths);
        assert!(conflict.is_some());
    }

    #[test]
    fn find_normalization_conflict_ignores_distinct_names() {
        let paths = vec!["a.txt".to_string(), "b.txt".to_string()];
        assert!(find_normalization_conflict(&paths).is_none());
    }

    #[test]
    fn normalized_lookup_maps_nfc_form_to_original() {
        let nfd = "e\u{0301}.txt".to_string();
        let lookup = normalized_lookup(&[nfd.clone()]);
        assert_eq!(lookup.get("\u{e9}.txt"), Some(&nfd));
    }
}
