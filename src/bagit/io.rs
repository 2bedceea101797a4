use crate::bagit::consts::*;
use crate::bagit::error::*;
use crate::bagit::Error::IoGeneral;
use snafu::ResultExt;
use std::io::Read;
use std::path::{Path, PathBuf};

/// Iteratively reads lines. Lines can be terminated by CR, LF, or CRLF.
pub struct LineReader<R: Read> {
    reader: R,
    buf: [u8; BUF_SIZE],
    position: usize,
    read: usize,
    end: bool,
}

pub fn is_space_or_tab(c: char) -> bool {
    c == SPACE || c == TAB
}

impl<R: Read> LineReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: [0; BUF_SIZE],
            position: 0,
            read: 0,
            end: false,
        }
    }
}

impl<R: Read> Iterator for LineReader<R> {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.end {
            return None;
        }

        let mut line = Vec::new();

        loop {
            if self.position >= self.read {
                match self.reader.read(&mut self.buf) {
                    Ok(read) => {
                        if read == 0 {
                            self.end = true;
                        } else {
                            self.read = read;
                            self.position = 0;
                        }
                    }
                    Err(e) => return Some(Err(IoGeneral { source: e })),
                }
            }

            if self.end {
                return if line.is_empty() {
                    None
                } else {
                    Some(bytes_to_string(line))
                };
            }

            let mut seen_cr = false;
            let mut found_end = false;

            for i in self.position..self.read {
                let b = self.buf[i];

                if seen_cr && b != LF_B {
                    found_end = true;
                    self.position = i;
                    break;
                } else if b == CR_B {
                    seen_cr = true;
                } else if b == LF_B {
                    found_end = true;
                    self.position = i + 1;
                    break;
                } else {
                    line.push(b);
                }
            }

            // Read the whole buffer but didn't find the end of the line, try again
            if !found_end {
                self.position = 0;
                self.read = 0;
                continue;
            }

            return Some(bytes_to_string(line));
        }
    }
}

fn bytes_to_string(bytes: Vec<u8>) -> Result<String> {
    String::from_utf8(bytes).context(InvalidStringSnafu {})
}

/// Walks a directory tree, returning every regular file's path relative to
/// `root`. At each level, directory entries are read and sorted
/// lexicographically by name before any of them is descended into, so the
/// traversal order is the same one `tagmanifest-*.txt` fixity depends on
/// being reproducible across filesystems and operating systems.
pub struct Walker;

impl Walker {
    /// Returns the `/`-separated relative paths of every regular file
    /// under `root`, in sorted-per-level traversal order. A symlink that
    /// resolves to a file is followed and included; a symlink that
    /// resolves to a directory is not descended into.
    pub fn walk_files(root: &Path) -> Result<Vec<String>> {
        let mut paths = Vec::new();
        walk_level(root, Path::new(""), &mut paths)?;
        Ok(paths)
    }
}

fn walk_level(root: &Path, relative_dir: &Path, out: &mut Vec<String>) -> Result<()> {
    let dir = root.join(relative_dir);

    let mut entries: Vec<(std::ffi::OsString, PathBuf)> = std::fs::read_dir(&dir)
        .context(IoReadDirSnafu { path: &dir })?
        .map(|entry| {
            let entry = entry.context(IoReadDirSnafu { path: &dir })?;
            Ok((entry.file_name(), entry.path()))
        })
        .collect::<Result<Vec<_>>>()?;

    entries.sort_by(|a, b| a.0.cmp(&b.0));

    for (name, abs_path) in entries {
        let relative = relative_dir.join(&name);

        let symlink_type = std::fs::symlink_metadata(&abs_path)
            .context(IoStatSnafu { path: &abs_path })?
            .file_type();

        if symlink_type.is_dir() {
            walk_level(root, &relative, out)?;
        } else if symlink_type.is_symlink() {
            // Follow a symlink only far enough to tell whether it resolves to a
            // file; a symlink to a directory is intentionally not descended into.
            if let Ok(meta) = std::fs::metadata(&abs_path) {
                if meta.is_file() {
                    out.push(to_unix_path(relative_str(&relative)?));
                }
            }
        } else if symlink_type.is_file() {
            out.push(to_unix_path(relative_str(&relative)?));
        } else {
            return Err(Error::UnsupportedFile { path: abs_path });
        }
    }

    Ok(())
}

fn relative_str(path: &Path) -> Result<&str> {
    path.to_str()
        .ok_or_else(|| Error::InvalidUtf8Path { path: path.to_path_buf() })
}

#[cfg(windows)]
fn to_unix_path(path: &str) -> String {
    path.replace('\\', "/")
}

#[cfg(not(windows))]
fn to_unix_path(path: &str) -> String {
    path.to_string()
}

/// Checks filesystem permissions before bagging begins, so a half-moved bag
/// never results from a permission error discovered partway through.
/// Mirrors `original_source/bagit_modules/io.py::can_bag`/`can_read`.
pub struct PermissionScanner;

impl PermissionScanner {
    /// Returns every directory or file under `root` that lacks write
    /// permission, plus `root` itself if `root` is unreadable. A pure
    /// audit: nothing is mutated.
    pub fn can_bag(root: &Path) -> Vec<PathBuf> {
        let mut unwritable = Vec::new();

        if !is_readable(root) {
            unwritable.push(root.to_path_buf());
            return unwritable;
        }
        if !is_writable(root) {
            unwritable.push(root.to_path_buf());
        }

        for entry in walkdir::WalkDir::new(root) {
            let entry = match entry {
                Ok(e) => e,
                Err(_) => continue,
            };
            if entry.path() == root {
                continue;
            }
            if !is_writable(entry.path()) {
                unwritable.push(entry.path().to_path_buf());
            }
        }

        unwritable
    }

    /// Returns the `(unreadable directories, unreadable files)` found
    /// under `root`.
    pub fn can_read(root: &Path) -> (Vec<PathBuf>, Vec<PathBuf>) {
        let mut dirs = Vec::new();
        let mut files = Vec::new();

        for entry in walkdir::WalkDir::new(root) {
            let entry = match entry {
                Ok(e) => e,
                Err(_) => continue,
            };
            if entry.file_type().is_dir() {
                if !is_readable(entry.path()) {
                    dirs.push(entry.path().to_path_buf());
                }
            } else if entry.file_type().is_file() && !is_readable(entry.path()) {
                files.push(entry.path().to_path_buf());
            }
        }

        (dirs, files)
    }
}

#[cfg(unix)]
fn is_readable(path: &Path) -> bool {
    access(path, libc::R_OK)
}

#[cfg(unix)]
fn is_writable(path: &Path) -> bool {
    access(path, libc::W_OK)
}

#[cfg(unix)]
fn access(path: &Path, mode: libc::c_int) -> bool {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = match CString::new(path.as_os_str().as_bytes()) {
        Ok(p) => p,
        Err(_) => return false,
    };

    unsafe { libc::access(c_path.as_ptr(), mode) == 0 }
}

#[cfg(not(unix))]
fn is_readable(path: &Path) -> bool {
    std::fs::metadata(path).is_ok()
}

#[cfg(not(unix))]
fn is_writable(path: &Path) -> bool {
    match std::fs::metadata(path) {
        Ok(meta) => !meta.permissions().readonly(),
        Err(_) => false,
    }
}
