use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

use blake2::Blake2b512;
use digest::DynDigest;
use md5::Md5;
use sha1::Sha1;
use sha2::{Sha256, Sha512};
use snafu::ResultExt;
use strum_macros::{Display, EnumString};

use crate::bagit::consts::HASH_BLOCK_SIZE;
use crate::bagit::error::*;

/// A hex-encoded digest, as read from or written to a manifest.
pub type HexDigest = String;

/// The digest algorithms bagr knows how to compute.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd, Display, EnumString,
)]
#[strum(serialize_all = "lowercase")]
pub enum DigestAlgorithm {
    Md5,
    Sha1,
    Sha256,
    Sha512,
    Blake2b,
}

impl DigestAlgorithm {
    fn new_hasher(self) -> Box<dyn DynDigest + Send> {
        match self {
            DigestAlgorithm::Md5 => Box::<Md5>::default(),
            DigestAlgorithm::Sha1 => Box::<Sha1>::default(),
            DigestAlgorithm::Sha256 => Box::<Sha256>::default(),
            DigestAlgorithm::Sha512 => Box::<Sha512>::default(),
            DigestAlgorithm::Blake2b => Box::<Blake2b512>::default(),
        }
    }
}

/// Returns a fresh hasher for every requested algorithm. Unlike the reference
/// implementation, unsupported names never reach this point: they're filtered
/// out (with a warning) wherever algorithm names are parsed from strings, so
/// every `DigestAlgorithm` passed here is always instantiable.
pub fn get_hashers(
    algorithms: &[DigestAlgorithm],
) -> HashMap<DigestAlgorithm, Box<dyn DynDigest + Send>> {
    algorithms
        .iter()
        .map(|alg| (*alg, alg.new_hasher()))
        .collect()
}

/// Reads `path` once, in 512 KiB blocks, feeding every requested algorithm's
/// hasher each block, and returns the resulting hex digests plus the total
/// byte count.
pub fn hash_file<P: AsRef<Path>>(
    path: P,
    algorithms: &[DigestAlgorithm],
) -> Result<(HashMap<DigestAlgorithm, HexDigest>, u64)> {
    let path = path.as_ref();
    let mut hashers = get_hashers(algorithms);

    let mut file = File::open(path).context(IoReadSnafu { path })?;
    let mut buf = vec![0u8; HASH_BLOCK_SIZE];
    let mut total_bytes: u64 = 0;

    loop {
        let read = file.read(&mut buf).context(IoReadSnafu { path })?;
        if read == 0 {
            break;
        }
        total_bytes += read as u64;
        for hasher in hashers.values_mut() {
            hasher.update(&buf[..read]);
        }
    }

    let digests = hashers
        .into_iter()
        .map(|(alg, mut hasher)| (alg, hex::encode(hasher.finalize_reset())))
        .collect();

    Ok((digests, total_bytes))
}

/// A `Write` sink that feeds every byte written to it through a set of
/// digest hashers before (optionally) forwarding it to an inner writer. Used
/// while moving payload files into `data/` so that the digest is computed in
/// the same pass as the copy/move, and while hashing into `io::sink()` when
/// only the digest, not a copy, is needed.
pub struct MultiDigestWriter<W: Write> {
    hashers: Vec<(DigestAlgorithm, Box<dyn DynDigest + Send>)>,
    inner: W,
}

impl<W: Write> MultiDigestWriter<W> {
    pub fn new(algorithms: &[DigestAlgorithm], inner: W) -> Self {
        Self {
            hashers: algorithms.iter().map(|a| (*a, a.new_hasher())).collect(),
            inner,
        }
    }

    pub fn finalize_hex(self) -> HashMap<DigestAlgorithm, HexDigest> {
        self.hashers
            .into_iter()
            .map(|(alg, mut hasher)| (alg, hex::encode(hasher.finalize_reset())))
            .collect()
    }
}

impl<W: Write> Write for MultiDigestWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for (_, hasher) in self.hashers.iter_mut() {
            hasher.update(buf);
        }
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
