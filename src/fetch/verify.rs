//! Archive digest verification
//!
//! Declared digests look like `SHA256=<hex>` or `sha256:<hex>`. A bare
//! 64-character hex string is taken as SHA256. Supported algorithms are
//! SHA256, SHA512, SHA3_256, SHA3_512 and BLAKE3; comparison ignores case.

use sha2::Digest;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::output;

/// Chunk size for reading files during hashing (1MB)
const CHUNK_SIZE: usize = 1024 * 1024;

/// Threshold for showing progress (100MB)
const PROGRESS_THRESHOLD: u64 = 100 * 1024 * 1024;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DigestError {
    #[error("unknown digest algorithm '{0}' (expected SHA256, SHA512, SHA3_256, SHA3_512 or BLAKE3)")]
    UnknownAlgorithm(String),

    #[error("{algorithm} digest must be {expected} hex characters, got '{value}'")]
    InvalidHex {
        algorithm: HashAlgorithm,
        expected: usize,
        value: String,
    },
}

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error(
        "{algorithm} integrity check failed for '{}'\n  expected: {expected}\n  got:      {actual}",
        path.display()
    )]
    Mismatch {
        path: PathBuf,
        algorithm: HashAlgorithm,
        expected: String,
        actual: String,
    },

    #[error("cannot hash {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha256,
    Sha512,
    Sha3_256,
    Sha3_512,
    Blake3,
}

impl HashAlgorithm {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Sha256 => "SHA256",
            Self::Sha512 => "SHA512",
            Self::Sha3_256 => "SHA3_256",
            Self::Sha3_512 => "SHA3_512",
            Self::Blake3 => "BLAKE3",
        }
    }

    fn hex_len(&self) -> usize {
        match self {
            Self::Sha256 | Self::Sha3_256 | Self::Blake3 => 64,
            Self::Sha512 | Self::Sha3_512 => 128,
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_uppercase().replace('-', "_").as_str() {
            "SHA256" => Some(Self::Sha256),
            "SHA512" => Some(Self::Sha512),
            "SHA3_256" => Some(Self::Sha3_256),
            "SHA3_512" => Some(Self::Sha3_512),
            "BLAKE3" => Some(Self::Blake3),
            _ => None,
        }
    }
}

impl fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A digest declared by the caller for an archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpectedDigest {
    pub algorithm: HashAlgorithm,
    /// Lowercase hex
    pub hex: String,
}

impl ExpectedDigest {
    pub fn parse(s: &str) -> Result<Self, DigestError> {
        let s = s.trim();
        let (algorithm, value) = match s.split_once(['=', ':']) {
            Some((algo, value)) => (
                HashAlgorithm::from_name(algo.trim())
                    .ok_or_else(|| DigestError::UnknownAlgorithm(algo.trim().to_string()))?,
                value.trim(),
            ),
            None => (HashAlgorithm::Sha256, s),
        };

        if value.len() != algorithm.hex_len() || !value.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(DigestError::InvalidHex {
                algorithm,
                expected: algorithm.hex_len(),
                value: value.to_string(),
            });
        }

        Ok(Self {
            algorithm,
            hex: value.to_ascii_lowercase(),
        })
    }
}

impl fmt::Display for ExpectedDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.algorithm, self.hex)
    }
}

/// Verify a file against an expected digest.
pub fn verify_file(file: &Path, expected: &ExpectedDigest) -> Result<(), VerifyError> {
    let actual = file_digest(file, expected.algorithm).map_err(|source| VerifyError::Io {
        path: file.to_path_buf(),
        source,
    })?;

    if actual != expected.hex {
        return Err(VerifyError::Mismatch {
            path: file.to_path_buf(),
            algorithm: expected.algorithm,
            expected: expected.hex.clone(),
            actual,
        });
    }

    Ok(())
}

/// Compute the lowercase hex digest of a file.
///
/// Shows a progress bar for files larger than 100MB.
pub fn file_digest(file: &Path, algorithm: HashAlgorithm) -> std::io::Result<String> {
    let mut f = std::fs::File::open(file)?;
    let file_size = f.metadata().map(|m| m.len()).unwrap_or(0);

    let pb = (file_size > PROGRESS_THRESHOLD).then(|| {
        let pb = output::spinner(&format!("checksum {}", algorithm));
        output::upgrade_to_bytes(&pb, file_size);
        output::ProgressGuard::new(pb)
    });
    let mut on_progress = |n: u64| {
        if let Some(guard) = &pb {
            guard.bar().inc(n);
        }
    };

    match algorithm {
        HashAlgorithm::Sha256 => hash_reader::<sha2::Sha256>(&mut f, &mut on_progress),
        HashAlgorithm::Sha512 => hash_reader::<sha2::Sha512>(&mut f, &mut on_progress),
        HashAlgorithm::Sha3_256 => hash_reader::<sha3::Sha3_256>(&mut f, &mut on_progress),
        HashAlgorithm::Sha3_512 => hash_reader::<sha3::Sha3_512>(&mut f, &mut on_progress),
        HashAlgorithm::Blake3 => hash_blake3(&mut f, &mut on_progress),
    }
}

fn hash_reader<D: Digest>(
    reader: &mut impl Read,
    on_progress: &mut impl FnMut(u64),
) -> std::io::Result<String> {
    let mut hasher = D::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
        on_progress(n as u64);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// BLAKE3 has its own hasher API
fn hash_blake3(
    reader: &mut impl Read,
    on_progress: &mut impl FnMut(u64),
) -> std::io::Result<String> {
    let mut hasher = blake3::Hasher::new();
    let mut buffer = vec![0u8; CHUNK_SIZE];

    loop {
        let n = reader.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        hasher.update(&buffer[..n]);
        on_progress(n as u64);
    }

    Ok(hasher.finalize().to_hex().to_string())
}

/// Every supported digest of one file, for writing declarations.
#[derive(Debug, Clone)]
pub struct FileHashes {
    pub sha256: String,
    pub sha512: String,
    pub sha3_256: String,
    pub blake3: String,
}

/// Compute all hashes in a single pass (used by `depbuild hash`).
pub fn compute_all_hashes(file: &Path) -> std::io::Result<FileHashes> {
    let mut f = std::fs::File::open(file)?;
    let mut sha256 = sha2::Sha256::new();
    let mut sha512 = sha2::Sha512::new();
    let mut sha3_256 = sha3::Sha3_256::new();
    let mut blake3_hasher = blake3::Hasher::new();
    let mut buffer = [0u8; 8192];

    loop {
        let n = f.read(&mut buffer)?;
        if n == 0 {
            break;
        }
        sha256.update(&buffer[..n]);
        sha512.update(&buffer[..n]);
        sha3_256.update(&buffer[..n]);
        blake3_hasher.update(&buffer[..n]);
    }

    Ok(FileHashes {
        sha256: hex::encode(sha256.finalize()),
        sha512: hex::encode(sha512.finalize()),
        sha3_256: hex::encode(sha3_256.finalize()),
        blake3: blake3_hasher.finalize().to_hex().to_string(),
    })
}
