// src/hash.rs

//! Checksums for pinned source archives
//!
//! Recipes pin every source archive with a prefixed checksum such as
//! `sha256:<hex>` or `sha512:<hex>`. A bare 64-character hex string is read
//! as SHA-256, which is what most upstream release pages publish.

use sha2::{Digest, Sha256, Sha512};
use std::fmt;
use std::io::{self, Read};
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;

/// Digest used by a pinned checksum
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    const fn hex_len(self) -> usize {
        match self {
            Self::Sha256 => 64,
            Self::Sha512 => 128,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::Sha512 => "sha512",
        }
    }
}

impl FromStr for HashAlgorithm {
    type Err = HashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sha256" | "sha-256" => Ok(Self::Sha256),
            "sha512" | "sha-512" => Ok(Self::Sha512),
            _ => Err(HashError::UnknownAlgorithm(s.to_string())),
        }
    }
}

/// Malformed checksum in a recipe
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HashError {
    #[error("unknown hash algorithm: {0}")]
    UnknownAlgorithm(String),
    #[error("{algorithm} digest must be {expected} hex characters, got {got}")]
    InvalidLength {
        algorithm: &'static str,
        expected: usize,
        got: usize,
    },
    #[error("invalid hex in digest: {0}")]
    InvalidHex(String),
}

/// A digest together with its algorithm
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Hash {
    pub algorithm: HashAlgorithm,
    /// Lowercase hex digest
    pub value: String,
}

impl Hash {
    pub fn new(algorithm: HashAlgorithm, value: &str) -> Result<Self, HashError> {
        if value.len() != algorithm.hex_len() {
            return Err(HashError::InvalidLength {
                algorithm: algorithm.name(),
                expected: algorithm.hex_len(),
                got: value.len(),
            });
        }
        if !value.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(HashError::InvalidHex(value.to_string()));
        }
        Ok(Self {
            algorithm,
            value: value.to_ascii_lowercase(),
        })
    }

    /// Parse `sha256:<hex>` or `sha512:<hex>`; a bare digest is SHA-256
    pub fn parse_prefixed(s: &str) -> Result<Self, HashError> {
        match s.split_once(':') {
            Some((algorithm, digest)) => Self::new(algorithm.parse()?, digest),
            None => Self::new(HashAlgorithm::Sha256, s),
        }
    }

    pub fn to_prefixed_string(&self) -> String {
        format!("{}:{}", self.algorithm.name(), self.value)
    }

    /// File-name friendly key, used for the source cache
    pub fn cache_key(&self) -> String {
        format!("{}_{}", self.algorithm.name(), self.value)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm.name(), self.value)
    }
}

/// Incremental hasher, fed while a download streams to disk
pub enum Hasher {
    Sha256(Sha256),
    Sha512(Sha512),
}

impl Hasher {
    pub fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Sha256 => Self::Sha256(Sha256::new()),
            HashAlgorithm::Sha512 => Self::Sha512(Sha512::new()),
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha256(hasher) => hasher.update(data),
            Self::Sha512(hasher) => hasher.update(data),
        }
    }

    pub fn finalize(self) -> Hash {
        let (algorithm, value) = match self {
            Self::Sha256(hasher) => (HashAlgorithm::Sha256, hex::encode(hasher.finalize())),
            Self::Sha512(hasher) => (HashAlgorithm::Sha512, hex::encode(hasher.finalize())),
        };
        Hash { algorithm, value }
    }
}

pub fn hash_bytes(algorithm: HashAlgorithm, data: &[u8]) -> Hash {
    let mut hasher = Hasher::new(algorithm);
    hasher.update(data);
    hasher.finalize()
}

/// Stream a file through the hasher
pub fn hash_file(algorithm: HashAlgorithm, path: &Path) -> io::Result<Hash> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Hasher::new(algorithm);
    let mut buffer = [0u8; 8192];
    loop {
        let n = file.read(&mut buffer)?;
        if n == 0 {
            return Ok(hasher.finalize());
        }
        hasher.update(&buffer[..n]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_hash() {
        let hash = hash_bytes(HashAlgorithm::Sha256, b"Hello, World!");
        assert_eq!(
            hash.value,
            "dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f"
        );
    }

    #[test]
    fn test_sha512_length() {
        let hash = hash_bytes(HashAlgorithm::Sha512, b"Hello, World!");
        assert_eq!(hash.value.len(), 128);
    }

    #[test]
    fn test_hasher_incremental() {
        let full_hash = hash_bytes(HashAlgorithm::Sha256, b"Hello, World!");

        let mut hasher = Hasher::new(HashAlgorithm::Sha256);
        hasher.update(b"Hello, ");
        hasher.update(b"World!");

        assert_eq!(full_hash, hasher.finalize());
    }

    #[test]
    fn test_hash_validation() {
        assert!(matches!(
            Hash::new(HashAlgorithm::Sha256, "abc123"),
            Err(HashError::InvalidLength { .. })
        ));
        assert!(matches!(
            Hash::new(
                HashAlgorithm::Sha256,
                "gggg6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f",
            ),
            Err(HashError::InvalidHex(_))
        ));
    }

    #[test]
    fn test_prefixed_hash() {
        let hash = Hash::parse_prefixed(
            "sha256:DFFD6021BB2BD5B0AF676290809EC3A53191DD81C7F70A4B28688A362182986F",
        )
        .unwrap();
        assert_eq!(hash.algorithm, HashAlgorithm::Sha256);
        assert_eq!(hash, hash_bytes(HashAlgorithm::Sha256, b"Hello, World!"));

        // Unprefixed defaults to SHA-256
        let hash = Hash::parse_prefixed(
            "dffd6021bb2bd5b0af676290809ec3a53191dd81c7f70a4b28688a362182986f",
        )
        .unwrap();
        assert_eq!(hash.algorithm, HashAlgorithm::Sha256);

        assert!(matches!(
            Hash::parse_prefixed("md5:abc"),
            Err(HashError::UnknownAlgorithm(_))
        ));
    }

    #[test]
    fn test_cache_key_is_path_safe() {
        let hash = hash_bytes(HashAlgorithm::Sha256, b"test");
        let key = hash.cache_key();
        assert!(key.starts_with("sha256_"));
        assert!(!key.contains(':'));
    }

    #[test]
    fn test_hash_file_matches_bytes() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("pkg.tar.gz");
        std::fs::write(&path, b"Hello, World!").unwrap();

        let hash = hash_file(HashAlgorithm::Sha512, &path).unwrap();
        assert_eq!(hash, hash_bytes(HashAlgorithm::Sha512, b"Hello, World!"));
        assert_eq!(hash.to_string(), hash.to_prefixed_string());
    }
}
