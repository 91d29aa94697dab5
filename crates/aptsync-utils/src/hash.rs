use std::{fs::File, io, path::Path};

use sha2::{Digest, Sha256};

use crate::error::{HashError, HashResult};

/// Calculates the blake3 content digest of a file as a hex string.
///
/// The store records this digest for every file it saves.
///
/// # Errors
///
/// * [`HashError::ReadFailed`] if the file cannot be read.
pub fn calculate_checksum<P: AsRef<Path>>(file_path: P) -> HashResult<String> {
    let file_path = file_path.as_ref();
    let mut hasher = blake3::Hasher::new();
    hasher.update_mmap(file_path).map_err(|err| {
        HashError::ReadFailed {
            path: file_path.to_path_buf(),
            source: err,
        }
    })?;
    Ok(hasher.finalize().to_hex().to_string())
}

/// Calculates the SHA-256 digest of a file as a lowercase hex string.
///
/// Debian indexes publish SHA-256 sums for every file they list, so this is
/// the digest used to check fetched payloads.
///
/// # Errors
///
/// * [`HashError::ReadFailed`] if the file cannot be read.
pub fn sha256_file<P: AsRef<Path>>(file_path: P) -> HashResult<String> {
    let file_path = file_path.as_ref();
    let read_failed = |err| {
        HashError::ReadFailed {
            path: file_path.to_path_buf(),
            source: err,
        }
    };

    let mut file = File::open(file_path).map_err(read_failed)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher).map_err(read_failed)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Verifies a file against an expected SHA-256 hex digest.
///
/// The comparison is case-insensitive.
///
/// # Errors
///
/// * [`HashError::InvalidDigest`] if `expected` is not 64 hex characters.
/// * [`HashError::ReadFailed`] if the file cannot be read.
pub fn verify_sha256<P: AsRef<Path>>(file_path: P, expected: &str) -> HashResult<bool> {
    let expected = expected.trim();
    if expected.len() != 64 || hex::decode(expected).is_err() {
        return Err(HashError::InvalidDigest {
            digest: expected.to_string(),
        });
    }

    let actual = sha256_file(file_path)?;
    Ok(actual.eq_ignore_ascii_case(expected))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    const HELLO_SHA256: &str = "a948904f2f0f479b8f8197694b30184b0d2ed1c1cd2a1ec0fb85d299a192a447";

    fn hello_file() -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"hello world\n").unwrap();
        file
    }

    #[test]
    fn test_calculate_checksum() {
        let file = hello_file();
        let checksum = calculate_checksum(file.path()).unwrap();
        assert_eq!(
            checksum,
            "dc5a4edb8240b018124052c330270696f96771a63b45250a5c17d3000e823355"
        );
    }

    #[test]
    fn test_calculate_checksum_file_not_found() {
        assert!(calculate_checksum("/path/to/nonexistent/file").is_err());
    }

    #[test]
    fn test_sha256_file() {
        let file = hello_file();
        assert_eq!(sha256_file(file.path()).unwrap(), HELLO_SHA256);
    }

    #[test]
    fn test_verify_sha256_match_is_case_insensitive() {
        let file = hello_file();
        assert!(verify_sha256(file.path(), HELLO_SHA256).unwrap());
        assert!(verify_sha256(file.path(), &HELLO_SHA256.to_uppercase()).unwrap());
    }

    #[test]
    fn test_verify_sha256_mismatch() {
        let file = hello_file();
        let other = "0".repeat(64);
        assert!(!verify_sha256(file.path(), &other).unwrap());
    }

    #[test]
    fn test_verify_sha256_rejects_malformed_digest() {
        let file = hello_file();
        let result = verify_sha256(file.path(), "not-a-digest");
        assert!(matches!(result, Err(HashError::InvalidDigest { .. })));
    }
}
