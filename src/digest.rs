//! Digest and file-existence helpers shared by the image fetcher and rootfs
//! assembler.

use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DigestError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("malformed digest {0:?}, expected \"sha256:<hex>\"")]
    MalformedDigest(String),
    #[error("digest mismatch: expected {expected}, got {actual}")]
    Mismatch { expected: String, actual: String },
}

/// Returns true iff `stat(2)` succeeds on `path`.
pub fn exists(path: impl AsRef<Path>) -> bool {
    path.as_ref().symlink_metadata().is_ok()
}

/// Computes the lowercase hex SHA-256 digest of a file's contents.
pub fn sha256_file(path: impl AsRef<Path>) -> Result<String, DigestError> {
    let path = path.as_ref();
    let mut file = File::open(path).map_err(|source| DigestError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).map_err(|source| DigestError::Io {
            path: path.display().to_string(),
            source,
        })?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    let bytes = hasher.finalize();
    let mut hex = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        hex.push_str(&format!("{:02x}", byte));
    }
    Ok(hex)
}

/// Splits an OCI digest string (`sha256:<hex>`) into its algorithm-qualified
/// hex component. Only `sha256` is supported.
pub fn hex_of(digest: &str) -> Result<&str, DigestError> {
    digest
        .strip_prefix("sha256:")
        .filter(|hex| !hex.is_empty())
        .ok_or_else(|| DigestError::MalformedDigest(digest.to_string()))
}

/// Verifies that `path`'s SHA-256 matches the declared OCI digest
/// (`sha256:<hex>`).
pub fn check_file_digest(path: impl AsRef<Path>, digest: &str) -> Result<(), DigestError> {
    let expected = hex_of(digest)?;
    let actual = sha256_file(&path)?;
    if actual == expected {
        Ok(())
    } else {
        Err(DigestError::Mismatch {
            expected: expected.to_string(),
            actual,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn hex_of_rejects_non_sha256() {
        assert!(hex_of("sha512:abcd").is_err());
        assert!(hex_of("sha256:").is_err());
    }

    #[test]
    fn sha256_file_matches_known_digest() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"hello world").unwrap();
        let digest = sha256_file(f.path()).unwrap();
        assert_eq!(
            digest,
            "b94d27b9934d3e08a52e52d7da7dacefbc729364bd4fb74447c8efa9bff4d4e"
        );
    }

    #[test]
    fn check_file_digest_detects_mismatch() {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(b"hello world").unwrap();
        let err = check_file_digest(
            f.path(),
            "sha256:0000000000000000000000000000000000000000000000000000000000000000",
        )
        .unwrap_err();
        assert!(matches!(err, DigestError::Mismatch { .. }));
    }

    #[test]
    fn exists_reports_real_and_missing_paths() {
        let f = tempfile::NamedTempFile::new().unwrap();
        assert!(exists(f.path()));
        assert!(!exists(f.path().join("does-not-exist")));
    }
}
