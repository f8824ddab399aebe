//! Run provenance: identifiers and content hashes.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::warn;
use uuid::Uuid;

/// Compute SHA256 checksum of a file, streaming its contents.
pub fn compute_file_checksum(path: impl AsRef<Path>) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path.as_ref())?;
    let mut hasher = Sha256::new();
    std::io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}

/// Compute SHA256 hash of arbitrary bytes.
pub fn compute_hash(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    let result = hasher.finalize();
    format!("{:x}", result)
}

/// Compute configuration hash from JSON serialization.
pub fn compute_config_hash<T: Serialize>(config: &T) -> String {
    match serde_json::to_vec(config) {
        Ok(bytes) => compute_hash(&bytes),
        Err(e) => {
            warn!("Failed to serialize config for hashing: {}", e);
            String::new()
        }
    }
}

/// Generate a unique run ID.
pub fn generate_run_id() -> Uuid {
    Uuid::new_v4()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_compute_hash_known_value() {
        assert_eq!(
            compute_hash(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_file_checksum_matches_bytes() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "unique_id,date,y\n").unwrap();
        let checksum = compute_file_checksum(file.path()).unwrap();
        assert_eq!(checksum, compute_hash(b"unique_id,date,y\n"));
    }

    #[test]
    fn test_file_checksum_spans_many_buffers() {
        let mut file = NamedTempFile::new().unwrap();
        let mut expected = Vec::new();
        for i in 0..20_000 {
            let line = format!("S{},2020-01-01,{}\n", i % 17, i);
            file.write_all(line.as_bytes()).unwrap();
            expected.extend_from_slice(line.as_bytes());
        }
        file.flush().unwrap();
        assert_eq!(compute_file_checksum(file.path()).unwrap(), compute_hash(&expected));
    }

    #[test]
    fn test_file_checksum_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(compute_file_checksum(dir.path().join("absent.csv")).is_err());
    }

    #[test]
    fn test_config_hash_is_stable() {
        #[derive(Serialize)]
        struct Settings {
            span: i64,
        }
        let a = compute_config_hash(&Settings { span: 14 });
        let b = compute_config_hash(&Settings { span: 14 });
        let c = compute_config_hash(&Settings { span: 59 });
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_run_ids_unique() {
        assert_ne!(generate_run_id(), generate_run_id());
    }
}
