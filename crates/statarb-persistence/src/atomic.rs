//! Atomic JSON writes.

use crate::error::PersistenceResult;
use serde::Serialize;
use std::fs;
use std::path::Path;

/// Serialize `value` and atomically replace `path` with it.
///
/// Writes to a sibling `.tmp` file and renames over the target, so readers
/// never observe a torn file. The parent directory is created on demand.
pub fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> PersistenceResult<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, serde_json::to_vec_pretty(value)?)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Sample {
        a: u32,
        b: String,
    }

    #[test]
    fn test_write_and_replace() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("sample.json");

        let first = Sample {
            a: 1,
            b: String::from("one"),
        };
        write_json_atomic(&path, &first).unwrap();

        let second = Sample {
            a: 2,
            b: String::from("two"),
        };
        write_json_atomic(&path, &second).unwrap();

        let read: Sample =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(read, second);

        // No stray temp file remains.
        assert!(!path.with_extension("tmp").exists());
    }
}
