use log::warn;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs;
use std::path::Path;

use crate::error::StoreError;

/// Reads a JSON blob, treating a missing file as the default value.
pub fn read_json<T: DeserializeOwned + Default>(path: &Path) -> Result<T, StoreError> {
    if !path.exists() {
        return Ok(T::default());
    }
    let content = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Like [`read_json`], but any failure downgrades to the default value.
pub fn load_or_default<T: DeserializeOwned + Default>(path: &Path) -> T {
    match read_json(path) {
        Ok(value) => value,
        Err(e) => {
            warn!("ignoring {}: {e}", path.display());
            T::default()
        }
    }
}

pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), StoreError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let content = serde_json::to_string_pretty(value).map_err(StoreError::Encode)?;
    fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn unencodable_value_is_not_reported_as_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        let value = HashMap::from([((1u8, 2u8), 3u8)]);

        let err = write_json(&path, &value).unwrap_err();
        assert!(matches!(err, StoreError::Encode(_)));
        assert!(!path.exists());
    }

    #[test]
    fn missing_file_reads_as_default() {
        let dir = tempfile::tempdir().unwrap();
        let value: Vec<String> = read_json(&dir.path().join("nothing.json")).unwrap();
        assert!(value.is_empty());
    }

    #[test]
    fn corrupt_file_is_reported_then_downgraded() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "{not json").unwrap();

        let err = read_json::<HashMap<String, u32>>(&path).unwrap_err();
        assert!(matches!(err, StoreError::StorageCorrupt(_)));
        assert!(load_or_default::<HashMap<String, u32>>(&path).is_empty());
    }

    #[test]
    fn write_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("data.json");
        write_json(&path, &vec![1, 2, 3]).unwrap();
        let back: Vec<u32> = read_json(&path).unwrap();
        assert_eq!(back, vec![1, 2, 3]);
    }
}
