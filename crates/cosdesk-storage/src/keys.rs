//! Shared key generation for storage backends.
//!
//! Key format: the destination path without its leading slash, followed by
//! the file name. The root path `/` maps to the bare file name.

use crate::{StorageError, StorageResult};

/// Normalize a destination path into a key prefix.
///
/// Empty segments and `.` are dropped, so `/`, `` and `//` all map to the
/// empty prefix and `/a//b/` maps to `a/b`. `..` is rejected.
pub fn normalize_dir(destination: &str) -> StorageResult<String> {
    let mut segments = Vec::new();
    for segment in destination.split('/') {
        match segment.trim() {
            "" | "." => continue,
            ".." => {
                return Err(StorageError::InvalidKey(format!(
                    "destination path {} escapes the bucket",
                    destination
                )))
            }
            s => segments.push(s),
        }
    }
    Ok(segments.join("/"))
}

/// Generate the object key for a file uploaded to `destination`.
pub fn object_key(destination: &str, file_name: &str) -> StorageResult<String> {
    let name = file_name.trim();
    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        return Err(StorageError::InvalidKey(format!(
            "invalid file name {:?}",
            file_name
        )));
    }

    let prefix = normalize_dir(destination)?;
    if prefix.is_empty() {
        Ok(name.to_string())
    } else {
        Ok(format!("{}/{}", prefix, name))
    }
}

/// Check a key before it is handed to a backend.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() || key.starts_with('/') || key.split('/').any(|s| s == "..") {
        return Err(StorageError::InvalidKey(
            "Storage key contains invalid characters".to_string(),
        ));
    }
    Ok(())
}

/// Percent-encode each segment of a key for use in a URL path.
pub fn encode_key(key: &str) -> String {
    key.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_destination_maps_to_bare_name() {
        assert_eq!(object_key("/", "fw.bin").unwrap(), "fw.bin");
        assert_eq!(object_key("", "fw.bin").unwrap(), "fw.bin");
    }

    #[test]
    fn nested_destination_is_normalized() {
        assert_eq!(object_key("/a/b/c", "fw.bin").unwrap(), "a/b/c/fw.bin");
        assert_eq!(object_key("a//b/./c/", "fw.bin").unwrap(), "a/b/c/fw.bin");
    }

    #[test]
    fn traversal_is_rejected() {
        assert!(object_key("/a/../..", "fw.bin").is_err());
        assert!(object_key("/", "../fw.bin").is_err());
        assert!(object_key("/", "").is_err());
        assert!(validate_key("/etc/passwd").is_err());
        assert!(validate_key("a/../b").is_err());
        assert!(validate_key("a/b.v1..2").is_ok());
    }

    #[test]
    fn segments_are_encoded() {
        assert_eq!(encode_key("a b/c#1.txt"), "a%20b/c%231.txt");
    }
}
