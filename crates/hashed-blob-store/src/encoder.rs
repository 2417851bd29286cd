//! Key encoding: shard directories and metadata-carrying file names
//!
//! A record lives at `«c/<shard>/<escaped-name>»<optimized>»<expiration>»<updated>`.
//! The shard is derived from the logical key alone, so several keys may share
//! one shard directory. Everything needed to rebuild a [`RecordDescriptor`]
//! is in the file name; listing a shard never has to open a file.

use crate::backend::StorageBackend;
use crate::error::Result;
use crate::types::{from_ticks, to_ticks, RecordDescriptor};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Field separator inside a record file name. Never produced by escaping.
pub const FILE_NAME_SEPARATOR: char = '»';

/// Reserved top-level directory holding every shard directory
pub const CACHE_DIRECTORY_NAME: &str = "«c";

/// Longest record file name most file systems accept
pub const MAX_FILE_NAME_BYTES: usize = 255;

/// Bytes of the key digest used for the shard name (rendered as hex)
const SHARD_HASH_BYTES: usize = 4;

/// Hex shard name for a logical key
pub fn shard_hash(unique_name: &str) -> String {
    let digest = Sha256::digest(unique_name.as_bytes());
    hex::encode(&digest[..SHARD_HASH_BYTES])
}

/// Shard directory for a logical key, relative to the store root
pub fn shard_directory(unique_name: &str) -> PathBuf {
    Path::new(CACHE_DIRECTORY_NAME).join(shard_hash(unique_name))
}

/// Whether a directory name under the cache root is a shard directory
pub fn is_shard_directory(name: &str) -> bool {
    name.len() == SHARD_HASH_BYTES * 2
        && name
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

fn escape_name(unique_name: &str) -> String {
    urlencoding::encode(unique_name).into_owned()
}

fn unescape_name(escaped: &str) -> Option<String> {
    urlencoding::decode(escaped).ok().map(|s| s.into_owned())
}

fn parse_flag(field: &str) -> Option<bool> {
    if field.eq_ignore_ascii_case("true") {
        Some(true)
    } else if field.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        None
    }
}

/// Leaf file name for a descriptor
pub fn encode_file_name(descriptor: &RecordDescriptor) -> String {
    format!(
        "{name}{sep}{optimized}{sep}{expiration}{sep}{updated}",
        name = escape_name(descriptor.unique_name()),
        sep = FILE_NAME_SEPARATOR,
        optimized = descriptor.is_optimized(),
        expiration = to_ticks(&descriptor.expiration_time()),
        updated = to_ticks(&descriptor.updated_time()),
    )
}

/// Full path of a descriptor's file, relative to the store root
pub fn record_path(descriptor: &RecordDescriptor) -> PathBuf {
    shard_directory(descriptor.unique_name()).join(encode_file_name(descriptor))
}

/// Rebuild a descriptor from a record file name or path.
///
/// Only the last path component is decoded. Returns `None` for the cache
/// directory itself, shard directories, partially written files and any
/// name that does not hold exactly four well-formed fields.
pub fn decode_file_name(name: &str) -> Option<RecordDescriptor> {
    let leaf = Path::new(name).file_name()?.to_str()?;
    if leaf == CACHE_DIRECTORY_NAME {
        return None;
    }

    let parts: Vec<&str> = leaf.split(FILE_NAME_SEPARATOR).collect();
    if parts.len() != 4 {
        return None;
    }

    let unique_name = unescape_name(parts[0])?;
    let is_optimized = parse_flag(parts[1])?;
    let expiration_time = from_ticks(parts[2].parse::<i64>().ok()?)?;
    let updated_time = from_ticks(parts[3].parse::<i64>().ok()?)?;

    Some(
        RecordDescriptor::new(unique_name, expiration_time, updated_time)
            .with_optimized(is_optimized),
    )
}

/// Create every missing directory above `file_path` before a write.
///
/// Directories that already exist are not an error.
pub async fn ensure_path<B>(backend: &B, file_path: &Path) -> Result<()>
where
    B: StorageBackend + ?Sized,
{
    match file_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            backend.create_folder_all(parent).await
        }
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::FsStorage;
    use chrono::{Duration, TimeZone, Utc};
    use tempfile::tempdir;

    fn descriptor(name: &str) -> RecordDescriptor {
        let updated = Utc.timestamp_opt(1_700_000_000, 250_000_000).unwrap();
        RecordDescriptor::new(name, updated + Duration::hours(1), updated)
    }

    #[test]
    fn test_shard_hash_is_stable() {
        let a = shard_hash("weather/98052");
        let b = shard_hash("weather/98052");
        let c = shard_hash("weather/10001");

        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 8);
        assert!(is_shard_directory(&a));
    }

    #[test]
    fn test_shard_directory_under_cache_root() {
        let dir = shard_directory("k");
        let mut components = dir.components();
        assert_eq!(components.next().unwrap().as_os_str(), CACHE_DIRECTORY_NAME);
        assert_eq!(components.next().unwrap().as_os_str(), shard_hash("k").as_str());
        assert!(components.next().is_none());
    }

    #[test]
    fn test_is_shard_directory() {
        assert!(is_shard_directory("0a1b2c3d"));
        assert!(!is_shard_directory("0A1B2C3D"));
        assert!(!is_shard_directory("0a1b2c3"));
        assert!(!is_shard_directory("0a1b2c3g"));
        assert!(!is_shard_directory(CACHE_DIRECTORY_NAME));
    }

    #[test]
    fn test_encode_file_name_layout() {
        let d = descriptor("weather/98052");
        let name = encode_file_name(&d);
        let parts: Vec<&str> = name.split(FILE_NAME_SEPARATOR).collect();

        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "weather%2F98052");
        assert_eq!(parts[1], "false");
        assert_eq!(parts[2], to_ticks(&d.expiration_time()).to_string());
        assert_eq!(parts[3], to_ticks(&d.updated_time()).to_string());
    }

    #[test]
    fn test_round_trip() {
        for name in ["k", "weather/98052", "with space", "ünïcødé ✓", "a%2Fb", "q?x=1&y=2"] {
            let d = descriptor(name).with_optimized(true);
            assert_eq!(decode_file_name(&encode_file_name(&d)), Some(d.clone()));
            let path = record_path(&d);
            assert_eq!(decode_file_name(path.to_str().unwrap()), Some(d));
        }
    }

    #[test]
    fn test_separator_in_key_is_escaped() {
        let name = format!("left{0}middle{0}right", FILE_NAME_SEPARATOR);
        let d = descriptor(&name);
        let encoded = encode_file_name(&d);

        assert_eq!(encoded.matches(FILE_NAME_SEPARATOR).count(), 3);
        assert_eq!(decode_file_name(&encoded).unwrap().unique_name(), name);
    }

    #[test]
    fn test_decode_rejects_wrong_field_count() {
        assert!(decode_file_name("just-a-file").is_none());
        assert!(decode_file_name("a»true»1").is_none());
        assert!(decode_file_name("a»true»1»2»3").is_none());
    }

    #[test]
    fn test_decode_rejects_bad_fields() {
        assert!(decode_file_name("a»maybe»1»2").is_none());
        assert!(decode_file_name("a»true»soon»2").is_none());
        assert!(decode_file_name("a»true»1»2.partial").is_none());
        assert!(decode_file_name("a»true»-5»2").is_none());
        assert!(decode_file_name("%FF»true»1»2").is_none());
    }

    #[test]
    fn test_decode_accepts_legacy_flag_casing() {
        let d = decode_file_name("key»True»637000000000000000»637000000000000000").unwrap();
        assert!(d.is_optimized());
        assert_eq!(d.unique_name(), "key");
    }

    #[test]
    fn test_decode_ignores_bookkeeping_directories() {
        assert!(decode_file_name(CACHE_DIRECTORY_NAME).is_none());
        let shard = shard_directory("k");
        assert!(decode_file_name(shard.to_str().unwrap()).is_none());
    }

    #[tokio::test]
    async fn test_ensure_path_creates_and_tolerates_existing() {
        let dir = tempdir().unwrap();
        let storage = FsStorage::new(dir.path().to_path_buf());
        let path = record_path(&descriptor("k"));

        ensure_path(&storage, &path).await.unwrap();
        ensure_path(&storage, &path).await.unwrap();

        assert!(dir.path().join(shard_directory("k")).is_dir());
    }
}
