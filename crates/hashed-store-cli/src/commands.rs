//! Store commands, written against the provider contract

use crate::error::{CliError, Result};
use chrono::{Duration, Utc};
use hashed_blob_store::{RecordDescriptor, StoreProvider};
use std::io::Write;
use tracing::info;

fn write_json_line<W: Write>(out: &mut W, descriptor: &RecordDescriptor) -> Result<()> {
    serde_json::to_writer(&mut *out, descriptor)?;
    writeln!(out)?;
    Ok(())
}

/// Print every stored record, one JSON object per line
pub async fn list<P, W>(provider: &P, out: &mut W) -> Result<usize>
where
    P: StoreProvider + ?Sized,
    W: Write,
{
    let items = provider.enumerate_all().await;
    for item in &items {
        write_json_line(out, item)?;
    }
    Ok(items.len())
}

/// Print the winning descriptor for `key`, or its payload bytes
pub async fn get<P, W>(provider: &P, key: &str, payload: bool, out: &mut W) -> Result<()>
where
    P: StoreProvider + ?Sized,
    W: Write,
{
    let latest = provider
        .get_latest(key)
        .await
        .ok_or_else(|| CliError::NotFound(key.to_string()))?;

    if payload {
        let data = provider
            .read(&latest)
            .await
            .ok_or_else(|| CliError::NotFound(key.to_string()))?;
        out.write_all(&data)?;
        return Ok(());
    }
    write_json_line(out, &latest)
}

/// TTL from a whole number of seconds, rejecting values chrono cannot hold
pub fn ttl_from_secs(secs: i64) -> Result<Duration> {
    Duration::try_seconds(secs)
        .ok_or_else(|| CliError::Config(format!("ttl of {} seconds is out of range", secs)))
}

/// Schedule a write expiring `ttl` from now
pub fn put<P>(
    provider: &P,
    key: &str,
    data: Vec<u8>,
    ttl: Duration,
    optimized: bool,
) -> Result<RecordDescriptor>
where
    P: StoreProvider + ?Sized,
{
    let now = Utc::now();
    let expires = now.checked_add_signed(ttl).ok_or_else(|| {
        CliError::Config(format!("ttl of {} seconds is out of range", ttl.num_seconds()))
    })?;
    let descriptor = RecordDescriptor::new(key, expires, now).with_optimized(optimized);
    info!(key = %key, size = data.len(), ttl_secs = ttl.num_seconds(), "Scheduling write");
    provider.write(descriptor.clone(), data);
    Ok(descriptor)
}

/// Schedule removal of the current winner for `key`
pub async fn delete<P>(provider: &P, key: &str) -> Result<RecordDescriptor>
where
    P: StoreProvider + ?Sized,
{
    let latest = provider
        .get_latest(key)
        .await
        .ok_or_else(|| CliError::NotFound(key.to_string()))?;
    provider.delete(&latest);
    Ok(latest)
}

/// Schedule removal of every version of `key`
pub fn purge<P>(provider: &P, key: &str)
where
    P: StoreProvider + ?Sized,
{
    info!(key = %key, "Scheduling purge");
    provider.delete_all(key);
}

#[cfg(test)]
mod tests {
    use super::*;
    use hashed_blob_store::{BackgroundQueue, FsStorage, HashedStoreProvider, StoreConfig};
    use tempfile::{tempdir, TempDir};

    fn provider(dir: &TempDir) -> HashedStoreProvider<FsStorage, BackgroundQueue> {
        HashedStoreProvider::new(
            FsStorage::new(dir.path().to_path_buf()),
            BackgroundQueue::spawn(),
            &StoreConfig::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_put_then_get_payload() {
        let dir = tempdir().unwrap();
        let provider = provider(&dir);

        let descriptor = put(
            &provider,
            "weather/98052",
            b"{\"temp\":72}".to_vec(),
            Duration::hours(1),
            false,
        )
        .unwrap();
        provider.queue().drain().await;
        assert_eq!(provider.cached_latest("weather/98052"), Some(descriptor));

        let mut out = Vec::new();
        get(&provider, "weather/98052", true, &mut out).await.unwrap();
        assert_eq!(out, b"{\"temp\":72}");
    }

    #[tokio::test]
    async fn test_get_descriptor_as_json() {
        let dir = tempdir().unwrap();
        let provider = provider(&dir);
        let descriptor =
            put(&provider, "k", b"v".to_vec(), Duration::minutes(5), true).unwrap();
        provider.queue().drain().await;

        let mut out = Vec::new();
        get(&provider, "k", false, &mut out).await.unwrap();
        let parsed: RecordDescriptor = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed, descriptor);
    }

    #[tokio::test]
    async fn test_get_missing_key() {
        let dir = tempdir().unwrap();
        let provider = provider(&dir);

        let mut out = Vec::new();
        let result = get(&provider, "missing", false, &mut out).await;
        assert!(matches!(result, Err(CliError::NotFound(_))));
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_list_prints_one_line_per_record() {
        let dir = tempdir().unwrap();
        let provider = provider(&dir);
        put(&provider, "a", b"1".to_vec(), Duration::hours(1), false).unwrap();
        put(&provider, "b", b"2".to_vec(), Duration::hours(1), false).unwrap();
        provider.queue().drain().await;

        let mut out = Vec::new();
        let count = list(&provider, &mut out).await.unwrap();
        assert_eq!(count, 2);
        assert_eq!(String::from_utf8(out).unwrap().lines().count(), 2);
    }

    #[tokio::test]
    async fn test_delete_and_purge() {
        let dir = tempdir().unwrap();
        let provider = provider(&dir);
        put(&provider, "a", b"1".to_vec(), Duration::hours(1), false).unwrap();
        put(&provider, "b", b"2".to_vec(), Duration::hours(1), false).unwrap();
        provider.queue().drain().await;

        delete(&provider, "a").await.unwrap();
        purge(&provider, "b");
        provider.queue().drain().await;

        assert!(provider.get_latest("a").await.is_none());
        assert!(provider.get_latest("b").await.is_none());
        assert!(matches!(
            delete(&provider, "a").await,
            Err(CliError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_put_rejects_ttl_past_representable_time() {
        let dir = tempdir().unwrap();
        let provider = provider(&dir);

        let ttl = ttl_from_secs(10_000_000_000_000).unwrap();
        let result = put(&provider, "k", b"v".to_vec(), ttl, false);
        assert!(matches!(result, Err(CliError::Config(_))));

        provider.queue().drain().await;
        assert!(provider.get_latest("k").await.is_none());
    }

    #[test]
    fn test_ttl_from_secs_bounds() {
        assert_eq!(ttl_from_secs(3600).unwrap(), Duration::hours(1));
        assert!(matches!(ttl_from_secs(i64::MAX), Err(CliError::Config(_))));
        assert!(matches!(ttl_from_secs(i64::MIN), Err(CliError::Config(_))));
    }
}
