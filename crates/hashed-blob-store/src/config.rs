use crate::error::{Result, StoreError};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_WRITE_ATTEMPTS: u32 = 3;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(50);
const DEFAULT_LOCK_STRIPES: usize = 64;
const DEFAULT_QUEUE_CAPACITY: usize = crate::queue::DEFAULT_QUEUE_CAPACITY;

/// Provider configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Directory holding the reserved cache directory
    pub root: PathBuf,
    /// Attempts per background write before it is dropped
    pub write_attempts: u32,
    /// Pause between failed write attempts
    pub retry_delay: Duration,
    /// Number of I/O locks shards are spread over
    pub io_lock_stripes: usize,
    /// Pending background jobs accepted before new work is refused
    pub queue_capacity: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./cache/store"),
            write_attempts: DEFAULT_WRITE_ATTEMPTS,
            retry_delay: DEFAULT_RETRY_DELAY,
            io_lock_stripes: DEFAULT_LOCK_STRIPES,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl StoreConfig {
    /// Parse configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let root = env::var("HASHED_STORE_ROOT")
            .map(PathBuf::from)
            .unwrap_or(defaults.root);

        let write_attempts = env::var("HASHED_STORE_WRITE_ATTEMPTS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.write_attempts);

        let retry_delay = env::var("HASHED_STORE_RETRY_DELAY_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.retry_delay);

        let io_lock_stripes = env::var("HASHED_STORE_LOCK_STRIPES")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.io_lock_stripes);

        let queue_capacity = env::var("HASHED_STORE_QUEUE_CAPACITY")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(defaults.queue_capacity);

        Self {
            root,
            write_attempts,
            retry_delay,
            io_lock_stripes,
            queue_capacity,
        }
    }

    /// Builder-style root override
    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.write_attempts == 0 {
            return Err(StoreError::Config(
                "write_attempts must be at least 1".to_string(),
            ));
        }
        if self.io_lock_stripes == 0 {
            return Err(StoreError::Config(
                "io_lock_stripes must be at least 1".to_string(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(StoreError::Config(
                "queue_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = StoreConfig::default();
        assert_eq!(config.root, PathBuf::from("./cache/store"));
        assert_eq!(config.write_attempts, 3);
        assert_eq!(config.retry_delay, Duration::from_millis(50));
        assert_eq!(config.io_lock_stripes, 64);
        assert_eq!(config.queue_capacity, 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_with_root() {
        let config = StoreConfig::default().with_root("/tmp/elsewhere");
        assert_eq!(config.root, PathBuf::from("/tmp/elsewhere"));
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let config = StoreConfig {
            write_attempts: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(StoreError::Config(_))));

        let config = StoreConfig {
            io_lock_stripes: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(StoreError::Config(_))));

        let config = StoreConfig {
            queue_capacity: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(StoreError::Config(_))));
    }
}
