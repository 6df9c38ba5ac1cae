//! Configuration options for caskdb.
//!
//! A database is opened with a list of option functions applied, in
//! order, on top of the configuration persisted in the database
//! directory (or the defaults for a fresh directory). The effective
//! configuration is written back to `config.json` so size limits stay
//! consistent across reopens.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default maximum datafile size before rotation (1MB).
pub const DEFAULT_MAX_DATAFILE_SIZE: usize = 1 << 20;

/// Default maximum key size (64 bytes).
pub const DEFAULT_MAX_KEY_SIZE: usize = 64;

/// Default maximum value size (64KB).
pub const DEFAULT_MAX_VALUE_SIZE: usize = 1 << 16;

/// Database configuration.
///
/// Persisted as `config.json` in the database directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    /// Rotation threshold for the active datafile, in bytes.
    pub max_datafile_size: usize,

    /// Per-key byte limit, enforced on put and on index load.
    pub max_key_size: usize,

    /// Per-value byte limit, enforced on put and on index load.
    pub max_value_size: usize,

    /// Fsync the active datafile after every put.
    pub sync: bool,

    /// Memory-pool concurrency; an optimization hint, not persisted.
    #[serde(skip)]
    pub max_concurrency: Option<usize>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_datafile_size: DEFAULT_MAX_DATAFILE_SIZE,
            max_key_size: DEFAULT_MAX_KEY_SIZE,
            max_value_size: DEFAULT_MAX_VALUE_SIZE,
            sync: false,
            max_concurrency: None,
        }
    }
}

/// An option function, applied to the configuration at open time.
pub type OptionFn = Box<dyn Fn(&mut Config) -> Result<()> + Send + Sync>;

/// Set the maximum datafile size.
pub fn with_max_datafile_size(size: usize) -> OptionFn {
    Box::new(move |cfg| {
        cfg.max_datafile_size = size;
        Ok(())
    })
}

/// Set the maximum key size.
pub fn with_max_key_size(size: usize) -> OptionFn {
    Box::new(move |cfg| {
        cfg.max_key_size = size;
        Ok(())
    })
}

/// Set the maximum value size.
pub fn with_max_value_size(size: usize) -> OptionFn {
    Box::new(move |cfg| {
        cfg.max_value_size = size;
        Ok(())
    })
}

/// Enable or disable fsync after every put.
pub fn with_sync(sync: bool) -> OptionFn {
    Box::new(move |cfg| {
        cfg.sync = sync;
        Ok(())
    })
}

/// Enable memory pooling with the given concurrency.
///
/// Zero concurrency is rejected with an invalid-configuration error.
pub fn with_memory_pool(max_concurrency: usize) -> OptionFn {
    Box::new(move |cfg| {
        if max_concurrency == 0 {
            return Err(Error::InvalidConfiguration(
                "memory pool concurrency must be greater than zero".into(),
            ));
        }
        cfg.max_concurrency = Some(max_concurrency);
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.max_datafile_size, DEFAULT_MAX_DATAFILE_SIZE);
        assert_eq!(cfg.max_key_size, 64);
        assert_eq!(cfg.max_value_size, 65536);
        assert!(!cfg.sync);
        assert_eq!(cfg.max_concurrency, None);
    }

    #[test]
    fn test_options_apply_in_order() {
        let mut cfg = Config::default();
        for opt in [with_max_key_size(16), with_max_key_size(32)] {
            opt(&mut cfg).unwrap();
        }
        assert_eq!(cfg.max_key_size, 32);
    }

    #[test]
    fn test_memory_pool_rejects_zero() {
        let mut cfg = Config::default();
        let err = with_memory_pool(0)(&mut cfg).unwrap_err();
        assert!(matches!(err, Error::InvalidConfiguration(_)));

        with_memory_pool(4)(&mut cfg).unwrap();
        assert_eq!(cfg.max_concurrency, Some(4));
    }

    #[test]
    fn test_config_json_keys() {
        let cfg = Config {
            max_datafile_size: 2048,
            max_key_size: 16,
            max_value_size: 128,
            sync: true,
            max_concurrency: Some(8),
        };

        let json = serde_json::to_string(&cfg).unwrap();
        assert!(json.contains("\"maxDatafileSize\":2048"));
        assert!(json.contains("\"maxKeySize\":16"));
        assert!(json.contains("\"maxValueSize\":128"));
        assert!(json.contains("\"sync\":true"));
        // Not persisted
        assert!(!json.contains("maxConcurrency"));

        let parsed: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.max_datafile_size, 2048);
        assert_eq!(parsed.max_concurrency, None);
    }

    #[test]
    fn test_config_json_missing_fields_default() {
        let parsed: Config = serde_json::from_str("{\"maxKeySize\":8}").unwrap();
        assert_eq!(parsed.max_key_size, 8);
        assert_eq!(parsed.max_datafile_size, DEFAULT_MAX_DATAFILE_SIZE);
        assert!(!parsed.sync);
    }
}
