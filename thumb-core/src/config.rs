//! # Configuration
//!
//! A minimal string key/value store. Layers are applied in order, later
//! layers winning:
//!
//! 1. built-in defaults (each component documents its keys)
//! 2. environment variables with a prefix, `THUMB__S3__BUCKET` → `s3.bucket`
//! 3. explicit overrides, usually command-line flags
//!
//! ```rust
//! use thumb_core::ThumbConfig;
//! let mut config = ThumbConfig::new();
//!
//! config.set("filter.max_width", "320");
//! config.set("upload.part_size", "5242880");
//!
//! let snapshot = config.snapshot();
//! assert_eq!(snapshot.get_u32("filter.max_width"), Some(320));
//! ```
//!
//! Components read typed settings from a [`ThumbConfigSnapshot`] so a running
//! pipeline never observes a half-applied change.

use std::collections::HashMap;

/// Prefix used for environment overrides.
pub const ENV_PREFIX: &str = "THUMB__";

#[derive(Debug, Default, Clone)]
pub struct ThumbConfig {
    values: HashMap<String, String>,
}

impl ThumbConfig {
    /// Create an empty config store.
    pub fn new() -> Self {
        Self {
            values: HashMap::new(),
        }
    }

    /// Set a configuration key to a string value.
    pub fn set<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.values.insert(key.into(), value.into());
    }

    /// Set a key only when a value is present.
    pub fn set_opt<K, V>(&mut self, key: K, value: Option<V>)
    where
        K: Into<String>,
        V: Into<String>,
    {
        if let Some(value) = value {
            self.set(key, value);
        }
    }

    /// Set a key unless something already provided it.
    pub fn set_default<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.values.entry(key.into()).or_insert_with(|| value.into());
    }

    /// Get a configuration value by key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(|s| s.as_str())
    }

    /// Check whether a key is present.
    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Overlay environment variables starting with `prefix`.
    ///
    /// `THUMB__FILTER__MAX_WIDTH=320` becomes `filter.max_width = "320"`.
    pub fn load_env(&mut self, prefix: &str) {
        self.load_vars(std::env::vars(), prefix);
    }

    /// Same as [`load_env`](Self::load_env) over an explicit variable list.
    pub fn load_vars<I>(&mut self, vars: I, prefix: &str)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            if let Some(stripped) = key.strip_prefix(prefix) {
                let normalized = stripped.to_lowercase().replace("__", ".");
                if !normalized.is_empty() {
                    self.set(normalized, value);
                }
            }
        }
    }

    pub fn snapshot(&self) -> ThumbConfigSnapshot {
        ThumbConfigSnapshot::new(self.values.clone())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ThumbConfigSnapshot {
    map: HashMap<String, String>,
}

impl ThumbConfigSnapshot {
    pub(crate) fn new(map: HashMap<String, String>) -> Self {
        Self { map }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(|s| s.as_str()).filter(|s| !s.is_empty())
    }

    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get(key).map(str::to_string)
    }

    pub fn get_usize(&self, key: &str) -> Option<usize> {
        self.get(key).and_then(|v| v.parse::<usize>().ok())
    }

    pub fn get_u32(&self, key: &str) -> Option<u32> {
        self.get(key).and_then(|v| v.parse::<u32>().ok())
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.get(key).and_then(|v| v.parse::<u64>().ok())
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        self.get(key).and_then(|v| v.parse::<bool>().ok())
    }
}
