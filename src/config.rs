//! Configuration store with rehash support.
//!
//! Configuration is a TOML document whose top-level tables are sections.
//! Clients hold [`SectionHandle`]s, a store handle plus a section name, and
//! resolve every lookup at call time. Rehashing replaces the store's
//! interior under a lock, so no handle ever points into a stale table.
//!
//! Typed accessors are thin wrappers over string retrieval plus parsing;
//! dotted keys (`SASL.Account`) traverse nested tables.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;
use toml::{Table, Value};

use crate::error::ConfigError;

#[derive(Debug)]
struct Store {
    path: Option<PathBuf>,
    root: Table,
}

/// A shared configuration store. Cloning yields another handle to the same
/// store; rehashing through any handle is visible through all of them.
#[derive(Clone, Debug)]
pub struct Config {
    inner: Arc<RwLock<Store>>,
}

impl Config {
    /// Parse a TOML document held in memory. Such a store cannot be
    /// rehashed.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let root = text.parse::<Table>()?;
        Ok(Config {
            inner: Arc::new(RwLock::new(Store { path: None, root })),
        })
    }

    /// Load a TOML document from a file, remembering the path for rehash.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let root = text.parse::<Table>()?;
        Ok(Config {
            inner: Arc::new(RwLock::new(Store {
                path: Some(path.to_path_buf()),
                root,
            })),
        })
    }

    /// Re-read the backing file, replacing the store contents in place.
    ///
    /// Every handle sees the new values on its next lookup. Must not be
    /// called while a client is inside `think()`.
    pub fn rehash(&self) -> Result<(), ConfigError> {
        let path = self
            .inner
            .read()
            .path
            .clone()
            .ok_or(ConfigError::NoBackingFile)?;
        let text = std::fs::read_to_string(&path)?;
        let root = text.parse::<Table>()?;
        self.inner.write().root = root;
        Ok(())
    }

    /// A handle to a named top-level section.
    #[must_use]
    pub fn section(&self, name: &str) -> SectionHandle {
        SectionHandle {
            config: self.clone(),
            section: Some(name.to_string()),
        }
    }

    /// A handle to the document root, used as the fallback section.
    #[must_use]
    pub fn root_section(&self) -> SectionHandle {
        SectionHandle {
            config: self.clone(),
            section: None,
        }
    }
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Integer(i) => Some(i.to_string()),
        Value::Float(f) => Some(f.to_string()),
        Value::Boolean(b) => Some(b.to_string()),
        _ => None,
    }
}

fn lookup_dotted(table: &Table, key: &str) -> Option<String> {
    let mut current = table;
    let mut parts = key.split('.').peekable();
    while let Some(part) = parts.next() {
        let value = current.get(part)?;
        if parts.peek().is_none() {
            return value_to_string(value);
        }
        current = value.as_table()?;
    }
    None
}

/// A section reference that resolves at lookup time.
#[derive(Clone, Debug)]
pub struct SectionHandle {
    config: Config,
    /// `None` addresses the document root.
    section: Option<String>,
}

impl SectionHandle {
    /// The section's name, or `None` for the root.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.section.as_deref()
    }

    /// Look up a key, stringifying scalar values. Dotted keys traverse
    /// nested tables.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        let store = self.config.inner.read();
        let table = match &self.section {
            None => &store.root,
            Some(name) => store.root.get(name)?.as_table()?,
        };
        lookup_dotted(table, key)
    }
}

/// A client's primary section plus its fallback, resolved in that order.
#[derive(Clone, Debug)]
pub struct SectionPair {
    primary: SectionHandle,
    fallback: SectionHandle,
}

impl SectionPair {
    /// Bind a primary and a fallback section.
    #[must_use]
    pub fn new(primary: SectionHandle, fallback: SectionHandle) -> Self {
        SectionPair { primary, fallback }
    }

    /// The primary section.
    #[must_use]
    pub fn primary(&self) -> &SectionHandle {
        &self.primary
    }

    /// The fallback section.
    #[must_use]
    pub fn fallback(&self) -> &SectionHandle {
        &self.fallback
    }

    /// Rebind the primary section (rehash re-binding).
    pub fn set_primary(&mut self, primary: SectionHandle) {
        self.primary = primary;
    }

    /// Rebind the fallback section.
    pub fn set_fallback(&mut self, fallback: SectionHandle) {
        self.fallback = fallback;
    }

    /// Read a key from the primary section, then the fallback.
    #[must_use]
    pub fn read(&self, key: &str) -> Option<String> {
        self.primary.get(key).or_else(|| self.fallback.get(key))
    }

    /// Read a key with a default.
    #[must_use]
    pub fn read_or(&self, key: &str, default: &str) -> String {
        self.read(key).unwrap_or_else(|| default.to_string())
    }

    /// Read a key that must exist.
    pub fn require(&self, key: &str) -> Result<String, ConfigError> {
        self.read(key).ok_or_else(|| ConfigError::MissingKey {
            section: self.primary.name().unwrap_or("<root>").to_string(),
            key: key.to_string(),
        })
    }

    /// Read a boolean. Accepts `true`/`false`, `yes`/`no`, `on`/`off`, and
    /// `1`/`0`, case-insensitively.
    #[must_use]
    pub fn read_bool(&self, key: &str, default: bool) -> bool {
        match self.read(key) {
            Some(s) => match s.to_ascii_lowercase().as_str() {
                "true" | "yes" | "on" | "1" => true,
                "false" | "no" | "off" | "0" => false,
                _ => default,
            },
            None => default,
        }
    }

    /// Read an `i32`.
    #[must_use]
    pub fn read_int(&self, key: &str, default: i32) -> i32 {
        self.read(key)
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(default)
    }

    /// Read an `i64`.
    #[must_use]
    pub fn read_long(&self, key: &str, default: i64) -> i64 {
        self.read(key)
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(default)
    }

    /// Read an `f64`.
    #[must_use]
    pub fn read_double(&self, key: &str, default: f64) -> f64 {
        self.read(key)
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(default)
    }
}
