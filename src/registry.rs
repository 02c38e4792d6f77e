//! Maps engine URIs to constructed engines.
//!
//! The application shell builds one [`EngineRegistry`], registers the
//! backends it wants and hands it to whoever needs an engine. There is no
//! process-wide table.
//!
//! URI form: `<scheme>://<path>?key=..&offset=..&increment=..&dsn=..`

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::contracts::{Engine, RegistryError};
use crate::engine::{EngineConfig, TicketEngine};
use crate::storage::{MemoryCounterStore, RocksDbCounterStore};

/// Builds an engine from a parsed URI.
pub type EngineConstructor =
    Arc<dyn Fn(&EngineUri) -> Result<Arc<dyn Engine>, RegistryError> + Send + Sync>;

/// A parsed engine URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineUri {
    raw: String,
    scheme: String,
    path: String,
    params: BTreeMap<String, String>,
}

impl EngineUri {
    pub fn parse(uri: &str) -> Result<Self, RegistryError> {
        let invalid = |reason: &str| RegistryError::InvalidUri {
            uri: uri.to_string(),
            reason: reason.to_string(),
        };

        let (scheme, rest) = uri
            .split_once("://")
            .ok_or_else(|| invalid("missing '://'"))?;
        if scheme.is_empty() {
            return Err(invalid("empty scheme"));
        }
        if !scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        {
            return Err(invalid("scheme has invalid characters"));
        }

        let (path, query) = match rest.split_once('?') {
            Some((path, query)) => (path, query),
            None => (rest, ""),
        };

        let mut params = BTreeMap::new();
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            let (name, value) = pair.split_once('=').unwrap_or((pair, ""));
            let name =
                percent_decode(name, true).ok_or_else(|| invalid("bad escape in query"))?;
            let value =
                percent_decode(value, true).ok_or_else(|| invalid("bad escape in query"))?;
            params.insert(name, value);
        }

        Ok(Self {
            raw: uri.to_string(),
            scheme: scheme.to_ascii_lowercase(),
            path: percent_decode(path, false).ok_or_else(|| invalid("bad escape in path"))?,
            params,
        })
    }

    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name).map(String::as_str)
    }

    /// Connection descriptor: the `dsn` parameter, falling back to the path.
    pub fn dsn(&self) -> Option<&str> {
        self.param("dsn")
            .filter(|d| !d.is_empty())
            .or(Some(self.path.as_str()))
            .filter(|d| !d.is_empty())
    }

    /// Engine configuration from the `key`, `offset` and `increment`
    /// parameters, defaults for the rest. Not yet validated.
    pub fn engine_config(&self) -> Result<EngineConfig, RegistryError> {
        let mut config = EngineConfig::default();
        if let Some(key) = self.param("key") {
            config = config.with_key(key);
        }
        if let Some(offset) = self.int_param("offset")? {
            config = config.with_offset(offset);
        }
        if let Some(increment) = self.int_param("increment")? {
            config = config.with_increment(increment);
        }
        Ok(config)
    }

    fn int_param(&self, name: &str) -> Result<Option<i64>, RegistryError> {
        self.param(name)
            .map(|v| {
                v.parse::<i64>().map_err(|e| RegistryError::InvalidUri {
                    uri: self.raw.clone(),
                    reason: format!("{}: {}", name, e),
                })
            })
            .transpose()
    }
}

impl fmt::Display for EngineUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Decodes `%XX` escapes, and `+` as a space when `plus_as_space` is set
/// (query components only). Returns `None` on a malformed escape or
/// non-UTF-8 result.
fn percent_decode(input: &str, plus_as_space: bool) -> Option<String> {
    let bytes = input.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let hex = bytes.get(i + 1..i + 3)?;
                if !hex.iter().all(u8::is_ascii_hexdigit) {
                    return None;
                }
                let hex = std::str::from_utf8(hex).ok()?;
                out.push(u8::from_str_radix(hex, 16).ok()?);
                i += 3;
            }
            b'+' if plus_as_space => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8(out).ok()
}

/// Scheme -> constructor table.
#[derive(Default, Clone)]
pub struct EngineRegistry {
    constructors: BTreeMap<String, EngineConstructor>,
}

impl EngineRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the bundled `memory` and `rocksdb` backends.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("memory", memory_engine);
        registry.register("rocksdb", rocksdb_engine);
        registry
    }

    /// Registers `constructor` under `scheme`, replacing any previous entry.
    pub fn register<F>(&mut self, scheme: &str, constructor: F)
    where
        F: Fn(&EngineUri) -> Result<Arc<dyn Engine>, RegistryError> + Send + Sync + 'static,
    {
        let scheme = scheme.to_ascii_lowercase();
        if self
            .constructors
            .insert(scheme.clone(), Arc::new(constructor))
            .is_some()
        {
            tracing::info!(scheme = %scheme, "Replaced engine registration");
        } else {
            tracing::debug!(scheme = %scheme, "Registered engine");
        }
    }

    /// Registered schemes, sorted.
    pub fn schemes(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }

    /// Parses `uri` and constructs the engine registered for its scheme.
    pub fn lookup(&self, uri: &str) -> Result<Arc<dyn Engine>, RegistryError> {
        let parsed = EngineUri::parse(uri)?;
        let constructor = self
            .constructors
            .get(parsed.scheme())
            .ok_or_else(|| RegistryError::UnknownScheme(parsed.scheme().to_string()))?;
        let engine = constructor(&parsed)?;
        tracing::info!(
            scheme = %parsed.scheme(),
            key = %engine.config().key(),
            "Engine constructed"
        );
        Ok(engine)
    }
}

fn memory_engine(uri: &EngineUri) -> Result<Arc<dyn Engine>, RegistryError> {
    let store = Arc::new(MemoryCounterStore::new());
    let engine = TicketEngine::with_config(store, uri.engine_config()?)?;
    Ok(Arc::new(engine))
}

fn rocksdb_engine(uri: &EngineUri) -> Result<Arc<dyn Engine>, RegistryError> {
    let path = uri.dsn().ok_or_else(|| RegistryError::InvalidUri {
        uri: uri.to_string(),
        reason: "missing store path".into(),
    })?;
    let config = uri.engine_config()?;
    let store = Arc::new(RocksDbCounterStore::open(path)?);
    let engine = TicketEngine::with_config(store, config)?;
    Ok(Arc::new(engine))
}
