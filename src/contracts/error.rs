use std::sync::{MutexGuard, PoisonError};

use thiserror::Error;

/// Failures surfaced by an [`Engine`](crate::contracts::Engine).
///
/// Every variant carries the namespace it happened in, so callers can
/// diagnose without extra logging. Nothing is retried internally.
#[derive(Error, Debug)]
pub enum TicketError {
    /// Store unreachable, or the liveness probe failed.
    #[error("Connection error on {namespace}: {source}")]
    Connection {
        namespace: String,
        #[source]
        source: StoreError,
    },

    /// Invalid key/offset/increment supplied by the caller.
    #[error("Configuration error on {namespace}: {reason}")]
    Configuration { namespace: String, reason: String },

    /// The store refused valid step/residue settings; no row was written.
    #[error("Store rejected auto-increment settings on {namespace}: {source}")]
    SettingsRejected {
        namespace: String,
        #[source]
        source: StoreError,
    },

    /// The disposable-row write failed; no identifier was issued.
    #[error("Write error on {namespace}: {source}")]
    Write {
        namespace: String,
        #[source]
        source: StoreError,
    },

    #[error("integer value too small: requested {requested}, last issued {last} in {namespace}")]
    MonotonicityViolation {
        namespace: String,
        requested: i64,
        last: i64,
    },

    /// Empty or missing namespace. No sentinel zero is ever returned.
    #[error("No integers issued in {namespace}")]
    NotFound { namespace: String },

    /// Any other store failure while reading or moving the floor.
    #[error("Store error on {namespace}: {source}")]
    Store {
        namespace: String,
        #[source]
        source: StoreError,
    },
}

impl TicketError {
    /// Stable machine-readable code, used by the HTTP layer and metrics.
    pub fn code(&self) -> &'static str {
        match self {
            TicketError::Connection { .. } => "CONNECTION_ERROR",
            TicketError::Configuration { .. } => "CONFIGURATION_ERROR",
            TicketError::SettingsRejected { .. } => "SETTINGS_REJECTED",
            TicketError::Write { .. } => "WRITE_ERROR",
            TicketError::MonotonicityViolation { .. } => "MONOTONICITY_VIOLATION",
            TicketError::NotFound { .. } => "NOT_FOUND",
            TicketError::Store { .. } => "STORE_ERROR",
        }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("RocksDB error: {0}")]
    RocksDb(String),

    #[error("Namespace not found: {0}")]
    NamespaceNotFound(String),

    #[error("Invalid namespace: {0}")]
    InvalidNamespace(String),

    #[error("Invalid auto-increment settings: increment {increment}, offset {offset}")]
    InvalidSettings { increment: i64, offset: i64 },

    #[error("Auto-increment range exhausted in {0}")]
    Exhausted(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Lock poisoned: {0}")]
    LockPoisoned(String),
}

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Invalid engine URI {uri}: {reason}")]
    InvalidUri { uri: String, reason: String },

    #[error("No engine registered for scheme: {0}")]
    UnknownScheme(String),

    #[error("Engine construction failed: {0}")]
    Engine(#[from] TicketError),

    #[error("Store open failed: {0}")]
    Store(#[from] StoreError),
}

/// Top-level error for the server binary.
#[derive(Error, Debug)]
pub enum TicketdError {
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Engine error: {0}")]
    Engine(#[from] TicketError),

    #[error("Invalid value for {name}: {reason}")]
    InvalidEnv { name: &'static str, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Extension trait for converting lock errors to StoreError.
pub trait LockResultExt<T> {
    /// Converts a lock error to a StoreError.
    fn map_lock_err(self) -> Result<T, StoreError>;
}

impl<'a, T> LockResultExt<MutexGuard<'a, T>>
    for Result<MutexGuard<'a, T>, PoisonError<MutexGuard<'a, T>>>
{
    #[inline]
    fn map_lock_err(self) -> Result<MutexGuard<'a, T>, StoreError> {
        self.map_err(|e| StoreError::LockPoisoned(e.to_string()))
    }
}
