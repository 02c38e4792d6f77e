use serde::{Deserialize, Serialize};

use crate::contracts::error::TicketError;
use crate::contracts::store::is_valid_namespace;

/// Default logical sequence name.
pub const DEFAULT_KEY: &str = "integers";
/// Default residue.
pub const DEFAULT_OFFSET: i64 = 1;
/// Default step.
pub const DEFAULT_INCREMENT: i64 = 2;

/// Immutable engine configuration.
///
/// Cooperating engines share `key` and `increment` and pick distinct
/// `offset` residues in `[0, increment)`; their issued values then never
/// collide.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    key: String,
    offset: i64,
    increment: i64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            key: DEFAULT_KEY.into(),
            offset: DEFAULT_OFFSET,
            increment: DEFAULT_INCREMENT,
        }
    }
}

impl EngineConfig {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    pub fn increment(&self) -> i64 {
        self.increment
    }

    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = key.into();
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }

    pub fn with_increment(mut self, increment: i64) -> Self {
        self.increment = increment;
        self
    }

    /// Checks every field and the offset/increment combination.
    pub fn validate(&self) -> Result<(), TicketError> {
        validate_key(&self.key)?;
        validate_increment(&self.key, self.increment)?;
        validate_offset(&self.key, self.offset)?;
        self.check_residue()
    }

    /// `offset` must be a residue modulo `increment`.
    pub fn check_residue(&self) -> Result<(), TicketError> {
        if self.offset >= self.increment {
            return Err(TicketError::Configuration {
                namespace: self.key.clone(),
                reason: format!(
                    "offset {} must be below increment {}",
                    self.offset, self.increment
                ),
            });
        }
        Ok(())
    }
}

pub(crate) fn validate_key(key: &str) -> Result<(), TicketError> {
    if !is_valid_namespace(key) {
        return Err(TicketError::Configuration {
            namespace: key.to_string(),
            reason: "key must be 1-64 characters of [A-Za-z0-9_], not starting with a digit"
                .into(),
        });
    }
    Ok(())
}

pub(crate) fn validate_increment(key: &str, increment: i64) -> Result<(), TicketError> {
    if increment < 1 {
        return Err(TicketError::Configuration {
            namespace: key.to_string(),
            reason: format!("increment must be at least 1, got {}", increment),
        });
    }
    Ok(())
}

pub(crate) fn validate_offset(key: &str, offset: i64) -> Result<(), TicketError> {
    if offset < 0 {
        return Err(TicketError::Configuration {
            namespace: key.to_string(),
            reason: format!("offset must not be negative, got {}", offset),
        });
    }
    Ok(())
}
