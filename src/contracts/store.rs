use crate::contracts::error::StoreError;

/// A persistent store that can hand out auto-increment identifiers.
///
/// # Invariants
/// - Identifiers generated for one namespace are strictly increasing in
///   commit order, whatever session generated them
/// - A session never caches identifiers; the store is the only source of truth
/// - `raise_floor` never moves a namespace counter backward
pub trait CounterStore: Send + Sync {
    type Session<'a>: CounterSession
    where
        Self: 'a;

    /// Opens a short-lived session. Dropping it releases the connection.
    fn connect(&self) -> Result<Self::Session<'_>, StoreError>;
}

/// One connection's worth of access to a [`CounterStore`].
///
/// Step and residue are session-scoped, like connection variables: two
/// sessions on the same store may issue with different settings.
pub trait CounterSession {
    /// Liveness probe.
    fn ping(&mut self) -> Result<(), StoreError>;

    /// Sets the step between generated identifiers and the residue they must satisfy.
    fn set_auto_increment(&mut self, increment: i64, offset: i64) -> Result<(), StoreError>;

    /// Inserts or replaces the row keyed by `stub`, creating the namespace on
    /// first use. Returns the identifier generated for the new row.
    fn replace_stub(&mut self, namespace: &str, stub: &str) -> Result<i64, StoreError>;

    /// Largest identifier currently stored in `namespace`.
    ///
    /// `Ok(None)` for a namespace with no rows,
    /// [`StoreError::NamespaceNotFound`] for one that was never created.
    fn max_id(&mut self, namespace: &str) -> Result<Option<i64>, StoreError>;

    /// Moves the namespace counter so the next generated identifier is at
    /// least `floor`. Lower values leave the counter untouched.
    fn raise_floor(&mut self, namespace: &str, floor: i64) -> Result<(), StoreError>;
}

/// Returns true if `namespace` is usable as a storage namespace identifier.
///
/// Accepted: 1 to 64 ASCII characters, `[A-Za-z_][A-Za-z0-9_]*`.
pub fn is_valid_namespace(namespace: &str) -> bool {
    let mut chars = namespace.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    namespace.len() <= MAX_NAMESPACE_LEN
        && (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Maximum namespace identifier length.
pub const MAX_NAMESPACE_LEN: usize = 64;

/// Validates a namespace, returning a store error if unusable.
pub fn validate_namespace(namespace: &str) -> Result<(), StoreError> {
    if is_valid_namespace(namespace) {
        Ok(())
    } else {
        Err(StoreError::InvalidNamespace(namespace.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_plain_identifiers() {
        assert!(is_valid_namespace("integers"));
        assert!(is_valid_namespace("_tickets_2"));
        assert!(is_valid_namespace(&"a".repeat(64)));
    }

    #[test]
    fn rejects_unusable_identifiers() {
        assert!(!is_valid_namespace(""));
        assert!(!is_valid_namespace("1tickets"));
        assert!(!is_valid_namespace("tick-ets"));
        assert!(!is_valid_namespace("tickets; DROP TABLE x"));
        assert!(!is_valid_namespace("tïckets"));
        assert!(!is_valid_namespace(&"a".repeat(65)));
    }
}
