use crate::contracts::error::TicketError;
use crate::contracts::config::EngineConfig;

/// Issues globally unique, monotonically increasing 64-bit integers.
///
/// # Invariants
/// - Successive `next_int` values for one key are strictly increasing in
///   store-commit order, across every engine sharing that key
/// - `set_last_int(v)` is rejected when `v < last_int()`
/// - Changing offset/increment affects only values issued afterwards
///
/// Implementations are stateless with respect to issued values and must be
/// safe to share between threads.
pub trait Engine: Send + Sync {
    /// Largest integer issued so far under the current key.
    fn last_int(&self) -> Result<i64, TicketError>;

    /// Issues the next integer.
    fn next_int(&self) -> Result<i64, TicketError>;

    /// Advances the floor so the next issued integer is greater than `value`.
    ///
    /// Not atomic with concurrent issuance: run it with traffic excluded.
    fn set_last_int(&self, value: i64) -> Result<(), TicketError>;

    fn set_key(&self, key: &str) -> Result<(), TicketError>;

    fn set_offset(&self, offset: i64) -> Result<(), TicketError>;

    fn set_increment(&self, increment: i64) -> Result<(), TicketError>;

    /// Snapshot of the configuration the next call will use.
    fn config(&self) -> EngineConfig;

    /// Releases engine resources. Operations hold no connection between calls,
    /// so this has nothing to do for the bundled engines.
    fn close(&self) -> Result<(), TicketError>;
}
