pub mod config;
pub mod engine;
pub mod error;
pub mod store;

pub use config::{EngineConfig, DEFAULT_INCREMENT, DEFAULT_KEY, DEFAULT_OFFSET};
pub use engine::Engine;
pub use error::{LockResultExt, RegistryError, StoreError, TicketError, TicketdError};
pub use store::{
    is_valid_namespace, validate_namespace, CounterSession, CounterStore, MAX_NAMESPACE_LEN,
};
