//! The ticket-server engine: issues integers by harvesting store-generated
//! auto-increment identifiers.

mod ticket;

pub use crate::contracts::config::{
    EngineConfig, DEFAULT_INCREMENT, DEFAULT_KEY, DEFAULT_OFFSET,
};
pub use ticket::TicketEngine;
