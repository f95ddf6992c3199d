//! Foundation layer for WireVox
//!
//! Shared building blocks used by every provider adapter: the session error
//! taxonomy and the connection state cell.

pub mod error;
pub mod state;

pub use error::SessionError;
pub use state::{ConnectionState, StateCell};
