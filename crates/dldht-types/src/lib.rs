//! Core types for the dl-dht client.
//!
//! This crate defines the error taxonomy, the client configuration and the
//! key-shape contract shared by the wire layer and the CLI. It performs no
//! network I/O.

pub mod config;
pub mod error;
pub mod key;

pub use config::ClientConfig;
pub use error::{DhtError, DhtResult};
pub use key::{make_key, validate_key, KeyGroup};
