//! Persistent node state (§4.E header chain engine, §4.F transaction
//! database): everything this node remembers between runs, backed by
//! [`sled`](https://docs.rs/sled).

pub mod chain;
pub mod config;
pub mod error;
pub mod sled_format;
pub mod txdb;

pub use chain::{BlockLink, ChainEvent, ChainState};
pub use config::Config;
pub use error::StateError;
pub use txdb::{ConflictPolicy, NeverConflicts, TransactionDb, TransactionRecord};
