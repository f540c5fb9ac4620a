//! Core block, transaction, and address types for the SPV node.
//!
//! This crate defines the consensus-critical data model (§4.D of the node
//! design): block headers, blocks, transactions, transparent inputs/outputs,
//! and the little-endian wire encoding they are serialized with (§4.A). It
//! also carries the proof-of-work/difficulty arithmetic and the coin profile
//! (network parameters) that the header chain engine validates against.
//!
//! Higher layers (header chain engine, transaction database, wallet, network
//! core) depend on this crate for their shared vocabulary; this crate itself
//! depends on nothing in the workspace.

mod cached;
pub mod amount;
pub mod compactint;
pub mod fmt;
pub mod serialization;
pub mod work;

pub mod block;
pub mod parameters;
pub mod transaction;
pub mod transparent;

pub use compactint::CompactInt;
pub use serialization::{BitcoinDeserialize, BitcoinDeserializeInto, BitcoinSerialize, SerializationError};
