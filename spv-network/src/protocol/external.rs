/// A Tokio codec that transforms an `AsyncRead` into a `Stream` of `Message`s.
pub mod codec;
/// Inventory items.
mod inv;
/// An enum of all supported Bitcoin message types.
mod message;

/// A single byte enum representing a Bitcoin message type.
mod command;
/// Newtype wrappers for primitive types.
pub mod types;

pub use codec::Codec;
pub use command::Command;
pub use inv::InventoryHash;
pub use message::{Message, Version};
