//! The peer-to-peer network core: wire protocol, peer lifecycle, address
//! book, and the header-sync and inventory state machines that drive an SPV
//! node's view of the network (§4.K).

pub mod constants;
pub mod inventory;
pub mod meta_addr;
pub mod peer;
pub mod protocol;
pub mod sync;

pub use meta_addr::{AddressBook, MetaAddr};
pub use protocol::external::{Command, InventoryHash, Message};
