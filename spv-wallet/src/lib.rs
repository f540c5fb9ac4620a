//! The wallet store, coin selector, payment monitors, and transaction
//! builder (§4.G, §4.H, §4.I): everything this node uses to track its own
//! money and spend it.

pub mod builder;
pub mod error;
pub mod monitor;
pub mod monitors;
pub mod persistence;
pub mod select;
pub mod store;

pub use builder::{p2pkh_planned_input, ChangeProducer, InputSigner, OutputProducer, PlannedInput, TransactionBuilder};
pub use error::WalletError;
pub use monitor::{Monitor, MonitorAction};
pub use monitors::{MultisigMonitor, PkhMonitor, StealthMonitor};
pub use persistence::PersistentWalletStore;
pub use select::select_spends;
pub use store::{Metadata, Spend, SpendId, WalletStore};
