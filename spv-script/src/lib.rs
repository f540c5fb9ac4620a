//! The Bitcoin Script stack-machine evaluator (§4.C).
//!
//! [`Evaluator`] runs a [`spv_chain::transparent::Script`] program against one
//! coin profile's limits and returns the resulting stack. It has no notion of
//! a transaction, an input, or a signature: it only knows how to execute
//! opcodes, which is all a wallet scanning a payment needs from it (§1
//! Non-goals: "no full block/UTXO validation").

pub mod error;
pub mod evaluator;
pub mod number;
pub mod opcodes;
pub mod parse;

pub use error::ScriptError;
pub use evaluator::Evaluator;
pub use parse::{parse as parse_script, Item as ScriptItem};
