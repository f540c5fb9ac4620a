//! The SIGHASH signable-preimage serialization (§4.D).
//!
//! The wallet's transaction builder (not this crate) holds the ECDSA
//! signing capability; this module only computes the digest the signature
//! commits to, and the one-byte flag suffix appended to a raw signature.

use std::io;

use thiserror::Error;

use crate::serialization::{sha256d, BitcoinSerialize};
use crate::transparent::{Input, OutPoint, Output, Script};

use super::Transaction;

/// Which inputs/outputs a signature commits to.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SigHashBase {
    All,
    None,
    Single,
}

/// The full SIGHASH flag byte: a base selector plus the `ANYONECANPAY`
/// modifier bit.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct SigHashFlags {
    pub base: SigHashBase,
    pub anyone_can_pay: bool,
}

impl SigHashFlags {
    pub const ALL: SigHashFlags = SigHashFlags {
        base: SigHashBase::All,
        anyone_can_pay: false,
    };

    /// Parse the one-byte flag suffix appended to a signature.
    pub fn from_byte(byte: u8) -> Option<SigHashFlags> {
        let anyone_can_pay = byte & 0x80 != 0;
        let base = match byte & !0x80 {
            0x01 => SigHashBase::All,
            0x02 => SigHashBase::None,
            0x03 => SigHashBase::Single,
            _ => return None,
        };
        Some(SigHashFlags { base, anyone_can_pay })
    }

    /// The one-byte encoding appended after a raw ECDSA signature.
    pub fn to_byte(self) -> u8 {
        let base = match self.base {
            SigHashBase::All => 0x01,
            SigHashBase::None => 0x02,
            SigHashBase::Single => 0x03,
        };
        base | if self.anyone_can_pay { 0x80 } else { 0 }
    }

    /// The 4-byte little-endian encoding written into the signable preimage.
    fn to_u32(self) -> u32 {
        self.to_byte() as u32
    }
}

/// Errors computing a signable preimage.
#[derive(Error, Debug)]
pub enum SigHashError {
    #[error("SIGHASH_SINGLE requires an output at the same index as the input ({0})")]
    MissingSingleOutput(usize),
    #[error("input index {0} is out of range for a transaction with {1} inputs")]
    InputOutOfRange(usize, usize),
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Compute the SIGHASH digest for input `input_index`, using
/// `prevout_script` as the script of the output that input redeems.
pub fn signature_hash(
    tx: &Transaction,
    input_index: usize,
    prevout_script: &Script,
    flags: SigHashFlags,
) -> Result<[u8; 32], SigHashError> {
    if input_index >= tx.inputs.len() {
        return Err(SigHashError::InputOutOfRange(input_index, tx.inputs.len()));
    }
    if flags.base == SigHashBase::Single && input_index >= tx.outputs.len() {
        return Err(SigHashError::MissingSingleOutput(input_index));
    }

    let mut writer = sha256d::Writer::default();
    tx.version.bitcoin_serialize(&mut writer)?;

    if flags.anyone_can_pay {
        write_compact_count(&mut writer, 1)?;
        write_signing_input(&mut writer, &tx.inputs[input_index], prevout_script, true)?;
    } else {
        write_compact_count(&mut writer, tx.inputs.len())?;
        for (i, input) in tx.inputs.iter().enumerate() {
            if i == input_index {
                write_signing_input(&mut writer, input, prevout_script, true)?;
            } else {
                let keep_sequence = flags.base != SigHashBase::None;
                write_signing_input(&mut writer, input, &Script(Vec::new()), keep_sequence)?;
            }
        }
    }

    match flags.base {
        SigHashBase::None => write_compact_count(&mut writer, 0)?,
        SigHashBase::Single => {
            write_compact_count(&mut writer, 1)?;
            tx.outputs[input_index].bitcoin_serialize(&mut writer)?;
        }
        SigHashBase::All => {
            tx.outputs.bitcoin_serialize(&mut writer)?;
        }
    }

    tx.locktime.bitcoin_serialize(&mut writer)?;
    flags.to_u32().bitcoin_serialize(&mut writer)?;

    Ok(writer.finish())
}

fn write_compact_count<W: io::Write>(writer: W, count: usize) -> Result<(), io::Error> {
    crate::compactint::CompactInt::from(count).bitcoin_serialize(writer)
}

/// Write one input's signing view: its outpoint, a script (either the
/// prevout script for the signed input or empty for the others), and a
/// sequence that is preserved or zeroed per the base sighash type.
fn write_signing_input<W: io::Write>(
    mut writer: W,
    input: &Input,
    script: &Script,
    keep_sequence: bool,
) -> Result<(), io::Error> {
    let (outpoint, sequence) = match input {
        Input::PrevOut { outpoint, sequence, .. } => (*outpoint, *sequence),
        Input::Coinbase { .. } => (
            OutPoint {
                hash: crate::transaction::Hash([0; 32]),
                index: 0xFFFF_FFFF,
            },
            0,
        ),
    };
    outpoint.bitcoin_serialize(&mut writer)?;
    script.bitcoin_serialize(&mut writer)?;
    let sequence = if keep_sequence { sequence } else { 0 };
    sequence.bitcoin_serialize(&mut writer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_byte_roundtrip() {
        spv_test::init();
        for base in [SigHashBase::All, SigHashBase::None, SigHashBase::Single] {
            for anyone_can_pay in [false, true] {
                let flags = SigHashFlags { base, anyone_can_pay };
                assert_eq!(SigHashFlags::from_byte(flags.to_byte()), Some(flags));
            }
        }
    }

    #[test]
    fn all_byte_is_one() {
        spv_test::init();
        assert_eq!(SigHashFlags::ALL.to_byte(), 0x01);
    }
}
