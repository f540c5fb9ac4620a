//! The 12-byte, NUL-padded ASCII command name in a message header (§4.A).

use std::io::{self, Read, Write};

use spv_chain::serialization::{BitcoinDeserialize, BitcoinSerialize, SerializationError};

/// Which [`Message`](super::Message) variant a header's payload decodes as.
///
/// Bitcoin identifies messages on the wire by a 12-byte ASCII string; we use
/// this enum as the internal representation and only touch the wire string
/// during (de)serialization, so adding a command can never produce a
/// malformed string by accident.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Command {
    Version,
    Verack,
    Ping,
    Pong,
    GetAddr,
    Addr,
    GetBlocks,
    Inv,
    GetHeaders,
    Headers,
    GetData,
    Block,
    Tx,
    NotFound,
}

impl Command {
    /// The 12-byte, NUL-padded wire encoding of this command.
    pub fn bytes(self) -> &'static [u8] {
        match self {
            Command::Version => b"version\0\0\0\0\0",
            Command::Verack => b"verack\0\0\0\0\0\0",
            Command::Ping => b"ping\0\0\0\0\0\0\0\0",
            Command::Pong => b"pong\0\0\0\0\0\0\0\0",
            Command::GetAddr => b"getaddr\0\0\0\0\0",
            Command::Addr => b"addr\0\0\0\0\0\0\0\0",
            Command::GetBlocks => b"getblocks\0\0\0",
            Command::Inv => b"inv\0\0\0\0\0\0\0\0\0",
            Command::GetHeaders => b"getheaders\0\0",
            Command::Headers => b"headers\0\0\0\0\0",
            Command::GetData => b"getdata\0\0\0\0\0",
            Command::Block => b"block\0\0\0\0\0\0\0",
            Command::Tx => b"tx\0\0\0\0\0\0\0\0\0\0",
            Command::NotFound => b"notfound\0\0\0\0",
        }
    }
}

impl BitcoinSerialize for Command {
    fn bitcoin_serialize<W: Write>(&self, mut writer: W) -> Result<(), io::Error> {
        writer.write_all(self.bytes())
    }
}

impl BitcoinDeserialize for Command {
    fn bitcoin_deserialize<R: Read>(mut reader: R) -> Result<Self, SerializationError> {
        let mut raw = [0u8; 12];
        reader.read_exact(&mut raw)?;
        for candidate in [
            Command::Version,
            Command::Verack,
            Command::Ping,
            Command::Pong,
            Command::GetAddr,
            Command::Addr,
            Command::GetBlocks,
            Command::Inv,
            Command::GetHeaders,
            Command::Headers,
            Command::GetData,
            Command::Block,
            Command::Tx,
            Command::NotFound,
        ] {
            if candidate.bytes() == raw {
                return Ok(candidate);
            }
        }
        Err(SerializationError::Parse("unrecognized command string"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_command_roundtrips() {
        for cmd in [
            Command::Version,
            Command::Verack,
            Command::Ping,
            Command::Pong,
            Command::GetAddr,
            Command::Addr,
            Command::GetBlocks,
            Command::Inv,
            Command::GetHeaders,
            Command::Headers,
            Command::GetData,
            Command::Block,
            Command::Tx,
            Command::NotFound,
        ] {
            assert_eq!(cmd.bytes().len(), 12);
            let mut bytes = Vec::new();
            cmd.bitcoin_serialize(&mut bytes).unwrap();
            assert_eq!(Command::bitcoin_deserialize(&bytes[..]).unwrap(), cmd);
        }
    }

    #[test]
    fn unknown_command_errors() {
        let raw = *b"notacommand\0";
        assert!(Command::bitcoin_deserialize(&raw[..]).is_err());
    }
}
