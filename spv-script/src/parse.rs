//! A non-executing script walk: splits a program into its literal
//! `(opcode, pushed data)` sequence, for callers that need to pattern-match
//! a script's shape (e.g. "is this `OP_HASH160 <20 bytes> OP_EQUAL`?")
//! rather than run it. Shares the push-length decoding [`crate::evaluator`]
//! uses, since both need to agree on where one opcode ends and the next
//! begins.

use crate::error::ScriptError;
use crate::opcodes::{OP_PUSHDATA1, OP_PUSHDATA2, OP_PUSHDATA4};

/// One parsed script item: an opcode, with the data it pushed if it was a
/// push opcode.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Item {
    pub opcode: u8,
    pub data: Option<Vec<u8>>,
}

/// Splits `program` into its `(opcode, data)` sequence. Returns an error if
/// a push opcode's declared length runs past the end of the program.
pub fn parse(program: &[u8]) -> Result<Vec<Item>, ScriptError> {
    let mut items = Vec::new();
    let mut pc = 0usize;
    while pc < program.len() {
        let opcode = program[pc];
        pc += 1;

        let data_push_size = if opcode < OP_PUSHDATA1 {
            Some(opcode as usize)
        } else if opcode == OP_PUSHDATA1 {
            let n = *program.get(pc).ok_or(ScriptError::Truncated)? as usize;
            pc += 1;
            Some(n)
        } else if opcode == OP_PUSHDATA2 {
            let b0 = *program.get(pc).ok_or(ScriptError::Truncated)? as usize;
            let b1 = *program.get(pc + 1).ok_or(ScriptError::Truncated)? as usize;
            pc += 2;
            Some(b0 | (b1 << 8))
        } else if opcode == OP_PUSHDATA4 {
            let b0 = *program.get(pc).ok_or(ScriptError::Truncated)? as usize;
            let b1 = *program.get(pc + 1).ok_or(ScriptError::Truncated)? as usize;
            let b2 = *program.get(pc + 2).ok_or(ScriptError::Truncated)? as usize;
            let b3 = *program.get(pc + 3).ok_or(ScriptError::Truncated)? as usize;
            pc += 4;
            Some(b0 | (b1 << 8) | (b2 << 16) | (b3 << 24))
        } else {
            None
        };

        let data = match data_push_size {
            Some(size) => {
                let end = pc.checked_add(size).ok_or(ScriptError::Truncated)?;
                let slice = program.get(pc..end).ok_or(ScriptError::Truncated)?;
                pc = end;
                Some(slice.to_vec())
            }
            None => None,
        };

        items.push(Item { opcode, data });
    }
    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcodes::{OP_EQUAL, OP_HASH160};

    #[test]
    fn parses_hash160_equal_shape() {
        let mut program = vec![OP_HASH160, 20];
        program.extend_from_slice(&[0x11; 20]);
        program.push(OP_EQUAL);

        let items = parse(&program).unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0].opcode, OP_HASH160);
        assert_eq!(items[1].data, Some(vec![0x11; 20]));
        assert_eq!(items[2].opcode, OP_EQUAL);
    }
}
