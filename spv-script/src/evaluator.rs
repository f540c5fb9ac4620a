//! The stack-machine script evaluator (§4.C).
//!
//! [`Evaluator::evaluate`] walks a [`Script`]'s program byte-by-byte, the way
//! a miner or a wallet validating a peer's spend would: data pushes go on the
//! main stack, opcodes above `OP_16` pop and push according to a fixed
//! dispatch table, and `OP_IF`/`OP_NOTIF`/`OP_ELSE`/`OP_ENDIF` gate whether
//! the opcodes between them run at all. `OP_CHECKSIG` and its relatives are
//! deliberately left unimplemented: this SPV profile never reaches them
//! because the wallet layer authorizes spends before a script ever runs
//! (§1 Non-goals), so they fall through the dispatch as no-ops rather than
//! panicking on an opcode nothing here can evaluate correctly.

use ripemd160::{Digest as _, Ripemd160};
use sha1::Sha1;
use sha2::Sha256;

use spv_chain::{parameters::Params, transparent::Script};

use crate::error::ScriptError;
use crate::number::{cast_to_bool, decode_int, decode_uint, encode_int};
use crate::opcodes::*;

/// Evaluates scripts against one coin profile's limits.
pub struct Evaluator {
    max_script_element_size: usize,
    max_script_instructions: usize,
}

impl Evaluator {
    pub fn new(params: &Params) -> Self {
        Evaluator {
            max_script_element_size: params.max_script_element_size,
            max_script_instructions: params.max_script_instructions,
        }
    }

    /// Runs `script` to completion and returns the final main stack.
    pub fn evaluate(&self, script: &Script) -> Result<Vec<Vec<u8>>, ScriptError> {
        let program = &script.0;
        let mut pc = 0usize;
        let mut opcount = 0usize;
        let mut block_false = 0usize;
        let mut block_exec_values: Vec<bool> = Vec::new();
        let mut stack: Vec<Vec<u8>> = Vec::new();
        let mut altstack: Vec<Vec<u8>> = Vec::new();

        while pc < program.len() {
            let (opcode, data, next_pc) = read_op(program, pc)?;
            pc = next_pc;
            let block_exec = block_false == 0;

            if opcode > OP_16 {
                opcount += 1;
                if opcount > self.max_script_instructions {
                    return Err(ScriptError::TooManyInstructions(self.max_script_instructions));
                }
            }

            if DISABLED_OPCODES.contains(&opcode) {
                return Err(ScriptError::DisabledOpcode(opcode));
            }

            if block_exec && data.is_some() {
                let data = data.expect("checked Some above");
                if data.len() > self.max_script_element_size {
                    return Err(ScriptError::InvalidScriptElementSize(
                        data.len(),
                        self.max_script_element_size,
                    ));
                }
                stack.push(data);
                continue;
            }

            if !(block_exec || (opcode >= OP_IF && opcode <= OP_ENDIF)) {
                continue;
            }

            match opcode {
                OP_NOP | OP_NOP1 | OP_NOP2 | OP_NOP3 | OP_NOP4 | OP_NOP5 | OP_NOP6 | OP_NOP7
                | OP_NOP8 | OP_NOP9 | OP_NOP10 => {}

                _ if small_int_constant(opcode).is_some() => {
                    stack.push(small_int_constant(opcode).expect("checked Some above").to_vec());
                }

                OP_IF | OP_NOTIF => {
                    let mut value = false;
                    if block_exec {
                        value = cast_to_bool(&pop(&mut stack)?);
                        if opcode == OP_NOTIF {
                            value = !value;
                        }
                    }
                    if !value {
                        block_false += 1;
                    }
                    block_exec_values.push(value);
                }

                OP_ELSE => {
                    let v = *block_exec_values.last().ok_or(ScriptError::StackUnderflow)?;
                    *block_exec_values.last_mut().expect("checked above") = !v;
                    if v {
                        block_false += 1;
                    } else {
                        block_false -= 1;
                    }
                }

                OP_ENDIF => {
                    let v = block_exec_values.pop().ok_or(ScriptError::StackUnderflow)?;
                    if !v {
                        block_false -= 1;
                    }
                }

                OP_EQUAL | OP_EQUALVERIFY => {
                    let u = pop(&mut stack)?;
                    let v = pop(&mut stack)?;
                    stack.push(vec![(u == v) as u8]);
                    if opcode == OP_EQUALVERIFY {
                        verify(&mut stack)?;
                    }
                }

                OP_VERIFY => {
                    if !cast_to_bool(&pop(&mut stack)?) {
                        return Err(ScriptError::VerifyFailure);
                    }
                }

                OP_RETURN => return Err(ScriptError::ScriptReturn),

                OP_TOALTSTACK => {
                    let v = pop(&mut stack)?;
                    altstack.push(v);
                }

                OP_FROMALTSTACK => {
                    let v = altstack.pop().ok_or(ScriptError::StackUnderflow)?;
                    stack.push(v);
                }

                OP_2DROP => {
                    require(&stack, 2)?;
                    stack.truncate(stack.len() - 2);
                }

                OP_2DUP => {
                    require(&stack, 2)?;
                    let tail = stack[stack.len() - 2..].to_vec();
                    stack.extend(tail);
                }

                OP_3DUP => {
                    require(&stack, 3)?;
                    let tail = stack[stack.len() - 3..].to_vec();
                    stack.extend(tail);
                }

                OP_2OVER => {
                    require(&stack, 4)?;
                    let len = stack.len();
                    let tail = stack[len - 4..len - 2].to_vec();
                    stack.extend(tail);
                }

                OP_2ROT => {
                    require(&stack, 6)?;
                    let len = stack.len();
                    let x1 = stack[len - 6].clone();
                    let x2 = stack[len - 5].clone();
                    let tail = stack[len - 4..].to_vec();
                    stack.truncate(len - 6);
                    stack.extend(tail);
                    stack.push(x1);
                    stack.push(x2);
                }

                OP_2SWAP => {
                    require(&stack, 4)?;
                    let len = stack.len();
                    stack.swap(len - 4, len - 2);
                    stack.swap(len - 3, len - 1);
                }

                OP_IFDUP => {
                    let top = stack.last().ok_or(ScriptError::StackUnderflow)?.clone();
                    if cast_to_bool(&top) {
                        stack.push(top);
                    }
                }

                OP_DEPTH => {
                    stack.push(encode_int(stack.len() as i64));
                }

                OP_DROP => {
                    pop(&mut stack)?;
                }

                OP_DUP => {
                    let top = stack.last().ok_or(ScriptError::StackUnderflow)?.clone();
                    stack.push(top);
                }

                OP_NIP => {
                    require(&stack, 2)?;
                    let len = stack.len();
                    stack.remove(len - 2);
                }

                OP_OVER => {
                    require(&stack, 2)?;
                    let v = stack[stack.len() - 2].clone();
                    stack.push(v);
                }

                OP_PICK | OP_ROLL => {
                    let n = decode_uint(&pop(&mut stack)?) as usize;
                    if n >= stack.len() {
                        return Err(ScriptError::StackUnderflow);
                    }
                    let idx = stack.len() - 1 - n;
                    let v = stack[idx].clone();
                    if opcode == OP_ROLL {
                        stack.remove(idx);
                    }
                    stack.push(v);
                }

                OP_ROT => {
                    require(&stack, 3)?;
                    let len = stack.len();
                    stack.swap(len - 3, len - 2);
                    stack.swap(len - 2, len - 1);
                }

                OP_SWAP => {
                    require(&stack, 2)?;
                    let len = stack.len();
                    stack.swap(len - 2, len - 1);
                }

                OP_TUCK => {
                    let a = pop(&mut stack)?;
                    let b = pop(&mut stack)?;
                    stack.push(a.clone());
                    stack.push(b);
                    stack.push(a);
                }

                OP_SIZE => {
                    let len = stack.last().ok_or(ScriptError::StackUnderflow)?.len();
                    stack.push(encode_int(len as i64));
                }

                OP_1ADD | OP_1SUB | OP_NEGATE | OP_ABS | OP_NOT | OP_0NOTEQUAL => {
                    let v = decode_int(&pop(&mut stack)?);
                    let result = match opcode {
                        OP_1ADD => v + 1,
                        OP_1SUB => v - 1,
                        OP_NEGATE => -v,
                        OP_ABS => v.abs(),
                        OP_NOT => (v == 0) as i64,
                        OP_0NOTEQUAL => (v != 0) as i64,
                        _ => unreachable!(),
                    };
                    stack.push(encode_int(result));
                }

                OP_ADD | OP_SUB | OP_BOOLAND | OP_BOOLOR | OP_NUMEQUAL | OP_NUMEQUALVERIFY
                | OP_NUMNOTEQUAL | OP_LESSTHAN | OP_LESSTHANOREQUAL | OP_GREATERTHAN
                | OP_GREATERTHANOREQUAL | OP_MIN | OP_MAX => {
                    let x2 = decode_int(&pop(&mut stack)?);
                    let x1 = decode_int(&pop(&mut stack)?);
                    let result = match opcode {
                        OP_ADD => x1 + x2,
                        OP_SUB => x1 - x2,
                        OP_BOOLAND => (x1 != 0 && x2 != 0) as i64,
                        OP_BOOLOR => (x1 != 0 || x2 != 0) as i64,
                        OP_NUMEQUAL | OP_NUMEQUALVERIFY => (x1 == x2) as i64,
                        OP_NUMNOTEQUAL => (x1 != x2) as i64,
                        OP_LESSTHAN => (x1 < x2) as i64,
                        OP_LESSTHANOREQUAL => (x1 <= x2) as i64,
                        OP_GREATERTHAN => (x1 > x2) as i64,
                        OP_GREATERTHANOREQUAL => (x1 >= x2) as i64,
                        OP_MIN => x1.min(x2),
                        OP_MAX => x1.max(x2),
                        _ => unreachable!(),
                    };
                    stack.push(encode_int(result));
                    if opcode == OP_NUMEQUALVERIFY {
                        verify(&mut stack)?;
                    }
                }

                OP_WITHIN => {
                    let b = decode_int(&pop(&mut stack)?);
                    let a = decode_int(&pop(&mut stack)?);
                    let x = decode_int(&pop(&mut stack)?);
                    stack.push(encode_int((a <= x && x < b) as i64));
                }

                OP_RIPEMD160 => {
                    let data = pop(&mut stack)?;
                    stack.push(Ripemd160::digest(&data).to_vec());
                }

                OP_SHA1 => {
                    let data = pop(&mut stack)?;
                    stack.push(Sha1::digest(&data).to_vec());
                }

                OP_SHA256 => {
                    let data = pop(&mut stack)?;
                    stack.push(Sha256::digest(&data).to_vec());
                }

                OP_HASH160 => {
                    let data = pop(&mut stack)?;
                    let sha = Sha256::digest(&data);
                    stack.push(Ripemd160::digest(&sha).to_vec());
                }

                OP_HASH256 => {
                    let data = pop(&mut stack)?;
                    let once = Sha256::digest(&data);
                    stack.push(Sha256::digest(&once).to_vec());
                }

                // OP_VER, OP_VERIF, OP_VERNOTIF, OP_RESERVED(1|2), OP_CODESEPARATOR,
                // and the OP_CHECKSIG family fall through here: this node never
                // evaluates a spending script to authorize a spend, so these are
                // silent no-ops rather than opcodes this evaluator implements.
                _ => {}
            }
        }

        if !block_exec_values.is_empty() {
            return Err(ScriptError::UnterminatedIfStatement(block_exec_values.len()));
        }

        Ok(stack)
    }
}

/// Reads one instruction at `pc`: the opcode byte, and (for a data push) the
/// pushed bytes, returning the program counter just past it.
fn read_op(program: &[u8], mut pc: usize) -> Result<(u8, Option<Vec<u8>>, usize), ScriptError> {
    let opcode = *program.get(pc).ok_or(ScriptError::Truncated)?;
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

    Ok((opcode, data, pc))
}

fn pop(stack: &mut Vec<Vec<u8>>) -> Result<Vec<u8>, ScriptError> {
    stack.pop().ok_or(ScriptError::StackUnderflow)
}

fn require(stack: &[Vec<u8>], n: usize) -> Result<(), ScriptError> {
    if stack.len() < n {
        Err(ScriptError::StackUnderflow)
    } else {
        Ok(())
    }
}

fn verify(stack: &mut Vec<Vec<u8>>) -> Result<(), ScriptError> {
    if cast_to_bool(stack.last().ok_or(ScriptError::StackUnderflow)?) {
        stack.pop();
        Ok(())
    } else {
        Err(ScriptError::VerifyFailure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spv_chain::parameters::Network;

    fn eval(program: Vec<u8>) -> Result<Vec<Vec<u8>>, ScriptError> {
        let params = Network::Mainnet.params();
        let evaluator = Evaluator::new(&params);
        evaluator.evaluate(&Script(program))
    }

    fn push(data: &[u8]) -> Vec<u8> {
        let mut out = Vec::new();
        if data.len() < OP_PUSHDATA1 as usize {
            out.push(data.len() as u8);
        } else {
            out.push(OP_PUSHDATA1);
            out.push(data.len() as u8);
        }
        out.extend_from_slice(data);
        out
    }

    #[test]
    fn pushes_literal_bytes() {
        let stack = eval(push(&[0x00])).unwrap();
        assert_eq!(stack, vec![vec![0x00]]);
    }

    #[test]
    fn small_int_constants_push_their_value() {
        for (op, expected) in [(OP_1, 0x01u8), (OP_2, 0x02), (OP_16, 0x10)] {
            let stack = eval(vec![op]).unwrap();
            assert_eq!(stack, vec![vec![expected]]);
        }
        let stack = eval(vec![OP_1NEGATE]).unwrap();
        assert_eq!(stack, vec![vec![0xff]]);
        let stack = eval(vec![OP_FALSE]).unwrap();
        assert_eq!(stack, vec![Vec::<u8>::new()]);
    }

    #[test]
    fn if_else_endif_takes_true_branch() {
        let mut program = push(&[0x01]);
        program.push(OP_IF);
        program.extend(push(&[0x03]));
        program.push(OP_ELSE);
        program.extend(push(&[0x02]));
        program.push(OP_ENDIF);
        assert_eq!(eval(program).unwrap(), vec![vec![0x03]]);
    }

    #[test]
    fn if_else_endif_takes_false_branch() {
        let mut program = push(&[0x00]);
        program.push(OP_IF);
        program.extend(push(&[0x03]));
        program.push(OP_ELSE);
        program.extend(push(&[0x02]));
        program.push(OP_ENDIF);
        assert_eq!(eval(program).unwrap(), vec![vec![0x02]]);
    }

    #[test]
    fn unterminated_if_errors() {
        let mut program = push(&[0x70]);
        program.push(OP_IF);
        assert_eq!(
            eval(program),
            Err(ScriptError::UnterminatedIfStatement(1))
        );
    }

    #[test]
    fn disabled_opcodes_are_rejected() {
        for op in DISABLED_OPCODES {
            assert_eq!(eval(vec![*op]), Err(ScriptError::DisabledOpcode(*op)));
        }
    }

    #[test]
    fn too_many_instructions_is_rejected() {
        let params = Network::Mainnet.params();
        let program = vec![OP_NOP; params.max_script_instructions + 1];
        assert_eq!(
            eval(program),
            Err(ScriptError::TooManyInstructions(params.max_script_instructions))
        );
    }

    #[test]
    fn hash_ops_match_known_vectors() {
        assert_eq!(
            eval(vec![OP_RIPEMD160]).unwrap_err(),
            ScriptError::StackUnderflow
        );

        let mut program = push(&[]);
        program.push(OP_RIPEMD160);
        let stack = eval(program).unwrap();
        assert_eq!(
            hex::encode(&stack[0]),
            "9c1185a5c5e9fc54612808977ee8f548b2258d31"
        );

        let mut program = push(&[]);
        program.push(OP_SHA256);
        let stack = eval(program).unwrap();
        assert_eq!(
            hex::encode(&stack[0]),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );

        let mut program = push(&[]);
        program.push(OP_HASH160);
        let stack = eval(program).unwrap();
        assert_eq!(
            hex::encode(&stack[0]),
            "b472a266d0bd89c13706a4132ccfb16f7c3b9fcb"
        );

        let mut program = push(&[]);
        program.push(OP_HASH256);
        let stack = eval(program).unwrap();
        assert_eq!(
            hex::encode(&stack[0]),
            "5df6e0e2761359d30a8275058e299fcc0381534545f55cf43e41983f5d4c9456"
        );
    }

    #[test]
    fn pick_and_roll() {
        let program = vec![OP_1, OP_2, OP_3, OP_4, OP_0, OP_PICK, OP_4, OP_PICK];
        let stack = eval(program).unwrap();
        assert_eq!(
            stack,
            vec![
                vec![0x01],
                vec![0x02],
                vec![0x03],
                vec![0x04],
                vec![0x04],
                vec![0x01]
            ]
        );
    }

    #[test]
    fn arithmetic_add() {
        let program = vec![OP_1, OP_2, OP_ADD];
        assert_eq!(eval(program).unwrap(), vec![vec![0x03]]);
    }
}
