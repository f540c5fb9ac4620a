//! Errors an [`crate::Evaluator`] can raise while executing a script (§4.C).

use thiserror::Error;

/// Everything that can go wrong evaluating a script.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    /// A data push exceeded the coin profile's `max_script_element_size`.
    #[error("pushed {0} bytes, exceeding the {1}-byte element size limit")]
    InvalidScriptElementSize(usize, usize),

    /// More non-push opcodes ran than the coin profile's
    /// `max_script_instructions` allows.
    #[error("script executed more than {0} instructions")]
    TooManyInstructions(usize),

    /// The script used one of the string/bit-manipulation opcodes Bitcoin
    /// Core disabled after CVE-2010-5141 and friends.
    #[error("script used disabled opcode 0x{0:02x}")]
    DisabledOpcode(u8),

    /// Execution reached the end of the script with unmatched `OP_IF`s.
    #[error("{0} IF block(s) were never closed with OP_ENDIF")]
    UnterminatedIfStatement(usize),

    /// The script ran `OP_RETURN`.
    #[error("script executed OP_RETURN")]
    ScriptReturn,

    /// `OP_VERIFY`, `OP_EQUALVERIFY`, or `OP_NUMEQUALVERIFY` popped a false
    /// value.
    #[error("script verification failed")]
    VerifyFailure,

    /// A stack-manipulation or arithmetic opcode needed more items than were
    /// on the stack (or alt stack).
    #[error("stack underflow")]
    StackUnderflow,

    /// The script ended mid data-push, or a push's declared length ran past
    /// the end of the program.
    #[error("script truncated mid instruction")]
    Truncated,
}
