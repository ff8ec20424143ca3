use crate::types::encoding::DecodeError;
use at_derive::Error;

/// Errors raised while decoding, executing, generating or restoring AT code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ATError {
    /// Code ended in the middle of an instruction.
    #[error("code exhausted at {pc:#06x}: needed {requested} more bytes")]
    DecodeExhaustion { pc: u32, requested: usize },
    /// A code, data or branch address lies outside its segment.
    #[error("invalid {segment} address {address}")]
    InvalidAddress { segment: &'static str, address: i64 },
    /// Byte at `pc` is not an opcode.
    #[error("invalid opcode {opcode:#04x} at {pc:#06x}")]
    InvalidOpCode { opcode: u8, pc: u32 },
    /// Unknown function code, or one called through the wrong opcode.
    #[error("illegal function code {code:#06x}: {reason}")]
    IllegalFunctionCode { code: u16, reason: String },
    /// Operation-level fault that an installed error handler may catch.
    #[error("runtime fault: {0}")]
    RuntimeFault(&'static str),
    /// Push onto a full stack or pop from an empty one.
    #[error("{stack} stack {reason}")]
    StackBounds {
        stack: &'static str,
        reason: &'static str,
    },
    /// Code generation failed; never raised while executing.
    #[error("compilation failed: {0}")]
    CompilationError(String),
    /// Header bytes are malformed or describe an unsupported machine.
    #[error("invalid header: {0}")]
    InvalidHeader(String),
    /// State or creation bytes do not describe a valid machine.
    #[error("malformed machine image: {0}")]
    MalformedState(String),
}

impl ATError {
    /// Whether an `ERR_ADR` handler may take over instead of finishing the machine.
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, ATError::RuntimeFault(_))
    }

    pub(crate) fn compile(message: impl Into<String>) -> Self {
        ATError::CompilationError(message.into())
    }
}

impl From<DecodeError> for ATError {
    fn from(err: DecodeError) -> Self {
        ATError::MalformedState(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_runtime_faults_are_recoverable() {
        assert!(ATError::RuntimeFault("division by zero").is_recoverable());
        assert!(!ATError::InvalidOpCode { opcode: 0xdd, pc: 0 }.is_recoverable());
        assert!(!ATError::InvalidAddress {
            segment: "data",
            address: 512
        }
        .is_recoverable());
        assert!(!ATError::StackBounds {
            stack: "call",
            reason: "underflow"
        }
        .is_recoverable());
    }

    #[test]
    fn display_formats() {
        assert_eq!(
            ATError::InvalidOpCode { opcode: 0xdd, pc: 0x12 }.to_string(),
            "invalid opcode 0xdd at 0x0012"
        );
        assert_eq!(
            ATError::DecodeExhaustion { pc: 3, requested: 4 }.to_string(),
            "code exhausted at 0x0003: needed 4 more bytes"
        );
        assert_eq!(
            ATError::IllegalFunctionCode {
                code: 0xaaaa,
                reason: "unknown".into()
            }
            .to_string(),
            "illegal function code 0xaaaa: unknown"
        );
    }

    #[test]
    fn decode_errors_become_malformed_state() {
        let err: ATError = DecodeError::TrailingBytes(3).into();
        assert_eq!(
            err,
            ATError::MalformedState("3 trailing bytes after value".into())
        );
    }
}
