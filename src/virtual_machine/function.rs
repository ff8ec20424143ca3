//! Function codes reachable through the `EXT_FUN*` opcodes.
//!
//! [`for_each_function!`](crate::for_each_function) is the canonical table:
//! `Name = code, "NAME", param_count, returns_value`. Codes in
//! [`PLATFORM_FUNCTIONS`] are not in the table; the host decides their shape.

use crate::virtual_machine::errors::ATError;
use crate::virtual_machine::isa::OpCode;
use std::fmt;
use std::ops::RangeInclusive;

/// Codes forwarded verbatim to the host's platform hooks.
pub const PLATFORM_FUNCTIONS: RangeInclusive<u16> = 0x0500..=0x06ff;

/// Invokes a callback macro with the complete function-code table.
#[macro_export]
macro_rules! for_each_function {
    ($callback:ident) => {
        $callback! {
            /// Logs the parameter; diagnostics only.
            Echo = 0x0001, "ECHO", 1, false,

            // Register reads
            GetA1 = 0x0100, "GET_A1", 0, true,
            GetA2 = 0x0101, "GET_A2", 0, true,
            GetA3 = 0x0102, "GET_A3", 0, true,
            GetA4 = 0x0103, "GET_A4", 0, true,
            GetB1 = 0x0104, "GET_B1", 0, true,
            GetB2 = 0x0105, "GET_B2", 0, true,
            GetB3 = 0x0106, "GET_B3", 0, true,
            GetB4 = 0x0107, "GET_B4", 0, true,
            /// Copies A into the four data words starting at the given word index.
            GetAInd = 0x0108, "GET_A_IND", 1, false,
            /// Copies B into the four data words starting at the given word index.
            GetBInd = 0x0109, "GET_B_IND", 1, false,

            // Register writes
            SetA1 = 0x0110, "SET_A1", 1, false,
            SetA2 = 0x0111, "SET_A2", 1, false,
            SetA3 = 0x0112, "SET_A3", 1, false,
            SetA4 = 0x0113, "SET_A4", 1, false,
            SetA1A2 = 0x0114, "SET_A1_A2", 2, false,
            SetA3A4 = 0x0115, "SET_A3_A4", 2, false,
            SetB1 = 0x0116, "SET_B1", 1, false,
            SetB2 = 0x0117, "SET_B2", 1, false,
            SetB3 = 0x0118, "SET_B3", 1, false,
            SetB4 = 0x0119, "SET_B4", 1, false,
            SetB1B2 = 0x011a, "SET_B1_B2", 2, false,
            SetB3B4 = 0x011b, "SET_B3_B4", 2, false,
            /// Loads A from the four data words starting at the given word index.
            SetAInd = 0x011c, "SET_A_IND", 1, false,
            /// Loads B from the four data words starting at the given word index.
            SetBInd = 0x011d, "SET_B_IND", 1, false,

            // Register operations
            ClearA = 0x0120, "CLEAR_A", 0, false,
            ClearB = 0x0121, "CLEAR_B", 0, false,
            ClearAAndB = 0x0122, "CLEAR_A_AND_B", 0, false,
            CopyAFromB = 0x0123, "COPY_A_FROM_B", 0, false,
            CopyBFromA = 0x0124, "COPY_B_FROM_A", 0, false,
            CheckAIsZero = 0x0125, "CHECK_A_IS_ZERO", 0, true,
            CheckBIsZero = 0x0126, "CHECK_B_IS_ZERO", 0, true,
            CheckAEqualsB = 0x0127, "CHECK_A_EQUALS_B", 0, true,
            SwapAAndB = 0x0128, "SWAP_A_AND_B", 0, false,
            OrAWithB = 0x0129, "OR_A_WITH_B", 0, false,
            OrBWithA = 0x012a, "OR_B_WITH_A", 0, false,
            AndAWithB = 0x012b, "AND_A_WITH_B", 0, false,
            AndBWithA = 0x012c, "AND_B_WITH_A", 0, false,
            XorAWithB = 0x012d, "XOR_A_WITH_B", 0, false,
            XorBWithA = 0x012e, "XOR_B_WITH_A", 0, false,
            /// -1, 0 or 1 comparing A with B as unsigned 256-bit numbers, A1 most significant.
            UnsignedCompareAWithB = 0x0130, "UNSIGNED_COMPARE_A_WITH_B", 0, true,
            /// As the unsigned form, but A1 and B1 carry the sign.
            SignedCompareAWithB = 0x0131, "SIGNED_COMPARE_A_WITH_B", 0, true,

            // Digests of a data-segment range (start word, byte length)
            Md5IntoB = 0x0200, "MD5_INTO_B", 2, false,
            CheckMd5WithB = 0x0201, "CHECK_MD5_WITH_B", 2, true,
            Rmd160IntoB = 0x0202, "RMD160_INTO_B", 2, false,
            CheckRmd160WithB = 0x0203, "CHECK_RMD160_WITH_B", 2, true,
            Sha256IntoB = 0x0204, "SHA256_INTO_B", 2, false,
            CheckSha256WithB = 0x0205, "CHECK_SHA256_WITH_B", 2, true,
            Hash160IntoB = 0x0206, "HASH160_INTO_B", 2, false,
            CheckHash160WithB = 0x0207, "CHECK_HASH160_WITH_B", 2, true,

            // Blockchain queries
            GetBlockTimestamp = 0x0300, "GET_BLOCK_TIMESTAMP", 0, true,
            GetCreationTimestamp = 0x0301, "GET_CREATION_TIMESTAMP", 0, true,
            GetPreviousBlockTimestamp = 0x0302, "GET_PREVIOUS_BLOCK_TIMESTAMP", 0, true,
            PutPreviousBlockHashIntoA = 0x0303, "PUT_PREVIOUS_BLOCK_HASH_INTO_A", 0, false,
            PutTxAfterTimestampIntoA = 0x0304, "PUT_TX_AFTER_TIMESTAMP_INTO_A", 1, false,
            GetTypeFromTxInA = 0x0305, "GET_TYPE_FROM_TX_IN_A", 0, true,
            GetAmountFromTxInA = 0x0306, "GET_AMOUNT_FROM_TX_IN_A", 0, true,
            GetTimestampFromTxInA = 0x0307, "GET_TIMESTAMP_FROM_TX_IN_A", 0, true,
            /// Two-phase: sleeps one round before delivering its value.
            GenerateRandomUsingTxInA = 0x0308, "GENERATE_RANDOM_USING_TX_IN_A", 0, true,
            PutMessageFromTxInAIntoB = 0x0309, "PUT_MESSAGE_FROM_TX_IN_A_INTO_B", 0, false,
            PutAddressFromTxInAIntoB = 0x030a, "PUT_ADDRESS_FROM_TX_IN_A_INTO_B", 0, false,
            PutCreatorIntoB = 0x030b, "PUT_CREATOR_INTO_B", 0, false,

            // Balances and payments
            GetCurrentBalance = 0x0400, "GET_CURRENT_BALANCE", 0, true,
            GetPreviousBalance = 0x0401, "GET_PREVIOUS_BALANCE", 0, true,
            PayToAddressInB = 0x0402, "PAY_TO_ADDRESS_IN_B", 1, false,
            PayAllToAddressInB = 0x0403, "PAY_ALL_TO_ADDRESS_IN_B", 0, false,
            PayPreviousToAddressInB = 0x0404, "PAY_PREVIOUS_TO_ADDRESS_IN_B", 0, false,
            MessageAToAddressInB = 0x0405, "MESSAGE_A_TO_ADDRESS_IN_B", 0, false,
            AddMinutesToTimestamp = 0x0406, "ADD_MINUTES_TO_TIMESTAMP", 2, true,
        }
    };
}

#[macro_export]
macro_rules! define_functions {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $code:expr, $label:literal, $params:expr, $returns:expr
        ),* $(,)?
    ) => {
        #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
        #[repr(u16)]
        pub enum FunctionCode {
            $(
                $(#[$doc])*
                $name = $code,
            )*
        }

        impl TryFrom<u16> for FunctionCode {
            type Error = ATError;

            fn try_from(value: u16) -> Result<Self, Self::Error> {
                match value {
                    $( $code => Ok(FunctionCode::$name), )*
                    _ => Err(ATError::IllegalFunctionCode {
                        code: value,
                        reason: "unknown function".into(),
                    }),
                }
            }
        }

        impl FunctionCode {
            pub const ALL: &'static [FunctionCode] = &[ $( FunctionCode::$name, )* ];

            pub const fn value(self) -> u16 {
                self as u16
            }

            pub const fn name(self) -> &'static str {
                match self {
                    $( FunctionCode::$name => $label, )*
                }
            }

            pub const fn param_count(self) -> u8 {
                match self {
                    $( FunctionCode::$name => $params, )*
                }
            }

            pub const fn returns_value(self) -> bool {
                match self {
                    $( FunctionCode::$name => $returns, )*
                }
            }
        }
    };
}

for_each_function!(define_functions);

impl FunctionCode {
    /// Fails unless `opcode` passes exactly this function's parameters and
    /// has a destination exactly when the function returns a value.
    pub fn check_signature(self, opcode: OpCode) -> Result<(), ATError> {
        let expected = (self.param_count(), self.returns_value());
        match opcode.function_signature() {
            Some(actual) if actual == expected => Ok(()),
            _ => Err(ATError::IllegalFunctionCode {
                code: self.value(),
                reason: format!(
                    "{} takes {} parameter(s){} and cannot be called by {}",
                    self.name(),
                    expected.0,
                    if expected.1 { " and returns a value" } else { "" },
                    opcode.mnemonic()
                ),
            }),
        }
    }
}

/// A decoded function-code operand.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Function {
    Known(FunctionCode),
    /// Host-defined code in [`PLATFORM_FUNCTIONS`].
    Platform(u16),
}

impl Function {
    /// Resolves a raw code; anything neither known nor platform-specific is illegal.
    pub fn from_code(code: u16) -> Result<Self, ATError> {
        if PLATFORM_FUNCTIONS.contains(&code) {
            return Ok(Function::Platform(code));
        }
        FunctionCode::try_from(code).map(Function::Known)
    }

    pub const fn code(self) -> u16 {
        match self {
            Function::Known(known) => known.value(),
            Function::Platform(raw) => raw,
        }
    }
}

impl From<FunctionCode> for Function {
    fn from(code: FunctionCode) -> Self {
        Function::Known(code)
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Function::Known(code) => write!(f, "\"{}\"{{{:04x}}}", code.name(), code.value()),
            Function::Platform(raw) => write!(f, "API-FN({:04x})", raw),
        }
    }
}
