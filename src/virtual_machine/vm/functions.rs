use super::registers::Register;
use super::Machine;
use crate::info;
use crate::types::timestamp::Timestamp;
use crate::virtual_machine::errors::ATError;
use crate::virtual_machine::function::{Function, FunctionCode};
use crate::virtual_machine::header::{REGISTER_SIZE, VALUE_SIZE};
use crate::virtual_machine::host::{Host, PlatformCall};
use crate::virtual_machine::isa::OpCode;
use crate::virtual_machine::operand::word_offset;
use std::cmp::Ordering;
use std::ops::Range;

/// Bytes of B a digest of `len` bytes occupies.
fn digest_span(len: usize) -> Range<usize> {
    match len {
        20 => 4..24,
        _ => 0..len,
    }
}

fn digest_register(digest: &[u8]) -> Register {
    let mut bytes = [0u8; REGISTER_SIZE];
    bytes[digest_span(digest.len())].copy_from_slice(digest);
    Register::from_be_bytes(&bytes)
}

fn ordering_value(ordering: Ordering) -> u64 {
    ordering as i8 as i64 as u64
}

impl Machine {
    /// Runs `function` for `opcode` with already-loaded parameters, storing
    /// any return value at the byte offset `dest`.
    pub(super) fn call_function<H: Host>(
        &mut self,
        host: &mut H,
        opcode: OpCode,
        function: Function,
        params: &[u64],
        dest: Option<usize>,
    ) -> Result<(), ATError> {
        let result = match function {
            Function::Known(code) => {
                code.check_signature(opcode)?;
                self.call_known(host, code, params)?
            }
            Function::Platform(code) => self.call_platform(host, code, params, dest.is_some())?,
        };
        if let (Some(dest), Some(value)) = (dest, result) {
            self.store(dest, value);
        }
        Ok(())
    }

    fn call_platform<H: Host>(
        &mut self,
        host: &mut H,
        code: u16,
        params: &[u64],
        returns_value: bool,
    ) -> Result<Option<u64>, ATError> {
        let param_count = params.len() as u8;
        host.platform_pre_execute_check(code, param_count, returns_value)?;

        let mut call = PlatformCall {
            params: [0; 2],
            param_count,
            returns_value,
            a: self.a,
            b: self.b,
            return_value: 0,
        };
        call.params[..params.len()].copy_from_slice(params);
        host.platform_execute(code, &mut call)?;

        self.a = call.a;
        self.b = call.b;
        Ok(returns_value.then_some(call.return_value))
    }

    fn call_known<H: Host>(
        &mut self,
        host: &mut H,
        code: FunctionCode,
        params: &[u64],
    ) -> Result<Option<u64>, ATError> {
        use FunctionCode::*;

        let param = |index: usize| params.get(index).copied().unwrap_or(0);
        let flag = |condition: bool| Some(u64::from(condition));

        let result = match code {
            Echo => {
                info!("ECHO: {:#018x}", param(0));
                None
            }

            GetA1 | GetA2 | GetA3 | GetA4 => Some(self.a.word(code.value() as usize - GetA1.value() as usize)),
            GetB1 | GetB2 | GetB3 | GetB4 => Some(self.b.word(code.value() as usize - GetB1.value() as usize)),
            GetAInd => {
                self.store_register(param(0), self.a)?;
                None
            }
            GetBInd => {
                self.store_register(param(0), self.b)?;
                None
            }

            SetA1 | SetA2 | SetA3 | SetA4 => {
                self.a.set_word(code.value() as usize - SetA1.value() as usize, param(0));
                None
            }
            SetA1A2 => {
                self.a.set_word(0, param(0));
                self.a.set_word(1, param(1));
                None
            }
            SetA3A4 => {
                self.a.set_word(2, param(0));
                self.a.set_word(3, param(1));
                None
            }
            SetB1 | SetB2 | SetB3 | SetB4 => {
                self.b.set_word(code.value() as usize - SetB1.value() as usize, param(0));
                None
            }
            SetB1B2 => {
                self.b.set_word(0, param(0));
                self.b.set_word(1, param(1));
                None
            }
            SetB3B4 => {
                self.b.set_word(2, param(0));
                self.b.set_word(3, param(1));
                None
            }
            SetAInd => {
                self.a = self.load_register(param(0))?;
                None
            }
            SetBInd => {
                self.b = self.load_register(param(0))?;
                None
            }

            ClearA => {
                self.a = Register::ZERO;
                None
            }
            ClearB => {
                self.b = Register::ZERO;
                None
            }
            ClearAAndB => {
                self.a = Register::ZERO;
                self.b = Register::ZERO;
                None
            }
            CopyAFromB => {
                self.a = self.b;
                None
            }
            CopyBFromA => {
                self.b = self.a;
                None
            }
            CheckAIsZero => flag(self.a.is_zero()),
            CheckBIsZero => flag(self.b.is_zero()),
            CheckAEqualsB => flag(self.a == self.b),
            SwapAAndB => {
                std::mem::swap(&mut self.a, &mut self.b);
                None
            }
            OrAWithB => {
                self.a = self.a.zip_with(self.b, |a, b| a | b);
                None
            }
            OrBWithA => {
                self.b = self.b.zip_with(self.a, |b, a| b | a);
                None
            }
            AndAWithB => {
                self.a = self.a.zip_with(self.b, |a, b| a & b);
                None
            }
            AndBWithA => {
                self.b = self.b.zip_with(self.a, |b, a| b & a);
                None
            }
            XorAWithB => {
                self.a = self.a.zip_with(self.b, |a, b| a ^ b);
                None
            }
            XorBWithA => {
                self.b = self.b.zip_with(self.a, |b, a| b ^ a);
                None
            }
            UnsignedCompareAWithB => Some(ordering_value(self.a.0.cmp(&self.b.0))),
            SignedCompareAWithB => {
                let signed = |r: Register| (r.0[0] as i64, r.0[1], r.0[2], r.0[3]);
                Some(ordering_value(signed(self.a).cmp(&signed(self.b))))
            }

            Md5IntoB => {
                let digest = host.md5(self.data_range(param(0), param(1))?);
                self.b = digest_register(&digest);
                None
            }
            CheckMd5WithB => {
                let digest = host.md5(self.data_range(param(0), param(1))?);
                flag(self.b_holds_digest(&digest))
            }
            Rmd160IntoB => {
                let digest = host.ripemd160(self.data_range(param(0), param(1))?);
                self.b = digest_register(&digest);
                None
            }
            CheckRmd160WithB => {
                let digest = host.ripemd160(self.data_range(param(0), param(1))?);
                flag(self.b_holds_digest(&digest))
            }
            Sha256IntoB => {
                let digest = host.sha256(self.data_range(param(0), param(1))?);
                self.b = digest_register(&digest);
                None
            }
            CheckSha256WithB => {
                let digest = host.sha256(self.data_range(param(0), param(1))?);
                flag(self.b_holds_digest(&digest))
            }
            Hash160IntoB => {
                let digest = host.hash160(self.data_range(param(0), param(1))?);
                self.b = digest_register(&digest);
                None
            }
            CheckHash160WithB => {
                let digest = host.hash160(self.data_range(param(0), param(1))?);
                flag(self.b_holds_digest(&digest))
            }

            GetBlockTimestamp => Some(Self::block_timestamp(self.current_block_height)),
            GetCreationTimestamp => Some(Self::block_timestamp(host.creation_block_height())),
            GetPreviousBlockTimestamp => Some(Self::block_timestamp(host.previous_block_height())),
            PutPreviousBlockHashIntoA => {
                self.a = host.previous_block_hash();
                None
            }
            PutTxAfterTimestampIntoA => {
                self.a = host
                    .transaction_after(Timestamp::from(param(0)))
                    .unwrap_or_default();
                None
            }
            GetTypeFromTxInA => Some(host.transaction_type(&self.a)),
            GetAmountFromTxInA => Some(host.transaction_amount(&self.a)),
            GetTimestampFromTxInA => Some(host.transaction_timestamp(&self.a)),
            GenerateRandomUsingTxInA => {
                if !self.flags.first_op_after_sleeping {
                    // Wait a block so the entropy source cannot be known yet.
                    self.sleep(None);
                    self.pc = self.opcode_pc;
                    return Ok(None);
                }
                Some(host.random_from_transaction(&self.a))
            }
            PutMessageFromTxInAIntoB => {
                if let Some(message) = host.transaction_message(&self.a) {
                    self.b = message;
                }
                None
            }
            PutAddressFromTxInAIntoB => {
                self.b = host.transaction_sender(&self.a);
                None
            }
            PutCreatorIntoB => {
                self.b = host.creator_address();
                None
            }

            GetCurrentBalance => Some(self.current_balance),
            GetPreviousBalance => Some(self.previous_balance),
            PayToAddressInB => {
                self.pay(host, param(0).min(self.current_balance));
                None
            }
            PayAllToAddressInB => {
                self.pay(host, self.current_balance);
                None
            }
            PayPreviousToAddressInB => {
                self.pay(host, self.previous_balance.min(self.current_balance));
                None
            }
            MessageAToAddressInB => {
                host.message_to_address(&self.a, &self.b);
                None
            }
            AddMinutesToTimestamp => Some(
                host.add_minutes_to_timestamp(Timestamp::from(param(0)), param(1))
                    .to_u64(),
            ),
        };
        Ok(result)
    }

    fn pay<H: Host>(&mut self, host: &mut H, amount: u64) {
        self.current_balance -= amount;
        host.pay_to_address(amount, &self.b);
    }

    /// Bytes `[start_word * 8, start_word * 8 + len)` of the data segment.
    fn data_range(&self, start_word: u64, len: u64) -> Result<&[u8], ATError> {
        let start = usize::try_from(start_word)
            .ok()
            .and_then(|word| word.checked_mul(VALUE_SIZE));
        let end = start.zip(usize::try_from(len).ok()).and_then(|(start, len)| start.checked_add(len));
        match (start, end) {
            (Some(start), Some(end)) if end <= self.data.len() => Ok(&self.data[start..end]),
            _ => Err(ATError::InvalidAddress {
                segment: "data",
                address: start_word as i64,
            }),
        }
    }

    fn load_register(&self, start_word: u64) -> Result<Register, ATError> {
        let mut register = Register::ZERO;
        for (i, index) in (start_word..).take(4).enumerate() {
            register.set_word(i, self.load(word_offset(index, self.data.len())?));
        }
        Ok(register)
    }

    fn store_register(&mut self, start_word: u64, register: Register) -> Result<(), ATError> {
        // Validate the whole span before writing any word.
        let mut offsets = [0usize; 4];
        for (slot, index) in offsets.iter_mut().zip(start_word..) {
            *slot = word_offset(index, self.data.len())?;
        }
        for (i, offset) in offsets.into_iter().enumerate() {
            self.store(offset, register.word(i));
        }
        Ok(())
    }

    fn b_holds_digest(&self, digest: &[u8]) -> bool {
        self.b.to_be_bytes()[digest_span(digest.len())] == *digest
    }
}
