//! State bytes and creation bytes.
//!
//! State bytes carry everything mutable about a machine and its header; code
//! is stored by the host separately and supplied again on load. See
//! [`Machine::to_bytes`] for the field order.

use super::registers::Register;
use super::stack::BoundedStack;
use super::{pad, Flags, Machine};
use crate::types::encoding::{read_bytes, Decode, Encode};
use crate::virtual_machine::errors::ATError;
use crate::virtual_machine::header::{Header, ADDRESS_SIZE, VALUE_SIZE};
use crate::virtual_machine::host::Host;

const FLAG_SLEEPING: u32 = 1 << 0;
const FLAG_STOPPED: u32 = 1 << 1;
const FLAG_FINISHED: u32 = 1 << 2;
const FLAG_FROZEN: u32 = 1 << 3;
const FLAG_HAD_FATAL_ERROR: u32 = 1 << 4;
const FLAG_FIRST_OP_AFTER_SLEEPING: u32 = 1 << 5;
const FLAG_HAS_ON_ERROR_ADDRESS: u32 = 1 << 6;
const FLAG_HAS_SLEEP_UNTIL_HEIGHT: u32 = 1 << 7;
const FLAG_HAS_FROZEN_BALANCE: u32 = 1 << 8;
const KNOWN_FLAGS: u32 = (1 << 9) - 1;

impl Flags {
    fn bits(self) -> u32 {
        [
            (self.sleeping, FLAG_SLEEPING),
            (self.stopped, FLAG_STOPPED),
            (self.finished, FLAG_FINISHED),
            (self.frozen, FLAG_FROZEN),
            (self.had_fatal_error, FLAG_HAD_FATAL_ERROR),
            (self.first_op_after_sleeping, FLAG_FIRST_OP_AFTER_SLEEPING),
        ]
        .into_iter()
        .filter(|(set, _)| *set)
        .fold(0, |bits, (_, bit)| bits | bit)
    }

    fn from_bits(bits: u32) -> Self {
        Self {
            sleeping: bits & FLAG_SLEEPING != 0,
            stopped: bits & FLAG_STOPPED != 0,
            finished: bits & FLAG_FINISHED != 0,
            frozen: bits & FLAG_FROZEN != 0,
            had_fatal_error: bits & FLAG_HAD_FATAL_ERROR != 0,
            first_op_after_sleeping: bits & FLAG_FIRST_OP_AFTER_SLEEPING != 0,
        }
    }
}

/// Writes a u32 byte length followed by the entries.
fn encode_stack<T: Encode + Copy>(stack: &BoundedStack<T>, entry_size: usize, out: &mut Vec<u8>) {
    ((stack.len() * entry_size) as u32).encode(out);
    for entry in stack.entries() {
        entry.encode(out);
    }
}

fn decode_stack<T: Decode + Copy>(
    input: &mut &[u8],
    name: &'static str,
    capacity: usize,
    entry_size: usize,
) -> Result<BoundedStack<T>, ATError> {
    let byte_len = u32::decode(input)? as usize;
    if byte_len % entry_size != 0 {
        return Err(ATError::MalformedState(format!(
            "{name} stack length {byte_len} is not a multiple of {entry_size}"
        )));
    }
    let count = byte_len / entry_size;
    if count > capacity {
        return Err(ATError::MalformedState(format!(
            "{name} stack holds {count} entries but capacity is {capacity}"
        )));
    }
    let entries = (0..count)
        .map(|_| T::decode(input))
        .collect::<Result<Vec<_>, _>>()?;
    BoundedStack::from_entries(name, capacity, entries)
}

impl Machine {
    /// Serializes the machine state.
    ///
    /// Layout, big-endian:
    /// header, data segment, call stack (u32 byte length + u32 entries),
    /// user stack (u32 byte length + u64 entries), A, B, pc, on-stop address,
    /// previous balance, current balance, flags (u32), then the optional
    /// on-error address (u32), sleep-until height (u32) and frozen balance
    /// (u64), each present only when its flag bit is set.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.header.to_bytes();
        out.extend_from_slice(&self.data);
        encode_stack(&self.call_stack, ADDRESS_SIZE, &mut out);
        encode_stack(&self.user_stack, VALUE_SIZE, &mut out);
        self.a.encode(&mut out);
        self.b.encode(&mut out);
        self.pc.encode(&mut out);
        self.on_stop_address.encode(&mut out);
        self.previous_balance.encode(&mut out);
        self.current_balance.encode(&mut out);

        let mut flags = self.flags.bits();
        if self.on_error_address.is_some() {
            flags |= FLAG_HAS_ON_ERROR_ADDRESS;
        }
        if self.sleep_until_height.is_some() {
            flags |= FLAG_HAS_SLEEP_UNTIL_HEIGHT;
        }
        if self.frozen_balance.is_some() {
            flags |= FLAG_HAS_FROZEN_BALANCE;
        }
        flags.encode(&mut out);

        if let Some(address) = self.on_error_address {
            address.encode(&mut out);
        }
        if let Some(height) = self.sleep_until_height {
            height.encode(&mut out);
        }
        if let Some(balance) = self.frozen_balance {
            balance.encode(&mut out);
        }
        out
    }

    /// Restores a machine from [`Machine::to_bytes`] output and its code.
    ///
    /// Code shorter than the declared capacity is zero-padded.
    pub fn from_bytes(state: &[u8], code: &[u8]) -> Result<Self, ATError> {
        let mut input = state;
        let header = Header::read(&mut input)?;
        if code.len() > header.code_len() {
            return Err(ATError::MalformedState(format!(
                "{} code bytes exceed capacity {}",
                code.len(),
                header.code_len()
            )));
        }

        let data = read_bytes(&mut input, header.data_len())?.to_vec();
        let mut machine = Self::blank(header, pad(code, header.code_len()), data);
        machine.call_stack = decode_stack(
            &mut input,
            "call",
            header.call_stack_pages as usize,
            ADDRESS_SIZE,
        )?;
        machine.user_stack = decode_stack(
            &mut input,
            "user",
            header.user_stack_pages as usize,
            VALUE_SIZE,
        )?;
        machine.a = Register::decode(&mut input)?;
        machine.b = Register::decode(&mut input)?;
        machine.pc = u32::decode(&mut input)?;
        machine.on_stop_address = u32::decode(&mut input)?;
        machine.previous_balance = u64::decode(&mut input)?;
        machine.current_balance = u64::decode(&mut input)?;

        let flags = u32::decode(&mut input)?;
        if flags & !KNOWN_FLAGS != 0 {
            return Err(ATError::MalformedState(format!(
                "unknown flag bits {:#x}",
                flags & !KNOWN_FLAGS
            )));
        }
        machine.flags = Flags::from_bits(flags);
        if flags & FLAG_HAS_ON_ERROR_ADDRESS != 0 {
            machine.on_error_address = Some(u32::decode(&mut input)?);
        }
        if flags & FLAG_HAS_SLEEP_UNTIL_HEIGHT != 0 {
            machine.sleep_until_height = Some(u32::decode(&mut input)?);
        }
        if flags & FLAG_HAS_FROZEN_BALANCE != 0 {
            machine.frozen_balance = Some(u64::decode(&mut input)?);
        }

        if !input.is_empty() {
            return Err(ATError::MalformedState(format!(
                "{} trailing bytes",
                input.len()
            )));
        }
        Ok(machine)
    }

    /// Builds creation bytes: a header sized to exactly fit `code` and
    /// `data`, then the code, then the data zero-padded to whole words.
    pub fn creation_bytes(
        code: &[u8],
        data: &[u8],
        call_stack_pages: u16,
        user_stack_pages: u16,
        min_activation_amount: u64,
    ) -> Result<Vec<u8>, ATError> {
        let code_pages = u16::try_from(code.len())
            .map_err(|_| ATError::InvalidHeader(format!("{} code bytes is too many", code.len())))?;
        let data_pages = u16::try_from(data.len().div_ceil(VALUE_SIZE))
            .map_err(|_| ATError::InvalidHeader(format!("{} data bytes is too many", data.len())))?;
        let header = Header::new(
            code_pages,
            data_pages,
            call_stack_pages,
            user_stack_pages,
            min_activation_amount,
        );

        let mut out = header.to_bytes();
        out.extend_from_slice(code);
        out.extend_from_slice(&pad(data, header.data_len()));
        Ok(out)
    }

    /// Deploys a machine from [`Machine::creation_bytes`] output.
    pub fn from_creation_bytes<H: Host>(host: &H, bytes: &[u8]) -> Result<Self, ATError> {
        let mut input = bytes;
        let header = Header::read(&mut input)?;
        let code = read_bytes(&mut input, header.code_len())?;
        if input.len() > header.data_len() {
            return Err(ATError::MalformedState(format!(
                "{} data bytes exceed capacity {}",
                input.len(),
                header.data_len()
            )));
        }
        Self::new(host, header, code, input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_bits_round_trip() {
        let flags = Flags {
            sleeping: true,
            frozen: true,
            first_op_after_sleeping: true,
            ..Flags::default()
        };
        assert_eq!(flags.bits(), FLAG_SLEEPING | FLAG_FROZEN | FLAG_FIRST_OP_AFTER_SLEEPING);
        assert_eq!(Flags::from_bits(flags.bits()), flags);
    }

    #[test]
    fn flag_bits_fit_known_mask() {
        for bit in [
            FLAG_SLEEPING,
            FLAG_STOPPED,
            FLAG_FINISHED,
            FLAG_FROZEN,
            FLAG_HAD_FATAL_ERROR,
            FLAG_FIRST_OP_AFTER_SLEEPING,
            FLAG_HAS_ON_ERROR_ADDRESS,
            FLAG_HAS_SLEEP_UNTIL_HEIGHT,
            FLAG_HAS_FROZEN_BALANCE,
        ] {
            assert_eq!(bit & KNOWN_FLAGS, bit);
        }
    }
}
