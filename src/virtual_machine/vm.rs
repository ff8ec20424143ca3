//! The round-based execution engine.
//!
//! A [`Machine`] owns everything mutable about one deployed AT: its data
//! segment, registers, stacks, cursors, lifecycle flags and balances. The
//! host drives it one round per block through [`Machine::execute_round`] and
//! persists [`Machine::to_bytes`] between rounds.

pub mod metering;
pub mod registers;
pub mod stack;

mod functions;
mod serialization;


use crate::types::timestamp::Timestamp;
use crate::virtual_machine::errors::ATError;
use crate::virtual_machine::function::Function;
use crate::virtual_machine::header::{Header, VALUE_SIZE};
use crate::virtual_machine::host::Host;
use crate::virtual_machine::isa::OpCode;
use crate::virtual_machine::operand::{word_offset, CodeReader};
use crate::{debug, error, info, warn};
use metering::{Charge, RoundMeter};
use registers::Register;
use stack::BoundedStack;

/// Decodes the operands of one instruction, moves the program counter past
/// it, then hands the decoded operands to the matching `op_*` handler.
///
/// Data addresses arrive at handlers as validated byte offsets, branch
/// offsets as targets relative to the opcode, bounds-checked only when taken.
macro_rules! exec_at {
    // Entry point
    (
        machine = $machine:ident,
        host = $host:ident,
        reader = $reader:ident,
        opcode = $opcode:ident,
        { $( $variant:ident => $handler:ident $args:tt ),* $(,)? }
    ) => {{
        match $opcode {
            $(
                OpCode::$variant => exec_at!(@call $machine, $host, $reader, $handler, $args),
            )*
        }
    }};

    // Handler that talks to the host (semicolon separator)
    (@call $machine:ident, $host:ident, $reader:ident, $handler:ident,
        (host; $( $field:ident : $kind:ident ),* $(,)? )
    ) => {{
        $( let $field = exec_at!(@read $reader, $kind)?; )*
        $machine.pc = $reader.position() as u32;
        $machine.$handler($host, $( $field ),*)
    }};

    // Handler on machine state only
    (@call $machine:ident, $host:ident, $reader:ident, $handler:ident,
        ( $( $field:ident : $kind:ident ),* $(,)? )
    ) => {{
        $( let $field = exec_at!(@read $reader, $kind)?; )*
        $machine.pc = $reader.position() as u32;
        $machine.$handler($( $field ),*)
    }};

    (@read $reader:ident, Value) => { $reader.value() };
    (@read $reader:ident, Addr) => { $reader.data_address() };
    (@read $reader:ident, Code) => { $reader.code_address() };
    (@read $reader:ident, Offset) => { $reader.branch_offset().map(|(_, target)| target) };
    (@read $reader:ident, Func) => { $reader.function() };
}

/// Lifecycle booleans, persisted as bits of the state flags word.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Flags {
    pub sleeping: bool,
    pub stopped: bool,
    pub finished: bool,
    pub frozen: bool,
    pub had_fatal_error: bool,
    pub first_op_after_sleeping: bool,
}

/// Where a machine stands between rounds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    /// Runs from `pc` next round.
    Ready,
    /// Waiting for a block height, or for the next round if no height is set.
    Sleeping,
    /// Resumes at the on-stop address next round.
    Stopped,
    Finished { fatal: bool },
    /// Out of funds; runs again only once its balance rises above the frozen balance.
    Frozen,
}

#[derive(Clone, Debug)]
pub struct Machine {
    header: Header,
    code: Vec<u8>,
    data: Vec<u8>,
    call_stack: BoundedStack<u32>,
    user_stack: BoundedStack<u64>,
    a: Register,
    b: Register,
    pc: u32,
    on_stop_address: u32,
    on_error_address: Option<u32>,
    sleep_until_height: Option<u32>,
    flags: Flags,
    previous_balance: u64,
    current_balance: u64,
    frozen_balance: Option<u64>,

    // Round-local, never persisted.
    opcode_pc: u32,
    current_block_height: u32,
    steps: u64,
}

/// Compares code and persisted state; round-local counters are ignored.
impl PartialEq for Machine {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code && self.to_bytes() == other.to_bytes()
    }
}

impl Eq for Machine {}

impl Machine {
    /// Deploys a machine from a header and its initial code and data.
    ///
    /// Code and data are zero-padded to the header's capacities. A machine
    /// funded below the minimum activation amount starts frozen.
    pub fn new<H: Host>(host: &H, header: Header, code: &[u8], data: &[u8]) -> Result<Self, ATError> {
        header.validate()?;
        if code.len() > header.code_len() {
            return Err(ATError::InvalidHeader(format!(
                "{} code bytes exceed capacity {}",
                code.len(),
                header.code_len()
            )));
        }
        if data.len() > header.data_len() {
            return Err(ATError::InvalidHeader(format!(
                "{} data bytes exceed capacity {}",
                data.len(),
                header.data_len()
            )));
        }

        let mut machine = Self::blank(header, pad(code, header.code_len()), pad(data, header.data_len()));
        machine.current_block_height = host.current_block_height();
        machine.current_balance = host.current_balance();

        if machine.current_balance < header.min_activation_amount {
            warn!(
                "AT funded with {} below activation amount {}, starting frozen",
                machine.current_balance, header.min_activation_amount
            );
            machine.flags.frozen = true;
            machine.frozen_balance = Some(header.min_activation_amount.saturating_sub(1));
        }
        Ok(machine)
    }

    fn blank(header: Header, code: Vec<u8>, data: Vec<u8>) -> Self {
        Self {
            call_stack: BoundedStack::new("call", header.call_stack_pages as usize),
            user_stack: BoundedStack::new("user", header.user_stack_pages as usize),
            header,
            code,
            data,
            a: Register::ZERO,
            b: Register::ZERO,
            pc: 0,
            on_stop_address: 0,
            on_error_address: None,
            sleep_until_height: None,
            flags: Flags::default(),
            previous_balance: 0,
            current_balance: 0,
            frozen_balance: None,
            opcode_pc: 0,
            current_block_height: 0,
            steps: 0,
        }
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn code(&self) -> &[u8] {
        &self.code
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Reads the word at `index` of the data segment.
    pub fn data_word(&self, index: u64) -> Result<u64, ATError> {
        Ok(self.load(word_offset(index, self.data.len())?))
    }

    pub fn a(&self) -> Register {
        self.a
    }

    pub fn b(&self) -> Register {
        self.b
    }

    pub fn call_stack(&self) -> &[u32] {
        self.call_stack.entries()
    }

    pub fn user_stack(&self) -> &[u64] {
        self.user_stack.entries()
    }

    pub fn pc(&self) -> u32 {
        self.pc
    }

    pub fn on_stop_address(&self) -> u32 {
        self.on_stop_address
    }

    pub fn on_error_address(&self) -> Option<u32> {
        self.on_error_address
    }

    pub fn sleep_until_height(&self) -> Option<u32> {
        self.sleep_until_height
    }

    pub fn flags(&self) -> Flags {
        self.flags
    }

    pub fn previous_balance(&self) -> u64 {
        self.previous_balance
    }

    pub fn current_balance(&self) -> u64 {
        self.current_balance
    }

    pub fn frozen_balance(&self) -> Option<u64> {
        self.frozen_balance
    }

    /// Steps consumed by the last round.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn is_finished(&self) -> bool {
        self.flags.finished
    }

    pub fn had_fatal_error(&self) -> bool {
        self.flags.had_fatal_error
    }

    pub fn is_frozen(&self) -> bool {
        self.flags.frozen
    }

    pub fn is_sleeping(&self) -> bool {
        self.flags.sleeping
    }

    pub fn is_stopped(&self) -> bool {
        self.flags.stopped
    }

    pub fn status(&self) -> Status {
        if self.flags.finished {
            Status::Finished {
                fatal: self.flags.had_fatal_error,
            }
        } else if self.flags.frozen {
            Status::Frozen
        } else if self.flags.sleeping {
            Status::Sleeping
        } else if self.flags.stopped {
            Status::Stopped
        } else {
            Status::Ready
        }
    }

    /// Runs one round against `host`.
    ///
    /// Never fails: faults end up in the machine's flags and are reported
    /// through [`Host::on_fatal_error`].
    ///
    /// Step fees and payments are deducted from the machine's own balance
    /// during the round. The host must store [`Machine::current_balance`] as
    /// the machine's chain balance afterwards, otherwise the next round reads
    /// the old balance back and nothing spent is ever charged.
    pub fn execute_round<H: Host>(&mut self, host: &mut H) {
        self.steps = 0;
        if self.flags.finished {
            return;
        }

        self.current_block_height = host.current_block_height();
        self.previous_balance = self.current_balance;
        self.current_balance = host.current_balance();

        if self.flags.frozen {
            if self
                .frozen_balance
                .is_some_and(|frozen| self.current_balance <= frozen)
            {
                return;
            }
            info!(
                "AT thawed at height {} with balance {}",
                self.current_block_height, self.current_balance
            );
            self.flags.frozen = false;
            self.frozen_balance = None;
        }

        if self.flags.sleeping {
            if self
                .sleep_until_height
                .is_some_and(|height| self.current_block_height < height)
            {
                return;
            }
            self.flags.sleeping = false;
            self.sleep_until_height = None;
            self.flags.first_op_after_sleeping = true;
        }

        if self.flags.stopped {
            self.pc = self.on_stop_address;
            self.flags.stopped = false;
        }

        let mut meter = RoundMeter::new(host.max_steps_per_round(), host.fee_per_step());
        while self.is_running() {
            let Err(err) = self.step(host, &mut meter) else {
                continue;
            };
            match self.on_error_address {
                Some(handler) if err.is_recoverable() => {
                    debug!("{err}, continuing at [{handler:04x}]");
                    self.pc = handler;
                }
                _ => self.fail(host, err),
            }
        }
        self.steps = meter.steps();
    }

    fn is_running(&self) -> bool {
        let Flags {
            sleeping,
            stopped,
            finished,
            frozen,
            ..
        } = self.flags;
        !(sleeping || stopped || finished || frozen)
    }

    /// Fetches, meters and executes the instruction at `pc`.
    fn step<H: Host>(&mut self, host: &mut H, meter: &mut RoundMeter) -> Result<(), ATError> {
        let pc = self.pc;
        let byte = *self
            .code
            .get(pc as usize)
            .ok_or(ATError::DecodeExhaustion { pc, requested: 1 })?;
        let opcode =
            OpCode::try_from(byte).map_err(|_| ATError::InvalidOpCode { opcode: byte, pc })?;

        match meter.charge(host.opcode_steps(opcode), self.current_balance) {
            Charge::Paid { fee } => self.current_balance -= fee,
            Charge::RoundBudgetExhausted => {
                warn!(
                    "AT paused at [{pc:04x}] after {} steps this round",
                    meter.steps()
                );
                self.flags.sleeping = true;
                self.sleep_until_height = None;
                return Ok(());
            }
            Charge::InsufficientBalance => {
                warn!(
                    "AT frozen at [{pc:04x}] with balance {}",
                    self.current_balance
                );
                self.flags.frozen = true;
                self.frozen_balance = Some(self.current_balance);
                return Ok(());
            }
        }

        debug!("[{pc:04x}] {opcode}");
        self.opcode_pc = pc;
        let result = self.exec(opcode, host);
        self.flags.first_op_after_sleeping = false;
        result
    }

    fn exec<H: Host>(&mut self, opcode: OpCode, host: &mut H) -> Result<(), ATError> {
        let mut reader = CodeReader::new(&self.code, self.data.len(), self.pc as usize);
        exec_at! {
            machine = self,
            host = host,
            reader = reader,
            opcode = opcode,
            {
                Nop => op_nop(),
                // Data movement
                SetVal => op_set_val(dest: Addr, value: Value),
                SetDat => op_set_dat(dest: Addr, src: Addr),
                ClrDat => op_clr_dat(dest: Addr),
                SetInd => op_set_ind(dest: Addr, src: Addr),
                SetIdx => op_set_idx(dest: Addr, base: Addr, index: Addr),
                IndDat => op_ind_dat(dest: Addr, src: Addr),
                IdxDat => op_idx_dat(base: Addr, index: Addr, src: Addr),
                // Arithmetic and bitwise
                IncDat => op_inc_dat(dest: Addr),
                DecDat => op_dec_dat(dest: Addr),
                AddDat => op_add(dest: Addr, src: Addr),
                SubDat => op_sub(dest: Addr, src: Addr),
                MulDat => op_mul(dest: Addr, src: Addr),
                DivDat => op_div(dest: Addr, src: Addr),
                BorDat => op_bor(dest: Addr, src: Addr),
                AndDat => op_and(dest: Addr, src: Addr),
                XorDat => op_xor(dest: Addr, src: Addr),
                NotDat => op_not(dest: Addr),
                ModDat => op_mod(dest: Addr, src: Addr),
                ShlDat => op_shl(dest: Addr, src: Addr),
                ShrDat => op_shr(dest: Addr, src: Addr),
                AddVal => op_add_val(dest: Addr, value: Value),
                SubVal => op_sub_val(dest: Addr, value: Value),
                MulVal => op_mul_val(dest: Addr, value: Value),
                DivVal => op_div_val(dest: Addr, value: Value),
                ShlVal => op_shl_val(dest: Addr, value: Value),
                ShrVal => op_shr_val(dest: Addr, value: Value),
                // Stacks and control flow
                PshDat => op_psh_dat(src: Addr),
                PopDat => op_pop_dat(dest: Addr),
                JmpSub => op_jmp_sub(target: Code),
                RetSub => op_ret_sub(),
                JmpAdr => op_jmp_adr(target: Code),
                BzrDat => op_bzr(src: Addr, target: Offset),
                BnzDat => op_bnz(src: Addr, target: Offset),
                BgtDat => op_bgt(lhs: Addr, rhs: Addr, target: Offset),
                BltDat => op_blt(lhs: Addr, rhs: Addr, target: Offset),
                BgeDat => op_bge(lhs: Addr, rhs: Addr, target: Offset),
                BleDat => op_ble(lhs: Addr, rhs: Addr, target: Offset),
                BeqDat => op_beq(lhs: Addr, rhs: Addr, target: Offset),
                BneDat => op_bne(lhs: Addr, rhs: Addr, target: Offset),
                // Lifecycle
                SlpDat => op_slp_dat(src: Addr),
                FizDat => op_fiz_dat(host; src: Addr),
                StzDat => op_stz_dat(src: Addr),
                FinImd => op_fin_imd(host;),
                StpImd => op_stp_imd(),
                SlpImd => op_slp_imd(),
                ErrAdr => op_err_adr(target: Code),
                SlpVal => op_slp_val(value: Value),
                SetPcs => op_set_pcs(),
                // Function calls
                ExtFun => op_ext_fun(host; func: Func),
                ExtFunDat => op_ext_fun_dat(host; func: Func, arg1: Addr),
                ExtFunDat2 => op_ext_fun_dat_2(host; func: Func, arg1: Addr, arg2: Addr),
                ExtFunRet => op_ext_fun_ret(host; func: Func, dest: Addr),
                ExtFunRetDat => op_ext_fun_ret_dat(host; func: Func, dest: Addr, arg1: Addr),
                ExtFunRetDat2 => op_ext_fun_ret_dat_2(host; func: Func, dest: Addr, arg1: Addr, arg2: Addr),
                ExtFunVal => op_ext_fun_val(host; func: Func, value: Value),
            }
        }
    }

    // ----- data segment -----

    /// Reads the word at a validated byte offset.
    fn load(&self, offset: usize) -> u64 {
        let mut word = [0u8; VALUE_SIZE];
        word.copy_from_slice(&self.data[offset..offset + VALUE_SIZE]);
        u64::from_be_bytes(word)
    }

    fn store(&mut self, offset: usize, value: u64) {
        self.data[offset..offset + VALUE_SIZE].copy_from_slice(&value.to_be_bytes());
    }

    /// Follows the word index stored at `pointer`.
    fn deref(&self, pointer: usize) -> Result<usize, ATError> {
        word_offset(self.load(pointer), self.data.len())
    }

    /// Follows the word index stored at `base`, advanced by the word at `index`.
    fn deref_indexed(&self, base: usize, index: usize) -> Result<usize, ATError> {
        let base = self.load(base);
        let target = base
            .checked_add(self.load(index))
            .ok_or(ATError::InvalidAddress {
                segment: "data",
                address: base as i64,
            })?;
        word_offset(target, self.data.len())
    }

    fn update(&mut self, dest: usize, op: impl FnOnce(u64) -> u64) {
        let value = op(self.load(dest));
        self.store(dest, value);
    }

    fn try_update(
        &mut self,
        dest: usize,
        op: impl FnOnce(u64) -> Result<u64, ATError>,
    ) -> Result<(), ATError> {
        let value = op(self.load(dest))?;
        self.store(dest, value);
        Ok(())
    }

    // ----- lifecycle -----

    fn sleep(&mut self, height: Option<u32>) {
        self.flags.sleeping = true;
        self.sleep_until_height = height;
    }

    fn stop(&mut self) {
        self.flags.stopped = true;
        self.pc = self.on_stop_address;
    }

    fn finish<H: Host>(&mut self, host: &mut H) {
        info!(
            "AT finished, refunding {} to its creator",
            self.current_balance
        );
        host.on_finished(self.current_balance);
        self.current_balance = 0;
        self.flags.finished = true;
    }

    fn fail<H: Host>(&mut self, host: &mut H, err: ATError) {
        error!("AT failed at [{:04x}]: {err}", self.opcode_pc);
        self.flags.finished = true;
        self.flags.had_fatal_error = true;
        host.on_fatal_error(&err);
    }

    fn branch_if(&mut self, condition: bool, target: i64) -> Result<(), ATError> {
        if condition {
            self.pc = u32::try_from(target)
                .ok()
                .filter(|&pc| (pc as usize) < self.code.len())
                .ok_or(ATError::InvalidAddress {
                    segment: "branch",
                    address: target,
                })?;
        }
        Ok(())
    }

    fn compare(&self, lhs: usize, rhs: usize) -> (i64, i64) {
        (self.load(lhs) as i64, self.load(rhs) as i64)
    }

    // ----- handlers -----

    fn op_nop(&mut self) -> Result<(), ATError> {
        Ok(())
    }

    fn op_set_val(&mut self, dest: usize, value: u64) -> Result<(), ATError> {
        self.store(dest, value);
        Ok(())
    }

    fn op_set_dat(&mut self, dest: usize, src: usize) -> Result<(), ATError> {
        self.store(dest, self.load(src));
        Ok(())
    }

    fn op_clr_dat(&mut self, dest: usize) -> Result<(), ATError> {
        self.store(dest, 0);
        Ok(())
    }

    fn op_set_ind(&mut self, dest: usize, src: usize) -> Result<(), ATError> {
        let source = self.deref(src)?;
        self.store(dest, self.load(source));
        Ok(())
    }

    fn op_set_idx(&mut self, dest: usize, base: usize, index: usize) -> Result<(), ATError> {
        let source = self.deref_indexed(base, index)?;
        self.store(dest, self.load(source));
        Ok(())
    }

    fn op_ind_dat(&mut self, dest: usize, src: usize) -> Result<(), ATError> {
        let target = self.deref(dest)?;
        self.store(target, self.load(src));
        Ok(())
    }

    fn op_idx_dat(&mut self, base: usize, index: usize, src: usize) -> Result<(), ATError> {
        let target = self.deref_indexed(base, index)?;
        self.store(target, self.load(src));
        Ok(())
    }

    fn op_inc_dat(&mut self, dest: usize) -> Result<(), ATError> {
        self.update(dest, |value| value.wrapping_add(1));
        Ok(())
    }

    fn op_dec_dat(&mut self, dest: usize) -> Result<(), ATError> {
        self.update(dest, |value| value.wrapping_sub(1));
        Ok(())
    }

    fn op_add(&mut self, dest: usize, src: usize) -> Result<(), ATError> {
        self.op_add_val(dest, self.load(src))
    }

    fn op_sub(&mut self, dest: usize, src: usize) -> Result<(), ATError> {
        self.op_sub_val(dest, self.load(src))
    }

    fn op_mul(&mut self, dest: usize, src: usize) -> Result<(), ATError> {
        self.op_mul_val(dest, self.load(src))
    }

    fn op_div(&mut self, dest: usize, src: usize) -> Result<(), ATError> {
        self.op_div_val(dest, self.load(src))
    }

    fn op_mod(&mut self, dest: usize, src: usize) -> Result<(), ATError> {
        let divisor = self.load(src) as i64;
        self.try_update(dest, |value| {
            if divisor == 0 {
                return Err(ATError::RuntimeFault("modulo by zero"));
            }
            Ok((value as i64).wrapping_rem(divisor) as u64)
        })
    }

    fn op_bor(&mut self, dest: usize, src: usize) -> Result<(), ATError> {
        let operand = self.load(src);
        self.update(dest, |value| value | operand);
        Ok(())
    }

    fn op_and(&mut self, dest: usize, src: usize) -> Result<(), ATError> {
        let operand = self.load(src);
        self.update(dest, |value| value & operand);
        Ok(())
    }

    fn op_xor(&mut self, dest: usize, src: usize) -> Result<(), ATError> {
        let operand = self.load(src);
        self.update(dest, |value| value ^ operand);
        Ok(())
    }

    fn op_not(&mut self, dest: usize) -> Result<(), ATError> {
        self.update(dest, |value| !value);
        Ok(())
    }

    fn op_shl(&mut self, dest: usize, src: usize) -> Result<(), ATError> {
        self.op_shl_val(dest, self.load(src))
    }

    fn op_shr(&mut self, dest: usize, src: usize) -> Result<(), ATError> {
        self.op_shr_val(dest, self.load(src))
    }

    fn op_add_val(&mut self, dest: usize, operand: u64) -> Result<(), ATError> {
        self.update(dest, |value| value.wrapping_add(operand));
        Ok(())
    }

    fn op_sub_val(&mut self, dest: usize, operand: u64) -> Result<(), ATError> {
        self.update(dest, |value| value.wrapping_sub(operand));
        Ok(())
    }

    fn op_mul_val(&mut self, dest: usize, operand: u64) -> Result<(), ATError> {
        self.update(dest, |value| value.wrapping_mul(operand));
        Ok(())
    }

    fn op_div_val(&mut self, dest: usize, operand: u64) -> Result<(), ATError> {
        let divisor = operand as i64;
        self.try_update(dest, |value| {
            if divisor == 0 {
                return Err(ATError::RuntimeFault("division by zero"));
            }
            Ok((value as i64).wrapping_div(divisor) as u64)
        })
    }

    fn op_shl_val(&mut self, dest: usize, shift: u64) -> Result<(), ATError> {
        self.update(dest, |value| shift_left(value, shift));
        Ok(())
    }

    fn op_shr_val(&mut self, dest: usize, shift: u64) -> Result<(), ATError> {
        self.update(dest, |value| shift_right(value, shift));
        Ok(())
    }

    fn op_psh_dat(&mut self, src: usize) -> Result<(), ATError> {
        self.user_stack.push(self.load(src))
    }

    fn op_pop_dat(&mut self, dest: usize) -> Result<(), ATError> {
        let value = self.user_stack.pop()?;
        self.store(dest, value);
        Ok(())
    }

    fn op_jmp_sub(&mut self, target: u32) -> Result<(), ATError> {
        self.call_stack.push(self.pc)?;
        self.pc = target;
        Ok(())
    }

    fn op_ret_sub(&mut self) -> Result<(), ATError> {
        let address = self.call_stack.pop()?;
        if address as usize >= self.code.len() {
            return Err(ATError::InvalidAddress {
                segment: "code",
                address: i64::from(address),
            });
        }
        self.pc = address;
        Ok(())
    }

    fn op_jmp_adr(&mut self, target: u32) -> Result<(), ATError> {
        self.pc = target;
        Ok(())
    }

    fn op_bzr(&mut self, src: usize, target: i64) -> Result<(), ATError> {
        self.branch_if(self.load(src) == 0, target)
    }

    fn op_bnz(&mut self, src: usize, target: i64) -> Result<(), ATError> {
        self.branch_if(self.load(src) != 0, target)
    }

    fn op_bgt(&mut self, lhs: usize, rhs: usize, target: i64) -> Result<(), ATError> {
        let (lhs, rhs) = self.compare(lhs, rhs);
        self.branch_if(lhs > rhs, target)
    }

    fn op_blt(&mut self, lhs: usize, rhs: usize, target: i64) -> Result<(), ATError> {
        let (lhs, rhs) = self.compare(lhs, rhs);
        self.branch_if(lhs < rhs, target)
    }

    fn op_bge(&mut self, lhs: usize, rhs: usize, target: i64) -> Result<(), ATError> {
        let (lhs, rhs) = self.compare(lhs, rhs);
        self.branch_if(lhs >= rhs, target)
    }

    fn op_ble(&mut self, lhs: usize, rhs: usize, target: i64) -> Result<(), ATError> {
        let (lhs, rhs) = self.compare(lhs, rhs);
        self.branch_if(lhs <= rhs, target)
    }

    fn op_beq(&mut self, lhs: usize, rhs: usize, target: i64) -> Result<(), ATError> {
        self.branch_if(self.load(lhs) == self.load(rhs), target)
    }

    fn op_bne(&mut self, lhs: usize, rhs: usize, target: i64) -> Result<(), ATError> {
        self.branch_if(self.load(lhs) != self.load(rhs), target)
    }

    fn op_slp_dat(&mut self, src: usize) -> Result<(), ATError> {
        let height = u32::try_from(self.load(src)).unwrap_or(u32::MAX);
        self.sleep(Some(height));
        Ok(())
    }

    fn op_fiz_dat<H: Host>(&mut self, host: &mut H, src: usize) -> Result<(), ATError> {
        if self.load(src) == 0 {
            self.finish(host);
        }
        Ok(())
    }

    fn op_stz_dat(&mut self, src: usize) -> Result<(), ATError> {
        if self.load(src) == 0 {
            self.stop();
        }
        Ok(())
    }

    fn op_fin_imd<H: Host>(&mut self, host: &mut H) -> Result<(), ATError> {
        self.finish(host);
        Ok(())
    }

    fn op_stp_imd(&mut self) -> Result<(), ATError> {
        self.stop();
        Ok(())
    }

    fn op_slp_imd(&mut self) -> Result<(), ATError> {
        self.sleep(Some(self.current_block_height.saturating_add(1)));
        Ok(())
    }

    fn op_err_adr(&mut self, target: u32) -> Result<(), ATError> {
        self.on_error_address = Some(target);
        Ok(())
    }

    fn op_slp_val(&mut self, blocks: u64) -> Result<(), ATError> {
        let blocks = u32::try_from(blocks).unwrap_or(u32::MAX);
        self.sleep(Some(self.current_block_height.saturating_add(blocks)));
        Ok(())
    }

    fn op_set_pcs(&mut self) -> Result<(), ATError> {
        self.on_stop_address = self.pc;
        Ok(())
    }

    fn op_ext_fun<H: Host>(&mut self, host: &mut H, func: Function) -> Result<(), ATError> {
        self.call_function(host, OpCode::ExtFun, func, &[], None)
    }

    fn op_ext_fun_dat<H: Host>(&mut self, host: &mut H, func: Function, arg1: usize) -> Result<(), ATError> {
        let params = [self.load(arg1)];
        self.call_function(host, OpCode::ExtFunDat, func, &params, None)
    }

    fn op_ext_fun_dat_2<H: Host>(
        &mut self,
        host: &mut H,
        func: Function,
        arg1: usize,
        arg2: usize,
    ) -> Result<(), ATError> {
        let params = [self.load(arg1), self.load(arg2)];
        self.call_function(host, OpCode::ExtFunDat2, func, &params, None)
    }

    fn op_ext_fun_ret<H: Host>(&mut self, host: &mut H, func: Function, dest: usize) -> Result<(), ATError> {
        self.call_function(host, OpCode::ExtFunRet, func, &[], Some(dest))
    }

    fn op_ext_fun_ret_dat<H: Host>(
        &mut self,
        host: &mut H,
        func: Function,
        dest: usize,
        arg1: usize,
    ) -> Result<(), ATError> {
        let params = [self.load(arg1)];
        self.call_function(host, OpCode::ExtFunRetDat, func, &params, Some(dest))
    }

    fn op_ext_fun_ret_dat_2<H: Host>(
        &mut self,
        host: &mut H,
        func: Function,
        dest: usize,
        arg1: usize,
        arg2: usize,
    ) -> Result<(), ATError> {
        let params = [self.load(arg1), self.load(arg2)];
        self.call_function(host, OpCode::ExtFunRetDat2, func, &params, Some(dest))
    }

    fn op_ext_fun_val<H: Host>(&mut self, host: &mut H, func: Function, value: u64) -> Result<(), ATError> {
        self.call_function(host, OpCode::ExtFunVal, func, &[value], None)
    }

    /// Timestamp of the first transaction in the block at `height`.
    fn block_timestamp(height: u32) -> u64 {
        Timestamp::new(height, 0).to_u64()
    }
}

fn pad(bytes: &[u8], capacity: usize) -> Vec<u8> {
    let mut padded = bytes.to_vec();
    padded.resize(capacity.max(bytes.len()), 0);
    padded
}

fn shift_left(value: u64, shift: u64) -> u64 {
    u32::try_from(shift)
        .ok()
        .and_then(|shift| value.checked_shl(shift))
        .unwrap_or(0)
}

fn shift_right(value: u64, shift: u64) -> u64 {
    u32::try_from(shift)
        .ok()
        .and_then(|shift| value.checked_shr(shift))
        .unwrap_or(0)
}
