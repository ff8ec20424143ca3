//! The capability interface a blockchain node provides to its machines.
//!
//! The engine never reaches into host storage. Everything it needs about the
//! chain (limits, heights, transactions, balances, digests) and everything it
//! does to the chain (payments, messages, refunds) crosses this trait as plain
//! values. Registers are passed by value; anything the host wants to place in
//! A or B is returned and copied in by the engine.

use crate::types::timestamp::Timestamp;
use crate::virtual_machine::errors::ATError;
use crate::virtual_machine::isa::OpCode;
use crate::virtual_machine::vm::registers::Register;

/// Transaction kinds visible to machines.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
#[repr(u64)]
pub enum TransactionType {
    Payment = 0,
    Message = 1,
}

impl TransactionType {
    pub const fn value(self) -> u64 {
        self as u64
    }
}

/// Arguments and register snapshot for a platform-specific function.
///
/// The host may rewrite `a`, `b` and `return_value`; the engine copies them
/// back after the call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlatformCall {
    pub params: [u64; 2],
    pub param_count: u8,
    pub returns_value: bool,
    pub a: Register,
    pub b: Register,
    pub return_value: u64,
}

pub trait Host {
    // ----- metering -----

    /// Step budget for one round.
    fn max_steps_per_round(&self) -> u64;

    /// Steps charged for one opcode.
    fn opcode_steps(&self, opcode: OpCode) -> u64 {
        opcode.base_steps()
    }

    /// Balance deducted per step.
    fn fee_per_step(&self) -> u64;

    // ----- chain queries -----

    fn current_block_height(&self) -> u32;

    fn creation_block_height(&self) -> u32;

    fn previous_block_height(&self) -> u32 {
        self.current_block_height().saturating_sub(1)
    }

    fn previous_block_hash(&self) -> Register;

    /// First transaction to this machine strictly after `timestamp`, as an
    /// opaque identifier to be held in A. `None` zero-fills A.
    fn transaction_after(&self, timestamp: Timestamp) -> Option<Register>;

    fn transaction_type(&self, tx: &Register) -> u64;

    /// Amount of a payment; zero for other transaction types.
    fn transaction_amount(&self, tx: &Register) -> u64;

    fn transaction_timestamp(&self, tx: &Register) -> u64;

    /// Entropy derived from `tx` and a block that did not exist when the
    /// machine asked. Only called on the first step after the machine wakes.
    fn random_from_transaction(&self, tx: &Register) -> u64;

    /// Message payload of `tx`; `None` leaves B unchanged.
    fn transaction_message(&self, tx: &Register) -> Option<Register>;

    fn transaction_sender(&self, tx: &Register) -> Register;

    fn creator_address(&self) -> Register;

    /// Balance the chain holds for this machine, read at the start of each round.
    ///
    /// This must reflect [`Machine::current_balance`] as left by the previous
    /// round, after fees and payments.
    ///
    /// [`Machine::current_balance`]: crate::virtual_machine::vm::Machine::current_balance
    fn current_balance(&self) -> u64;

    /// Adds `minutes` of chain time to a packed timestamp.
    fn add_minutes_to_timestamp(&self, timestamp: Timestamp, minutes: u64) -> Timestamp;

    // ----- chain mutations -----

    /// Credits `amount` to `address`.
    ///
    /// The machine has already capped `amount` and deducted it from its own
    /// balance, so the host only credits the recipient. The debit reaches the
    /// chain when the host writes back the balance after the round.
    fn pay_to_address(&mut self, amount: u64, address: &Register);

    fn message_to_address(&mut self, message: &Register, address: &Register);

    /// The machine finished; `amount` must be returned to its creator.
    fn on_finished(&mut self, amount: u64);

    /// The machine finished because of `error`.
    fn on_fatal_error(&mut self, error: &ATError);

    // ----- platform-specific functions -----

    /// Validates the shape of a call to a code in the platform range.
    fn platform_pre_execute_check(
        &self,
        code: u16,
        param_count: u8,
        returns_value: bool,
    ) -> Result<(), ATError> {
        let _ = (param_count, returns_value);
        Err(ATError::IllegalFunctionCode {
            code,
            reason: "no platform-specific functions on this host".into(),
        })
    }

    /// Runs a platform function that passed [`Host::platform_pre_execute_check`].
    fn platform_execute(&mut self, code: u16, call: &mut PlatformCall) -> Result<(), ATError> {
        let _ = call;
        Err(ATError::IllegalFunctionCode {
            code,
            reason: "no platform-specific functions on this host".into(),
        })
    }

    // ----- digests -----

    fn md5(&self, data: &[u8]) -> [u8; 16];

    fn ripemd160(&self, data: &[u8]) -> [u8; 20];

    fn sha256(&self, data: &[u8]) -> [u8; 32];

    /// RIPEMD-160 of SHA-256.
    fn hash160(&self, data: &[u8]) -> [u8; 20] {
        self.ripemd160(&self.sha256(data))
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use md5::Md5;
    use ripemd::Ripemd160;
    use sha2::{Digest, Sha256};
    use std::collections::BTreeMap;

    pub const MAX_STEPS_PER_ROUND: u64 = 500;
    pub const FEE_PER_STEP: u64 = 1;
    pub const DEFAULT_INITIAL_BALANCE: u64 = 1234;
    pub const DEFAULT_INITIAL_BLOCK_HEIGHT: u32 = 10;
    pub const DEFAULT_CREATION_BLOCK_HEIGHT: u32 = 8;
    /// Seconds per block.
    pub const BLOCK_PERIOD: u64 = 600;

    pub const AT_CREATOR: &str = "AT Creator";
    pub const AT_ADDRESS: &str = "AT";

    #[derive(Clone, Debug)]
    pub struct TestTransaction {
        pub hash: Register,
        pub tx_type: TransactionType,
        pub sender: String,
        pub recipient: String,
        pub amount: u64,
        pub message: Register,
        pub timestamp: Timestamp,
    }

    #[derive(Clone, Debug)]
    pub struct TestBlock {
        pub hash: Register,
        pub transactions: Vec<TestTransaction>,
    }

    /// In-memory chain with a handful of named accounts.
    pub struct TestHost {
        pub blockchain: Vec<TestBlock>,
        pub accounts: BTreeMap<String, u64>,
        pub messages: BTreeMap<String, Vec<Register>>,
        pub current_block_height: u32,
        pub fee_per_step: u64,
        pub refunds: Vec<u64>,
        pub fatal_errors: Vec<ATError>,
        pub platform_calls: Vec<(u16, u64)>,
    }

    fn sha256_register(parts: &[&[u8]]) -> Register {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part);
        }
        Register::from_be_bytes(&hasher.finalize().into())
    }

    pub fn encode_address(name: &str) -> Register {
        Register::from_prefix(name.as_bytes())
    }

    pub fn decode_address(address: &Register) -> String {
        address
            .to_be_bytes()
            .iter()
            .filter(|&&b| b != 0)
            .map(|&b| b as char)
            .collect()
    }

    impl TestHost {
        pub fn new() -> Self {
            let blockchain = (1..=DEFAULT_INITIAL_BLOCK_HEIGHT)
                .map(|height| TestBlock {
                    hash: sha256_register(&[b"block", &height.to_be_bytes()]),
                    transactions: Vec::new(),
                })
                .collect();

            let accounts = [
                (AT_CREATOR, 1_000_000),
                (AT_ADDRESS, DEFAULT_INITIAL_BALANCE),
                ("Initiator", 100_000),
                ("Responder", 200_000),
                ("Bystander", 300_000),
            ]
            .into_iter()
            .map(|(name, balance)| (name.to_string(), balance))
            .collect();

            Self {
                blockchain,
                accounts,
                messages: BTreeMap::new(),
                current_block_height: DEFAULT_INITIAL_BLOCK_HEIGHT,
                fee_per_step: FEE_PER_STEP,
                refunds: Vec::new(),
                fatal_errors: Vec::new(),
                platform_calls: Vec::new(),
            }
        }

        pub fn balance_of(&self, name: &str) -> u64 {
            self.accounts.get(name).copied().unwrap_or(0)
        }

        pub fn set_at_balance(&mut self, balance: u64) {
            self.accounts.insert(AT_ADDRESS.to_string(), balance);
        }

        pub fn bump_block_height(&mut self) {
            self.current_block_height += 1;
        }

        pub fn payment(sender: &str, recipient: &str, amount: u64) -> TestTransaction {
            TestTransaction {
                hash: Register::ZERO,
                tx_type: TransactionType::Payment,
                sender: sender.to_string(),
                recipient: recipient.to_string(),
                amount,
                message: Register::ZERO,
                timestamp: Timestamp::default(),
            }
        }

        pub fn message(sender: &str, recipient: &str, message: &[u8]) -> TestTransaction {
            TestTransaction {
                tx_type: TransactionType::Message,
                amount: 0,
                message: Register::from_prefix(message),
                ..Self::payment(sender, recipient, 0)
            }
        }

        /// Appends a block, stamping each transaction with its height and
        /// sequence. Returns the new block's height.
        pub fn add_block(&mut self, transactions: Vec<TestTransaction>) -> u32 {
            let height = self.blockchain.len() as u32 + 1;
            let transactions = transactions
                .into_iter()
                .enumerate()
                .map(|(seq, mut tx)| {
                    tx.timestamp = Timestamp::new(height, seq as u32);
                    tx.hash = sha256_register(&[
                        b"tx",
                        &tx.timestamp.to_u64().to_be_bytes(),
                        tx.sender.as_bytes(),
                        tx.recipient.as_bytes(),
                    ]);
                    tx
                })
                .collect();
            self.blockchain.push(TestBlock {
                hash: sha256_register(&[b"block", &height.to_be_bytes()]),
                transactions,
            });
            height
        }

        fn find_transaction(&self, tx: &Register) -> Option<&TestTransaction> {
            self.blockchain
                .iter()
                .flat_map(|block| block.transactions.iter())
                .find(|candidate| candidate.hash == *tx)
        }
    }

    impl Default for TestHost {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Host for TestHost {
        fn max_steps_per_round(&self) -> u64 {
            MAX_STEPS_PER_ROUND
        }

        fn fee_per_step(&self) -> u64 {
            self.fee_per_step
        }

        fn current_block_height(&self) -> u32 {
            self.current_block_height
        }

        fn creation_block_height(&self) -> u32 {
            DEFAULT_CREATION_BLOCK_HEIGHT
        }

        fn previous_block_hash(&self) -> Register {
            let previous = self.previous_block_height() as usize;
            previous
                .checked_sub(1)
                .and_then(|index| self.blockchain.get(index))
                .map(|block| block.hash)
                .unwrap_or_default()
        }

        fn transaction_after(&self, timestamp: Timestamp) -> Option<Register> {
            let mut height = timestamp.block_height.max(1);
            let mut seq = if timestamp.block_height == 0 {
                0
            } else {
                timestamp.transaction_sequence as usize + 1
            };

            while height <= self.current_block_height {
                let block = self.blockchain.get(height as usize - 1)?;
                if let Some(tx) = block.transactions[seq.min(block.transactions.len())..]
                    .iter()
                    .find(|tx| tx.recipient == AT_ADDRESS)
                {
                    return Some(tx.hash);
                }
                height += 1;
                seq = 0;
            }
            None
        }

        fn transaction_type(&self, tx: &Register) -> u64 {
            self.find_transaction(tx)
                .map_or(u64::MAX, |tx| tx.tx_type.value())
        }

        fn transaction_amount(&self, tx: &Register) -> u64 {
            match self.find_transaction(tx) {
                Some(tx) if tx.tx_type == TransactionType::Payment => tx.amount,
                Some(_) => 0,
                None => u64::MAX,
            }
        }

        fn transaction_timestamp(&self, tx: &Register) -> u64 {
            self.find_transaction(tx)
                .map_or(u64::MAX, |tx| tx.timestamp.to_u64())
        }

        fn random_from_transaction(&self, tx: &Register) -> u64 {
            let [a1, a2, a3, a4] = tx.0;
            ((a1 ^ 9) << 3) ^ ((a2 ^ 9) << 12) ^ ((a3 ^ 9) << 5) ^ (a4 ^ 9)
        }

        fn transaction_message(&self, tx: &Register) -> Option<Register> {
            self.find_transaction(tx)
                .filter(|tx| tx.tx_type == TransactionType::Message)
                .map(|tx| tx.message)
        }

        fn transaction_sender(&self, tx: &Register) -> Register {
            self.find_transaction(tx)
                .map(|tx| encode_address(&tx.sender))
                .unwrap_or_default()
        }

        fn creator_address(&self) -> Register {
            encode_address(AT_CREATOR)
        }

        fn current_balance(&self) -> u64 {
            self.balance_of(AT_ADDRESS)
        }

        fn add_minutes_to_timestamp(&self, timestamp: Timestamp, minutes: u64) -> Timestamp {
            let blocks = minutes.wrapping_mul(60) / BLOCK_PERIOD;
            Timestamp::new(
                timestamp.block_height.wrapping_add(blocks as u32),
                timestamp.transaction_sequence,
            )
        }

        fn pay_to_address(&mut self, amount: u64, address: &Register) {
            *self.accounts.entry(decode_address(address)).or_default() += amount;
        }

        fn message_to_address(&mut self, message: &Register, address: &Register) {
            self.messages
                .entry(decode_address(address))
                .or_default()
                .push(*message);
        }

        fn on_finished(&mut self, amount: u64) {
            *self.accounts.entry(AT_CREATOR.to_string()).or_default() += amount;
            self.refunds.push(amount);
        }

        fn on_fatal_error(&mut self, error: &ATError) {
            self.fatal_errors.push(error.clone());
        }

        fn platform_pre_execute_check(
            &self,
            code: u16,
            param_count: u8,
            returns_value: bool,
        ) -> Result<(), ATError> {
            let required = match code {
                0x0501 => (1, false),
                0x0502 => (0, true),
                _ => {
                    return Err(ATError::IllegalFunctionCode {
                        code,
                        reason: "unrecognised platform-specific function".into(),
                    })
                }
            };
            if (param_count, returns_value) != required {
                return Err(ATError::IllegalFunctionCode {
                    code,
                    reason: format!(
                        "called with {param_count} parameter(s), returns_value={returns_value}"
                    ),
                });
            }
            Ok(())
        }

        fn platform_execute(&mut self, code: u16, call: &mut PlatformCall) -> Result<(), ATError> {
            match code {
                0x0501 => self.platform_calls.push((code, call.params[0])),
                0x0502 => {
                    self.platform_calls.push((code, 0));
                    call.return_value = 0x0502;
                }
                _ => {
                    return Err(ATError::IllegalFunctionCode {
                        code,
                        reason: "unrecognised platform-specific function".into(),
                    })
                }
            }
            Ok(())
        }

        fn md5(&self, data: &[u8]) -> [u8; 16] {
            Md5::digest(data).into()
        }

        fn ripemd160(&self, data: &[u8]) -> [u8; 20] {
            Ripemd160::digest(data).into()
        }

        fn sha256(&self, data: &[u8]) -> [u8; 32] {
            Sha256::digest(data).into()
        }
    }

    #[test]
    fn addresses_round_trip() {
        let reg = encode_address("Initiator");
        assert_eq!(decode_address(&reg), "Initiator");
    }

    #[test]
    fn finds_transactions_after_timestamp() {
        let mut host = TestHost::new();
        let height = host.add_block(vec![
            TestHost::payment("Initiator", "Bystander", 5),
            TestHost::payment("Initiator", AT_ADDRESS, 50),
            TestHost::message("Responder", AT_ADDRESS, b"hello"),
        ]);
        host.bump_block_height();
        assert_eq!(height, host.current_block_height);

        let first = host
            .transaction_after(Timestamp::new(DEFAULT_CREATION_BLOCK_HEIGHT, 0))
            .unwrap();
        assert_eq!(host.transaction_amount(&first), 50);
        assert_eq!(host.transaction_type(&first), TransactionType::Payment.value());
        assert_eq!(decode_address(&host.transaction_sender(&first)), "Initiator");

        let ts = Timestamp::from(host.transaction_timestamp(&first));
        assert_eq!(ts, Timestamp::new(height, 1));
        let second = host.transaction_after(ts).unwrap();
        assert_eq!(host.transaction_amount(&second), 0);
        assert_eq!(
            host.transaction_message(&second),
            Some(Register::from_prefix(b"hello"))
        );

        let third = Timestamp::from(host.transaction_timestamp(&second));
        assert_eq!(host.transaction_after(third), None);
    }

    #[test]
    fn future_blocks_are_invisible() {
        let mut host = TestHost::new();
        host.add_block(vec![TestHost::payment("Initiator", AT_ADDRESS, 1)]);
        assert_eq!(host.transaction_after(Timestamp::new(1, 0)), None);
    }

    #[test]
    fn add_minutes_counts_whole_blocks() {
        let host = TestHost::new();
        let ts = host.add_minutes_to_timestamp(Timestamp::new(10, 4), 45);
        assert_eq!(ts, Timestamp::new(14, 4));
    }

    #[test]
    fn hash160_composes_digests() {
        let host = TestHost::new();
        assert_eq!(host.hash160(b"abc"), host.ripemd160(&host.sha256(b"abc")));
    }
}
