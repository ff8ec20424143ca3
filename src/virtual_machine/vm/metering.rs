/// Outcome of trying to pay for one instruction.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Charge {
    /// Steps recorded; the caller must deduct `fee` from the balance.
    Paid { fee: u64 },
    /// The instruction would exceed this round's step budget.
    RoundBudgetExhausted,
    /// The balance cannot cover the instruction's fee.
    InsufficientBalance,
}

/// Per-round step and fee accounting.
///
/// Created fresh at the start of every round from the host's limits. The
/// step budget is checked before the balance, so a machine with funds left
/// pauses rather than freezing when it merely runs out of steps.
#[derive(Clone, Debug)]
pub struct RoundMeter {
    steps: u64,
    max_steps: u64,
    fee_per_step: u64,
}

impl RoundMeter {
    pub fn new(max_steps: u64, fee_per_step: u64) -> Self {
        Self {
            steps: 0,
            max_steps,
            fee_per_step,
        }
    }

    /// Steps consumed so far this round.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn fee_for(&self, cost: u64) -> u64 {
        cost.saturating_mul(self.fee_per_step)
    }

    pub fn charge(&mut self, cost: u64, balance: u64) -> Charge {
        if self.steps.saturating_add(cost) > self.max_steps {
            return Charge::RoundBudgetExhausted;
        }
        let fee = self.fee_for(cost);
        if fee > balance {
            return Charge::InsufficientBalance;
        }
        self.steps += cost;
        Charge::Paid { fee }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn charges_steps_and_fee() {
        let mut meter = RoundMeter::new(500, 1);
        assert_eq!(meter.charge(10, 1234), Charge::Paid { fee: 10 });
        assert_eq!(meter.charge(1, 1224), Charge::Paid { fee: 1 });
        assert_eq!(meter.steps(), 11);
    }

    #[test]
    fn budget_is_checked_before_balance() {
        let mut meter = RoundMeter::new(5, 1);
        assert_eq!(meter.charge(5, 5), Charge::Paid { fee: 5 });
        assert_eq!(meter.charge(1, 0), Charge::RoundBudgetExhausted);
    }

    #[test]
    fn exact_budget_fits() {
        let mut meter = RoundMeter::new(10, 0);
        assert_eq!(meter.charge(10, 0), Charge::Paid { fee: 0 });
        assert_eq!(meter.charge(1, 0), Charge::RoundBudgetExhausted);
    }

    #[test]
    fn insufficient_balance_leaves_steps_untouched() {
        let mut meter = RoundMeter::new(500, 3);
        assert_eq!(meter.charge(10, 29), Charge::InsufficientBalance);
        assert_eq!(meter.steps(), 0);
    }

    #[test]
    fn fee_saturates() {
        let meter = RoundMeter::new(u64::MAX, u64::MAX);
        assert_eq!(meter.fee_for(2), u64::MAX);
    }
}
