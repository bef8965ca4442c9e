use crate::constants::WITHDRAWAL_MIN_FEE;

/// Withdrawal fee policy: a proportional part with a fixed floor.
///
/// With `divisor == 0` the fee is always `minimum`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FeePolicy {
    pub divisor: u64,
    pub minimum: u64,
}

impl Default for FeePolicy {
    fn default() -> Self {
        Self {
            divisor: 0,
            minimum: WITHDRAWAL_MIN_FEE,
        }
    }
}

impl FeePolicy {
    pub fn new(divisor: u64, minimum: u64) -> Self {
        Self { divisor, minimum }
    }

    pub fn fee(&self, amount: u64) -> u64 {
        if self.divisor == 0 {
            return self.minimum;
        }
        (amount / self.divisor).max(self.minimum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_divisor_is_flat_minimum() {
        let p = FeePolicy::new(0, 15_300);
        assert_eq!(p.fee(0), 15_300);
        assert_eq!(p.fee(500_000), 15_300);
        assert_eq!(p.fee(u64::MAX), 15_300);
    }

    #[test]
    fn divisor_with_floor() {
        let p = FeePolicy::new(1_000, 1_000);
        assert_eq!(p.fee(10_000), 1_000);
        assert_eq!(p.fee(5_000_000), 5_000);
    }

    #[test]
    fn fee_monotonic_and_floored() {
        let p = FeePolicy::new(997, 2_500);
        let mut prev = 0;
        for amount in (0..20_000_000u64).step_by(12_345) {
            let fee = p.fee(amount);
            assert!(fee >= p.minimum);
            assert!(fee >= prev, "fee decreased at {amount}");
            prev = fee;
        }
    }

    #[test]
    fn default_covers_withdrawal_budget() {
        assert_eq!(FeePolicy::default().fee(1), 75_300);
    }
}
