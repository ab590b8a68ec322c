use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use piggybank_core::{DomainError, DomainResult, ValueObject};

/// Annual interest rate in percent (`2.5` means 2.5%/year).
///
/// Non-negative by construction. Mutable on an account, but a rate change is
/// always recorded through a carry transaction so that interest accrued under
/// the old rate is folded in exactly once.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InterestRate(Decimal);

impl InterestRate {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(annual_pct: Decimal) -> DomainResult<Self> {
        if annual_pct < Decimal::ZERO {
            return Err(DomainError::validation(format!(
                "interest rate must be non-negative, got {annual_pct}"
            )));
        }
        Ok(Self(annual_pct))
    }

    pub fn annual_pct(&self) -> Decimal {
        self.0
    }
}

impl ValueObject for InterestRate {}

impl core::fmt::Display for InterestRate {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}%", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn rejects_negative_rate() {
        let err = InterestRate::new(dec!(-0.5)).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn zero_and_positive_rates_are_valid() {
        assert_eq!(InterestRate::new(Decimal::ZERO).unwrap(), InterestRate::ZERO);
        assert_eq!(
            InterestRate::new(dec!(2.5)).unwrap().annual_pct(),
            dec!(2.5)
        );
    }
}
