//! Interest arithmetic: fractional day counts and simple prorated accrual.
//!
//! The model is simple (non-compounding) daily proration applied once per
//! gap between postings: `balance × rate/100/365 × days`, with `days` a real
//! number so sub-day gaps still accrue a proportional amount and same-instant
//! postings accrue exactly zero.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;

const MILLIS_PER_DAY: i64 = 86_400_000;
const DAYS_PER_YEAR: i64 = 365;

/// Elapsed time between two instants as a fractional number of days.
///
/// Never floored; a 12-hour gap is `0.5` days.
pub fn fractional_days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> Decimal {
    let millis = (to - from).num_milliseconds();
    Decimal::from(millis) / Decimal::from(MILLIS_PER_DAY)
}

/// Daily rate as a decimal fraction from an annual percentage.
pub fn daily_rate(annual_pct: Decimal) -> Decimal {
    annual_pct / Decimal::from(100) / Decimal::from(DAYS_PER_YEAR)
}

/// Interest accrued on `balance` over `days` at `annual_pct` percent/year.
///
/// Zero for non-positive day counts; no compounding happens within the gap.
pub fn accrued_interest(balance: Decimal, annual_pct: Decimal, days: Decimal) -> Decimal {
    if days <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    balance * daily_rate(annual_pct) * days
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDateTime;
    use rust_decimal_macros::dec;

    fn at(s: &str) -> DateTime<Utc> {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
            .unwrap()
            .and_utc()
    }

    #[test]
    fn whole_and_fractional_days() {
        assert_eq!(
            fractional_days_between(at("2024-03-01 00:00:00"), at("2024-03-11 00:00:00")),
            dec!(10)
        );
        assert_eq!(
            fractional_days_between(at("2024-03-01 00:00:00"), at("2024-03-01 12:00:00")),
            dec!(0.5)
        );
        assert_eq!(
            fractional_days_between(at("2024-03-01 00:00:00"), at("2024-03-01 00:00:00")),
            Decimal::ZERO
        );
    }

    #[test]
    fn clean_proration_fixture() {
        // 1000 at 3.65%/year over 10 days accrues exactly 1.00.
        assert_eq!(accrued_interest(dec!(1000), dec!(3.65), dec!(10)), dec!(1));
    }

    #[test]
    fn zero_days_accrues_nothing() {
        assert_eq!(
            accrued_interest(dec!(1000), dec!(3.65), Decimal::ZERO),
            Decimal::ZERO
        );
    }
}
