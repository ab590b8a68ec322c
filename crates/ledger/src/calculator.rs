//! Ledger calculator: running balances and interest accrual over an
//! append-only transaction log.
//!
//! Pure functions over their inputs; persistence of the returned records is
//! the caller's responsibility. Time is always passed in explicitly so
//! results are reproducible without mocking a clock.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

use piggybank_core::{DomainError, TransactionId};

use crate::interest::{accrued_interest, fractional_days_between};
use crate::rate::InterestRate;
use crate::transaction::{NewTransaction, Transaction, TransactionKind};

/// Local validation failure. Neither kind is retryable; the caller must
/// supply corrected input.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LedgerError {
    /// A transaction amount is zero or negative.
    #[error("invalid amount: {0} (must be strictly positive)")]
    InvalidAmount(Decimal),

    /// A new event's timestamp precedes the latest posted transaction.
    /// Out-of-order insertion is rejected, not silently reordered: running
    /// balances are only meaningful for a strictly time-ordered append log.
    #[error("invalid timestamp: {attempted} precedes the latest posted transaction at {latest}")]
    InvalidTimestamp {
        latest: DateTime<Utc>,
        attempted: DateTime<Utc>,
    },
}

impl From<LedgerError> for DomainError {
    fn from(value: LedgerError) -> Self {
        match &value {
            LedgerError::InvalidAmount(_) => DomainError::validation(value.to_string()),
            LedgerError::InvalidTimestamp { .. } => DomainError::invariant(value.to_string()),
        }
    }
}

/// Display-only live balance: what the balance would be if posted right now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BalanceProjection {
    /// Interest accrued since the last posted transaction, not yet posted.
    pub accrued_interest: Decimal,
    /// Last running balance plus the unposted accrual.
    pub projected_balance: Decimal,
}

impl BalanceProjection {
    fn zero() -> Self {
        Self {
            accrued_interest: Decimal::ZERO,
            projected_balance: Decimal::ZERO,
        }
    }
}

/// Most recent posted transaction. Among equal timestamps the last appended
/// wins (`max_by_key` keeps the final maximum), matching append-log order.
fn most_recent(transactions: &[Transaction]) -> Option<&Transaction> {
    transactions.iter().max_by_key(|t| t.timestamp)
}

/// Compute the fully populated record for appending `entry` after
/// `prior` at `rate`.
///
/// The gap between the previous posting and `entry.timestamp` accrues simple
/// prorated interest on the previous running balance; the new running balance
/// folds that interest in together with the signed amount. The first
/// transaction of an account starts from an implicit zero balance and
/// accrues nothing.
pub fn accrue_on_append(
    prior: &[Transaction],
    rate: InterestRate,
    entry: NewTransaction,
) -> Result<Transaction, LedgerError> {
    if entry.amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidAmount(entry.amount));
    }

    let (prev_balance, prev_timestamp) = match most_recent(prior) {
        Some(prev) => {
            if entry.timestamp < prev.timestamp {
                return Err(LedgerError::InvalidTimestamp {
                    latest: prev.timestamp,
                    attempted: entry.timestamp,
                });
            }
            (prev.running_balance, prev.timestamp)
        }
        None => (Decimal::ZERO, entry.timestamp),
    };

    let days = fractional_days_between(prev_timestamp, entry.timestamp);
    let interest = accrued_interest(prev_balance, rate.annual_pct(), days);

    Ok(Transaction {
        id: TransactionId::new(),
        timestamp: entry.timestamp,
        kind: entry.kind,
        amount: entry.amount,
        description: entry.description,
        running_balance: prev_balance + interest + entry.kind.signum() * entry.amount,
        accumulated_interest: interest,
    })
}

/// Project the live balance at `as_of` without posting anything.
///
/// Empty history projects to zero. `as_of` must not precede the most recent
/// posted transaction.
pub fn project_balance(
    transactions: &[Transaction],
    rate: InterestRate,
    as_of: DateTime<Utc>,
) -> Result<BalanceProjection, LedgerError> {
    let Some(last) = most_recent(transactions) else {
        return Ok(BalanceProjection::zero());
    };

    if as_of < last.timestamp {
        return Err(LedgerError::InvalidTimestamp {
            latest: last.timestamp,
            attempted: as_of,
        });
    }

    let days = fractional_days_between(last.timestamp, as_of);
    let accrued = accrued_interest(last.running_balance, rate.annual_pct(), days);

    Ok(BalanceProjection {
        accrued_interest: accrued,
        projected_balance: last.running_balance + accrued,
    })
}

/// [`project_balance`] defaulted to the current instant (display paths only).
pub fn project_balance_now(
    transactions: &[Transaction],
    rate: InterestRate,
) -> Result<BalanceProjection, LedgerError> {
    project_balance(transactions, rate, Utc::now())
}

/// Build the zero-amount carry transaction for an interest-rate change at
/// `at`.
///
/// The carry accrues under the *old* rate up to `at` and folds that interest
/// into the running balance, so interest never double-counts across the rate
/// boundary and the new rate never applies retroactively. Kind is `Deposit`
/// by convention.
pub fn rate_change_entry(
    transactions: &[Transaction],
    old_rate: InterestRate,
    new_rate: InterestRate,
    at: DateTime<Utc>,
) -> Result<Transaction, LedgerError> {
    let projected = project_balance(transactions, old_rate, at)?;

    Ok(Transaction {
        id: TransactionId::new(),
        timestamp: at,
        kind: TransactionKind::Deposit,
        amount: Decimal::ZERO,
        description: format!("Interest rate changed from {old_rate} to {new_rate}"),
        running_balance: projected.projected_balance,
        accumulated_interest: projected.accrued_interest,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap()
    }

    fn rate(pct: Decimal) -> InterestRate {
        InterestRate::new(pct).unwrap()
    }

    fn deposit(amount: Decimal, at: DateTime<Utc>) -> NewTransaction {
        NewTransaction {
            kind: TransactionKind::Deposit,
            amount,
            description: "Pocket money".to_string(),
            timestamp: at,
        }
    }

    fn withdrawal(amount: Decimal, at: DateTime<Utc>) -> NewTransaction {
        NewTransaction {
            kind: TransactionKind::Withdrawal,
            amount,
            description: "Toy store".to_string(),
            timestamp: at,
        }
    }

    #[test]
    fn first_deposit_starts_from_zero_balance() {
        let posted = accrue_on_append(&[], rate(dec!(2.5)), deposit(dec!(100), t0())).unwrap();

        assert_eq!(posted.running_balance, dec!(100));
        assert_eq!(posted.accumulated_interest, Decimal::ZERO);
        assert_eq!(posted.timestamp, t0());
    }

    #[test]
    fn same_instant_append_accrues_zero() {
        let first = accrue_on_append(&[], rate(dec!(5)), deposit(dec!(100), t0())).unwrap();
        let second =
            accrue_on_append(&[first.clone()], rate(dec!(5)), deposit(dec!(10), t0())).unwrap();

        assert_eq!(second.accumulated_interest, Decimal::ZERO);
        assert_eq!(second.running_balance, dec!(110));
    }

    #[test]
    fn ten_day_gap_prorates_exactly() {
        // 1000 at 3.65%/year over 10 days accrues exactly 1.00.
        let first = accrue_on_append(&[], rate(dec!(3.65)), deposit(dec!(1000), t0())).unwrap();
        let later = t0() + Duration::days(10);
        let second =
            accrue_on_append(&[first], rate(dec!(3.65)), deposit(dec!(10), later)).unwrap();

        assert_eq!(second.accumulated_interest, dec!(1));
        assert_eq!(second.running_balance, dec!(1011));
    }

    #[test]
    fn sub_day_gap_still_accrues_proportionally() {
        let first = accrue_on_append(&[], rate(dec!(3.65)), deposit(dec!(1000), t0())).unwrap();
        let half_day_later = t0() + Duration::hours(12);
        let second =
            accrue_on_append(&[first], rate(dec!(3.65)), deposit(dec!(10), half_day_later))
                .unwrap();

        assert_eq!(second.accumulated_interest, dec!(0.05));
    }

    #[test]
    fn deposit_and_withdrawal_differ_by_twice_the_amount() {
        let first = accrue_on_append(&[], rate(dec!(3.65)), deposit(dec!(1000), t0())).unwrap();
        let later = t0() + Duration::days(3);

        let prior = vec![first];
        let dep = accrue_on_append(&prior, rate(dec!(3.65)), deposit(dec!(50), later)).unwrap();
        let wd = accrue_on_append(&prior, rate(dec!(3.65)), withdrawal(dec!(50), later)).unwrap();

        assert_eq!(dep.accumulated_interest, wd.accumulated_interest);
        assert_eq!(dep.running_balance - wd.running_balance, dec!(100));
    }

    #[test]
    fn non_positive_amounts_are_rejected() {
        let err = accrue_on_append(&[], rate(dec!(1)), deposit(Decimal::ZERO, t0())).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount(_)));

        let err = accrue_on_append(&[], rate(dec!(1)), deposit(dec!(-5), t0())).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount(_)));
    }

    #[test]
    fn out_of_order_append_is_rejected() {
        let first = accrue_on_append(&[], rate(dec!(1)), deposit(dec!(100), t0())).unwrap();
        let earlier = t0() - Duration::hours(1);

        let err =
            accrue_on_append(&[first], rate(dec!(1)), deposit(dec!(10), earlier)).unwrap_err();
        match err {
            LedgerError::InvalidTimestamp { latest, attempted } => {
                assert_eq!(latest, t0());
                assert_eq!(attempted, earlier);
            }
            other => panic!("expected InvalidTimestamp, got {other:?}"),
        }
    }

    #[test]
    fn most_recent_prior_wins_regardless_of_input_order() {
        let first = accrue_on_append(&[], rate(dec!(3.65)), deposit(dec!(1000), t0())).unwrap();
        let second = accrue_on_append(
            &[first.clone()],
            rate(dec!(3.65)),
            deposit(dec!(10), t0() + Duration::days(1)),
        )
        .unwrap();

        // Prior history handed over newest-first; accrual must still base off
        // the most recent entry.
        let shuffled = vec![second.clone(), first];
        let third = accrue_on_append(
            &shuffled,
            rate(dec!(3.65)),
            deposit(dec!(1), t0() + Duration::days(2)),
        )
        .unwrap();

        let expected_interest =
            accrued_interest(second.running_balance, dec!(3.65), Decimal::ONE);
        assert_eq!(third.accumulated_interest, expected_interest);
    }

    #[test]
    fn empty_history_projects_to_zero() {
        let projection = project_balance(&[], rate(dec!(2.5)), t0()).unwrap();
        assert_eq!(projection.accrued_interest, Decimal::ZERO);
        assert_eq!(projection.projected_balance, Decimal::ZERO);
    }

    #[test]
    fn projection_is_idempotent_and_never_mutates() {
        let first = accrue_on_append(&[], rate(dec!(3.65)), deposit(dec!(1000), t0())).unwrap();
        let history = vec![first];
        let snapshot = history.clone();
        let as_of = t0() + Duration::days(10);

        let a = project_balance(&history, rate(dec!(3.65)), as_of).unwrap();
        let b = project_balance(&history, rate(dec!(3.65)), as_of).unwrap();

        assert_eq!(a, b);
        assert_eq!(a.accrued_interest, dec!(1));
        assert_eq!(a.projected_balance, dec!(1001));
        assert_eq!(history, snapshot);
    }

    #[test]
    fn projection_rejects_as_of_before_last_posting() {
        let first = accrue_on_append(&[], rate(dec!(1)), deposit(dec!(100), t0())).unwrap();
        let err = project_balance(&[first], rate(dec!(1)), t0() - Duration::seconds(1))
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidTimestamp { .. }));
    }

    #[test]
    fn rate_change_carries_old_rate_accrual_exactly_once() {
        let first = accrue_on_append(&[], rate(dec!(2)), deposit(dec!(1000), t0())).unwrap();
        let at = t0() + Duration::days(10);
        let history = vec![first];

        let expected = project_balance(&history, rate(dec!(2)), at).unwrap();
        let carry =
            rate_change_entry(&history, rate(dec!(2)), rate(dec!(5)), at).unwrap();

        assert_eq!(carry.amount, Decimal::ZERO);
        assert_eq!(carry.kind, TransactionKind::Deposit);
        assert_eq!(carry.accumulated_interest, expected.accrued_interest);
        assert_eq!(carry.running_balance, expected.projected_balance);
        assert_eq!(carry.description, "Interest rate changed from 2% to 5%");

        // A subsequent append accrues at the new rate, on the carried balance,
        // only for time after the change.
        let mut history = history;
        history.push(carry.clone());
        let next = accrue_on_append(
            &history,
            rate(dec!(5)),
            deposit(dec!(10), at + Duration::days(2)),
        )
        .unwrap();

        let expected_interest =
            accrued_interest(carry.running_balance, dec!(5), Decimal::TWO);
        assert_eq!(next.accumulated_interest, expected_interest);
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 256,
            ..ProptestConfig::default()
        })]

        /// Property: over any generated append sequence, each entry satisfies
        /// `running_balance = prev + interest + signed_amount`, and the final
        /// running balance rebuilds from the posted interest and signed
        /// amounts alone.
        #[test]
        fn running_balance_decomposes_into_principal_and_interest(
            entries in prop::collection::vec(
                (any::<bool>(), 1i64..100_000i64, 0i64..5_000i64),
                1..40,
            )
        ) {
            let annual = rate(dec!(2.5));
            let mut history: Vec<Transaction> = Vec::new();
            let mut at = t0();

            for (is_deposit, cents, gap_minutes) in entries {
                at += Duration::minutes(gap_minutes);
                let amount = Decimal::new(cents, 2);
                let entry = NewTransaction {
                    kind: if is_deposit {
                        TransactionKind::Deposit
                    } else {
                        TransactionKind::Withdrawal
                    },
                    amount,
                    description: String::new(),
                    timestamp: at,
                };
                let posted = accrue_on_append(&history, annual, entry).unwrap();

                let prev_balance = history
                    .last()
                    .map(|t| t.running_balance)
                    .unwrap_or(Decimal::ZERO);
                prop_assert_eq!(
                    posted.running_balance,
                    prev_balance + posted.accumulated_interest + posted.signed_amount()
                );

                history.push(posted);
            }

            let mut rebuilt = Decimal::ZERO;
            for t in &history {
                rebuilt = rebuilt + t.accumulated_interest + t.signed_amount();
            }
            let last = history.last().unwrap();
            prop_assert_eq!(last.running_balance, rebuilt);
        }
    }
}
