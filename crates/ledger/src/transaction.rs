use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use piggybank_core::{Entity, TransactionId};

/// Direction of a transaction. The sign lives here, never in `amount`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
}

impl TransactionKind {
    /// Sign applied to the amount when folding into a balance.
    pub fn signum(&self) -> Decimal {
        match self {
            TransactionKind::Deposit => Decimal::ONE,
            TransactionKind::Withdrawal => Decimal::NEGATIVE_ONE,
        }
    }
}

/// A posted ledger transaction (immutable once created).
///
/// All fields are computed atomically at append time from the prior account
/// state; existing entries are never edited or deleted. Reversals, if ever
/// needed, are modeled as new offsetting transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: TransactionId,
    pub timestamp: DateTime<Utc>,
    pub kind: TransactionKind,
    /// Strictly positive; the sign is implied by `kind`.
    pub amount: Decimal,
    pub description: String,
    /// Account balance immediately after this transaction, inclusive of any
    /// interest accrued since the previous one.
    pub running_balance: Decimal,
    /// Interest portion folded into `running_balance` at post time, isolated
    /// from the principal movement.
    pub accumulated_interest: Decimal,
}

impl Transaction {
    /// `+amount` for deposits, `-amount` for withdrawals.
    pub fn signed_amount(&self) -> Decimal {
        self.kind.signum() * self.amount
    }
}

impl Entity for Transaction {
    type Id = TransactionId;

    fn id(&self) -> &TransactionId {
        &self.id
    }
}

/// Input for a not-yet-posted transaction; the calculator fills in the rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTransaction {
    pub kind: TransactionKind,
    pub amount: Decimal,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}
