//! Family-bank ledger (accounts, transactions, prorated interest accrual).
//!
//! Pure domain logic only: no IO, no HTTP, no persistence concerns.

pub mod account;
pub mod calculator;
pub mod interest;
pub mod rate;
pub mod transaction;

pub use account::{
    Account, AccountCommand, AccountEvent, AccountId, AccountNumber, AccountOpened,
    ChangeInterestRate, InterestRateChanged, OpenAccount, RecordTransaction, TransactionPosted,
};
pub use calculator::{
    BalanceProjection, LedgerError, accrue_on_append, project_balance, project_balance_now,
    rate_change_entry,
};
pub use rate::InterestRate;
pub use transaction::{NewTransaction, Transaction, TransactionKind};
