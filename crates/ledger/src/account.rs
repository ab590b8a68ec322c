use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use piggybank_core::{
    Aggregate, AggregateId, AggregateRoot, DomainError, OwnerId, ValueObject,
};
use piggybank_events::Event;

use crate::calculator::{self, BalanceProjection, LedgerError};
use crate::rate::InterestRate;
use crate::transaction::{NewTransaction, Transaction, TransactionKind};

/// Account identifier (aggregate id).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub AggregateId);

impl AccountId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for AccountId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Display-only account number in `XXXX-XXXX-XXXX-XXXX` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountNumber(String);

impl AccountNumber {
    /// Validate an existing account number string.
    pub fn new(s: impl Into<String>) -> Result<Self, DomainError> {
        let s = s.into();
        let well_formed = s.len() == 19
            && s.split('-').count() == 4
            && s.split('-')
                .all(|g| g.len() == 4 && g.bytes().all(|b| b.is_ascii_digit()));
        if !well_formed {
            return Err(DomainError::validation(format!(
                "account number must be XXXX-XXXX-XXXX-XXXX, got {s:?}"
            )));
        }
        Ok(Self(s))
    }

    /// Generate a fresh account number from uuid entropy.
    pub fn generate() -> Self {
        let bytes = *Uuid::now_v7().as_bytes();
        let group = |chunk: &[u8]| {
            u32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) % 10_000
        };
        Self(format!(
            "{:04}-{:04}-{:04}-{:04}",
            group(&bytes[0..4]),
            group(&bytes[4..8]),
            group(&bytes[8..12]),
            group(&bytes[12..16]),
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ValueObject for AccountNumber {}

impl core::fmt::Display for AccountNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Aggregate root: a child's sub-account in the family bank.
///
/// State is an append-only transaction log plus a cached `balance` equal to
/// the most recent running balance. All interest arithmetic goes through the
/// ledger calculator; the aggregate only decides and folds events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    id: AccountId,
    owner_id: Option<OwnerId>,
    name: String,
    account_number: Option<AccountNumber>,
    interest_rate: InterestRate,
    transactions: Vec<Transaction>,
    balance: Decimal,
    version: u64,
    created: bool,
}

impl Account {
    /// Empty aggregate for rehydration.
    pub fn empty(id: AccountId) -> Self {
        Self {
            id,
            owner_id: None,
            name: String::new(),
            account_number: None,
            interest_rate: InterestRate::ZERO,
            transactions: Vec::new(),
            balance: Decimal::ZERO,
            version: 0,
            created: false,
        }
    }

    pub fn id_typed(&self) -> AccountId {
        self.id
    }

    pub fn owner_id(&self) -> Option<OwnerId> {
        self.owner_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn account_number(&self) -> Option<&AccountNumber> {
        self.account_number.as_ref()
    }

    pub fn interest_rate(&self) -> InterestRate {
        self.interest_rate
    }

    /// Cached balance: the running balance of the most recent transaction.
    pub fn balance(&self) -> Decimal {
        self.balance
    }

    /// Posted history, in append order.
    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn last_transaction_at(&self) -> Option<DateTime<Utc>> {
        self.transactions.iter().map(|t| t.timestamp).max()
    }

    /// Display-only live balance including interest accrued since the last
    /// posting. Never mutates state and never posts anything.
    pub fn projected_balance(
        &self,
        as_of: DateTime<Utc>,
    ) -> Result<BalanceProjection, LedgerError> {
        calculator::project_balance(&self.transactions, self.interest_rate, as_of)
    }
}

impl AggregateRoot for Account {
    type Id = AccountId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: OpenAccount.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenAccount {
    pub owner_id: OwnerId,
    pub account_id: AccountId,
    pub name: String,
    pub account_number: AccountNumber,
    pub interest_rate: InterestRate,
    pub occurred_at: DateTime<Utc>,
}

/// Command: RecordTransaction (deposit or withdrawal).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordTransaction {
    pub owner_id: OwnerId,
    pub account_id: AccountId,
    pub kind: TransactionKind,
    /// Strictly positive; sign implied by `kind`.
    pub amount: Decimal,
    pub description: String,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ChangeInterestRate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeInterestRate {
    pub owner_id: OwnerId,
    pub account_id: AccountId,
    pub new_rate: InterestRate,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountCommand {
    OpenAccount(OpenAccount),
    RecordTransaction(RecordTransaction),
    ChangeInterestRate(ChangeInterestRate),
}

/// Event: AccountOpened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountOpened {
    pub owner_id: OwnerId,
    pub account_id: AccountId,
    pub name: String,
    pub account_number: AccountNumber,
    pub interest_rate: InterestRate,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TransactionPosted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionPosted {
    pub owner_id: OwnerId,
    pub account_id: AccountId,
    pub transaction: Transaction,
    pub occurred_at: DateTime<Utc>,
}

/// Event: InterestRateChanged.
///
/// Carries the zero-amount transaction that folds in the interest accrued
/// under the old rate, so the rate transition and the carry post atomically:
/// the new rate can never apply retroactively.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterestRateChanged {
    pub owner_id: OwnerId,
    pub account_id: AccountId,
    pub old_rate: InterestRate,
    pub new_rate: InterestRate,
    pub posted: Transaction,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountEvent {
    AccountOpened(AccountOpened),
    TransactionPosted(TransactionPosted),
    InterestRateChanged(InterestRateChanged),
}

impl Event for AccountEvent {
    fn event_type(&self) -> &'static str {
        match self {
            AccountEvent::AccountOpened(_) => "bank.account.opened",
            AccountEvent::TransactionPosted(_) => "bank.account.transaction_posted",
            AccountEvent::InterestRateChanged(_) => "bank.account.interest_rate_changed",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            AccountEvent::AccountOpened(e) => e.occurred_at,
            AccountEvent::TransactionPosted(e) => e.occurred_at,
            AccountEvent::InterestRateChanged(e) => e.occurred_at,
        }
    }
}

impl Aggregate for Account {
    type Command = AccountCommand;
    type Event = AccountEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            AccountEvent::AccountOpened(e) => {
                self.id = e.account_id;
                self.owner_id = Some(e.owner_id);
                self.name = e.name.clone();
                self.account_number = Some(e.account_number.clone());
                self.interest_rate = e.interest_rate;
                self.transactions = Vec::new();
                self.balance = Decimal::ZERO;
                self.created = true;
            }
            AccountEvent::TransactionPosted(e) => {
                self.balance = e.transaction.running_balance;
                self.transactions.push(e.transaction.clone());
            }
            AccountEvent::InterestRateChanged(e) => {
                self.balance = e.posted.running_balance;
                self.transactions.push(e.posted.clone());
                self.interest_rate = e.new_rate;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            AccountCommand::OpenAccount(cmd) => self.handle_open(cmd),
            AccountCommand::RecordTransaction(cmd) => self.handle_record(cmd),
            AccountCommand::ChangeInterestRate(cmd) => self.handle_change_rate(cmd),
        }
    }
}

impl Account {
    fn ensure_owner(&self, owner_id: OwnerId) -> Result<(), DomainError> {
        if self.owner_id != Some(owner_id) {
            return Err(DomainError::invariant("owner mismatch"));
        }
        Ok(())
    }

    fn ensure_account_id(&self, account_id: AccountId) -> Result<(), DomainError> {
        if self.id != account_id {
            return Err(DomainError::invariant("account_id mismatch"));
        }
        Ok(())
    }

    fn handle_open(&self, cmd: &OpenAccount) -> Result<Vec<AccountEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("account already exists"));
        }
        if cmd.name.trim().is_empty() {
            return Err(DomainError::validation("account name cannot be empty"));
        }

        Ok(vec![AccountEvent::AccountOpened(AccountOpened {
            owner_id: cmd.owner_id,
            account_id: cmd.account_id,
            name: cmd.name.clone(),
            account_number: cmd.account_number.clone(),
            interest_rate: cmd.interest_rate,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_record(&self, cmd: &RecordTransaction) -> Result<Vec<AccountEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_owner(cmd.owner_id)?;
        self.ensure_account_id(cmd.account_id)?;

        let entry = NewTransaction {
            kind: cmd.kind,
            amount: cmd.amount,
            description: cmd.description.clone(),
            timestamp: cmd.occurred_at,
        };
        let transaction =
            calculator::accrue_on_append(&self.transactions, self.interest_rate, entry)?;

        Ok(vec![AccountEvent::TransactionPosted(TransactionPosted {
            owner_id: cmd.owner_id,
            account_id: cmd.account_id,
            transaction,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_change_rate(
        &self,
        cmd: &ChangeInterestRate,
    ) -> Result<Vec<AccountEvent>, DomainError> {
        if !self.created {
            return Err(DomainError::not_found());
        }
        self.ensure_owner(cmd.owner_id)?;
        self.ensure_account_id(cmd.account_id)?;

        let posted = calculator::rate_change_entry(
            &self.transactions,
            self.interest_rate,
            cmd.new_rate,
            cmd.occurred_at,
        )?;

        Ok(vec![AccountEvent::InterestRateChanged(
            InterestRateChanged {
                owner_id: cmd.owner_id,
                account_id: cmd.account_id,
                old_rate: self.interest_rate,
                new_rate: cmd.new_rate,
                posted,
                occurred_at: cmd.occurred_at,
            },
        )])
    }
}
