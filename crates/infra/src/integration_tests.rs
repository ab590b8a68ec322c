//! Integration tests for the full event-sourced pipeline.
//!
//! Command → EventStore → EventBus → Projection → ReadModel

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use uuid::Uuid;

use piggybank_core::{AggregateId, ExpectedVersion, OwnerId};
use piggybank_events::{EventBus, EventEnvelope, InMemoryEventBus};
use piggybank_ledger::{
    Account, AccountCommand, AccountEvent, AccountId, AccountNumber, AccountOpened,
    ChangeInterestRate, InterestRate, OpenAccount, RecordTransaction, TransactionKind,
};

use crate::command_dispatcher::{CommandDispatcher, DispatchError};
use crate::event_store::{EventStore, EventStoreError, InMemoryEventStore, UncommittedEvent};
use crate::projections::account_summaries::{AccountSummariesProjection, AccountSummary};
use crate::read_model::InMemoryOwnerStore;

const AGGREGATE_TYPE: &str = "bank.account";

fn test_owner_id() -> OwnerId {
    OwnerId::new()
}

fn test_account_id() -> AccountId {
    AccountId::new(AggregateId::new())
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
}

fn rate(pct: Decimal) -> InterestRate {
    InterestRate::new(pct).unwrap()
}

type TestDispatcher =
    CommandDispatcher<InMemoryEventStore, Arc<InMemoryEventBus<EventEnvelope<serde_json::Value>>>>;
type TestProjection =
    AccountSummariesProjection<Arc<InMemoryOwnerStore<AccountId, AccountSummary>>>;

fn setup() -> (TestDispatcher, Arc<TestProjection>) {
    piggybank_observability::init();

    let store = InMemoryEventStore::new();
    let bus: Arc<InMemoryEventBus<EventEnvelope<serde_json::Value>>> =
        Arc::new(InMemoryEventBus::new());
    let dispatcher = CommandDispatcher::new(store, bus.clone());
    let read_model_store: Arc<InMemoryOwnerStore<AccountId, AccountSummary>> =
        Arc::new(InMemoryOwnerStore::new());
    let projection = Arc::new(AccountSummariesProjection::new(read_model_store));

    // Subscribe to the bus BEFORE any events are published.
    let projection_clone = projection.clone();
    let bus_clone = bus.clone();
    let (ready_tx, ready_rx) = std::sync::mpsc::channel::<()>();
    std::thread::spawn(move || {
        let sub = bus_clone.subscribe();
        let _ = ready_tx.send(());
        while let Ok(env) = sub.recv() {
            if let Err(e) = projection_clone.apply_envelope(&env) {
                eprintln!("failed to apply envelope: {e:?}");
            }
        }
    });
    let _ = ready_rx.recv_timeout(std::time::Duration::from_secs(1));

    (dispatcher, projection)
}

/// The subscriber thread processes events asynchronously; give it a moment.
fn wait_for_processing() {
    std::thread::sleep(std::time::Duration::from_millis(50));
}

fn open(
    dispatcher: &TestDispatcher,
    owner_id: OwnerId,
    account_id: AccountId,
    name: &str,
    pct: Decimal,
) {
    dispatcher
        .dispatch(
            owner_id,
            account_id.0,
            AGGREGATE_TYPE,
            AccountCommand::OpenAccount(OpenAccount {
                owner_id,
                account_id,
                name: name.to_string(),
                account_number: AccountNumber::generate(),
                interest_rate: rate(pct),
                occurred_at: t0(),
            }),
            |_, id| Account::empty(AccountId::new(id)),
        )
        .unwrap();
}

fn deposit(
    dispatcher: &TestDispatcher,
    owner_id: OwnerId,
    account_id: AccountId,
    amount: Decimal,
    at: DateTime<Utc>,
) -> Result<(), DispatchError> {
    dispatcher
        .dispatch(
            owner_id,
            account_id.0,
            AGGREGATE_TYPE,
            AccountCommand::RecordTransaction(RecordTransaction {
                owner_id,
                account_id,
                kind: TransactionKind::Deposit,
                amount,
                description: "Allowance".to_string(),
                occurred_at: at,
            }),
            |_, id| Account::empty(AccountId::new(id)),
        )
        .map(|_| ())
}

#[test]
fn deposits_and_rate_change_flow_into_the_read_model() {
    let (dispatcher, projection) = setup();
    let owner_id = test_owner_id();
    let account_id = test_account_id();

    open(&dispatcher, owner_id, account_id, "Maya's savings", dec!(3.65));
    deposit(&dispatcher, owner_id, account_id, dec!(1000), t0()).unwrap();
    // 10 days at 3.65%/year on 1000 accrues exactly 1.00.
    deposit(
        &dispatcher,
        owner_id,
        account_id,
        dec!(10),
        t0() + Duration::days(10),
    )
    .unwrap();

    dispatcher
        .dispatch(
            owner_id,
            account_id.0,
            AGGREGATE_TYPE,
            AccountCommand::ChangeInterestRate(ChangeInterestRate {
                owner_id,
                account_id,
                new_rate: rate(dec!(7.30)),
                occurred_at: t0() + Duration::days(20),
            }),
            |_, id| Account::empty(AccountId::new(id)),
        )
        .unwrap();

    wait_for_processing();

    let summary = projection.get(owner_id, &account_id).unwrap();
    assert_eq!(summary.name, "Maya's savings");
    // 1011 carried another 10 days at 3.65% before the rate switch.
    assert_eq!(summary.balance, dec!(1012.011));
    assert_eq!(summary.interest_rate, rate(dec!(7.30)));
    assert_eq!(summary.last_activity_at, Some(t0() + Duration::days(20)));
}

#[test]
fn owner_isolation_preserved_across_read_models() {
    let (dispatcher, projection) = setup();
    let owner1 = test_owner_id();
    let owner2 = test_owner_id();
    let account1 = test_account_id();
    let account2 = test_account_id();

    open(&dispatcher, owner1, account1, "Maya's savings", dec!(2));
    open(&dispatcher, owner2, account2, "Leo's savings", dec!(3));
    deposit(&dispatcher, owner1, account1, dec!(100), t0()).unwrap();

    wait_for_processing();

    let owner1_accounts = projection.list(owner1);
    assert_eq!(owner1_accounts.len(), 1);
    assert_eq!(owner1_accounts[0].account_id, account1);
    assert_eq!(owner1_accounts[0].balance, dec!(100));

    let owner2_accounts = projection.list(owner2);
    assert_eq!(owner2_accounts.len(), 1);
    assert_eq!(owner2_accounts[0].account_id, account2);

    assert!(projection.get(owner1, &account2).is_none());
    assert!(projection.get(owner2, &account1).is_none());
}

#[test]
fn rejected_command_leaves_the_read_model_unchanged() {
    let (dispatcher, projection) = setup();
    let owner_id = test_owner_id();
    let account_id = test_account_id();

    open(&dispatcher, owner_id, account_id, "Maya's savings", dec!(2));
    deposit(&dispatcher, owner_id, account_id, dec!(100), t0()).unwrap();

    let err = deposit(&dispatcher, owner_id, account_id, dec!(0), t0()).unwrap_err();
    assert!(matches!(err, DispatchError::Validation(_)));

    let err = deposit(
        &dispatcher,
        owner_id,
        account_id,
        dec!(10),
        t0() - Duration::hours(1),
    )
    .unwrap_err();
    assert!(matches!(err, DispatchError::InvariantViolation(_)));

    wait_for_processing();

    let summary = projection.get(owner_id, &account_id).unwrap();
    assert_eq!(summary.balance, dec!(100));
}

#[test]
fn commands_against_a_foreign_owner_stream_are_rejected() {
    let (dispatcher, _projection) = setup();
    let owner_id = test_owner_id();
    let intruder = test_owner_id();
    let account_id = test_account_id();

    open(&dispatcher, owner_id, account_id, "Maya's savings", dec!(2));

    // The intruder's stream for this aggregate is empty, so the account
    // appears unopened from their side.
    let err = deposit(&dispatcher, intruder, account_id, dec!(10), t0()).unwrap_err();
    assert!(matches!(err, DispatchError::NotFound));
}

#[test]
fn stale_append_fails_the_optimistic_concurrency_check() {
    let store = InMemoryEventStore::new();
    let owner_id = test_owner_id();
    let account_id = test_account_id();

    let opened = AccountEvent::AccountOpened(AccountOpened {
        owner_id,
        account_id,
        name: "Maya's savings".to_string(),
        account_number: AccountNumber::generate(),
        interest_rate: rate(dec!(2)),
        occurred_at: t0(),
    });
    let uncommitted = |ev: &AccountEvent| {
        UncommittedEvent::from_typed(owner_id, account_id.0, AGGREGATE_TYPE, Uuid::now_v7(), ev)
            .unwrap()
    };

    store
        .append(vec![uncommitted(&opened)], ExpectedVersion::Exact(0))
        .unwrap();

    // A second writer still at version 0 must not be able to append.
    let err = store
        .append(vec![uncommitted(&opened)], ExpectedVersion::Exact(0))
        .unwrap_err();
    assert!(matches!(err, EventStoreError::Concurrency(_)));
}

#[test]
fn projection_rebuilds_deterministically_from_the_stream() {
    let (dispatcher, projection) = setup();
    let owner_id = test_owner_id();
    let account_id = test_account_id();

    open(&dispatcher, owner_id, account_id, "Maya's savings", dec!(3.65));
    deposit(&dispatcher, owner_id, account_id, dec!(1000), t0()).unwrap();
    deposit(
        &dispatcher,
        owner_id,
        account_id,
        dec!(10),
        t0() + Duration::days(10),
    )
    .unwrap();

    wait_for_processing();
    let live = projection.get(owner_id, &account_id).unwrap();

    let (store, _bus) = dispatcher.into_parts();
    let envelopes = store
        .load_stream(owner_id, account_id.0)
        .unwrap()
        .iter()
        .map(|e| e.to_envelope())
        .collect::<Vec<_>>();

    projection.rebuild_from_scratch(envelopes).unwrap();
    let rebuilt = projection.get(owner_id, &account_id).unwrap();

    assert_eq!(rebuilt, live);
    assert_eq!(rebuilt.balance, dec!(1011));
}
