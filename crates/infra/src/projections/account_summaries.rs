use std::collections::HashMap;
use std::sync::RwLock;

use rust_decimal::Decimal;
use serde_json::Value as JsonValue;
use thiserror::Error;

use chrono::{DateTime, Utc};
use piggybank_core::{AggregateId, OwnerId};
use piggybank_events::EventEnvelope;
use piggybank_ledger::{AccountEvent, AccountId, AccountNumber, InterestRate};

use crate::read_model::OwnerStore;

/// Queryable per-account summary: posted balance and current rate.
///
/// `balance` is the running balance of the most recent posted transaction,
/// not a live interest projection; displays that need accrued-to-now figures
/// project from the aggregate instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountSummary {
    pub account_id: AccountId,
    pub name: String,
    pub account_number: Option<AccountNumber>,
    pub balance: Decimal,
    pub interest_rate: InterestRate,
    pub last_activity_at: Option<DateTime<Utc>>,
}

/// Owner+aggregate cursor to support at-least-once delivery (idempotent projection).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
struct CursorKey {
    owner_id: OwnerId,
    aggregate_id: AggregateId,
}

#[derive(Debug, Error)]
pub enum SummaryProjectionError {
    #[error("failed to deserialize account event: {0}")]
    Deserialize(String),

    #[error("owner isolation violation: {0}")]
    OwnerIsolation(String),

    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Account summaries projection.
///
/// Consumes published envelopes (JSON payloads) and maintains an
/// owner-isolated read model. Read models are disposable and rebuildable
/// from the event stream.
#[derive(Debug)]
pub struct AccountSummariesProjection<S>
where
    S: OwnerStore<AccountId, AccountSummary>,
{
    store: S,
    cursors: RwLock<HashMap<CursorKey, u64>>,
}

impl<S> AccountSummariesProjection<S>
where
    S: OwnerStore<AccountId, AccountSummary>,
{
    pub fn new(store: S) -> Self {
        Self {
            store,
            cursors: RwLock::new(HashMap::new()),
        }
    }

    /// Query the summary for one owner/account.
    pub fn get(&self, owner_id: OwnerId, account_id: &AccountId) -> Option<AccountSummary> {
        self.store.get(owner_id, account_id)
    }

    /// List all account summaries for an owner.
    pub fn list(&self, owner_id: OwnerId) -> Vec<AccountSummary> {
        self.store.list(owner_id)
    }

    /// Apply a published envelope into the projection.
    ///
    /// - Enforces owner isolation
    /// - Enforces monotonic sequence per (owner, aggregate) stream
    /// - Idempotent for at-least-once delivery (replays <= cursor are ignored)
    pub fn apply_envelope(
        &self,
        envelope: &EventEnvelope<JsonValue>,
    ) -> Result<(), SummaryProjectionError> {
        let owner_id = envelope.owner_id();
        let aggregate_id = envelope.aggregate_id();
        let seq = envelope.sequence_number();

        // Cursor check (per owner + aggregate stream).
        if let Ok(mut cursors) = self.cursors.write() {
            let key = CursorKey {
                owner_id,
                aggregate_id,
            };
            let last = *cursors.get(&key).unwrap_or(&0);

            if seq == 0 {
                return Err(SummaryProjectionError::NonMonotonicSequence { last, found: seq });
            }

            if seq <= last {
                // Duplicate or replay; safe to ignore.
                return Ok(());
            }

            if seq != last + 1 && last != 0 {
                return Err(SummaryProjectionError::NonMonotonicSequence { last, found: seq });
            }

            let event: AccountEvent = serde_json::from_value(envelope.payload().clone())
                .map_err(|e| SummaryProjectionError::Deserialize(e.to_string()))?;

            // Validate owner isolation at the event level.
            let (event_owner, account_id) = match &event {
                AccountEvent::AccountOpened(e) => (e.owner_id, e.account_id),
                AccountEvent::TransactionPosted(e) => (e.owner_id, e.account_id),
                AccountEvent::InterestRateChanged(e) => (e.owner_id, e.account_id),
            };

            if event_owner != owner_id {
                return Err(SummaryProjectionError::OwnerIsolation(
                    "event owner_id does not match envelope owner_id".to_string(),
                ));
            }

            if account_id.0 != aggregate_id {
                return Err(SummaryProjectionError::OwnerIsolation(
                    "event account_id does not match envelope aggregate_id".to_string(),
                ));
            }

            match event {
                AccountEvent::AccountOpened(e) => {
                    self.store.upsert(
                        owner_id,
                        e.account_id,
                        AccountSummary {
                            account_id: e.account_id,
                            name: e.name,
                            account_number: Some(e.account_number),
                            balance: Decimal::ZERO,
                            interest_rate: e.interest_rate,
                            last_activity_at: Some(e.occurred_at),
                        },
                    );
                }
                AccountEvent::TransactionPosted(e) => {
                    let mut summary =
                        self.store
                            .get(owner_id, &e.account_id)
                            .unwrap_or(AccountSummary {
                                account_id: e.account_id,
                                name: String::new(),
                                account_number: None,
                                balance: Decimal::ZERO,
                                interest_rate: InterestRate::ZERO,
                                last_activity_at: None,
                            });
                    summary.balance = e.transaction.running_balance;
                    summary.last_activity_at = Some(e.transaction.timestamp);
                    self.store.upsert(owner_id, e.account_id, summary);
                }
                AccountEvent::InterestRateChanged(e) => {
                    let mut summary =
                        self.store
                            .get(owner_id, &e.account_id)
                            .unwrap_or(AccountSummary {
                                account_id: e.account_id,
                                name: String::new(),
                                account_number: None,
                                balance: Decimal::ZERO,
                                interest_rate: InterestRate::ZERO,
                                last_activity_at: None,
                            });
                    summary.balance = e.posted.running_balance;
                    summary.interest_rate = e.new_rate;
                    summary.last_activity_at = Some(e.posted.timestamp);
                    self.store.upsert(owner_id, e.account_id, summary);
                }
            }

            // Advance cursor after successful apply.
            cursors.insert(key, seq);
        }

        Ok(())
    }

    /// Rebuild the read model from scratch by replaying envelopes.
    pub fn rebuild_from_scratch(
        &self,
        envelopes: impl IntoIterator<Item = EventEnvelope<JsonValue>>,
    ) -> Result<(), SummaryProjectionError> {
        if let Ok(mut cursors) = self.cursors.write() {
            cursors.clear();
        }

        let mut envs: Vec<_> = envelopes.into_iter().collect();

        // Clear read model per owner before rebuilding.
        {
            let mut owners = envs.iter().map(|e| e.owner_id()).collect::<Vec<_>>();
            owners.sort_by_key(|o| *o.as_uuid().as_bytes());
            owners.dedup();
            for o in owners {
                self.store.clear_owner(o);
            }
        }

        // Deterministic replay order: owner, aggregate, sequence.
        envs.sort_by_key(|e| {
            (
                *e.owner_id().as_uuid().as_bytes(),
                *e.aggregate_id().as_uuid().as_bytes(),
                e.sequence_number(),
            )
        });

        for env in &envs {
            self.apply_envelope(env)?;
        }

        Ok(())
    }
}
