//! Projection implementations (read model builders).
//!
//! Projections consume published account events and maintain query-optimized
//! read models. They are rebuildable from the event stream, owner-isolated,
//! and idempotent under at-least-once delivery.

pub mod account_summaries;

pub use account_summaries::{AccountSummariesProjection, AccountSummary, SummaryProjectionError};
