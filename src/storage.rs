//! Storage trait for billing data.
//!
//! Implement [`BillingStore`] against your host's database. An in-memory
//! implementation lives in `testing` behind the `test-billing` feature.

use async_trait::async_trait;

use crate::entity::BillableUpdate;
use crate::error::Result;
use crate::subscription::Subscription;

/// Trait for storing billing data.
///
/// Writes are expected to be atomic per record. No transaction spans a
/// processor call and the following write, so a failure in between leaves
/// the local copy stale until it is reconciled externally.
#[async_trait]
pub trait BillingStore: Send + Sync {
    /// Load the entity's subscriptions ordered by creation time, newest first.
    async fn subscriptions(&self, billable_id: &str) -> Result<Vec<Subscription>>;

    /// Insert or update a subscription, matched on its processor ID.
    async fn save_subscription(&self, billable_id: &str, subscription: &Subscription) -> Result<()>;

    /// Assign the given fields on the billable record and save it.
    async fn save_billable(&self, billable_id: &str, update: &BillableUpdate) -> Result<()>;
}
