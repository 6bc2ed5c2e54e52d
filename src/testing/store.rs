use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use super::{read, write};
use crate::entity::BillableUpdate;
use crate::error::{CashierError, Result};
use crate::storage::BillingStore;
use crate::subscription::Subscription;

/// In-memory billing store for testing.
///
/// Wraps data in Arc for cheap cloning.
#[derive(Default, Clone)]
pub struct InMemoryBillingStore {
    inner: Arc<InMemoryBillingStoreInner>,
}

#[derive(Default)]
struct InMemoryBillingStoreInner {
    billables: RwLock<HashMap<String, BillableUpdate>>,
    subscriptions: RwLock<HashMap<String, Vec<Subscription>>>,
    fail_billable_writes: AtomicBool,
}

impl InMemoryBillingStore {
    /// Create a new in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the billing fields saved for an entity (for testing).
    pub fn billable(&self, billable_id: &str) -> Option<BillableUpdate> {
        read(&self.inner.billables).get(billable_id).cloned()
    }

    /// Seed a subscription directly, bypassing the processor.
    pub fn insert_subscription(&self, billable_id: &str, subscription: Subscription) {
        write(&self.inner.subscriptions)
            .entry(billable_id.to_string())
            .or_default()
            .push(subscription);
    }

    /// Make every `save_billable` call fail, simulating a lost local write.
    pub fn fail_billable_writes(&self, fail: bool) {
        self.inner.fail_billable_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl BillingStore for InMemoryBillingStore {
    async fn subscriptions(&self, billable_id: &str) -> Result<Vec<Subscription>> {
        let mut subscriptions = read(&self.inner.subscriptions)
            .get(billable_id)
            .cloned()
            .unwrap_or_default();
        subscriptions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(subscriptions)
    }

    async fn save_subscription(&self, billable_id: &str, subscription: &Subscription) -> Result<()> {
        let mut store = write(&self.inner.subscriptions);
        let rows = store.entry(billable_id.to_string()).or_default();

        match rows.iter_mut().find(|s| s.processor_id == subscription.processor_id) {
            Some(existing) => *existing = subscription.clone(),
            None => rows.push(subscription.clone()),
        }
        Ok(())
    }

    async fn save_billable(&self, billable_id: &str, update: &BillableUpdate) -> Result<()> {
        if self.inner.fail_billable_writes.load(Ordering::SeqCst) {
            return Err(CashierError::store("billable write interrupted"));
        }

        let mut store = write(&self.inner.billables);
        let record = store.entry(billable_id.to_string()).or_default();
        if let Some(processor_id) = &update.processor_id {
            record.processor_id = Some(processor_id.clone());
        }
        if let Some(details) = &update.payment_details {
            record.payment_details = Some(details.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::PaymentDetails;
    use crate::subscription::SubscriptionStatus;
    use chrono::{Duration, Utc};

    fn subscription(id: &str, age_days: i64) -> Subscription {
        Subscription {
            name: "default".to_string(),
            processor_id: id.to_string(),
            plan: "monthly".to_string(),
            status: SubscriptionStatus::Active,
            trial_ends_at: None,
            ends_at: None,
            created_at: Utc::now() - Duration::days(age_days),
        }
    }

    #[tokio::test]
    async fn test_subscriptions_newest_first() {
        let store = InMemoryBillingStore::new();
        store.insert_subscription("user_1", subscription("old", 10));
        store.insert_subscription("user_1", subscription("new", 1));

        let subs = store.subscriptions("user_1").await.unwrap();
        assert_eq!(subs[0].processor_id, "new");
        assert_eq!(subs[1].processor_id, "old");
        assert!(store.subscriptions("user_2").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_save_subscription_upserts() {
        let store = InMemoryBillingStore::new();
        let mut sub = subscription("sub_1", 1);
        store.save_subscription("user_1", &sub).await.unwrap();

        sub.plan = "yearly".to_string();
        store.save_subscription("user_1", &sub).await.unwrap();

        let subs = store.subscriptions("user_1").await.unwrap();
        assert_eq!(subs.len(), 1);
        assert_eq!(subs[0].plan, "yearly");
    }

    #[tokio::test]
    async fn test_save_billable_keeps_unset_fields() {
        let store = InMemoryBillingStore::new();
        store
            .save_billable("user_1", &BillableUpdate {
                processor_id: Some("cus_1".to_string()),
                payment_details: None,
            })
            .await
            .unwrap();
        store
            .save_billable("user_1", &BillableUpdate::payment_details(PaymentDetails::paypal("a@b.c")))
            .await
            .unwrap();

        let record = store.billable("user_1").unwrap();
        assert_eq!(record.processor_id.as_deref(), Some("cus_1"));
        assert!(record.payment_details.is_some());

        store.fail_billable_writes(true);
        assert!(store.save_billable("user_1", &BillableUpdate::default()).await.is_err());
    }
}
