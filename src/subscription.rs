//! Subscription state for billable entities.
//!
//! Resolves the canonical subscription for a name, answers trial, plan and
//! entitlement questions, and handles the processor-side lifecycle (coupons,
//! plan swaps, cancellation). Subscriptions are never deleted, only marked
//! cancelled.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::audit::{BillingAuditEvent, BillingAuditLogger};
use crate::cashier::Cashier;
use crate::charge::format_processor_amount;
use crate::client::GatewayResponse;
use crate::entity::BillableEntity;
use crate::error::{CashierError, GatewayError, Result};
use crate::options::{Params, params};
use crate::storage::BillingStore;

/// Processor-reported subscription status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    /// Subscription is active and billing.
    Active,
    /// A renewal payment failed; the processor keeps retrying.
    PastDue,
    /// Subscription has been canceled on the processor.
    Canceled,
}

impl SubscriptionStatus {
    /// Parse from the processor's status string.
    #[must_use]
    pub fn from_processor(status: &str) -> Self {
        match status {
            "Active" | "active" | "Pending" | "pending" => Self::Active,
            "Past Due" | "past_due" => Self::PastDue,
            _ => Self::Canceled, // Expired and unknown statuses grant nothing
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::PastDue => "past_due",
            Self::Canceled => "canceled",
        }
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A subscription owned by a billable entity.
///
/// `name` is unique per entity only in the sense that the most recently
/// created subscription with a given name is the canonical one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Logical name ("default", "main", ...).
    pub name: String,
    /// Processor-side subscription ID.
    pub processor_id: String,
    /// Plan identifier.
    pub plan: String,
    /// Processor-reported status.
    pub status: SubscriptionStatus,
    /// End of the subscription trial, if any.
    pub trial_ends_at: Option<DateTime<Utc>>,
    /// When access ends after cancellation.
    pub ends_at: Option<DateTime<Utc>>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

impl Subscription {
    /// Check if the subscription is within its trial period.
    #[must_use]
    pub fn on_trial(&self) -> bool {
        self.trial_ends_at.is_some_and(|end| Utc::now() < end)
    }

    /// Check if the subscription is cancelled but access has not ended yet.
    #[must_use]
    pub fn on_grace_period(&self) -> bool {
        self.ends_at.is_some_and(|end| Utc::now() < end)
    }

    /// Check if the subscription has been cancelled.
    #[must_use]
    pub fn cancelled(&self) -> bool {
        self.ends_at.is_some() || self.status == SubscriptionStatus::Canceled
    }

    /// Check if the subscription is active (not cancelled, or still in grace).
    #[must_use]
    pub fn active(&self) -> bool {
        (self.ends_at.is_none() && self.status != SubscriptionStatus::Canceled)
            || self.on_grace_period()
    }

    /// Check if the subscription grants access: active or still on trial.
    #[must_use]
    pub fn valid(&self) -> bool {
        self.active() || self.on_trial()
    }

    /// Check if a renewal payment has failed.
    #[must_use]
    pub fn is_past_due(&self) -> bool {
        self.status == SubscriptionStatus::PastDue
    }

    /// Check if the subscription is on exactly the given plan.
    #[must_use]
    pub fn on_plan(&self, plan: &str) -> bool {
        self.plan == plan
    }
}

/// Pick the canonical subscription for `name`: the most recently created one.
///
/// Ties on creation time resolve to the earliest entry in `subscriptions`.
#[must_use]
pub fn find_named<'a>(subscriptions: &'a [Subscription], name: &str) -> Option<&'a Subscription> {
    subscriptions
        .iter()
        .filter(|s| s.name == name)
        .reduce(|best, s| if s.created_at > best.created_at { s } else { best })
}

/// Check if any subscription, valid or not, is on the given plan.
#[must_use]
pub fn any_on_plan(subscriptions: &[Subscription], plan: &str) -> bool {
    subscriptions.iter().any(|s| s.on_plan(plan))
}

/// Subscription as the processor reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorSubscription {
    /// Processor subscription ID.
    pub id: String,
    /// Plan identifier.
    pub plan_id: String,
    /// Status string as reported ("Active", "Past Due", "Canceled", ...).
    pub status: String,
    /// Token of the payment method the subscription bills.
    pub payment_method_token: String,
    /// Discounts currently applied.
    pub discounts: Vec<Discount>,
    /// Date through which the subscription has been paid.
    pub paid_through_date: Option<DateTime<Utc>>,
    /// End of the processor-side trial.
    pub trial_ends_at: Option<DateTime<Utc>>,
}

/// A discount applied to a processor subscription.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Discount {
    /// Discount (coupon) ID.
    pub id: String,
    /// Amount taken off each billing cycle.
    pub amount: Decimal,
}

/// A plan as configured on the processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,
    pub price: Decimal,
    /// Billing frequency in months.
    pub billing_frequency: u32,
}

/// Trait for processor subscription operations.
#[allow(async_fn_in_trait)]
pub trait SubscriptionGateway: Send + Sync {
    /// Create a subscription.
    async fn create_subscription(
        &self,
        params: Params,
    ) -> std::result::Result<GatewayResponse<ProcessorSubscription>, GatewayError>;

    /// Get subscription details from the processor.
    async fn find_subscription(
        &self,
        subscription_id: &str,
    ) -> std::result::Result<ProcessorSubscription, GatewayError>;

    /// Update a subscription (payment method, discounts, plan).
    async fn update_subscription(
        &self,
        subscription_id: &str,
        params: Params,
    ) -> std::result::Result<GatewayResponse<ProcessorSubscription>, GatewayError>;

    /// Cancel a subscription immediately on the processor.
    async fn cancel_subscription(
        &self,
        subscription_id: &str,
    ) -> std::result::Result<GatewayResponse<ProcessorSubscription>, GatewayError>;

    /// Look up a plan.
    async fn find_plan(&self, plan_id: &str) -> std::result::Result<Plan, GatewayError>;
}

// =============================================================================
// State resolution
// =============================================================================

impl<S, G, A> Cashier<S, G, A>
where
    S: BillingStore,
{
    /// Get all subscriptions for the entity, newest first.
    pub async fn subscriptions(&self, entity: &impl BillableEntity) -> Result<Vec<Subscription>> {
        self.store.subscriptions(entity.billable_id()).await
    }

    /// Get the canonical subscription with the given name.
    pub async fn subscription(
        &self,
        entity: &impl BillableEntity,
        name: &str,
    ) -> Result<Option<Subscription>> {
        let subscriptions = self.subscriptions(entity).await?;
        let found = find_named(&subscriptions, name).cloned();

        tracing::debug!(
            billable_id = %entity.billable_id(),
            name = %name,
            found = found.is_some(),
            "resolved subscription"
        );

        Ok(found)
    }

    /// Check if the entity's trial-expiration timestamp is set and in the future.
    #[must_use]
    pub fn on_generic_trial(&self, entity: &impl BillableEntity) -> bool {
        entity.trial_ends_at().is_some_and(|end| end > Utc::now())
    }

    /// Check if the entity is on any trial.
    ///
    /// A generic trial short-circuits to `true`; otherwise the default
    /// subscription's own trial decides.
    pub async fn on_trial(&self, entity: &impl BillableEntity) -> Result<bool> {
        if self.on_generic_trial(entity) {
            return Ok(true);
        }
        self.on_trial_for(entity, &self.config.default_subscription, None).await
    }

    /// Check if the named subscription is on trial, optionally on a specific plan.
    pub async fn on_trial_for(
        &self,
        entity: &impl BillableEntity,
        name: &str,
        plan: Option<&str>,
    ) -> Result<bool> {
        let Some(subscription) = self.subscription(entity, name).await? else {
            return Ok(false);
        };

        Ok(match plan {
            None => subscription.on_trial(),
            Some(plan) => subscription.on_trial() && subscription.on_plan(plan),
        })
    }

    /// Check if the named subscription is valid, optionally on a specific plan.
    pub async fn subscribed(
        &self,
        entity: &impl BillableEntity,
        name: &str,
        plan: Option<&str>,
    ) -> Result<bool> {
        let Some(subscription) = self.subscription(entity, name).await? else {
            return Ok(false);
        };

        Ok(match plan {
            None => subscription.valid(),
            Some(plan) => subscription.valid() && subscription.on_plan(plan),
        })
    }

    /// Check if the named subscription is valid and on any of the given plans.
    pub async fn subscribed_to_plan<I, P>(
        &self,
        entity: &impl BillableEntity,
        plans: I,
        name: &str,
    ) -> Result<bool>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<str>,
    {
        let Some(subscription) = self.subscription(entity, name).await? else {
            return Ok(false);
        };

        if !subscription.valid() {
            return Ok(false);
        }

        Ok(plans.into_iter().any(|plan| subscription.on_plan(plan.as_ref())))
    }

    /// Check if any subscription, regardless of name or validity, is on the plan.
    ///
    /// This answers plan membership, not entitlement; see
    /// [`subscribed_to_plan`](Self::subscribed_to_plan) for the latter.
    pub async fn on_plan(&self, entity: &impl BillableEntity, plan: &str) -> Result<bool> {
        let subscriptions = self.subscriptions(entity).await?;
        Ok(any_on_plan(&subscriptions, plan))
    }

    /// Resolve a named subscription or fail with `InvalidSubscription`.
    pub(crate) async fn require_subscription(
        &self,
        entity: &impl BillableEntity,
        name: &str,
    ) -> Result<Subscription> {
        self.subscription(entity, name)
            .await?
            .ok_or_else(|| CashierError::InvalidSubscription(name.to_string()))
    }
}

// =============================================================================
// Lifecycle
// =============================================================================

impl<S, G, A> Cashier<S, G, A>
where
    S: BillingStore,
    G: SubscriptionGateway,
    A: BillingAuditLogger,
{
    /// Apply a coupon to the named subscription.
    ///
    /// With `remove_others`, discounts already on the subscription are removed
    /// in the same update.
    ///
    /// # Errors
    ///
    /// Returns `InvalidSubscription` if the entity has no subscription with
    /// that name, or `CouponApplicationFailed` if the subscription has ended or
    /// the processor refuses.
    pub async fn apply_coupon(
        &self,
        entity: &impl BillableEntity,
        coupon: &str,
        name: &str,
        remove_others: bool,
    ) -> Result<()> {
        let subscription = self.require_subscription(entity, name).await?;

        if !subscription.active() {
            return Err(CashierError::CouponApplicationFailed(format!(
                "subscription '{}' has ended",
                name
            )));
        }

        let remove: Vec<String> = if remove_others {
            self.gateway
                .find_subscription(&subscription.processor_id)
                .await?
                .discounts
                .into_iter()
                .map(|d| d.id)
                .collect()
        } else {
            Vec::new()
        };

        let request = params(json!({
            "discounts": {
                "add": [{ "inheritedFromId": coupon }],
                "remove": remove,
            }
        }));

        self.gateway
            .update_subscription(&subscription.processor_id, request)
            .await?
            .into_result(CashierError::CouponApplicationFailed)?;

        tracing::info!(
            billable_id = %entity.billable_id(),
            subscription_id = %subscription.processor_id,
            coupon = %coupon,
            "coupon applied"
        );

        self.audit
            .log(BillingAuditEvent::CouponApplied {
                billable_id: entity.billable_id().to_string(),
                subscription_id: subscription.processor_id,
                coupon: coupon.to_string(),
            })
            .await;

        Ok(())
    }

    /// Move the named subscription to a different plan.
    ///
    /// Charges are prorated by the processor.
    pub async fn swap_plan(
        &self,
        entity: &impl BillableEntity,
        name: &str,
        plan: &str,
    ) -> Result<Subscription> {
        let mut subscription = self.require_subscription(entity, name).await?;

        if !subscription.active() {
            return Err(CashierError::SubscriptionUpdateFailed(format!(
                "subscription '{}' is cancelled",
                name
            )));
        }

        let remote_plan = self.gateway.find_plan(plan).await?;

        let request = params(json!({
            "planId": remote_plan.id,
            "price": format_processor_amount(remote_plan.price),
            "options": { "prorateCharges": true },
        }));

        let remote = self
            .gateway
            .update_subscription(&subscription.processor_id, request)
            .await?
            .into_result(CashierError::SubscriptionUpdateFailed)?;

        let previous_plan = std::mem::replace(&mut subscription.plan, remote.plan_id);
        subscription.status = SubscriptionStatus::from_processor(&remote.status);
        self.store
            .save_subscription(entity.billable_id(), &subscription)
            .await?;

        self.audit
            .log(BillingAuditEvent::SubscriptionSwapped {
                billable_id: entity.billable_id().to_string(),
                subscription_id: subscription.processor_id.clone(),
                from_plan: previous_plan,
                to_plan: subscription.plan.clone(),
            })
            .await;

        Ok(subscription)
    }

    /// Cancel the named subscription at the end of the paid period.
    ///
    /// Access continues until the trial ends (when on trial) or until the
    /// processor's paid-through date.
    pub async fn cancel_subscription(
        &self,
        entity: &impl BillableEntity,
        name: &str,
    ) -> Result<Subscription> {
        self.cancel(entity, name, false).await
    }

    /// Cancel the named subscription and end access immediately.
    pub async fn cancel_subscription_now(
        &self,
        entity: &impl BillableEntity,
        name: &str,
    ) -> Result<Subscription> {
        self.cancel(entity, name, true).await
    }

    async fn cancel(
        &self,
        entity: &impl BillableEntity,
        name: &str,
        immediate: bool,
    ) -> Result<Subscription> {
        let mut subscription = self.require_subscription(entity, name).await?;

        let remote = self
            .gateway
            .cancel_subscription(&subscription.processor_id)
            .await?
            .into_result(CashierError::SubscriptionUpdateFailed)?;

        let now = Utc::now();
        subscription.ends_at = Some(if immediate {
            now
        } else if subscription.on_trial() {
            subscription.trial_ends_at.unwrap_or(now)
        } else {
            remote.paid_through_date.unwrap_or(now)
        });
        subscription.status = SubscriptionStatus::Canceled;

        self.store
            .save_subscription(entity.billable_id(), &subscription)
            .await?;

        self.audit
            .log(BillingAuditEvent::SubscriptionCancelled {
                billable_id: entity.billable_id().to_string(),
                subscription_id: subscription.processor_id.clone(),
                immediate,
            })
            .await;

        Ok(subscription)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn sub(name: &str, plan: &str, created_offset_days: i64) -> Subscription {
        Subscription {
            name: name.to_string(),
            processor_id: format!("sub_{}_{}", name, created_offset_days),
            plan: plan.to_string(),
            status: SubscriptionStatus::Active,
            trial_ends_at: None,
            ends_at: None,
            created_at: Utc::now() + Duration::days(created_offset_days),
        }
    }

    #[test]
    fn test_status_from_processor() {
        assert_eq!(SubscriptionStatus::from_processor("Active"), SubscriptionStatus::Active);
        assert_eq!(SubscriptionStatus::from_processor("Past Due"), SubscriptionStatus::PastDue);
        assert_eq!(SubscriptionStatus::from_processor("Canceled"), SubscriptionStatus::Canceled);
        assert_eq!(SubscriptionStatus::from_processor("Expired"), SubscriptionStatus::Canceled);
    }

    #[test]
    fn test_find_named_picks_most_recent() {
        let subs = vec![
            sub("default", "monthly", -30),
            sub("default", "yearly", -1),
            sub("other", "monthly", 0),
        ];

        let found = find_named(&subs, "default").unwrap();
        assert_eq!(found.plan, "yearly");
        assert!(find_named(&subs, "missing").is_none());
        // Exact, case-sensitive match.
        assert!(find_named(&subs, "Default").is_none());
    }

    #[test]
    fn test_find_named_ignores_input_order() {
        let subs = vec![sub("default", "old", -10), sub("default", "new", -2)];
        assert_eq!(find_named(&subs, "default").unwrap().plan, "new");
    }

    #[test]
    fn test_validity_predicates() {
        let mut s = sub("default", "monthly", 0);
        assert!(s.active());
        assert!(s.valid());
        assert!(!s.cancelled());

        // Cancelled, still in grace period
        s.ends_at = Some(Utc::now() + Duration::days(5));
        s.status = SubscriptionStatus::Canceled;
        assert!(s.cancelled());
        assert!(s.on_grace_period());
        assert!(s.active());

        // Grace period over
        s.ends_at = Some(Utc::now() - Duration::days(1));
        assert!(!s.active());
        assert!(!s.valid());

        // Ended but still on trial
        s.trial_ends_at = Some(Utc::now() + Duration::days(3));
        assert!(s.on_trial());
        assert!(s.valid());
    }

    #[test]
    fn test_past_due_still_active() {
        let mut s = sub("default", "monthly", 0);
        s.status = SubscriptionStatus::PastDue;
        assert!(s.is_past_due());
        assert!(s.active());
    }

    #[test]
    fn test_any_on_plan_ignores_validity() {
        let mut expired = sub("default", "p1", -60);
        expired.status = SubscriptionStatus::Canceled;
        expired.ends_at = Some(Utc::now() - Duration::days(30));

        let subs = vec![expired];
        assert!(any_on_plan(&subs, "p1"));
        assert!(!any_on_plan(&subs, "p2"));
    }
}
