//! Subscription creation.

use chrono::{Duration, Utc};
use serde_json::json;

use crate::audit::{BillingAuditEvent, BillingAuditLogger};
use crate::cashier::Cashier;
use crate::charge::{apply_tax, format_processor_amount};
use crate::client::PaymentGateway;
use crate::customer::Customer;
use crate::entity::BillableEntity;
use crate::error::{CashierError, Result};
use crate::options::{Params, merge_caller_wins, params};
use crate::storage::BillingStore;
use crate::subscription::{Subscription, SubscriptionStatus};

impl<S, G, A> Cashier<S, G, A>
where
    S: BillingStore,
    G: PaymentGateway,
    A: BillingAuditLogger,
{
    /// Start building a new subscription `name` on `plan`.
    pub fn new_subscription(
        &self,
        name: impl Into<String>,
        plan: impl Into<String>,
    ) -> SubscriptionBuilder<'_, S, G, A> {
        SubscriptionBuilder {
            cashier: self,
            name: name.into(),
            plan: plan.into(),
            trial_days: None,
            skip_trial: false,
            coupon: None,
            customer_options: Params::new(),
        }
    }
}

/// Builder for a new subscription.
///
/// Nothing is sent to the processor until [`create`](Self::create) is awaited.
#[must_use = "builder does nothing until you call create()"]
pub struct SubscriptionBuilder<'a, S, G, A> {
    cashier: &'a Cashier<S, G, A>,
    name: String,
    plan: String,
    trial_days: Option<u32>,
    skip_trial: bool,
    coupon: Option<String>,
    customer_options: Params,
}

impl<S, G, A> SubscriptionBuilder<'_, S, G, A>
where
    S: BillingStore,
    G: PaymentGateway,
    A: BillingAuditLogger,
{
    /// Start the subscription with a trial of `days` days.
    pub fn trial_days(mut self, days: u32) -> Self {
        self.trial_days = Some(days);
        self
    }

    /// Start billing immediately, ignoring any trial.
    pub fn skip_trial(mut self) -> Self {
        self.skip_trial = true;
        self
    }

    /// Apply a coupon when the subscription is created.
    pub fn with_coupon(mut self, coupon: impl Into<String>) -> Self {
        self.coupon = Some(coupon.into());
        self
    }

    /// Extra parameters for the customer, used if one has to be created.
    pub fn with_customer_options(mut self, options: Params) -> Self {
        self.customer_options = options;
        self
    }

    fn trial_period(&self) -> Option<u32> {
        if self.skip_trial {
            None
        } else {
            self.trial_days.filter(|days| *days > 0)
        }
    }

    /// Create the subscription on the processor and store it.
    ///
    /// Without a processor customer one is created from `token`. With an
    /// existing customer a given `token` replaces the default payment method
    /// first. Top-level keys in `options` replace the computed request fields.
    ///
    /// # Errors
    ///
    /// Returns `SubscriptionCreationFailed` if the processor refuses, or if
    /// there is no payment method to bill.
    pub async fn create<E: BillableEntity>(
        self,
        entity: &mut E,
        token: Option<&str>,
        options: Params,
    ) -> Result<Subscription> {
        let cashier = self.cashier;
        let customer = self.processor_customer(entity, token).await?;

        let Some(method) = customer.default_payment_method() else {
            return Err(CashierError::SubscriptionCreationFailed(format!(
                "customer {} has no payment method on file",
                customer.id
            )));
        };

        let plan = cashier.gateway.find_plan(&self.plan).await?;
        let trial = self.trial_period();
        let price = apply_tax(plan.price, entity.tax_percentage())?;

        let mut request = params(json!({
            "planId": plan.id,
            "price": format_processor_amount(price),
            "paymentMethodToken": method.token(),
            "trialPeriod": trial.is_some(),
            "trialDurationUnit": "day",
            "trialDuration": trial.unwrap_or(0),
        }));
        if let Some(coupon) = &self.coupon {
            request.insert(
                "discounts".to_string(),
                json!({ "add": [{ "inheritedFromId": coupon }] }),
            );
        }

        let remote = cashier
            .gateway
            .create_subscription(merge_caller_wins(request, options))
            .await?
            .into_result(CashierError::SubscriptionCreationFailed)?;

        let now = Utc::now();
        let subscription = Subscription {
            name: self.name,
            processor_id: remote.id,
            plan: self.plan,
            status: SubscriptionStatus::from_processor(&remote.status),
            trial_ends_at: trial.map(|days| now + Duration::days(i64::from(days))),
            ends_at: None,
            created_at: now,
        };

        cashier
            .store
            .save_subscription(entity.billable_id(), &subscription)
            .await?;

        tracing::info!(
            billable_id = %entity.billable_id(),
            subscription_id = %subscription.processor_id,
            plan = %subscription.plan,
            name = %subscription.name,
            "subscription created"
        );

        cashier
            .audit
            .log(BillingAuditEvent::SubscriptionCreated {
                billable_id: entity.billable_id().to_string(),
                subscription_id: subscription.processor_id.clone(),
                plan_id: subscription.plan.clone(),
            })
            .await;

        Ok(subscription)
    }

    async fn processor_customer<E: BillableEntity>(
        &self,
        entity: &mut E,
        token: Option<&str>,
    ) -> Result<Customer> {
        let cashier = self.cashier;

        if !entity.has_processor_id() {
            let Some(token) = token else {
                return Err(CashierError::SubscriptionCreationFailed(
                    "a payment method nonce is required for a new customer".to_string(),
                ));
            };
            return cashier
                .create_as_processor_customer(entity, token, self.customer_options.clone())
                .await;
        }

        if let Some(token) = token {
            cashier.update_card(entity, token).await?;
        }

        cashier.as_processor_customer(&*entity).await
    }
}
