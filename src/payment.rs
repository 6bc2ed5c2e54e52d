//! Payment method management.
//!
//! Replaces the entity's default payment method and moves every active
//! subscription over to it.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::audit::{BillingAuditEvent, BillingAuditLogger};
use crate::cashier::Cashier;
use crate::client::GatewayResponse;
use crate::customer::CustomerGateway;
use crate::entity::{BillableEntity, BillableUpdate, PaymentDetails};
use crate::error::{CashierError, GatewayError, Result};
use crate::options::{Params, params};
use crate::storage::BillingStore;
use crate::subscription::SubscriptionGateway;

/// A stored payment instrument on the processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PaymentMethod {
    CreditCard(CreditCard),
    PayPalAccount(PayPalAccount),
}

/// A vaulted credit card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreditCard {
    /// Payment method token.
    pub token: String,
    /// Card brand (Visa, MasterCard, ...).
    pub card_type: String,
    /// Last 4 digits of the card.
    pub last_four: String,
    /// Expiration as reported, e.g. "12/2030".
    pub expiration_date: Option<String>,
    /// Whether this is the customer's default payment method.
    pub default: bool,
}

/// A vaulted PayPal account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayPalAccount {
    /// Payment method token.
    pub token: String,
    /// Payer email.
    pub email: String,
    /// Whether this is the customer's default payment method.
    pub default: bool,
}

impl PaymentMethod {
    #[must_use]
    pub fn token(&self) -> &str {
        match self {
            Self::CreditCard(card) => &card.token,
            Self::PayPalAccount(account) => &account.token,
        }
    }

    #[must_use]
    pub fn is_default(&self) -> bool {
        match self {
            Self::CreditCard(card) => card.default,
            Self::PayPalAccount(account) => account.default,
        }
    }

    /// The fields cached on the billable record for this method.
    #[must_use]
    pub fn details(&self) -> PaymentDetails {
        match self {
            Self::CreditCard(card) => PaymentDetails::card(&card.card_type, &card.last_four),
            Self::PayPalAccount(account) => PaymentDetails::paypal(&account.email),
        }
    }
}

/// Trait for processor payment method operations.
#[allow(async_fn_in_trait)]
pub trait PaymentMethodGateway: Send + Sync {
    /// Exchange a nonce for a vaulted payment method.
    async fn create_payment_method(
        &self,
        params: Params,
    ) -> std::result::Result<GatewayResponse<PaymentMethod>, GatewayError>;
}

impl<S, G, A> Cashier<S, G, A>
where
    S: BillingStore,
    G: CustomerGateway + PaymentMethodGateway + SubscriptionGateway,
    A: BillingAuditLogger,
{
    /// Replace the entity's default payment method with the one behind `token`.
    ///
    /// The new method is created as default and verified. On success the
    /// entity's cached card or PayPal fields are replaced, and every active
    /// subscription is switched to the new token; inactive ones are skipped.
    ///
    /// # Errors
    ///
    /// Returns `PaymentMethodCreationFailed` if the processor refuses the
    /// nonce, and `SubscriptionUpdateFailed` if moving a subscription fails.
    pub async fn update_card<E: BillableEntity>(&self, entity: &mut E, token: &str) -> Result<()> {
        let customer = self.as_processor_customer(&*entity).await?;

        let request = params(json!({
            "customerId": customer.id,
            "paymentMethodNonce": token,
            "options": {
                "makeDefault": true,
                "verifyCard": true,
            },
        }));

        let method = self
            .gateway
            .create_payment_method(request)
            .await?
            .into_result(CashierError::PaymentMethodCreationFailed)?;

        let update = BillableUpdate::payment_details(method.details());
        entity.fill(&update);
        self.store.save_billable(entity.billable_id(), &update).await?;

        let updated = self
            .update_subscriptions_to_payment_method(&*entity, method.token())
            .await?;

        tracing::info!(
            billable_id = %entity.billable_id(),
            subscriptions_updated = updated,
            "payment method updated"
        );

        self.audit
            .log(BillingAuditEvent::PaymentMethodUpdated {
                billable_id: entity.billable_id().to_string(),
                token: method.token().to_string(),
                subscriptions_updated: updated,
            })
            .await;

        Ok(())
    }

    /// Point every active subscription at `token`. Returns how many were updated.
    async fn update_subscriptions_to_payment_method(
        &self,
        entity: &impl BillableEntity,
        token: &str,
    ) -> Result<usize> {
        let mut updated = 0;

        for subscription in self.subscriptions(entity).await? {
            if !subscription.active() {
                continue;
            }

            self.gateway
                .update_subscription(
                    &subscription.processor_id,
                    params(json!({ "paymentMethodToken": token })),
                )
                .await?
                .into_result(CashierError::SubscriptionUpdateFailed)?;

            updated += 1;
        }

        Ok(updated)
    }
}
