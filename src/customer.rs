//! Processor customer provisioning.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::audit::{BillingAuditEvent, BillingAuditLogger};
use crate::cashier::Cashier;
use crate::client::GatewayResponse;
use crate::entity::{BillableEntity, BillableUpdate, split_name};
use crate::error::{CashierError, GatewayError, Result};
use crate::options::{Params, merge_defaults_win_recursive, params};
use crate::payment::PaymentMethod;
use crate::storage::BillingStore;

/// A customer record on the processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    /// Processor customer ID.
    pub id: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub email: Option<String>,
    /// Vaulted payment methods, in the order the processor returns them.
    #[serde(default)]
    pub payment_methods: Vec<PaymentMethod>,
}

impl Customer {
    /// The payment method flagged as default, or the first one.
    #[must_use]
    pub fn default_payment_method(&self) -> Option<&PaymentMethod> {
        self.payment_methods
            .iter()
            .find(|m| m.is_default())
            .or_else(|| self.payment_methods.first())
    }
}

/// Trait for processor customer operations.
#[allow(async_fn_in_trait)]
pub trait CustomerGateway: Send + Sync {
    /// Look up a customer by processor ID.
    async fn find_customer(&self, customer_id: &str) -> std::result::Result<Customer, GatewayError>;

    /// Create a customer, optionally vaulting a payment method from a nonce.
    async fn create_customer(
        &self,
        params: Params,
    ) -> std::result::Result<GatewayResponse<Customer>, GatewayError>;
}

impl<S, G, A> Cashier<S, G, A>
where
    S: BillingStore,
    G: CustomerGateway,
    A: BillingAuditLogger,
{
    /// Fetch the entity's customer record from the processor.
    ///
    /// An entity without a processor ID is looked up with an empty ID, so the
    /// processor's not-found answer comes back as a [`GatewayError::NotFound`].
    pub async fn as_processor_customer(&self, entity: &impl BillableEntity) -> Result<Customer> {
        let customer_id = entity.processor_id().unwrap_or_default();

        let customer = self.gateway.find_customer(customer_id).await.inspect_err(|e| {
            tracing::debug!(
                billable_id = %entity.billable_id(),
                error = %e,
                "processor customer lookup failed"
            );
        })?;

        Ok(customer)
    }

    /// Create the processor customer for a new entity.
    ///
    /// The entity's name is split into first and last name; name, email,
    /// nonce, card verification and the billable id/type custom fields take
    /// precedence over the same keys in `options` at every nesting level. On success the processor ID and the
    /// first payment method's details are stored on the entity.
    ///
    /// # Errors
    ///
    /// Returns `CustomerCreationFailed` with the processor message if the
    /// processor refuses.
    pub async fn create_as_processor_customer<E: BillableEntity>(
        &self,
        entity: &mut E,
        token: &str,
        options: Params,
    ) -> Result<Customer> {
        let (first_name, last_name) = entity.name().map(split_name).unwrap_or_default();

        let defaults = params(json!({
            "firstName": first_name,
            "lastName": last_name,
            "email": entity.email(),
            "paymentMethodNonce": token,
            "creditCard": {
                "options": { "verifyCard": true },
            },
            "customFields": {
                "billable_id": entity.billable_id(),
                "billable_type": entity.billable_type(),
            },
        }));

        let customer = self
            .gateway
            .create_customer(merge_defaults_win_recursive(options, defaults))
            .await?
            .into_result(CashierError::CustomerCreationFailed)?;

        let update = BillableUpdate {
            processor_id: Some(customer.id.clone()),
            payment_details: customer.payment_methods.first().map(PaymentMethod::details),
        };
        entity.fill(&update);
        self.store.save_billable(entity.billable_id(), &update).await?;

        tracing::info!(
            billable_id = %entity.billable_id(),
            billable_type = %entity.billable_type(),
            customer_id = %customer.id,
            "processor customer created"
        );

        self.audit
            .log(BillingAuditEvent::CustomerCreated {
                billable_id: entity.billable_id().to_string(),
                customer_id: customer.id.clone(),
            })
            .await;

        Ok(customer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::NoOpAuditLogger;
    use crate::testing::{InMemoryBillingStore, MockGateway, TestBillable, nonces};

    fn cashier() -> Cashier<InMemoryBillingStore, MockGateway, NoOpAuditLogger> {
        Cashier::new(InMemoryBillingStore::new(), MockGateway::new())
            .with_audit_logger(NoOpAuditLogger)
    }

    #[tokio::test]
    async fn test_create_customer_persists_card() {
        let cashier = cashier();
        let mut user = TestBillable::new().with_name("Taylor Otwell");

        let customer = cashier
            .create_as_processor_customer(&mut user, nonces::VALID_VISA, Params::new())
            .await
            .unwrap();

        assert_eq!(customer.first_name.as_deref(), Some("Taylor"));
        assert_eq!(customer.last_name.as_deref(), Some("Otwell"));
        assert_eq!(user.processor_id(), Some(customer.id.as_str()));
        assert_eq!(user.payment_details.card_brand.as_deref(), Some("Visa"));
        assert_eq!(user.payment_details.card_last_four.as_deref(), Some("1881"));
        assert!(user.payment_details.paypal_email.is_none());

        let stored = cashier.store().billable(user.billable_id()).unwrap();
        assert_eq!(stored.processor_id, Some(customer.id));
    }

    #[tokio::test]
    async fn test_create_customer_persists_paypal() {
        let cashier = cashier();
        let mut user = TestBillable::new();

        cashier
            .create_as_processor_customer(&mut user, nonces::PAYPAL_ACCOUNT, Params::new())
            .await
            .unwrap();

        assert!(user.payment_details.card_brand.is_none());
        assert!(user.payment_details.paypal_email.is_some());
    }

    #[tokio::test]
    async fn test_create_customer_defaults_override_options() {
        let cashier = cashier();
        let mut user = TestBillable::new().with_name("Taylor Otwell");

        let options = params(json!({
            "firstName": "Someone",
            "company": "Laravel",
            "creditCard": { "options": { "verifyCard": false } },
        }));

        cashier
            .create_as_processor_customer(&mut user, nonces::VALID_VISA, options)
            .await
            .unwrap();

        let sent = cashier.gateway().last_request("create_customer").unwrap();
        assert_eq!(sent["firstName"], json!("Taylor"));
        assert_eq!(sent["company"], json!("Laravel"));
        assert_eq!(sent["creditCard"]["options"]["verifyCard"], json!(true));
    }

    #[tokio::test]
    async fn test_create_customer_failure() {
        let cashier = cashier();
        let mut user = TestBillable::new();

        let err = cashier
            .create_as_processor_customer(&mut user, nonces::DECLINED, Params::new())
            .await
            .unwrap_err();

        assert!(matches!(err, CashierError::CustomerCreationFailed(_)));
        assert!(!user.has_processor_id());
    }

    #[tokio::test]
    async fn test_missing_processor_id_is_not_found() {
        let cashier = cashier();
        let user = TestBillable::new();

        let err = cashier.as_processor_customer(&user).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
