//! One-off charges.
//!
//! Charges go to the customer's first payment method and are submitted for
//! settlement straight away. The entity's tax percentage is applied on top of
//! the requested amount.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::audit::{BillingAuditEvent, BillingAuditLogger};
use crate::cashier::Cashier;
use crate::client::GatewayResponse;
use crate::customer::CustomerGateway;
use crate::entity::BillableEntity;
use crate::error::{CashierError, GatewayError, Result};
use crate::invoice::TransactionSearch;
use crate::options::{Params, merge_caller_wins, params};
use crate::storage::BillingStore;

/// Settlement state of a processor transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    Authorizing,
    Authorized,
    SubmittedForSettlement,
    Settling,
    /// Funds transferred. Only settled transactions count as invoices by default.
    Settled,
    SettlementDeclined,
    Voided,
    ProcessorDeclined,
    GatewayRejected,
    Failed,
    #[serde(other)]
    Unrecognized,
}

impl TransactionStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Authorizing => "authorizing",
            Self::Authorized => "authorized",
            Self::SubmittedForSettlement => "submitted_for_settlement",
            Self::Settling => "settling",
            Self::Settled => "settled",
            Self::SettlementDeclined => "settlement_declined",
            Self::Voided => "voided",
            Self::ProcessorDeclined => "processor_declined",
            Self::GatewayRejected => "gateway_rejected",
            Self::Failed => "failed",
            Self::Unrecognized => "unrecognized",
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An add-on or discount line on a transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Adjustment {
    pub id: String,
    /// Amount per unit.
    pub amount: Decimal,
    pub quantity: u32,
}

impl Adjustment {
    /// Amount times quantity, `None` on overflow.
    #[must_use]
    pub fn total(&self) -> Option<Decimal> {
        self.amount.checked_mul(Decimal::from(self.quantity))
    }
}

/// A processor transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub status: TransactionStatus,
    /// Amount charged, tax included.
    pub amount: Decimal,
    pub tax_amount: Option<Decimal>,
    /// ISO currency code as reported by the processor.
    pub currency: String,
    pub customer_id: Option<String>,
    pub subscription_id: Option<String>,
    pub payment_method_token: Option<String>,
    #[serde(default)]
    pub custom_fields: HashMap<String, String>,
    #[serde(default)]
    pub add_ons: Vec<Adjustment>,
    #[serde(default)]
    pub discounts: Vec<Adjustment>,
    pub created_at: DateTime<Utc>,
}

/// Trait for processor transaction operations.
#[allow(async_fn_in_trait)]
pub trait TransactionGateway: Send + Sync {
    /// Submit a sale.
    async fn sale(
        &self,
        params: Params,
    ) -> std::result::Result<GatewayResponse<Transaction>, GatewayError>;

    /// Get a single transaction.
    async fn find_transaction(
        &self,
        transaction_id: &str,
    ) -> std::result::Result<Transaction, GatewayError>;

    /// Run a transaction search. No matches is an empty list, not an error.
    async fn search_transactions(
        &self,
        search: &TransactionSearch,
    ) -> std::result::Result<Vec<Transaction>, GatewayError>;
}

/// Format an amount the way the processor expects it: two decimal places,
/// halves rounded away from zero.
#[must_use]
pub fn format_processor_amount(amount: Decimal) -> String {
    let mut rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    rounded.rescale(2);
    rounded.to_string()
}

/// `amount` with a tax percentage added on top.
///
/// # Errors
///
/// Returns `InvalidRequest` if the taxed amount does not fit in a `Decimal`.
pub fn apply_tax(
    amount: Decimal,
    tax_percentage: Decimal,
) -> std::result::Result<Decimal, GatewayError> {
    tax_percentage
        .checked_div(Decimal::ONE_HUNDRED)
        .and_then(|rate| Decimal::ONE.checked_add(rate))
        .and_then(|factor| amount.checked_mul(factor))
        .ok_or_else(|| {
            GatewayError::invalid_request(format!(
                "amount {amount} with {tax_percentage}% tax is out of range"
            ))
        })
}

/// Set `customFields.description`, keeping any other custom fields.
fn with_description(mut options: Params, description: &str) -> Params {
    let fields = options
        .entry("customFields")
        .or_insert_with(|| Value::Object(Params::new()));

    if !fields.is_object() {
        *fields = Value::Object(Params::new());
    }
    if let Value::Object(fields) = fields {
        fields.insert("description".to_string(), Value::String(description.to_string()));
    }

    options
}

impl<S, G, A> Cashier<S, G, A>
where
    S: BillingStore,
    G: CustomerGateway + TransactionGateway,
    A: BillingAuditLogger,
{
    /// Make a one-off charge against the entity's first payment method.
    ///
    /// Top-level keys in `options` replace the computed request fields
    /// (`amount`, `paymentMethodToken`, `options`, `recurring`).
    ///
    /// # Errors
    ///
    /// Returns `ChargeFailed` with the processor message if the sale is
    /// refused, or a gateway error if the customer cannot be found.
    pub async fn charge(
        &self,
        entity: &impl BillableEntity,
        amount: Decimal,
        options: Params,
    ) -> Result<Transaction> {
        let customer = self.as_processor_customer(entity).await?;

        let Some(method) = customer.payment_methods.first() else {
            return Err(CashierError::ChargeFailed(format!(
                "customer {} has no payment method on file",
                customer.id
            )));
        };

        let total = apply_tax(amount, entity.tax_percentage())?;

        let defaults = params(json!({
            "amount": format_processor_amount(total),
            "paymentMethodToken": method.token(),
            "options": { "submitForSettlement": true },
            "recurring": true,
        }));

        let transaction = self
            .gateway
            .sale(merge_caller_wins(defaults, options))
            .await?
            .into_result(CashierError::ChargeFailed)?;

        tracing::info!(
            billable_id = %entity.billable_id(),
            transaction_id = %transaction.id,
            amount = %transaction.amount,
            "charge submitted"
        );

        self.audit
            .log(BillingAuditEvent::ChargeSucceeded {
                billable_id: entity.billable_id().to_string(),
                transaction_id: transaction.id.clone(),
                amount: transaction.amount,
            })
            .await;

        Ok(transaction)
    }

    /// Charge with a description recorded on the transaction.
    pub async fn invoice_for(
        &self,
        entity: &impl BillableEntity,
        description: &str,
        amount: Decimal,
        options: Params,
    ) -> Result<Transaction> {
        self.charge(entity, amount, with_description(options, description))
            .await
    }
}
