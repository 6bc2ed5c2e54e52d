//! Invoices.
//!
//! An [`Invoice`] is a read-only view of a processor [`Transaction`] for one
//! entity. Invoices are built on demand and never stored locally.

use chrono::{DateTime, Months, NaiveDate, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::audit::BillingAuditLogger;
use crate::cashier::Cashier;
use crate::charge::{Adjustment, Transaction, TransactionGateway, TransactionStatus};
use crate::config::CashierConfig;
use crate::entity::BillableEntity;
use crate::error::{CashierError, Result};
use crate::storage::BillingStore;

/// A filter added to an invoice search.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum SearchCriterion {
    /// Field equals value.
    Is { field: String, value: String },
    /// Field equals any of the values.
    In { field: String, values: Vec<String> },
    /// Amount within an inclusive range.
    AmountBetween { min: Decimal, max: Decimal },
}

impl SearchCriterion {
    pub fn is(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::Is {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn any_of<I, V>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        Self::In {
            field: field.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Check a transaction against this criterion.
    ///
    /// Supported fields: `id`, `status`, `currency`, `subscription_id`,
    /// `payment_method_token`. Unknown fields match nothing.
    #[must_use]
    pub fn matches(&self, transaction: &Transaction) -> bool {
        match self {
            Self::Is { field, value } => field_value(transaction, field).is_some_and(|v| v == *value),
            Self::In { field, values } => {
                field_value(transaction, field).is_some_and(|v| values.contains(&v))
            }
            Self::AmountBetween { min, max } => {
                transaction.amount >= *min && transaction.amount <= *max
            }
        }
    }
}

fn field_value(transaction: &Transaction, field: &str) -> Option<String> {
    match field {
        "id" => Some(transaction.id.clone()),
        "status" => Some(transaction.status.as_str().to_string()),
        "currency" => Some(transaction.currency.clone()),
        "subscription_id" => transaction.subscription_id.clone(),
        "payment_method_token" => transaction.payment_method_token.clone(),
        _ => None,
    }
}

/// A transaction search scoped to one customer and a creation window.
///
/// The customer and window are always applied; `filters` narrow further and
/// cannot widen or replace them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSearch {
    pub customer_id: String,
    pub created_from: DateTime<Utc>,
    pub created_to: DateTime<Utc>,
    pub filters: Vec<SearchCriterion>,
}

impl TransactionSearch {
    /// Check a transaction against the customer, the window and every filter.
    #[must_use]
    pub fn matches(&self, transaction: &Transaction) -> bool {
        transaction.customer_id.as_deref() == Some(self.customer_id.as_str())
            && transaction.created_at >= self.created_from
            && transaction.created_at <= self.created_to
            && self.filters.iter().all(|f| f.matches(transaction))
    }
}

/// Midnight `lookback_months` before `today` through midnight tomorrow.
pub(crate) fn search_window(today: NaiveDate, lookback_months: u32) -> (DateTime<Utc>, DateTime<Utc>) {
    let from = today
        .checked_sub_months(Months::new(lookback_months))
        .unwrap_or(NaiveDate::MIN);
    let to = today.succ_opt().unwrap_or(today);

    (
        from.and_time(NaiveTime::default()).and_utc(),
        to.and_time(NaiveTime::default()).and_utc(),
    )
}

/// A settled (or pending) charge presented to the entity as an invoice.
#[derive(Debug, Clone)]
pub struct Invoice {
    owner_id: String,
    transaction: Transaction,
    config: CashierConfig,
}

impl Invoice {
    /// Wrap a transaction for the given owner.
    #[must_use]
    pub fn new(owner_id: impl Into<String>, transaction: Transaction, config: CashierConfig) -> Self {
        Self {
            owner_id: owner_id.into(),
            transaction,
            config,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.transaction.id
    }

    /// Billable ID of the entity the invoice belongs to.
    #[must_use]
    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// Amount exactly as the processor reported it.
    #[must_use]
    pub fn raw_total(&self) -> Decimal {
        self.transaction.amount
    }

    /// Formatted total, e.g. `$10.00`.
    #[must_use]
    pub fn total(&self) -> String {
        self.config.format_amount(self.transaction.amount)
    }

    /// Formatted total before tax, never negative.
    #[must_use]
    pub fn subtotal(&self) -> String {
        let subtotal = self
            .transaction
            .amount
            .saturating_sub(self.raw_tax())
            .max(Decimal::ZERO);
        self.config.format_amount(subtotal)
    }

    #[must_use]
    pub fn raw_tax(&self) -> Decimal {
        self.transaction.tax_amount.unwrap_or(Decimal::ZERO)
    }

    #[must_use]
    pub fn tax(&self) -> String {
        self.config.format_amount(self.raw_tax())
    }

    #[must_use]
    pub fn date(&self) -> DateTime<Utc> {
        self.transaction.created_at
    }

    #[must_use]
    pub fn status(&self) -> TransactionStatus {
        self.transaction.status
    }

    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.transaction.status == TransactionStatus::Settled
    }

    #[must_use]
    pub fn currency(&self) -> &str {
        &self.transaction.currency
    }

    /// Description recorded by [`Cashier::invoice_for`], if any.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.transaction
            .custom_fields
            .get("description")
            .map(String::as_str)
    }

    #[must_use]
    pub fn add_ons(&self) -> &[Adjustment] {
        &self.transaction.add_ons
    }

    #[must_use]
    pub fn discounts(&self) -> &[Adjustment] {
        &self.transaction.discounts
    }

    #[must_use]
    pub fn has_discount(&self) -> bool {
        !self.transaction.discounts.is_empty()
    }

    /// Sum of all add-on lines, `None` on overflow.
    #[must_use]
    pub fn add_on_total(&self) -> Option<Decimal> {
        sum_adjustments(&self.transaction.add_ons)
    }

    #[must_use]
    pub fn discount_total(&self) -> Option<Decimal> {
        sum_adjustments(&self.transaction.discounts)
    }

    /// The underlying processor transaction.
    #[must_use]
    pub fn transaction(&self) -> &Transaction {
        &self.transaction
    }

    #[must_use]
    pub fn into_transaction(self) -> Transaction {
        self.transaction
    }
}

fn sum_adjustments(adjustments: &[Adjustment]) -> Option<Decimal> {
    adjustments
        .iter()
        .try_fold(Decimal::ZERO, |sum, adjustment| sum.checked_add(adjustment.total()?))
}

impl<S, G, A> Cashier<S, G, A>
where
    S: BillingStore,
    G: TransactionGateway,
    A: BillingAuditLogger,
{
    /// List the entity's invoices from the lookback window.
    ///
    /// Only settled transactions are returned unless `include_pending` is set.
    /// `filters` are added to the customer and date constraints.
    pub async fn invoices(
        &self,
        entity: &impl BillableEntity,
        include_pending: bool,
        filters: Vec<SearchCriterion>,
    ) -> Result<Vec<Invoice>> {
        let (created_from, created_to) =
            search_window(Utc::now().date_naive(), self.config.invoice_lookback_months);

        let search = TransactionSearch {
            customer_id: entity.processor_id().unwrap_or_default().to_string(),
            created_from,
            created_to,
            filters,
        };

        let transactions = self.gateway.search_transactions(&search).await?;
        let found = transactions.len();

        let invoices: Vec<Invoice> = transactions
            .into_iter()
            .filter(|t| include_pending || t.status == TransactionStatus::Settled)
            .map(|t| Invoice::new(entity.billable_id(), t, self.config.clone()))
            .collect();

        tracing::debug!(
            billable_id = %entity.billable_id(),
            found,
            returned = invoices.len(),
            include_pending,
            "listed invoices"
        );

        Ok(invoices)
    }

    /// List invoices including ones that have not settled yet.
    pub async fn invoices_including_pending(
        &self,
        entity: &impl BillableEntity,
        filters: Vec<SearchCriterion>,
    ) -> Result<Vec<Invoice>> {
        self.invoices(entity, true, filters).await
    }

    /// Look up an invoice, telling "does not exist" apart from lookup errors.
    ///
    /// Returns `Ok(None)` when the processor has no such transaction.
    pub async fn try_find_invoice(
        &self,
        entity: &impl BillableEntity,
        id: &str,
    ) -> Result<Option<Invoice>> {
        match self.gateway.find_transaction(id).await {
            Ok(transaction) => Ok(Some(Invoice::new(
                entity.billable_id(),
                transaction,
                self.config.clone(),
            ))),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Look up an invoice. Any failure, including transport errors, yields `None`.
    pub async fn find_invoice(&self, entity: &impl BillableEntity, id: &str) -> Option<Invoice> {
        match self.try_find_invoice(entity, id).await {
            Ok(invoice) => invoice,
            Err(e) => {
                tracing::debug!(
                    invoice_id = %id,
                    error = %e,
                    "invoice lookup failed"
                );
                None
            }
        }
    }

    /// Look up an invoice or fail with `InvoiceNotFound`.
    pub async fn find_invoice_or_fail(
        &self,
        entity: &impl BillableEntity,
        id: &str,
    ) -> Result<Invoice> {
        self.find_invoice(entity, id)
            .await
            .ok_or_else(|| CashierError::InvoiceNotFound(id.to_string()))
    }
}
