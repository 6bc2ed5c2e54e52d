//! The billable entity capability.
//!
//! Implement [`BillableEntity`] for your User or Organization types to give
//! them billing behavior through [`Cashier`](crate::Cashier).

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Information about a billable entity.
pub trait BillableEntity: Send + Sync {
    /// Get the unique ID of this billable entity.
    fn billable_id(&self) -> &str;

    /// Get the type of billable entity ("user" or "org").
    fn billable_type(&self) -> &str;

    /// The processor-side customer identifier, once provisioned.
    fn processor_id(&self) -> Option<&str>;

    /// Get the display name for this entity.
    fn name(&self) -> Option<&str>;

    /// Get the email for this entity.
    fn email(&self) -> &str;

    /// End of the entity-level trial, independent of any subscription.
    fn trial_ends_at(&self) -> Option<DateTime<Utc>>;

    /// Tax percentage applied on top of one-off charges.
    ///
    /// Override this to supply an entity-specific rate.
    fn tax_percentage(&self) -> Decimal {
        Decimal::ZERO
    }

    /// Assign persisted billing fields onto the in-memory record.
    ///
    /// Called right before the same update is handed to
    /// [`BillingStore::save_billable`](crate::BillingStore::save_billable).
    fn fill(&mut self, update: &BillableUpdate);

    /// Whether a processor customer has been provisioned for this entity.
    fn has_processor_id(&self) -> bool {
        self.processor_id().is_some_and(|id| !id.is_empty())
    }
}

/// Cached description of the entity's default payment method.
///
/// Either the card fields or the PayPal email are set, never both.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentDetails {
    /// Card brand (Visa, MasterCard, American Express, ...).
    pub card_brand: Option<String>,
    /// Last four digits of the card.
    pub card_last_four: Option<String>,
    /// Email of the PayPal account.
    pub paypal_email: Option<String>,
}

impl PaymentDetails {
    #[must_use]
    pub fn card(brand: impl Into<String>, last_four: impl Into<String>) -> Self {
        Self {
            card_brand: Some(brand.into()),
            card_last_four: Some(last_four.into()),
            paypal_email: None,
        }
    }

    #[must_use]
    pub fn paypal(email: impl Into<String>) -> Self {
        Self {
            card_brand: None,
            card_last_four: None,
            paypal_email: Some(email.into()),
        }
    }
}

/// Fields written back to the billable record after a processor call.
///
/// `None` leaves the stored value untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillableUpdate {
    pub processor_id: Option<String>,
    pub payment_details: Option<PaymentDetails>,
}

impl BillableUpdate {
    #[must_use]
    pub fn payment_details(details: PaymentDetails) -> Self {
        Self {
            processor_id: None,
            payment_details: Some(details),
        }
    }
}

/// Split a display name into first and last name on whitespace.
///
/// Only the first two tokens are used; any further tokens are dropped.
#[must_use]
pub fn split_name(name: &str) -> (Option<&str>, Option<&str>) {
    let mut parts = name.split_whitespace();
    (parts.next(), parts.next())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_name() {
        assert_eq!(split_name("Taylor Otwell"), (Some("Taylor"), Some("Otwell")));
        assert_eq!(split_name("Cher"), (Some("Cher"), None));
        assert_eq!(split_name("  Mary  Jane   Watson "), (Some("Mary"), Some("Jane")));
        assert_eq!(split_name(""), (None, None));
    }

    #[test]
    fn test_payment_details_are_exclusive() {
        let card = PaymentDetails::card("Visa", "1881");
        assert!(card.paypal_email.is_none());

        let paypal = PaymentDetails::paypal("buyer@example.com");
        assert!(paypal.card_brand.is_none());
        assert!(paypal.card_last_four.is_none());
    }
}
