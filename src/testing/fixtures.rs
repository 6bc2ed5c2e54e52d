//! Test fixtures for billable entities.

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::entity::{BillableEntity, BillableUpdate, PaymentDetails};

/// Helper functions for generating fake test data
pub mod fake {
    use super::*;

    /// Generate a fake email address
    pub fn email() -> String {
        format!("test-{}@example.com", Uuid::new_v4().simple())
    }

    /// Generate a fake UUID as a string
    pub fn uuid() -> String {
        Uuid::new_v4().to_string()
    }

    /// Generate a fake "First Last" name
    pub fn name() -> String {
        const FIRST: [&str; 5] = ["Taylor", "Jordan", "Alex", "Sam", "Robin"];
        const LAST: [&str; 5] = ["Otwell", "Smith", "Garcia", "Nguyen", "Okafor"];
        format!(
            "{} {}",
            FIRST[fastrand::usize(..FIRST.len())],
            LAST[fastrand::usize(..LAST.len())]
        )
    }
}

/// A billable user for tests.
#[derive(Debug, Clone)]
pub struct TestBillable {
    pub id: String,
    pub name: Option<String>,
    pub email: String,
    pub processor_id: Option<String>,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub tax_percentage: Decimal,
    pub payment_details: PaymentDetails,
}

impl Default for TestBillable {
    fn default() -> Self {
        Self::new()
    }
}

impl TestBillable {
    /// Create a billable with generated ID, name and email and no billing state.
    pub fn new() -> Self {
        Self {
            id: fake::uuid(),
            name: Some(fake::name()),
            email: fake::email(),
            processor_id: None,
            trial_ends_at: None,
            tax_percentage: Decimal::ZERO,
            payment_details: PaymentDetails::default(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn without_name(mut self) -> Self {
        self.name = None;
        self
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = email.into();
        self
    }

    pub fn with_processor_id(mut self, id: impl Into<String>) -> Self {
        self.processor_id = Some(id.into());
        self
    }

    /// Put the entity on a generic trial ending `days` from now (negative for past).
    pub fn with_trial_days(mut self, days: i64) -> Self {
        self.trial_ends_at = Some(Utc::now() + Duration::days(days));
        self
    }

    pub fn with_tax_percentage(mut self, percentage: Decimal) -> Self {
        self.tax_percentage = percentage;
        self
    }
}

impl BillableEntity for TestBillable {
    fn billable_id(&self) -> &str {
        &self.id
    }

    fn billable_type(&self) -> &str {
        "user"
    }

    fn processor_id(&self) -> Option<&str> {
        self.processor_id.as_deref()
    }

    fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    fn email(&self) -> &str {
        &self.email
    }

    fn trial_ends_at(&self) -> Option<DateTime<Utc>> {
        self.trial_ends_at
    }

    fn tax_percentage(&self) -> Decimal {
        self.tax_percentage
    }

    fn fill(&mut self, update: &BillableUpdate) {
        if let Some(id) = &update.processor_id {
            self.processor_id = Some(id.clone());
        }
        if let Some(details) = &update.payment_details {
            self.payment_details = details.clone();
        }
    }
}
