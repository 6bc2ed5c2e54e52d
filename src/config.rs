use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

use crate::utils::get_env_with_prefix;

/// Configuration shared by every cashier operation.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CashierConfig {
    /// Three-letter ISO currency code (lowercase).
    #[serde(default = "default_currency")]
    pub currency: String,
    /// Symbol used when formatting amounts for display.
    #[serde(default = "default_currency_symbol")]
    pub currency_symbol: String,
    /// How far back invoice listings reach, in months.
    #[serde(default = "default_invoice_lookback_months")]
    pub invoice_lookback_months: u32,
    /// Subscription name used when the caller does not give one.
    #[serde(default = "default_subscription")]
    pub default_subscription: String,
}

impl Default for CashierConfig {
    fn default() -> Self {
        Self {
            currency: default_currency(),
            currency_symbol: default_currency_symbol(),
            invoice_lookback_months: default_invoice_lookback_months(),
            default_subscription: default_subscription(),
        }
    }
}

fn default_currency() -> String {
    "usd".to_string()
}

fn default_currency_symbol() -> String {
    "$".to_string()
}

fn default_invoice_lookback_months() -> u32 {
    24
}

fn default_subscription() -> String {
    "default".to_string()
}

impl CashierConfig {
    pub fn builder() -> CashierConfigBuilder {
        CashierConfigBuilder::new()
    }

    /// Defaults overlaid with `CASHIER_*` environment variables, validated.
    pub fn from_env() -> crate::error::Result<Self> {
        CashierConfigBuilder::new().from_env().build()
    }

    /// Format an amount for display, e.g. `$19.99` or `-$5.00`.
    #[must_use]
    pub fn format_amount(&self, amount: Decimal) -> String {
        let mut rounded = amount
            .abs()
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        rounded.rescale(2);

        if amount.is_sign_negative() && !rounded.is_zero() {
            format!("-{}{}", self.currency_symbol, rounded)
        } else {
            format!("{}{}", self.currency_symbol, rounded)
        }
    }
}

/// Builder for CashierConfig with environment variable support
#[must_use = "builder does nothing until you call build()"]
pub struct CashierConfigBuilder {
    config: CashierConfig,
}

impl CashierConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: CashierConfig::default(),
        }
    }

    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.config.currency = currency.into();
        self
    }

    pub fn with_currency_symbol(mut self, symbol: impl Into<String>) -> Self {
        self.config.currency_symbol = symbol.into();
        self
    }

    pub fn with_invoice_lookback_months(mut self, months: u32) -> Self {
        self.config.invoice_lookback_months = months;
        self
    }

    pub fn with_default_subscription(mut self, name: impl Into<String>) -> Self {
        self.config.default_subscription = name.into();
        self
    }

    /// Load configuration from environment variables with CASHIER_ prefix
    pub fn from_env(mut self) -> Self {
        if let Some(currency) = get_env_with_prefix("CURRENCY") {
            self.config.currency = currency.to_lowercase();
        }
        if let Some(symbol) = get_env_with_prefix("CURRENCY_SYMBOL") {
            self.config.currency_symbol = symbol;
        }
        if let Some(months) = get_env_with_prefix("INVOICE_LOOKBACK_MONTHS") {
            if let Ok(m) = months.parse() {
                self.config.invoice_lookback_months = m;
            }
        }
        if let Some(name) = get_env_with_prefix("DEFAULT_SUBSCRIPTION") {
            self.config.default_subscription = name;
        }
        self
    }

    /// Build the configuration, validating all settings
    ///
    /// # Errors
    ///
    /// Returns an error if the currency is not a three-letter code, the
    /// invoice lookback is zero, or the default subscription name is empty.
    pub fn build(self) -> crate::error::Result<CashierConfig> {
        let currency = &self.config.currency;
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(crate::error::CashierError::config(format!(
                "Invalid currency code: {}. Must be a three-letter ISO code",
                currency
            )));
        }

        if self.config.invoice_lookback_months == 0 {
            return Err(crate::error::CashierError::config(
                "Invoice lookback must be at least one month",
            ));
        }

        if self.config.default_subscription.trim().is_empty() {
            return Err(crate::error::CashierError::config(
                "Default subscription name cannot be empty",
            ));
        }

        Ok(self.config)
    }
}

impl Default for CashierConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
