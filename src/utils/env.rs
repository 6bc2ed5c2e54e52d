/// Get environment variable with CASHIER_ prefix, falling back to unprefixed version
///
/// Checks `CASHIER_{key}` first, then `{key}`, so hosts can share plain names
/// such as `CURRENCY` across services.
///
/// # Examples
///
/// ```rust
/// use tideway_cashier::utils::get_env_with_prefix;
///
/// // Checks CASHIER_CURRENCY first, then CURRENCY
/// let currency = get_env_with_prefix("CURRENCY");
/// ```
pub fn get_env_with_prefix(key: &str) -> Option<String> {
    std::env::var(format!("CASHIER_{}", key))
        .or_else(|_| std::env::var(key))
        .ok()
}
