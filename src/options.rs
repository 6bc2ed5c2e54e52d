//! Request parameters sent to the payment processor.
//!
//! Callers may pass extra processor parameters to most operations. Two merge
//! strategies exist and they resolve collisions in opposite
//! directions:
//!
//! - [`merge_caller_wins`]: flat, top-level merge where caller keys replace
//!   computed defaults. Used for charges.
//! - [`merge_defaults_win_recursive`]: recursive merge where the computed
//!   defaults replace caller values at every nesting level. Used for customer
//!   creation.

use serde_json::{Map, Value};

/// Processor request parameters, keyed by the processor's field names.
pub type Params = Map<String, Value>;

/// Flat merge: every top-level key in `caller` replaces the same key in `defaults`.
///
/// Nested objects are not merged; a caller-supplied `options` object replaces
/// the default `options` object wholesale.
#[must_use]
pub fn merge_caller_wins(defaults: Params, caller: Params) -> Params {
    let mut merged = defaults;
    for (key, value) in caller {
        merged.insert(key, value);
    }
    merged
}

/// Recursive merge: `defaults` take precedence over `caller` at every level.
///
/// Objects present on both sides are merged key by key; any other collision
/// resolves to the default value. Keys only the caller supplied survive.
#[must_use]
pub fn merge_defaults_win_recursive(caller: Params, defaults: Params) -> Params {
    let mut merged = caller;
    for (key, default_value) in defaults {
        let value = match (merged.remove(&key), default_value) {
            (Some(Value::Object(caller_obj)), Value::Object(default_obj)) => {
                Value::Object(merge_defaults_win_recursive(caller_obj, default_obj))
            }
            (_, default_value) => default_value,
        };
        merged.insert(key, value);
    }
    merged
}

/// Convert a `json!({...})` literal into [`Params`].
///
/// Anything other than an object yields empty params.
#[must_use]
pub fn params(value: Value) -> Params {
    match value {
        Value::Object(map) => map,
        _ => Params::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_caller_wins_flat() {
        let defaults = params(json!({
            "amount": "10.00",
            "options": { "submitForSettlement": true },
            "recurring": true,
        }));
        let caller = params(json!({
            "recurring": false,
            "options": { "storeInVault": true },
        }));

        let merged = merge_caller_wins(defaults, caller);
        assert_eq!(merged["amount"], json!("10.00"));
        assert_eq!(merged["recurring"], json!(false));
        // Nested objects are replaced, not merged.
        assert_eq!(merged["options"], json!({ "storeInVault": true }));
    }

    #[test]
    fn test_defaults_win_recursive() {
        let caller = params(json!({
            "firstName": "Caller",
            "company": "Acme",
            "creditCard": {
                "options": { "verifyCard": false, "makeDefault": true },
                "billingAddress": { "postalCode": "94107" },
            },
        }));
        let defaults = params(json!({
            "firstName": "Taylor",
            "email": "taylor@example.com",
            "creditCard": {
                "options": { "verifyCard": true },
            },
        }));

        let merged = merge_defaults_win_recursive(caller, defaults);
        assert_eq!(merged["firstName"], json!("Taylor"));
        assert_eq!(merged["company"], json!("Acme"));
        assert_eq!(merged["email"], json!("taylor@example.com"));
        assert_eq!(merged["creditCard"]["options"]["verifyCard"], json!(true));
        assert_eq!(merged["creditCard"]["options"]["makeDefault"], json!(true));
        assert_eq!(merged["creditCard"]["billingAddress"]["postalCode"], json!("94107"));
    }

    #[test]
    fn test_default_scalar_replaces_caller_object() {
        let caller = params(json!({ "paymentMethodNonce": { "nested": 1 } }));
        let defaults = params(json!({ "paymentMethodNonce": "fake-valid-nonce" }));

        let merged = merge_defaults_win_recursive(caller, defaults);
        assert_eq!(merged["paymentMethodNonce"], json!("fake-valid-nonce"));
    }

    #[test]
    fn test_params_from_non_object() {
        assert!(params(json!(null)).is_empty());
        assert!(params(json!([1, 2])).is_empty());
    }
}
