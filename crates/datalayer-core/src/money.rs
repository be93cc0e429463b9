//! Monetary rounding and the empty-or-number JSON representation.
//!
//! Amounts are `Decimal` internally and JSON numbers on the wire. An absent
//! amount (no shipping on a product view, no weight on a product) is written
//! as the empty string so downstream tag managers see the same field shape
//! on every event.

use rust_decimal::{Decimal, RoundingStrategy};

/// Default number of decimals used when a shop does not configure one.
pub const DEFAULT_PRICE_DECIMALS: u32 = 2;

/// Round an amount half away from zero to the shop's price decimals.
pub fn round(amount: Decimal, decimals: u32) -> Decimal {
    amount
        .round_dp_with_strategy(decimals, RoundingStrategy::MidpointAwayFromZero)
        .normalize()
}

/// Serde adapter for a required `Decimal` written as a JSON number.
///
/// Reads back through the number's decimal text, so a value survives a
/// cache round trip unchanged.
pub mod amount {
    use rust_decimal::Decimal;
    use serde::de::Error as _;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S>(value: &Decimal, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        super::optional::serialize(&Some(*value), serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
    where
        D: Deserializer<'de>,
    {
        super::optional::deserialize(deserializer)?
            .ok_or_else(|| D::Error::custom("amount is required"))
    }
}

/// Serde adapter for `Option<Decimal>`: `None` <-> `""`, `Some` <-> number.
///
/// Deserialization also accepts numeric strings and `null`.
pub mod optional {
    use std::str::FromStr;

    use rust_decimal::prelude::ToPrimitive;
    use rust_decimal::Decimal;
    use serde::de::Error as _;
    use serde::ser::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn serialize<S>(value: &Option<Decimal>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(amount) => {
                let float = amount
                    .to_f64()
                    .ok_or_else(|| S::Error::custom("amount out of range"))?;
                serializer.serialize_f64(float)
            }
            None => serializer.serialize_str(""),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::Null => Ok(None),
            Value::String(s) if s.trim().is_empty() => Ok(None),
            Value::String(s) => Decimal::from_str(s.trim())
                .map(Some)
                .map_err(|e| D::Error::custom(format!("invalid amount {:?}: {}", s, e))),
            Value::Number(n) => parse_number(&n.to_string())
                .map(Some)
                .map_err(D::Error::custom),
            other => Err(D::Error::custom(format!("expected amount, got {}", other))),
        }
    }

    fn parse_number(raw: &str) -> Result<Decimal, String> {
        Decimal::from_str(raw)
            .or_else(|_| Decimal::from_scientific(raw))
            .map_err(|e| format!("invalid amount {}: {}", raw, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Holder {
        #[serde(with = "optional")]
        amount: Option<Decimal>,
    }

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn test_round_half_away_from_zero() {
        assert_eq!(round(dec("2.345"), 2), dec("2.35"));
        assert_eq!(round(dec("-2.345"), 2), dec("-2.35"));
        assert_eq!(round(dec("2.344"), 2), dec("2.34"));
        assert_eq!(round(dec("19.99") * dec("3"), 2), dec("59.97"));
    }

    #[test]
    fn test_round_zero_decimals() {
        assert_eq!(round(dec("1999.5"), 0), dec("2000"));
    }

    #[test]
    fn test_optional_none_serializes_as_empty_string() {
        let json = serde_json::to_value(Holder { amount: None }).unwrap();
        assert_eq!(json, json!({"amount": ""}));
    }

    #[test]
    fn test_optional_some_serializes_as_number() {
        let json = serde_json::to_value(Holder {
            amount: Some(dec("59.97")),
        })
        .unwrap();
        assert_eq!(json, json!({"amount": 59.97}));
    }

    #[test]
    fn test_optional_accepts_strings_numbers_and_null() {
        let h: Holder = serde_json::from_value(json!({"amount": "12.50"})).unwrap();
        assert_eq!(h.amount, Some(dec("12.50")));
        let h: Holder = serde_json::from_value(json!({"amount": 3})).unwrap();
        assert_eq!(h.amount, Some(dec("3")));
        let h: Holder = serde_json::from_value(json!({"amount": ""})).unwrap();
        assert_eq!(h.amount, None);
        let h: Holder = serde_json::from_value(json!({"amount": null})).unwrap();
        assert_eq!(h.amount, None);
    }

    #[test]
    fn test_optional_rejects_garbage() {
        let result: Result<Holder, _> = serde_json::from_value(json!({"amount": "abc"}));
        assert!(result.is_err());
        let result: Result<Holder, _> = serde_json::from_value(json!({"amount": [1]}));
        assert!(result.is_err());
    }
}
