/*
[INPUT]:  Exchange number encodings (quoted integers, price-level arrays)
[OUTPUT]: serde `deserialize_with` helpers producing `i64` / book levels
[POS]:    Data layer - wire-format leniency that rust_decimal's serde support does not cover
[UPDATE]: When the exchange changes numeric encodings
*/

use rust_decimal::Decimal;
use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Integers sometimes arrive quoted (ids, timestamps on older endpoints).
pub fn deserialize_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    match &value {
        Value::Number(number) => number
            .as_i64()
            .ok_or_else(|| D::Error::custom(format!("expected integer, found {number}"))),
        Value::String(raw) => raw
            .trim()
            .parse::<i64>()
            .map_err(|err| D::Error::custom(format!("invalid integer {raw:?}: {err}"))),
        other => Err(D::Error::custom(format!("expected integer, found {other}"))),
    }
}

/// `[[price, amount], ...]` book levels. Rows shorter than two entries are
/// skipped; rows with malformed numbers reject the whole payload.
pub fn deserialize_levels<'de, D>(deserializer: D) -> Result<Vec<(Decimal, Decimal)>, D::Error>
where
    D: Deserializer<'de>,
{
    let rows: Vec<Vec<Decimal>> = Vec::deserialize(deserializer)?;
    Ok(rows
        .into_iter()
        .filter_map(|row| match row.as_slice() {
            [price, amount, ..] => Some((*price, *amount)),
            _ => None,
        })
        .collect())
}
