//! Value encoding at the cache boundary.
//!
//! Values are stored as JSON text. Timestamps travel as RFC 3339 strings (entity
//! fields use `time::serde::rfc3339`), decimals as JSON floats through
//! [`decimal_float`]. Decoding is a single parse: a payload that decodes to a
//! string stays a string even when that string holds more JSON.

use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use thiserror::Error;

/// Field-name marker for values that never leave the process.
const PRIVATE_FIELD_MARKER: char = '_';

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to encode cache payload: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to decode cache payload: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Encode a value into the textual cache representation.
///
/// Object fields whose name starts with `_` are dropped at every depth.
pub fn encode<T: Serialize + ?Sized>(value: &T) -> Result<String, CodecError> {
    let mut tree = serde_json::to_value(value).map_err(CodecError::Encode)?;
    strip_private_fields(&mut tree);
    serde_json::to_string(&tree).map_err(CodecError::Encode)
}

/// Decode a cached payload. Exactly one parse attempt is made.
pub fn decode<T: DeserializeOwned>(payload: &str) -> Result<T, CodecError> {
    serde_json::from_str(payload).map_err(CodecError::Decode)
}

fn strip_private_fields(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|name, _| !name.starts_with(PRIVATE_FIELD_MARKER));
            for child in map.values_mut() {
                strip_private_fields(child);
            }
        }
        Value::Array(items) => {
            for item in items {
                strip_private_fields(item);
            }
        }
        _ => {}
    }
}

/// Serde adapter writing `BigDecimal` as a JSON float.
///
/// Precision beyond `f64` is lost in the serialized form; canonical amounts are
/// always reloaded from the store.
pub mod decimal_float {
    use std::str::FromStr;

    use bigdecimal::{BigDecimal, ToPrimitive};
    use serde::{Deserialize, Deserializer, Serializer, de, ser};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Float(f64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(value: &BigDecimal, serializer: S) -> Result<S::Ok, S::Error> {
        let float = value
            .to_f64()
            .filter(|float| float.is_finite())
            .ok_or_else(|| ser::Error::custom(format!("decimal `{value}` is out of f64 range")))?;
        serializer.serialize_f64(float)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<BigDecimal, D::Error> {
        let text = match Repr::deserialize(deserializer)? {
            // Shortest round-trip form, so 19.99 stays 19.99.
            Repr::Float(float) => float.to_string(),
            Repr::Text(text) => text,
        };
        BigDecimal::from_str(text.trim()).map_err(de::Error::custom)
    }

    pub mod option {
        use bigdecimal::BigDecimal;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S: Serializer>(
            value: &Option<BigDecimal>,
            serializer: S,
        ) -> Result<S::Ok, S::Error> {
            match value {
                Some(value) => super::serialize(value, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D: Deserializer<'de>>(
            deserializer: D,
        ) -> Result<Option<BigDecimal>, D::Error> {
            #[derive(Deserialize)]
            struct Wrapped(#[serde(with = "super")] BigDecimal);

            Ok(Option::<Wrapped>::deserialize(deserializer)?.map(|Wrapped(value)| value))
        }
    }
}
