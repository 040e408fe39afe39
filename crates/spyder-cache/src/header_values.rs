//! Header values inside JSON documents.
//!
//! Values are raw bytes on the wire. UTF-8 values are written as plain
//! strings; anything else is written as `{"base64": "..."}`.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use bytes::Bytes;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum StoredValue {
    Text(String),
    Binary { base64: String },
}

impl From<&Bytes> for StoredValue {
    fn from(value: &Bytes) -> Self {
        match std::str::from_utf8(value) {
            Ok(text) => StoredValue::Text(text.to_string()),
            Err(_) => StoredValue::Binary {
                base64: STANDARD.encode(value),
            },
        }
    }
}

impl StoredValue {
    fn into_bytes(self) -> Result<Bytes, base64::DecodeError> {
        match self {
            StoredValue::Text(text) => Ok(Bytes::from(text)),
            StoredValue::Binary { base64 } => STANDARD.decode(base64).map(Bytes::from),
        }
    }
}

pub fn serialize<S: Serializer>(
    headers: &[(String, Bytes)],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(
        headers
            .iter()
            .map(|(name, value)| (name.as_str(), StoredValue::from(value))),
    )
}

pub fn deserialize<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<(String, Bytes)>, D::Error> {
    Vec::<(String, StoredValue)>::deserialize(deserializer)?
        .into_iter()
        .map(|(name, value)| Ok((name, value.into_bytes().map_err(serde::de::Error::custom)?)))
        .collect()
}
