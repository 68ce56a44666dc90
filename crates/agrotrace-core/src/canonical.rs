//! Canonical encoding for deterministic record hashing.
//!
//! Any `Serialize` value is lowered through ciborium's value model and then
//! written as deterministic CBOR:
//! - Map keys: text only, sorted by plain lexicographic byte order
//! - Arrays: positional order preserved
//! - Numbers: decimal text (integers as-is, floats in shortest round-trip form)
//! - Timestamps: ISO-8601 UTC with millisecond precision (see [`iso8601`])
//! - Lengths: definite only
//!
//! **CRITICAL**: This encoding is FROZEN. Changes break every stored leaf hash
//! and every signature.

use ciborium::value::Value;
use serde::Serialize;

use crate::digest::Digest;
use crate::error::{CoreError, Result};

/// Encode a value to canonical bytes.
///
/// Two values with the same keys and values produce identical bytes no
/// matter how their maps were built.
pub fn canonicalize<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    let value =
        Value::serialized(value).map_err(|e| CoreError::Canonicalization(e.to_string()))?;
    let mut buf = Vec::new();
    encode_value(&mut buf, &value)?;
    Ok(buf)
}

/// `digest(canonicalize(value))`: the leaf hash of a record.
pub fn canonical_digest<T: Serialize + ?Sized>(value: &T) -> Result<Digest> {
    Ok(Digest::hash(&canonicalize(value)?))
}

/// Recursively encode a value.
fn encode_value(buf: &mut Vec<u8>, value: &Value) -> Result<()> {
    match value {
        Value::Integer(i) => encode_text(buf, &i128::from(*i).to_string()),
        Value::Float(f) => encode_text(buf, &format_float(*f)?),
        Value::Bytes(b) => encode_bytes(buf, b),
        Value::Text(s) => encode_text(buf, s),
        Value::Array(arr) => {
            encode_uint(buf, 4, arr.len() as u64);
            for item in arr {
                encode_value(buf, item)?;
            }
        }
        Value::Map(entries) => encode_map(buf, entries)?,
        Value::Bool(b) => buf.push(if *b { 0xf5 } else { 0xf4 }),
        Value::Null => buf.push(0xf6),
        Value::Tag(tag, _) => {
            return Err(CoreError::Canonicalization(format!(
                "tagged values are not canonical (tag {tag})"
            )))
        }
        _ => {
            return Err(CoreError::Canonicalization(
                "unsupported value type".into(),
            ))
        }
    }
    Ok(())
}

/// Render a float as fixed, locale-free decimal text.
fn format_float(f: f64) -> Result<String> {
    if !f.is_finite() {
        return Err(CoreError::Canonicalization(format!(
            "non-finite number: {f}"
        )));
    }
    if f == 0.0 {
        // Collapses -0.0.
        return Ok("0".to_string());
    }
    Ok(format!("{f}"))
}

fn encode_uint(buf: &mut Vec<u8>, major: u8, n: u64) {
    let mt = major << 5;
    if n < 24 {
        buf.push(mt | (n as u8));
    } else if n <= 0xff {
        buf.push(mt | 24);
        buf.push(n as u8);
    } else if n <= 0xffff {
        buf.push(mt | 25);
        buf.extend_from_slice(&(n as u16).to_be_bytes());
    } else if n <= 0xffffffff {
        buf.push(mt | 26);
        buf.extend_from_slice(&(n as u32).to_be_bytes());
    } else {
        buf.push(mt | 27);
        buf.extend_from_slice(&n.to_be_bytes());
    }
}

fn encode_bytes(buf: &mut Vec<u8>, bytes: &[u8]) {
    encode_uint(buf, 2, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

fn encode_text(buf: &mut Vec<u8>, s: &str) {
    encode_uint(buf, 3, s.len() as u64);
    buf.extend_from_slice(s.as_bytes());
}

/// Encode a map with keys in lexicographic order.
fn encode_map(buf: &mut Vec<u8>, entries: &[(Value, Value)]) -> Result<()> {
    let mut sorted: Vec<(&str, &Value)> = Vec::with_capacity(entries.len());
    for (k, v) in entries {
        match k {
            Value::Text(key) => sorted.push((key.as_str(), v)),
            other => {
                return Err(CoreError::Canonicalization(format!(
                    "map keys must be strings, got {other:?}"
                )))
            }
        }
    }

    sorted.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

    if let Some(pair) = sorted.windows(2).find(|w| w[0].0 == w[1].0) {
        return Err(CoreError::Canonicalization(format!(
            "duplicate map key: {}",
            pair[0].0
        )));
    }

    encode_uint(buf, 5, sorted.len() as u64);
    for (key, value) in sorted {
        encode_text(buf, key);
        encode_value(buf, value)?;
    }
    Ok(())
}

/// Serde adapter for `DateTime<Utc>` fields: ISO-8601, millisecond
/// precision, `Z` suffix.
///
/// Use as `#[serde(with = "agrotrace_core::canonical::iso8601")]`.
pub mod iso8601 {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    /// Format a timestamp the way the canonical encoding expects it.
    pub fn format(ts: &DateTime<Utc>) -> String {
        ts.to_rfc3339_opts(SecondsFormat::Millis, true)
    }

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let s = String::deserialize(deserializer)?;
        DateTime::parse_from_rfc3339(&s)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}
