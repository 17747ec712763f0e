//! Canonical CBOR encoding for stream events.
//!
//! This module implements RFC 8949 Core Deterministic Encoding:
//! - Map keys sorted by encoded byte comparison
//! - Integers use smallest valid encoding
//! - Definite lengths only
//! - No floats (timestamps are i64 milliseconds)
//!
//! Event hashes are computed over these bytes, so the encoding must not vary
//! across platforms. Decoding accepts any well-formed CBOR map; the hash
//! check is what binds an envelope to the exact bytes that were signed.

use bytes::Bytes;
use ciborium::value::{Integer, Value};

use crate::envelope::StreamEvent;
use crate::error::CoreError;
use crate::payload::Payload;
use crate::types::{Address, EventHash};

/// StreamEvent field keys (integer keys for compact encoding).
mod keys {
    pub const CREATOR_ADDRESS: u64 = 0;
    pub const SALT: u64 = 1;
    pub const PREV_MINIBLOCK_HASH: u64 = 2;
    pub const PAYLOAD: u64 = 3;
    pub const CREATED_AT_EPOCH_MS: u64 = 4;
    pub const DELEGATE_SIG: u64 = 5;
    pub const DELEGATE_EXPIRY_EPOCH_MS: u64 = 6;
}

/// Encode a stream event to canonical CBOR bytes.
pub fn encode_stream_event(event: &StreamEvent) -> Result<Vec<u8>, CoreError> {
    let value = event_to_cbor_value(event)?;
    encode_cbor_value_canonical(&value)
}

/// Decode a stream event from CBOR bytes.
pub fn decode_stream_event(bytes: &[u8]) -> Result<StreamEvent, CoreError> {
    let value: Value =
        ciborium::from_reader(bytes).map_err(|e| CoreError::DecodingError(e.to_string()))?;
    cbor_value_to_event(&value)
}

/// Encode any serializable value canonically.
pub fn to_canonical_bytes<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, CoreError> {
    let value = Value::serialized(value).map_err(|e| CoreError::EncodingError(e.to_string()))?;
    encode_cbor_value_canonical(&value)
}

fn key(k: u64) -> Value {
    Value::Integer(k.into())
}

fn event_to_cbor_value(event: &StreamEvent) -> Result<Value, CoreError> {
    let payload =
        Value::serialized(&event.payload).map_err(|e| CoreError::EncodingError(e.to_string()))?;

    let prev = match &event.prev_miniblock_hash {
        Some(h) => Value::Bytes(h.0.to_vec()),
        None => Value::Null,
    };
    let delegate_sig = match &event.delegate_sig {
        Some(s) => Value::Bytes(s.to_vec()),
        None => Value::Null,
    };

    Ok(Value::Map(vec![
        (
            key(keys::CREATOR_ADDRESS),
            Value::Bytes(event.creator_address.0.to_vec()),
        ),
        (key(keys::SALT), Value::Bytes(event.salt.clone())),
        (key(keys::PREV_MINIBLOCK_HASH), prev),
        (key(keys::PAYLOAD), payload),
        (
            key(keys::CREATED_AT_EPOCH_MS),
            Value::Integer(event.created_at_epoch_ms.into()),
        ),
        (key(keys::DELEGATE_SIG), delegate_sig),
        (
            key(keys::DELEGATE_EXPIRY_EPOCH_MS),
            Value::Integer(event.delegate_expiry_epoch_ms.into()),
        ),
    ]))
}

fn cbor_value_to_event(value: &Value) -> Result<StreamEvent, CoreError> {
    let map = match value {
        Value::Map(m) => m,
        _ => return Err(CoreError::DecodingError("expected map".into())),
    };

    let get = |k: u64| -> Option<&Value> {
        map.iter()
            .find(|(mk, _)| matches!(mk, Value::Integer(i) if i128::from(*i) == k as i128))
            .map(|(_, v)| v)
    };

    let creator_address = match get(keys::CREATOR_ADDRESS) {
        Some(Value::Bytes(b)) => Address::try_from(b.as_slice())
            .map_err(|_| CoreError::DecodingError("invalid creator_address".into()))?,
        _ => return Err(CoreError::DecodingError("missing creator_address".into())),
    };

    let salt = match get(keys::SALT) {
        Some(Value::Bytes(b)) => b.clone(),
        None => Vec::new(),
        _ => return Err(CoreError::DecodingError("invalid salt".into())),
    };

    let prev_miniblock_hash = match get(keys::PREV_MINIBLOCK_HASH) {
        Some(Value::Bytes(b)) => Some(
            EventHash::try_from(b.as_slice())
                .map_err(|_| CoreError::DecodingError("invalid prev_miniblock_hash".into()))?,
        ),
        Some(Value::Null) | None => None,
        _ => return Err(CoreError::DecodingError("invalid prev_miniblock_hash".into())),
    };

    let payload: Payload = match get(keys::PAYLOAD) {
        Some(v) => v
            .deserialized()
            .map_err(|e| CoreError::DecodingError(format!("invalid payload: {}", e)))?,
        None => return Err(CoreError::DecodingError("missing payload".into())),
    };

    let created_at_epoch_ms = match get(keys::CREATED_AT_EPOCH_MS) {
        Some(Value::Integer(i)) => i64::try_from(*i)
            .map_err(|_| CoreError::DecodingError("created_at out of range".into()))?,
        _ => return Err(CoreError::DecodingError("missing created_at".into())),
    };

    let delegate_sig = match get(keys::DELEGATE_SIG) {
        Some(Value::Bytes(b)) if b.is_empty() => None,
        Some(Value::Bytes(b)) => Some(Bytes::copy_from_slice(b)),
        Some(Value::Null) | None => None,
        _ => return Err(CoreError::DecodingError("invalid delegate_sig".into())),
    };

    let delegate_expiry_epoch_ms = match get(keys::DELEGATE_EXPIRY_EPOCH_MS) {
        Some(Value::Integer(i)) => u64::try_from(*i)
            .map_err(|_| CoreError::DecodingError("delegate expiry out of range".into()))?,
        None => 0,
        _ => return Err(CoreError::DecodingError("invalid delegate expiry".into())),
    };

    Ok(StreamEvent {
        creator_address,
        salt,
        prev_miniblock_hash,
        payload,
        created_at_epoch_ms,
        delegate_sig,
        delegate_expiry_epoch_ms,
    })
}

/// Encode a CBOR Value to canonical bytes.
fn encode_cbor_value_canonical(value: &Value) -> Result<Vec<u8>, CoreError> {
    let mut buf = Vec::new();
    encode_value_to(&mut buf, value)?;
    Ok(buf)
}

/// Recursively encode a CBOR value.
fn encode_value_to(buf: &mut Vec<u8>, value: &Value) -> Result<(), CoreError> {
    match value {
        Value::Integer(i) => encode_integer(buf, *i),
        Value::Bytes(b) => encode_bytes(buf, b),
        Value::Text(s) => encode_text(buf, s),
        Value::Array(arr) => {
            encode_uint(buf, 4, arr.len() as u64);
            for item in arr {
                encode_value_to(buf, item)?;
            }
        }
        Value::Map(entries) => encode_map_canonical(buf, entries)?,
        Value::Bool(b) => buf.push(if *b { 0xf5 } else { 0xf4 }),
        Value::Null => buf.push(0xf6),
        Value::Float(_) => {
            return Err(CoreError::EncodingError(
                "floats not supported in canonical encoding".into(),
            ))
        }
        _ => return Err(CoreError::EncodingError("unsupported CBOR value type".into())),
    }
    Ok(())
}

/// Encode a CBOR integer (major types 0 and 1).
fn encode_integer(buf: &mut Vec<u8>, i: Integer) {
    let n = i128::from(i);
    if n >= 0 {
        encode_uint(buf, 0, n as u64);
    } else {
        // -1 encodes as 0, -2 as 1, ...
        encode_uint(buf, 1, (-1 - n) as u64);
    }
}

/// Encode an unsigned integer with the given major type.
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
    } else if n <= 0xffff_ffff {
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

/// Encode a map canonically (major type 5), keys sorted by encoded bytes.
fn encode_map_canonical(buf: &mut Vec<u8>, entries: &[(Value, Value)]) -> Result<(), CoreError> {
    let mut pairs = Vec::with_capacity(entries.len());
    for (k, v) in entries {
        let mut key_buf = Vec::new();
        encode_value_to(&mut key_buf, k)?;
        pairs.push((key_buf, v));
    }
    pairs.sort_by(|a, b| a.0.cmp(&b.0));

    encode_uint(buf, 5, pairs.len() as u64);
    for (key_bytes, value) in pairs {
        buf.extend_from_slice(&key_bytes);
        encode_value_to(buf, value)?;
    }
    Ok(())
}
