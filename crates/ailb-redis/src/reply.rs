//! `MGET` reply decoding

use ailb_core::StoreReply;
use redis::Value;

/// Convert a raw `MGET` reply into the core's reply shape
///
/// `Nil` entries become missing. String and integer entries become their text.
/// Any other entry is kept as its debug text so the core rejects it as
/// malformed instead of treating it as missing.
#[must_use]
pub fn decode_reply(value: Value) -> StoreReply {
    match value {
        Value::Array(items) => StoreReply::Array(items.into_iter().map(decode_entry).collect()),
        _ => StoreReply::NonArray,
    }
}

fn decode_entry(value: Value) -> Option<String> {
    match value {
        Value::Nil => None,
        Value::BulkString(bytes) => Some(String::from_utf8_lossy(&bytes).into_owned()),
        Value::SimpleString(s) => Some(s),
        Value::Int(i) => Some(i.to_string()),
        other => Some(format!("{:?}", other)),
    }
}
