//! # Parameter Block Codec
//!
//! Serializes named, typed parameters into the wire's parameter block and
//! decodes received blocks back into typed values.
//!
//! ## Wire Format
//! ```text
//! [count:u32]
//! [type_id:u32][name_offset:u32][value_offset:u32]   x count
//! [name bytes][0x00][value bytes]                    x count
//! ```
//!
//! Offsets are absolute from the first byte of the block. Values carry no
//! length: a value ends where the next entry's name starts, or at the end
//! of the block. Every value travels as text (see [`value_text`]).

use crate::core::types::{Param, ParamType, TypedValue};
use crate::error::{constants, ProtocolError, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use bytes::{Buf, BufMut, BytesMut};
use chrono::{Datelike, NaiveDateTime, Timelike};
use std::collections::HashSet;
use std::ops::RangeInclusive;

/// Text form of `DateTime` values
pub const DATETIME_FORMAT: &str = "%d.%m.%y %H:%M:%S";

/// Years a two-digit `%y` field reads back as (70..=99 and 00..=69)
pub const DATETIME_YEARS: RangeInclusive<i32> = 1970..=2069;

/// Largest accepted parameter name, in bytes
pub const MAX_NAME_LEN: usize = 64 * 1024;

const COUNT_SIZE: usize = 4;
const DESCRIPTION_SIZE: usize = 12;

/// Encode a list of user parameters.
///
/// Names must be non-empty, unique, NUL-free and at most [`MAX_NAME_LEN`]
/// bytes; anything else is an `Encoding` error. Values whose text form would
/// not decode back to the same value are rejected too (see [`validate_value`]).
pub fn encode_params(params: &[Param]) -> Result<BytesMut> {
    let mut seen = HashSet::with_capacity(params.len());
    for param in params {
        if !seen.insert(param.name.as_str()) {
            return Err(ProtocolError::Encoding(format!(
                "Duplicate parameter name '{}'",
                param.name
            )));
        }
    }
    let entries: Vec<(&str, &TypedValue)> = params
        .iter()
        .map(|p| (p.name.as_str(), &p.value))
        .collect();
    encode_entries(&entries)
}

/// Encode entries without the uniqueness check.
///
/// Protocol-level blocks may repeat a name (e.g. several `errors` lines).
pub(crate) fn encode_entries(entries: &[(&str, &TypedValue)]) -> Result<BytesMut> {
    let mut texts = Vec::with_capacity(entries.len());
    for (name, value) in entries {
        validate_name(name)?;
        validate_value(name, value)?;
        texts.push(value_text(value));
    }

    let data_len: usize = entries
        .iter()
        .zip(&texts)
        .map(|((name, _), text)| name.len() + 1 + text.len())
        .sum();
    let table_len = COUNT_SIZE + DESCRIPTION_SIZE * entries.len();
    let total = table_len + data_len;
    let count = u32::try_from(entries.len())
        .map_err(|_| ProtocolError::Encoding(constants::ERR_BLOCK_TOO_LARGE.into()))?;
    if u32::try_from(total).is_err() {
        return Err(ProtocolError::Encoding(
            constants::ERR_BLOCK_TOO_LARGE.into(),
        ));
    }

    let mut block = BytesMut::with_capacity(total);
    block.put_u32_le(count);

    let mut offset = table_len;
    for ((name, value), text) in entries.iter().zip(&texts) {
        let name_offset = offset;
        let value_offset = name_offset + name.len() + 1;
        block.put_u32_le(value.param_type().type_id());
        block.put_u32_le(name_offset as u32);
        block.put_u32_le(value_offset as u32);
        offset = value_offset + text.len();
    }

    for ((name, _), text) in entries.iter().zip(&texts) {
        block.put_slice(name.as_bytes());
        block.put_u8(0);
        block.put_slice(text.as_bytes());
    }

    debug_assert_eq!(block.len(), total);
    Ok(block)
}

fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(ProtocolError::Encoding(constants::ERR_EMPTY_NAME.into()));
    }
    if name.as_bytes().contains(&0) {
        return Err(ProtocolError::Encoding(format!(
            "{}: '{}'",
            constants::ERR_NAME_CONTAINS_NUL,
            name.escape_default()
        )));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(ProtocolError::Encoding(format!(
            "{} ({} bytes)",
            constants::ERR_NAME_TOO_LONG,
            name.len()
        )));
    }
    Ok(())
}

/// Reject values the text encoding cannot carry losslessly.
///
/// - `Double` must be finite
/// - `DateTime` must fall in [`DATETIME_YEARS`] with whole seconds
/// - `Base64` payloads must be UTF-8, since receivers decode them as text
pub fn validate_value(name: &str, value: &TypedValue) -> Result<()> {
    let reason = match value {
        TypedValue::Double(d) if !d.is_finite() => format!("non-finite double {d}"),
        TypedValue::DateTime(dt) if !DATETIME_YEARS.contains(&dt.year()) => format!(
            "year {} outside {}..={}",
            dt.year(),
            DATETIME_YEARS.start(),
            DATETIME_YEARS.end()
        ),
        TypedValue::DateTime(dt) if dt.nanosecond() != 0 => {
            format!("sub-second precision in {dt}")
        }
        TypedValue::Base64(raw) => match std::str::from_utf8(raw) {
            Ok(_) => return Ok(()),
            Err(e) => format!("payload is not UTF-8: {e}"),
        },
        _ => return Ok(()),
    };
    Err(ProtocolError::Encoding(format!(
        "Cannot encode {} value for '{}': {reason}",
        value.param_type().name(),
        name.escape_default()
    )))
}

/// Wire text of a value
pub fn value_text(value: &TypedValue) -> String {
    match value {
        TypedValue::String(s) => s.clone(),
        TypedValue::Integer(i) => i.to_string(),
        TypedValue::Boolean(b) => if *b { "1" } else { "0" }.to_string(),
        TypedValue::Double(d) => d.to_string(),
        TypedValue::DateTime(dt) => dt.format(DATETIME_FORMAT).to_string(),
        TypedValue::Base64(raw) => BASE64.encode(raw),
    }
}

/// Decode a parameter block into `(name, value)` pairs in description order.
pub fn decode_params(block: &[u8]) -> Result<Vec<(String, TypedValue)>> {
    if block.len() < COUNT_SIZE {
        return Err(truncated("count"));
    }
    let count = (&block[..COUNT_SIZE]).get_u32_le();
    decode_params_with_count(block, count)
}

/// Decode a block whose `count` is already known.
///
/// `block` still starts at the count field, since offsets are relative to it.
pub fn decode_params_with_count(block: &[u8], count: u32) -> Result<Vec<(String, TypedValue)>> {
    let count = count as usize;
    let table_len = count
        .checked_mul(DESCRIPTION_SIZE)
        .and_then(|n| n.checked_add(COUNT_SIZE))
        .filter(|&n| n <= block.len())
        .ok_or_else(|| truncated("description table"))?;

    let mut table = &block[COUNT_SIZE..table_len];
    let mut descriptions = Vec::with_capacity(count);
    for _ in 0..count {
        let type_id = table.get_u32_le();
        let name_offset = table.get_u32_le() as usize;
        let value_offset = table.get_u32_le() as usize;
        descriptions.push((type_id, name_offset, value_offset));
    }

    let mut decoded = Vec::with_capacity(count);
    for (i, &(type_id, name_offset, value_offset)) in descriptions.iter().enumerate() {
        let value_end = descriptions
            .get(i + 1)
            .map(|&(_, next_name, _)| next_name)
            .unwrap_or(block.len());

        if name_offset < table_len || name_offset >= value_offset || value_offset > value_end
            || value_end > block.len()
        {
            return Err(ProtocolError::Decoding(format!(
                "{} (entry {i}: name {name_offset}, value {value_offset}, end {value_end})",
                constants::ERR_BAD_OFFSETS
            )));
        }

        let name_field = &block[name_offset..value_offset];
        let nul = name_field
            .iter()
            .position(|&b| b == 0)
            .ok_or_else(|| {
                ProtocolError::Decoding(format!("{} (entry {i})", constants::ERR_UNTERMINATED_NAME))
            })?;
        let name = std::str::from_utf8(&name_field[..nul])
            .map_err(|_| ProtocolError::Decoding(format!("Parameter name {i} is not UTF-8")))?
            .to_string();

        let ty = ParamType::from_type_id(type_id).ok_or_else(|| {
            ProtocolError::Decoding(format!("Unknown type discriminant {type_id} for '{name}'"))
        })?;
        let value = parse_value(ty, &block[value_offset..value_end])
            .map_err(|reason| {
                ProtocolError::Decoding(format!("Bad {} value for '{name}': {reason}", ty.name()))
            })?;

        decoded.push((name, value));
    }

    Ok(decoded)
}

fn parse_value(ty: ParamType, raw: &[u8]) -> std::result::Result<TypedValue, String> {
    let text = std::str::from_utf8(raw).map_err(|e| e.to_string())?;
    match ty {
        ParamType::String => Ok(TypedValue::String(text.to_string())),
        ParamType::Integer => text
            .trim()
            .parse::<i64>()
            .map(TypedValue::Integer)
            .map_err(|e| e.to_string()),
        ParamType::Boolean => text
            .trim()
            .parse::<i64>()
            .map(|n| TypedValue::Boolean(n != 0))
            .map_err(|e| e.to_string()),
        ParamType::Double => text
            .trim()
            .parse::<f64>()
            .map(TypedValue::Double)
            .map_err(|e| e.to_string()),
        ParamType::DateTime => NaiveDateTime::parse_from_str(text.trim(), DATETIME_FORMAT)
            .map(TypedValue::DateTime)
            .map_err(|e| e.to_string()),
        ParamType::Base64 => {
            let raw = BASE64.decode(text.trim()).map_err(|e| e.to_string())?;
            std::str::from_utf8(&raw).map_err(|e| e.to_string())?;
            Ok(TypedValue::Base64(raw))
        }
    }
}

fn truncated(part: &str) -> ProtocolError {
    ProtocolError::Decoding(format!("{} in {part}", constants::ERR_TRUNCATED_BLOCK))
}
