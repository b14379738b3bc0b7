//! Decoding and encoding of value windows.
//!
//! Decoding is total: a window that does not fit the buffer, or a width the
//! mode cannot hold, yields `None`. Encoding is the inverse and reports
//! values that cannot be represented.

use tracing::trace;

use crate::error::{CodecError, Result};
use crate::schema::{DecodeMode, Endian, NumericSchema};
use crate::value::Value;

/// Widest window the integer modes accept.
const MAX_NUMERIC_LENGTH: usize = 8;

/// Decode the value described by `schema` from `buf`.
pub fn decode(schema: &NumericSchema, buf: &[u8]) -> Option<Value> {
    decode_at(schema, buf, 0)
}

/// Decode with a base offset, used when the schema carries no offset of its
/// own (for example to skip a packet header).
pub fn decode_at(schema: &NumericSchema, buf: &[u8], base_offset: usize) -> Option<Value> {
    let offset = schema.effective_offset(base_offset);
    let end = offset.checked_add(schema.length)?;
    let window = buf.get(offset..end)?;
    if window.is_empty() {
        return None;
    }

    if schema.decode == DecodeMode::SignedByteHalfDegree {
        let byte = match schema.endian {
            Endian::Big => window[window.len() - 1],
            Endian::Little => window[0],
        };
        let value = half_degree(byte, schema.signed);
        return Some(finish(schema, scale_down(value, schema.precision)));
    }

    let mut ordered = window.to_vec();
    if schema.endian == Endian::Little {
        ordered.reverse();
    }

    match schema.decode {
        DecodeMode::Ascii => {
            let text = ordered
                .iter()
                .take_while(|&&b| b != 0)
                .map(|&b| char::from(b))
                .collect();
            Some(Value::Text(text))
        }
        DecodeMode::Bcd => {
            if ordered.len() > MAX_NUMERIC_LENGTH {
                return None;
            }
            let value = ordered.iter().fold(0i64, |acc, &b| {
                acc * 100 + i64::from(b >> 4) * 10 + i64::from(b & 0x0F)
            });
            Some(finish_integer(schema, value))
        }
        DecodeMode::None => {
            if ordered.len() > MAX_NUMERIC_LENGTH {
                return None;
            }
            let raw = ordered
                .iter()
                .fold(0u64, |acc, &b| (acc << 8) | u64::from(b));
            let bits = ordered.len() * 8;
            let value = if schema.signed {
                sign_extend(raw, bits)
            } else {
                i64::try_from(raw).ok()?
            };
            Some(finish_integer(schema, value))
        }
        DecodeMode::SignedByteHalfDegree => None,
    }
}

/// Encode `value` into a window of `schema.length` bytes.
pub fn encode(schema: &NumericSchema, value: &Value) -> Result<Vec<u8>> {
    if schema.length == 0 {
        return Err(unsupported_length(schema));
    }

    let bytes = match schema.decode {
        DecodeMode::Ascii => encode_ascii(schema, value)?,
        DecodeMode::SignedByteHalfDegree => {
            let number = numeric_input(schema, value)?;
            let byte = encode_half_degree(schema, number)?;
            let mut window = vec![0u8; schema.length];
            match schema.endian {
                Endian::Big => window[schema.length - 1] = byte,
                Endian::Little => window[0] = byte,
            }
            window
        }
        DecodeMode::Bcd => {
            if schema.length > MAX_NUMERIC_LENGTH {
                return Err(unsupported_length(schema));
            }
            let number = scaled_integer(schema, numeric_input(schema, value)?)?;
            let mut window = encode_bcd(schema, number)?;
            if schema.endian == Endian::Little {
                window.reverse();
            }
            window
        }
        DecodeMode::None => {
            if schema.length > MAX_NUMERIC_LENGTH {
                return Err(unsupported_length(schema));
            }
            let number = scaled_integer(schema, numeric_input(schema, value)?)?;
            let mut window = encode_integer(schema, number)?;
            if schema.endian == Endian::Little {
                window.reverse();
            }
            window
        }
    };

    trace!(mode = %schema.decode, ?bytes, "encoded value");
    Ok(bytes)
}

/// Encode `value` and write it at the schema's offset (0 when unset),
/// growing `dst` with zero bytes when it is too short.
pub fn encode_into(schema: &NumericSchema, value: &Value, dst: &mut Vec<u8>) -> Result<()> {
    let window = encode(schema, value)?;
    let offset = schema.effective_offset(0);
    let end = offset + window.len();
    if dst.len() < end {
        dst.resize(end, 0);
    }
    dst[offset..end].copy_from_slice(&window);
    Ok(())
}

fn half_degree(byte: u8, signed: bool) -> f64 {
    let whole = if signed { byte & 0x3F } else { byte & 0x7F };
    let mut value = f64::from(whole);
    if byte & 0x80 != 0 {
        value += 0.5;
    }
    if signed && byte & 0x40 != 0 {
        value = -value;
    }
    value
}

fn sign_extend(raw: u64, bits: usize) -> i64 {
    if bits >= 64 {
        return raw as i64;
    }
    let shift = 64 - bits;
    ((raw << shift) as i64) >> shift
}

fn scale_down(value: f64, precision: u32) -> f64 {
    if precision == 0 {
        return value;
    }
    let factor = 10f64.powi(precision as i32);
    ((value / factor) * factor).round() / factor
}

fn finish_integer(schema: &NumericSchema, value: i64) -> Value {
    if schema.precision == 0 {
        return match schema.label_for(value) {
            Some(label) => Value::Label(label.to_string()),
            None => Value::Integer(value),
        };
    }
    finish(schema, scale_down(value as f64, schema.precision))
}

fn finish(schema: &NumericSchema, value: f64) -> Value {
    if value.fract() == 0.0 {
        if let Some(label) = schema.label_for(value as i64) {
            return Value::Label(label.to_string());
        }
    }
    Value::Decimal(value)
}

fn numeric_input(schema: &NumericSchema, value: &Value) -> Result<f64> {
    match value {
        Value::Integer(v) => Ok(*v as f64),
        Value::Decimal(v) => Ok(*v),
        Value::Label(label) => schema
            .key_for(label)
            .map(|key| key as f64)
            .ok_or_else(|| CodecError::UnknownLabel(label.clone())),
        Value::Text(text) => match schema.key_for(text) {
            Some(key) => Ok(key as f64),
            None => text.trim().parse::<f64>().map_err(|_| CodecError::Unencodable {
                mode: schema.decode.as_str(),
                value: format!("'{text}'"),
            }),
        },
    }
}

fn scale_factor(schema: &NumericSchema) -> f64 {
    10f64.powi(schema.precision as i32) * schema.multiply_factor.unwrap_or(1.0)
}

fn scaled_integer(schema: &NumericSchema, value: f64) -> Result<i64> {
    let scaled = (value * scale_factor(schema)).round();
    if !scaled.is_finite() || scaled < i64::MIN as f64 || scaled > i64::MAX as f64 {
        return Err(out_of_range(schema, value));
    }
    Ok(scaled as i64)
}

fn encode_integer(schema: &NumericSchema, value: i64) -> Result<Vec<u8>> {
    let bits = schema.length * 8;
    let (min, max) = if schema.signed {
        (-(1i128 << (bits - 1)), (1i128 << (bits - 1)) - 1)
    } else {
        (0, (1i128 << bits) - 1)
    };
    let wide = i128::from(value);
    if wide < min || wide > max {
        return Err(out_of_range(schema, value));
    }
    let raw = wide.rem_euclid(1i128 << bits) as u128;
    Ok((0..schema.length)
        .rev()
        .map(|i| (raw >> (8 * i)) as u8)
        .collect())
}

fn encode_bcd(schema: &NumericSchema, value: i64) -> Result<Vec<u8>> {
    if value < 0 {
        return Err(out_of_range(schema, value));
    }
    let mut rest = value;
    let mut window = vec![0u8; schema.length];
    for byte in window.iter_mut().rev() {
        let low = (rest % 10) as u8;
        let high = ((rest / 10) % 10) as u8;
        *byte = (high << 4) | low;
        rest /= 100;
    }
    if rest != 0 {
        return Err(out_of_range(schema, value));
    }
    Ok(window)
}

fn encode_half_degree(schema: &NumericSchema, value: f64) -> Result<u8> {
    let scaled = value * scale_factor(schema);
    let halves = (scaled.abs() * 2.0).round();
    let whole = halves / 2.0;
    let limit = if schema.signed { 0x3F } else { 0x7F };
    if !halves.is_finite() || whole.trunc() > f64::from(limit) || (!schema.signed && scaled < 0.0)
    {
        return Err(out_of_range(schema, value));
    }

    let mut byte = whole.trunc() as u8;
    if halves % 2.0 != 0.0 {
        byte |= 0x80;
    }
    if schema.signed && scaled < 0.0 && halves != 0.0 {
        byte |= 0x40;
    }
    Ok(byte)
}

fn encode_ascii(schema: &NumericSchema, value: &Value) -> Result<Vec<u8>> {
    let (text, pad) = match value {
        Value::Integer(v) => (v.to_string(), '0'),
        Value::Decimal(v) => (v.to_string(), '0'),
        Value::Text(s) => (s.clone(), ' '),
        Value::Label(label) => match schema.key_for(label) {
            Some(key) => (key.to_string(), '0'),
            None => return Err(CodecError::UnknownLabel(label.clone())),
        },
    };

    let chars: Vec<char> = text.chars().collect();
    let padding = schema.length.saturating_sub(chars.len());
    let mut window = Vec::with_capacity(schema.length);
    for c in std::iter::repeat(pad).take(padding).chain(chars) {
        if window.len() == schema.length {
            break;
        }
        let byte = u8::try_from(u32::from(c)).map_err(|_| CodecError::Unencodable {
            mode: schema.decode.as_str(),
            value: format!("'{text}'"),
        })?;
        window.push(byte);
    }
    if schema.endian == Endian::Little {
        window.reverse();
    }
    Ok(window)
}

fn out_of_range(schema: &NumericSchema, value: impl ToString) -> CodecError {
    CodecError::OutOfRange {
        value: value.to_string(),
        length: schema.length,
    }
}

fn unsupported_length(schema: &NumericSchema) -> CodecError {
    CodecError::UnsupportedLength {
        mode: schema.decode.as_str(),
        length: schema.length,
    }
}
