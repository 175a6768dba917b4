//! Conversions between `pgnest_core::Value` and Postgres wire values

use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use pgnest_core::{PgnestError, Result, Value};
use postgres_types::{FromSql, IsNull, Kind, ToSql, Type};
use std::error::Error as StdError;
use tokio_postgres::Row as PgRow;

type BoxError = Box<dyn StdError + Sync + Send>;

/// Owned parameter value handed to tokio-postgres
#[derive(Debug)]
pub(crate) enum PgValue {
    Null,
    Bool(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
    /// Decimal text, sent in the binary NUMERIC layout
    Numeric(String),
    String(String),
    Bytes(Vec<u8>),
    Uuid(uuid::Uuid),
    Json(serde_json::Value),
    DateTimeUtc(DateTime<Utc>),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    Array(Vec<PgValue>),
}

impl PgValue {
    /// Convert a parameter for the type the server inferred for its placeholder,
    /// so integers are written with the width the column expects
    pub(crate) fn for_type(value: &Value, target_type: &Type) -> Self {
        if is_text_type(target_type) {
            return Self::as_text(value);
        }

        match value {
            Value::Null => PgValue::Null,
            Value::Bool(v) => PgValue::Bool(*v),
            Value::Int16(v) => Self::coerce_int(i64::from(*v), target_type),
            Value::Int32(v) => Self::coerce_int(i64::from(*v), target_type),
            Value::Int64(v) => Self::coerce_int(*v, target_type),
            Value::Float32(v) => match *target_type {
                Type::FLOAT8 => PgValue::Float64(f64::from(*v)),
                Type::NUMERIC => PgValue::Numeric(v.to_string()),
                _ => PgValue::Float32(*v),
            },
            Value::Float64(v) => match *target_type {
                Type::FLOAT4 => PgValue::Float32(*v as f32),
                Type::NUMERIC => PgValue::Numeric(v.to_string()),
                _ => PgValue::Float64(*v),
            },
            Value::Decimal(v) | Value::String(v) => Self::coerce_string(v, target_type),
            Value::Bytes(v) => PgValue::Bytes(v.clone()),
            Value::Uuid(v) => PgValue::Uuid(*v),
            Value::Json(v) => PgValue::Json(v.clone()),
            Value::DateTimeUtc(v) => match *target_type {
                Type::TIMESTAMP => PgValue::DateTime(v.naive_utc()),
                _ => PgValue::DateTimeUtc(*v),
            },
            Value::Date(v) => PgValue::Date(*v),
            Value::Time(v) => PgValue::Time(*v),
            Value::DateTime(v) => match *target_type {
                Type::TIMESTAMPTZ => PgValue::DateTimeUtc(v.and_utc()),
                _ => PgValue::DateTime(*v),
            },
            Value::Array(items) => match target_type.kind() {
                Kind::Array(member) => PgValue::Array(
                    items
                        .iter()
                        .map(|item| Self::for_type(item, member))
                        .collect(),
                ),
                _ => PgValue::Json(value.to_json()),
            },
        }
    }

    /// Any scalar bound to a text placeholder is sent as its text form
    fn as_text(value: &Value) -> Self {
        match value {
            Value::Null => PgValue::Null,
            Value::Decimal(v) | Value::String(v) => PgValue::String(v.clone()),
            Value::Float32(v) => PgValue::String(v.to_string()),
            Value::Float64(v) => PgValue::String(v.to_string()),
            other => match other.to_json() {
                serde_json::Value::String(text) => PgValue::String(text),
                json => PgValue::String(json.to_string()),
            },
        }
    }

    fn coerce_int(value: i64, target_type: &Type) -> Self {
        match *target_type {
            Type::INT2 => i16::try_from(value)
                .map(PgValue::Int16)
                .unwrap_or(PgValue::Int64(value)),
            Type::INT4 => i32::try_from(value)
                .map(PgValue::Int32)
                .unwrap_or(PgValue::Int64(value)),
            Type::FLOAT4 => PgValue::Float32(value as f32),
            Type::FLOAT8 => PgValue::Float64(value as f64),
            Type::NUMERIC => PgValue::Numeric(value.to_string()),
            _ => PgValue::Int64(value),
        }
    }

    /// Text parameters bound to typed placeholders are parsed client-side
    fn coerce_string(value: &str, target_type: &Type) -> Self {
        let parsed = match *target_type {
            Type::NUMERIC => Some(PgValue::Numeric(value.trim().to_string())),
            Type::JSON | Type::JSONB => serde_json::from_str(value).ok().map(PgValue::Json),
            Type::UUID => uuid::Uuid::parse_str(value).ok().map(PgValue::Uuid),
            Type::BOOL => match value {
                "t" | "true" => Some(PgValue::Bool(true)),
                "f" | "false" => Some(PgValue::Bool(false)),
                _ => None,
            },
            Type::INT2 | Type::INT4 | Type::INT8 => value
                .trim()
                .parse::<i64>()
                .ok()
                .map(|v| Self::coerce_int(v, target_type)),
            Type::FLOAT4 => value.trim().parse::<f32>().ok().map(PgValue::Float32),
            Type::FLOAT8 => value.trim().parse::<f64>().ok().map(PgValue::Float64),
            Type::DATE => NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .map(PgValue::Date),
            Type::TIME => NaiveTime::parse_from_str(value, "%H:%M:%S%.f")
                .ok()
                .map(PgValue::Time),
            Type::TIMESTAMP => parse_naive_timestamp(value).map(PgValue::DateTime),
            Type::TIMESTAMPTZ => DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|timestamp| timestamp.with_timezone(&Utc))
                .or_else(|| parse_naive_timestamp(value).map(|naive| naive.and_utc()))
                .map(PgValue::DateTimeUtc),
            _ => None,
        };
        parsed.unwrap_or_else(|| PgValue::String(value.to_string()))
    }
}

/// Placeholders whose binary format is plain UTF-8
fn is_text_type(ty: &Type) -> bool {
    matches!(
        *ty,
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN
    )
}

fn parse_naive_timestamp(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f"))
        .ok()
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

impl ToSql for PgValue {
    /// Each variant is type-checked against the placeholder, so a mismatch
    /// fails client-side instead of reaching the server as a malformed payload
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> std::result::Result<IsNull, BoxError> {
        match self {
            PgValue::Null => Ok(IsNull::Yes),
            PgValue::Bool(v) => v.to_sql_checked(ty, out),
            PgValue::Int16(v) => v.to_sql_checked(ty, out),
            PgValue::Int32(v) => v.to_sql_checked(ty, out),
            PgValue::Int64(v) => v.to_sql_checked(ty, out),
            PgValue::Float32(v) => v.to_sql_checked(ty, out),
            PgValue::Float64(v) => v.to_sql_checked(ty, out),
            PgValue::Numeric(v) if *ty == Type::NUMERIC => {
                out.extend_from_slice(&PgNumericString::encode(v)?);
                Ok(IsNull::No)
            }
            PgValue::Numeric(v) => v.to_sql_checked(ty, out),
            // Enum labels travel as their text
            PgValue::String(v) if matches!(ty.kind(), Kind::Enum(_)) => {
                out.extend_from_slice(v.as_bytes());
                Ok(IsNull::No)
            }
            PgValue::String(v) => v.to_sql_checked(ty, out),
            PgValue::Bytes(v) => v.to_sql_checked(ty, out),
            PgValue::Uuid(v) => v.to_sql_checked(ty, out),
            PgValue::Json(v) => v.to_sql_checked(ty, out),
            PgValue::DateTimeUtc(v) => v.to_sql_checked(ty, out),
            PgValue::Date(v) => v.to_sql_checked(ty, out),
            PgValue::Time(v) => v.to_sql_checked(ty, out),
            PgValue::DateTime(v) => v.to_sql_checked(ty, out),
            PgValue::Array(v) => v.to_sql_checked(ty, out),
        }
    }

    fn accepts(_: &Type) -> bool {
        true
    }

    postgres_types::to_sql_checked!();
}

/// NUMERIC decoded to its exact decimal text
#[derive(Debug)]
pub(crate) struct PgNumericString(pub(crate) String);

/// Any other type decoded from its raw UTF-8 payload (enums, domains)
#[derive(Debug)]
struct PgFallbackString(String);

const NUMERIC_POS: u16 = 0x0000;
const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;
/// Largest display scale the server accepts
const NUMERIC_MAX_DSCALE: i64 = 0x3FFF;

impl PgNumericString {
    /// Encode decimal text (`-12.50`, `1.5e3`, `NaN`, `Infinity`) as a binary
    /// NUMERIC payload, the inverse of [`PgNumericString::parse`]
    pub(crate) fn encode(text: &str) -> std::result::Result<Vec<u8>, BoxError> {
        let text = text.trim();
        let invalid = || -> BoxError { format!("invalid NUMERIC value {text:?}").into() };

        let special = match text.to_ascii_lowercase().as_str() {
            "nan" => Some(NUMERIC_NAN),
            "infinity" | "+infinity" | "inf" | "+inf" => Some(NUMERIC_PINF),
            "-infinity" | "-inf" => Some(NUMERIC_NINF),
            _ => None,
        };
        if let Some(sign) = special {
            return Ok(numeric_payload(0, sign, 0, &[]));
        }

        let (negative, unsigned) = match text.as_bytes().first() {
            Some(b'-') => (true, &text[1..]),
            Some(b'+') => (false, &text[1..]),
            _ => (false, text),
        };
        let (mantissa, exponent) = match unsigned.find(['e', 'E']) {
            Some(at) => (
                &unsigned[..at],
                unsigned[at + 1..].parse::<i64>().map_err(|_| invalid())?,
            ),
            None => (unsigned, 0),
        };
        let (int_part, frac_part) = mantissa.split_once('.').unwrap_or((mantissa, ""));
        let is_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if int_part.len() + frac_part.len() == 0
            || !is_digits(int_part)
            || !is_digits(frac_part)
            || exponent.unsigned_abs() > NUMERIC_MAX_DSCALE.unsigned_abs()
        {
            return Err(invalid());
        }

        let digits = format!("{int_part}{frac_part}");
        let len = digits.len() as i64;
        let point = int_part.len() as i64 + exponent;
        let dscale = (frac_part.len() as i64 - exponent).max(0);
        if dscale > NUMERIC_MAX_DSCALE {
            return Err(invalid());
        }

        let (int_digits, frac_digits) = if point <= 0 {
            (String::new(), format!("{}{digits}", "0".repeat((-point) as usize)))
        } else if point >= len {
            (format!("{digits}{}", "0".repeat((point - len) as usize)), String::new())
        } else {
            let (int_digits, frac_digits) = digits.split_at(point as usize);
            (int_digits.to_string(), frac_digits.to_string())
        };

        // Align both sides on base-10000 group boundaries around the point
        let int_padded = format!("{}{int_digits}", "0".repeat((4 - int_digits.len() % 4) % 4));
        let frac_padded = format!("{frac_digits}{}", "0".repeat((4 - frac_digits.len() % 4) % 4));
        let mut groups = int_padded
            .as_bytes()
            .chunks(4)
            .chain(frac_padded.as_bytes().chunks(4))
            .map(|chunk| chunk.iter().fold(0u16, |acc, b| acc * 10 + u16::from(b - b'0')))
            .collect::<Vec<_>>();
        let mut weight = (int_padded.len() / 4) as i64 - 1;

        let leading_zeros = groups.iter().take_while(|group| **group == 0).count();
        groups.drain(..leading_zeros);
        weight -= leading_zeros as i64;
        while groups.last() == Some(&0) {
            groups.pop();
        }
        if groups.is_empty() {
            weight = 0;
        }

        let weight = i16::try_from(weight).map_err(|_| invalid())?;
        if i16::try_from(groups.len()).is_err() {
            return Err(invalid());
        }
        let sign = if negative && !groups.is_empty() {
            NUMERIC_NEG
        } else {
            NUMERIC_POS
        };
        Ok(numeric_payload(weight, sign, dscale as i16, &groups))
    }

    /// Decode the binary NUMERIC representation: digit count, weight, sign
    /// and display scale, followed by base-10000 digit groups
    pub(crate) fn parse(raw: &[u8]) -> std::result::Result<String, BoxError> {
        if raw.len() < 8 {
            return Err("invalid NUMERIC payload: too short".into());
        }

        let ndigits = i16::from_be_bytes([raw[0], raw[1]]).max(0) as usize;
        let weight = i16::from_be_bytes([raw[2], raw[3]]);
        let sign = u16::from_be_bytes([raw[4], raw[5]]);
        let dscale = i16::from_be_bytes([raw[6], raw[7]]).max(0) as usize;

        if raw.len() < 8 + ndigits * 2 {
            return Err("invalid NUMERIC payload: truncated digits".into());
        }

        match sign {
            NUMERIC_NAN => return Ok("NaN".to_string()),
            NUMERIC_PINF => return Ok("Infinity".to_string()),
            NUMERIC_NINF => return Ok("-Infinity".to_string()),
            _ => {}
        }

        let groups = raw[8..8 + ndigits * 2]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect::<Vec<_>>();
        if groups.iter().any(|group| *group > 9999) {
            return Err("invalid NUMERIC payload: group out of range".into());
        }

        // Group i has weight (weight - i); groups outside the payload are zero
        let integer_groups = if weight >= 0 { weight as usize + 1 } else { 0 };
        let group_at = |position: i64| -> u16 {
            usize::try_from(position)
                .ok()
                .and_then(|index| groups.get(index).copied())
                .unwrap_or(0)
        };

        let mut integer_text = String::new();
        for index in 0..integer_groups {
            let group = group_at(index as i64);
            if index == 0 {
                integer_text.push_str(&group.to_string());
            } else {
                integer_text.push_str(&format!("{group:04}"));
            }
        }
        if integer_text.is_empty() {
            integer_text.push('0');
        }

        // Fraction group k has weight -k, i.e. sits at index weight + k
        let mut fraction_text = String::new();
        for k in 1..=dscale.div_ceil(4) {
            let group = group_at(i64::from(weight) + k as i64);
            fraction_text.push_str(&format!("{group:04}"));
        }
        fraction_text.truncate(dscale);

        let mut output = String::new();
        if sign == NUMERIC_NEG && groups.iter().any(|group| *group != 0) {
            output.push('-');
        }
        output.push_str(&integer_text);
        if !fraction_text.is_empty() {
            output.push('.');
            output.push_str(&fraction_text);
        }

        Ok(output)
    }
}

/// Header (digit count, weight, sign, display scale) followed by the groups
fn numeric_payload(weight: i16, sign: u16, dscale: i16, groups: &[u16]) -> Vec<u8> {
    let mut raw = Vec::with_capacity(8 + groups.len() * 2);
    raw.extend_from_slice(&(groups.len() as i16).to_be_bytes());
    raw.extend_from_slice(&weight.to_be_bytes());
    raw.extend_from_slice(&sign.to_be_bytes());
    raw.extend_from_slice(&dscale.to_be_bytes());
    for group in groups {
        raw.extend_from_slice(&group.to_be_bytes());
    }
    raw
}

impl<'a> FromSql<'a> for PgNumericString {
    fn from_sql(_: &Type, raw: &'a [u8]) -> std::result::Result<Self, BoxError> {
        Ok(Self(Self::parse(raw)?))
    }

    fn accepts(ty: &Type) -> bool {
        *ty == Type::NUMERIC
    }
}

impl<'a> FromSql<'a> for PgFallbackString {
    fn from_sql(_: &Type, raw: &'a [u8]) -> std::result::Result<Self, BoxError> {
        Ok(Self(String::from_utf8(raw.to_vec())?))
    }

    fn accepts(_: &Type) -> bool {
        true
    }
}

fn decode<'a, T, F>(row: &'a PgRow, idx: usize, wrap: F) -> Result<Value>
where
    T: FromSql<'a>,
    F: FnOnce(T) -> Value,
{
    let value = row.try_get::<_, Option<T>>(idx).map_err(|e| {
        let column = &row.columns()[idx];
        PgnestError::Decode(format!(
            "column \"{}\" of type {}: {e}",
            column.name(),
            column.type_().name()
        ))
    })?;
    Ok(value.map(wrap).unwrap_or(Value::Null))
}

fn array_of<T>(items: Vec<T>, wrap: impl Fn(T) -> Value) -> Value {
    Value::Array(items.into_iter().map(wrap).collect())
}

/// Convert one column of a result row into a `Value`
pub(crate) fn postgres_to_value(row: &PgRow, idx: usize) -> Result<Value> {
    let ty = row.columns()[idx].type_().clone();

    match ty {
        Type::BOOL => decode(row, idx, Value::Bool),
        Type::INT2 => decode(row, idx, Value::Int16),
        Type::INT4 => decode(row, idx, Value::Int32),
        Type::INT8 => decode(row, idx, Value::Int64),
        Type::OID => decode(row, idx, |oid: u32| Value::Int64(i64::from(oid))),
        Type::FLOAT4 => decode(row, idx, Value::Float32),
        Type::FLOAT8 => decode(row, idx, Value::Float64),
        Type::NUMERIC => decode(row, idx, |n: PgNumericString| Value::Decimal(n.0)),
        Type::TEXT | Type::VARCHAR | Type::BPCHAR | Type::NAME | Type::UNKNOWN => {
            decode(row, idx, Value::String)
        }
        Type::CHAR => decode(row, idx, |c: i8| Value::String((c as u8 as char).to_string())),
        Type::BYTEA => decode(row, idx, Value::Bytes),
        Type::UUID => decode(row, idx, Value::Uuid),
        Type::JSON | Type::JSONB => decode(row, idx, Value::Json),
        Type::DATE => decode(row, idx, Value::Date),
        Type::TIME => decode(row, idx, Value::Time),
        Type::TIMESTAMP => decode(row, idx, Value::DateTime),
        Type::TIMESTAMPTZ => decode(row, idx, Value::DateTimeUtc),
        Type::BOOL_ARRAY => decode(row, idx, |v: Vec<Option<bool>>| array_of(v, Value::from)),
        Type::INT2_ARRAY => decode(row, idx, |v: Vec<Option<i16>>| array_of(v, Value::from)),
        Type::INT4_ARRAY => decode(row, idx, |v: Vec<Option<i32>>| array_of(v, Value::from)),
        Type::INT8_ARRAY => decode(row, idx, |v: Vec<Option<i64>>| array_of(v, Value::from)),
        Type::FLOAT8_ARRAY => decode(row, idx, |v: Vec<Option<f64>>| array_of(v, Value::from)),
        Type::TEXT_ARRAY | Type::VARCHAR_ARRAY | Type::NAME_ARRAY | Type::BPCHAR_ARRAY => {
            decode(row, idx, |v: Vec<Option<String>>| array_of(v, Value::from))
        }
        Type::UUID_ARRAY => decode(row, idx, |v: Vec<Option<uuid::Uuid>>| {
            array_of(v, Value::from)
        }),
        _ => decode(row, idx, |s: PgFallbackString| Value::String(s.0)),
    }
}
