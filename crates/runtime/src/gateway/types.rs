//! Mapping between Postgres wire types and result set values.

use bytes::BytesMut;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use quarry_common::models::Value;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::error::Error;
use tokio_postgres::types::{to_sql_checked, Format, FromSql, IsNull, Kind, ToSql, Type};
use tokio_postgres::Row;

type BoxError = Box<dyn Error + Sync + Send>;

/// `numeric` column. rust_decimal has no NaN or infinities, so those are
/// recognized from the sign word and kept as Postgres spells them.
enum PgNumeric {
    Finite(Decimal),
    Special(&'static str),
}

impl<'a> FromSql<'a> for PgNumeric {
    fn from_sql(ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        // Header words: ndigits, weight, sign, dscale.
        match raw.get(4..6) {
            Some([0xC0, 0x00]) => Ok(PgNumeric::Special("NaN")),
            Some([0xD0, 0x00]) => Ok(PgNumeric::Special("Infinity")),
            Some([0xF0, 0x00]) => Ok(PgNumeric::Special("-Infinity")),
            _ => Decimal::from_sql(ty, raw).map(PgNumeric::Finite),
        }
    }

    fn accepts(ty: &Type) -> bool {
        <Decimal as FromSql>::accepts(ty)
    }
}

fn numeric_value(v: PgNumeric) -> Value {
    match v {
        PgNumeric::Finite(d) => d.to_f64().map_or_else(|| Value::Text(d.to_string()), float_value),
        PgNumeric::Special(s) => Value::Text(s.to_string()),
    }
}

/// Raw bytes of any column, used for enum labels.
struct RawBytes(Vec<u8>);

impl<'a> FromSql<'a> for RawBytes {
    fn from_sql(_ty: &Type, raw: &'a [u8]) -> Result<Self, BoxError> {
        Ok(RawBytes(raw.to_vec()))
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }
}

/// Bind parameter sent in text format; the server infers its type.
#[derive(Debug)]
pub(crate) struct TextParam<'a>(pub &'a str);

impl ToSql for TextParam<'_> {
    fn to_sql(&self, _ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        out.extend_from_slice(self.0.as_bytes());
        Ok(IsNull::No)
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    fn encode_format(&self, _ty: &Type) -> Format {
        Format::Text
    }

    to_sql_checked!();
}

fn float_value(v: f64) -> Value {
    if v.is_finite() {
        Value::Float64(v)
    } else {
        Value::Text(v.to_string())
    }
}

fn cell<'a, T, F>(row: &'a Row, idx: usize, f: F) -> Result<Value, tokio_postgres::Error>
where
    T: FromSql<'a>,
    F: FnOnce(T) -> Value,
{
    Ok(row.try_get::<_, Option<T>>(idx)?.map_or(Value::Null, f))
}

/// Converts column `idx` of `row` to the closest [`Value`] variant.
pub(crate) fn decode_cell(row: &Row, idx: usize) -> Result<Value, tokio_postgres::Error> {
    let ty = row.columns()[idx].type_().clone();

    if ty == Type::BOOL {
        cell(row, idx, Value::Bool)
    } else if ty == Type::INT2 {
        cell(row, idx, |v: i16| Value::Int64(v.into()))
    } else if ty == Type::INT4 {
        cell(row, idx, |v: i32| Value::Int64(v.into()))
    } else if ty == Type::INT8 {
        cell(row, idx, Value::Int64)
    } else if ty == Type::OID {
        cell(row, idx, |v: u32| Value::Int64(v.into()))
    } else if ty == Type::FLOAT4 {
        cell(row, idx, |v: f32| float_value(v.into()))
    } else if ty == Type::FLOAT8 {
        cell(row, idx, float_value)
    } else if ty == Type::NUMERIC {
        cell(row, idx, numeric_value)
    } else if ty == Type::TIMESTAMPTZ {
        cell(row, idx, |v: DateTime<Utc>| Value::Timestamp(v))
    } else if ty == Type::TIMESTAMP {
        cell(row, idx, |v: NaiveDateTime| Value::Timestamp(v.and_utc()))
    } else if ty == Type::DATE {
        cell(row, idx, |v: NaiveDate| {
            v.and_hms_opt(0, 0, 0)
                .map_or(Value::Null, |midnight| Value::Timestamp(midnight.and_utc()))
        })
    } else if ty == Type::UUID {
        cell(row, idx, |v: uuid::Uuid| Value::Text(v.to_string()))
    } else if ty == Type::JSON || ty == Type::JSONB {
        cell(row, idx, |v: serde_json::Value| Value::Text(v.to_string()))
    } else if ty == Type::BYTEA {
        cell(row, idx, |v: Vec<u8>| {
            Value::Text(String::from_utf8_lossy(&v).into_owned())
        })
    } else if <String as FromSql>::accepts(&ty) {
        // text, varchar, bpchar, name, unknown, citext
        cell(row, idx, Value::Text)
    } else if matches!(ty.kind(), Kind::Enum(_)) {
        cell(row, idx, |v: RawBytes| {
            Value::Text(String::from_utf8_lossy(&v.0).into_owned())
        })
    } else {
        tracing::debug!(
            target: "gateway",
            column = row.columns()[idx].name(),
            pg_type = %ty,
            "No conversion for column type, returning null"
        );
        Ok(Value::Null)
    }
}
