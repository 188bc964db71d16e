//! Conversions between pool values and PostgreSQL wire types.

use std::any::type_name;
use std::error::Error;

use bytes::BytesMut;
use relpool::{Row, Value};
use tokio_postgres::Row as PgRow;
use tokio_postgres::types::{FromSql, IsNull, ToSql, Type, to_sql_checked};

type BoxError = Box<dyn Error + Sync + Send>;

/// A statement parameter, coerced to the type the server declared for it.
#[derive(Debug)]
pub(crate) struct Param<'a>(pub(crate) &'a Value);

impl ToSql for Param<'_> {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match self.0 {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(v) => encode(v, ty, out),
            Value::Int(v) => encode_int(*v, ty, out),
            Value::Float(v) if *ty == Type::FLOAT4 => encode(&(*v as f32), ty, out),
            Value::Float(v) => encode(v, ty, out),
            Value::Text(v) => encode(v, ty, out),
            Value::Bytes(v) => encode(v, ty, out),
        }
    }

    fn accepts(_: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

fn encode<T: ToSql>(value: &T, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    if !T::accepts(ty) {
        return Err(format!("cannot encode {} as {ty}", type_name::<T>()).into());
    }
    value.to_sql(ty, out)
}

fn encode_int(value: i64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::INT2 => encode(&i16::try_from(value)?, ty, out),
        Type::INT4 => encode(&i32::try_from(value)?, ty, out),
        Type::OID => encode(&u32::try_from(value)?, ty, out),
        Type::FLOAT4 => encode(&(value as f32), ty, out),
        Type::FLOAT8 => encode(&(value as f64), ty, out),
        _ => encode(&value, ty, out),
    }
}

/// Convert a result row, decoding each column by its declared type.
///
/// Columns of types without a [`Value`] counterpart decode as
/// [`Value::Null`].
pub(crate) fn convert_row(row: &PgRow) -> Result<Row, tokio_postgres::Error> {
    let mut columns = Vec::with_capacity(row.len());
    let mut values = Vec::with_capacity(row.len());

    for (idx, column) in row.columns().iter().enumerate() {
        columns.push(column.name().to_string());
        values.push(column_value(row, idx, column.type_())?);
    }

    Ok(Row::new(columns, values))
}

fn column_value(row: &PgRow, idx: usize, ty: &Type) -> Result<Value, tokio_postgres::Error> {
    let value = match *ty {
        Type::BOOL => row.try_get::<_, Option<bool>>(idx)?.map(Value::Bool),
        Type::INT2 => row
            .try_get::<_, Option<i16>>(idx)?
            .map(|v| Value::Int(v.into())),
        Type::INT4 => row
            .try_get::<_, Option<i32>>(idx)?
            .map(|v| Value::Int(v.into())),
        Type::INT8 => row.try_get::<_, Option<i64>>(idx)?.map(Value::Int),
        Type::OID => row
            .try_get::<_, Option<u32>>(idx)?
            .map(|v| Value::Int(v.into())),
        Type::FLOAT4 => row
            .try_get::<_, Option<f32>>(idx)?
            .map(|v| Value::Float(v.into())),
        Type::FLOAT8 => row.try_get::<_, Option<f64>>(idx)?.map(Value::Float),
        Type::BYTEA => row.try_get::<_, Option<Vec<u8>>>(idx)?.map(Value::Bytes),
        _ if <String as FromSql>::accepts(ty) => {
            row.try_get::<_, Option<String>>(idx)?.map(Value::Text)
        }
        _ => {
            tracing::trace!(
                column = idx,
                pg_type = %ty,
                "unsupported column type; decoding as NULL"
            );
            None
        }
    };
    Ok(value.unwrap_or(Value::Null))
}
