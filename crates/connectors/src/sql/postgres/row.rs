use crate::sql::base::error::DbError;
use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use model::{
    core::value::Value,
    records::row::{FieldValue, RowData},
};
use rust_decimal::Decimal;
use std::str::FromStr;
use tokio_postgres::{
    Row,
    types::{FromSql, Type},
};
use uuid::Uuid;

pub(crate) fn to_row_data(table: &str, row: &Row, unique_keys: &[&str]) -> Result<RowData, DbError> {
    let fields = row
        .columns()
        .iter()
        .enumerate()
        .map(|(idx, column)| {
            let name = column.name().to_string();
            let value = get_value(row, idx, column.type_())?;
            let is_key = unique_keys.iter().any(|k| k.eq_ignore_ascii_case(&name));
            Ok(FieldValue::new(name, value, is_key))
        })
        .collect::<Result<Vec<_>, DbError>>()?;
    Ok(RowData::new(table, fields))
}

fn get_value(row: &Row, idx: usize, ty: &Type) -> Result<Value, DbError> {
    let value = match *ty {
        Type::BOOL => opt::<bool>(row, idx)?.map(Value::Boolean),
        Type::INT2 => opt::<i16>(row, idx)?.map(|v| Value::Int(i64::from(v))),
        Type::INT4 => opt::<i32>(row, idx)?.map(|v| Value::Int(i64::from(v))),
        Type::INT8 => opt::<i64>(row, idx)?.map(Value::Int),
        Type::OID => opt::<u32>(row, idx)?.map(|v| Value::Int(i64::from(v))),
        Type::FLOAT4 => opt::<f32>(row, idx)?.map(|v| Value::Float(f64::from(v))),
        Type::FLOAT8 => opt::<f64>(row, idx)?.map(Value::Float),
        Type::NUMERIC => match opt::<Decimal>(row, idx)? {
            Some(d) => Some(Value::Decimal(BigDecimal::from_str(&d.to_string()).map_err(
                |e| DbError::Decode {
                    column: column_name(row, idx),
                    reason: e.to_string(),
                },
            )?)),
            None => None,
        },
        Type::JSON | Type::JSONB => opt::<serde_json::Value>(row, idx)?.map(Value::Json),
        Type::UUID => opt::<Uuid>(row, idx)?.map(Value::Uuid),
        Type::BYTEA => opt::<Vec<u8>>(row, idx)?.map(Value::Bytes),
        Type::DATE => opt::<NaiveDate>(row, idx)?.map(Value::Date),
        Type::TIMESTAMP => opt::<NaiveDateTime>(row, idx)?.map(|v| Value::Timestamp(v.and_utc())),
        Type::TIMESTAMPTZ => opt::<DateTime<Utc>>(row, idx)?.map(Value::Timestamp),
        _ => opt::<String>(row, idx)?.map(Value::String),
    };
    Ok(value.unwrap_or(Value::Null))
}

fn opt<'a, T: FromSql<'a>>(row: &'a Row, idx: usize) -> Result<Option<T>, DbError> {
    row.try_get::<_, Option<T>>(idx).map_err(|e| DbError::Decode {
        column: column_name(row, idx),
        reason: e.to_string(),
    })
}

fn column_name(row: &Row, idx: usize) -> String {
    row.columns()
        .get(idx)
        .map(|c| c.name().to_string())
        .unwrap_or_else(|| idx.to_string())
}
