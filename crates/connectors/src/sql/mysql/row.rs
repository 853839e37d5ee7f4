use crate::sql::base::error::DbError;
use bigdecimal::BigDecimal;
use chrono::NaiveDate;
use model::{
    core::value::Value,
    records::row::{FieldValue, RowData},
};
use mysql_async::{Column, Row, Value as MySqlValue, consts::ColumnType};
use std::str::FromStr;

/// `binary` collation id; such columns hold raw bytes.
const BINARY_CHARSET: u16 = 63;

pub(crate) fn to_row_data(table: &str, row: &Row, unique_keys: &[&str]) -> Result<RowData, DbError> {
    let fields = row
        .columns_ref()
        .iter()
        .enumerate()
        .map(|(idx, column)| {
            let name = column.name_str().into_owned();
            let raw = row.as_ref(idx).unwrap_or(&MySqlValue::NULL);
            let value = convert(column, raw).map_err(|reason| DbError::Decode {
                column: name.clone(),
                reason,
            })?;
            let is_key = unique_keys.iter().any(|k| k.eq_ignore_ascii_case(&name));
            Ok(FieldValue::new(name, value, is_key))
        })
        .collect::<Result<Vec<_>, DbError>>()?;
    Ok(RowData::new(table, fields))
}

fn convert(column: &Column, raw: &MySqlValue) -> Result<Value, String> {
    let value = match raw {
        MySqlValue::NULL => Value::Null,
        MySqlValue::Int(v) => Value::Int(*v),
        MySqlValue::UInt(v) => Value::Uint(*v),
        MySqlValue::Float(v) => Value::Float(f64::from(*v)),
        MySqlValue::Double(v) => Value::Float(*v),
        MySqlValue::Date(y, m, d, h, mi, s, us) => {
            let date = NaiveDate::from_ymd_opt(i32::from(*y), u32::from(*m), u32::from(*d))
                .ok_or_else(|| format!("invalid date {y}-{m}-{d}"))?;
            match column.column_type() {
                ColumnType::MYSQL_TYPE_DATE | ColumnType::MYSQL_TYPE_NEWDATE => Value::Date(date),
                _ => {
                    let ts = date
                        .and_hms_micro_opt(u32::from(*h), u32::from(*mi), u32::from(*s), *us)
                        .ok_or_else(|| format!("invalid time {h}:{mi}:{s}.{us}"))?;
                    Value::Timestamp(ts.and_utc())
                }
            }
        }
        MySqlValue::Time(negative, days, h, m, s, us) => {
            let sign = if *negative { "-" } else { "" };
            let hours = u64::from(*days) * 24 + u64::from(*h);
            Value::String(format!("{sign}{hours:02}:{m:02}:{s:02}.{us:06}"))
        }
        MySqlValue::Bytes(bytes) => bytes_value(column, bytes)?,
    };
    Ok(value)
}

/// Text-protocol and string-typed values.
fn bytes_value(column: &Column, bytes: &[u8]) -> Result<Value, String> {
    let text = || std::str::from_utf8(bytes).map_err(|e| e.to_string());
    let value = match column.column_type() {
        ColumnType::MYSQL_TYPE_DECIMAL | ColumnType::MYSQL_TYPE_NEWDECIMAL => {
            Value::Decimal(BigDecimal::from_str(text()?).map_err(|e| e.to_string())?)
        }
        ColumnType::MYSQL_TYPE_TINY
        | ColumnType::MYSQL_TYPE_SHORT
        | ColumnType::MYSQL_TYPE_INT24
        | ColumnType::MYSQL_TYPE_LONG
        | ColumnType::MYSQL_TYPE_LONGLONG
        | ColumnType::MYSQL_TYPE_YEAR => {
            let text = text()?;
            match text.parse::<i64>() {
                Ok(v) => Value::Int(v),
                Err(_) => Value::Uint(text.parse::<u64>().map_err(|e| e.to_string())?),
            }
        }
        ColumnType::MYSQL_TYPE_FLOAT | ColumnType::MYSQL_TYPE_DOUBLE => {
            Value::Float(text()?.parse::<f64>().map_err(|e| e.to_string())?)
        }
        ColumnType::MYSQL_TYPE_JSON => {
            Value::Json(serde_json::from_slice(bytes).map_err(|e| e.to_string())?)
        }
        ColumnType::MYSQL_TYPE_BIT => Value::Bytes(bytes.to_vec()),
        _ if column.character_set() == BINARY_CHARSET => Value::Bytes(bytes.to_vec()),
        _ => match String::from_utf8(bytes.to_vec()) {
            Ok(s) => Value::String(s),
            Err(e) => Value::Bytes(e.into_bytes()),
        },
    };
    Ok(value)
}
