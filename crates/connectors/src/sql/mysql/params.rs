use chrono::{Datelike, Timelike};
use model::core::value::Value;
use mysql_async::{Params, Value as MySqlValue};

/// Wire value for one bound parameter.
pub(crate) fn to_mysql_value(value: &Value) -> MySqlValue {
    match value {
        Value::Int(i) => MySqlValue::Int(*i),
        Value::Uint(u) => MySqlValue::UInt(*u),
        Value::Float(f) => MySqlValue::Double(*f),
        // Sent as text so keys wider than 64 bits keep every digit.
        Value::Decimal(d) => MySqlValue::Bytes(d.to_string().into_bytes()),
        Value::String(s) => MySqlValue::Bytes(s.clone().into_bytes()),
        Value::Boolean(b) => MySqlValue::Int(i64::from(*b)),
        Value::Json(j) => MySqlValue::Bytes(j.to_string().into_bytes()),
        Value::Uuid(u) => MySqlValue::Bytes(u.to_string().into_bytes()),
        Value::Bytes(b) => MySqlValue::Bytes(b.clone()),
        Value::Date(d) => MySqlValue::Date(d.year() as u16, d.month() as u8, d.day() as u8, 0, 0, 0, 0),
        Value::Timestamp(ts) => {
            let naive = ts.naive_utc();
            MySqlValue::Date(
                naive.year() as u16,
                naive.month() as u8,
                naive.day() as u8,
                naive.hour() as u8,
                naive.minute() as u8,
                naive.second() as u8,
                ts.timestamp_subsec_micros(),
            )
        }
        Value::Null => MySqlValue::NULL,
    }
}

pub(crate) fn positional(values: &[Value]) -> Params {
    if values.is_empty() {
        return Params::Empty;
    }
    Params::Positional(values.iter().map(to_mysql_value).collect())
}
