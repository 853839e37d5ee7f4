use crate::sql::base::error::DbError;
use model::core::value::Value;
use rust_decimal::Decimal;
use std::str::FromStr;
use tokio_postgres::types::{Json, ToSql, Type};

pub struct PgParam(Box<dyn ToSql + Sync + Send>);

impl PgParam {
    /// Converts `value` to the Rust type the server expects for a parameter
    /// of type `ty`. Integer keys are narrowed to the column width, since the
    /// driver refuses to send an `i64` to an `int4` placeholder.
    pub fn for_type(value: &Value, ty: &Type) -> Result<Self, DbError> {
        let mismatch = || DbError::Decode {
            column: ty.name().to_string(),
            reason: format!("cannot bind {value:?}"),
        };

        let param: Box<dyn ToSql + Sync + Send> = match (value, ty) {
            (Value::Null, _) => Box::new(Option::<String>::None),
            (v, &Type::INT2) => Box::new(
                v.as_i64()
                    .and_then(|i| i16::try_from(i).ok())
                    .ok_or_else(mismatch)?,
            ),
            (v, &Type::INT4) => Box::new(
                v.as_i64()
                    .and_then(|i| i32::try_from(i).ok())
                    .ok_or_else(mismatch)?,
            ),
            (v, &Type::INT8) => Box::new(v.as_i64().ok_or_else(mismatch)?),
            (v, &Type::NUMERIC) => {
                let text = v.as_string().ok_or_else(mismatch)?;
                Box::new(Decimal::from_str(&text).map_err(|_| mismatch())?)
            }
            (v, &Type::TEXT | &Type::VARCHAR | &Type::BPCHAR | &Type::NAME) => {
                Box::new(v.as_string().ok_or_else(mismatch)?)
            }
            (Value::Float(f), _) => Box::new(*f),
            (Value::Boolean(b), _) => Box::new(*b),
            (Value::Json(j), _) => Box::new(Json(j.clone())),
            (Value::Uuid(u), _) => Box::new(*u),
            (Value::Bytes(b), _) => Box::new(b.clone()),
            (Value::Date(d), _) => Box::new(*d),
            (Value::Timestamp(t), &Type::TIMESTAMP) => Box::new(t.naive_utc()),
            (Value::Timestamp(t), _) => Box::new(*t),
            (Value::Int(i), _) => Box::new(*i),
            (other, _) => Box::new(other.as_string().ok_or_else(mismatch)?),
        };
        Ok(PgParam(param))
    }
}

impl AsRef<dyn ToSql + Sync> for PgParam {
    fn as_ref(&self) -> &(dyn ToSql + Sync + 'static) {
        &*self.0
    }
}

pub struct PgParamStore {
    pub params: Vec<PgParam>,
}

impl PgParamStore {
    /// Binds `values` against the parameter types of a prepared statement.
    pub fn for_types(values: &[Value], types: &[Type]) -> Result<Self, DbError> {
        if values.len() != types.len() {
            return Err(DbError::Unknown(format!(
                "statement expects {} parameters, got {}",
                types.len(),
                values.len()
            )));
        }
        let params = values
            .iter()
            .zip(types)
            .map(|(value, ty)| PgParam::for_type(value, ty))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { params })
    }

    pub fn as_refs(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params.iter().map(|param| param.as_ref()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn narrows_integers_to_column_width() {
        assert!(PgParam::for_type(&Value::Int(7), &Type::INT4).is_ok());
        assert!(PgParam::for_type(&Value::Int(i64::MAX), &Type::INT4).is_err());
        assert!(PgParam::for_type(&Value::Uint(u64::MAX), &Type::INT8).is_err());
    }

    #[test]
    fn arity_must_match_statement() {
        let err = PgParamStore::for_types(&[Value::Int(1)], &[]);
        assert!(err.is_err());
        let store = PgParamStore::for_types(
            &[Value::Int(1), Value::from("a")],
            &[Type::INT8, Type::TEXT],
        )
        .unwrap();
        assert_eq!(store.as_refs().len(), 2);
    }
}
