//! SQL for inventory reads, key domain probes and column checksums.

use crate::query::{
    ast::{common::OrderDir, common::TableRef, expr::BinaryOperator, expr::Expr},
    builder::select::SelectBuilder,
    dialect::Dialect,
    ident,
    renderer::{Render, Renderer},
    value,
};
use model::{core::value::Value, pagination::query_range::QueryRange};

pub const MIN_KEY_ALIAS: &str = "min_key";
pub const MAX_KEY_ALIAS: &str = "max_key";
pub const CHECKSUM_ALIAS: &str = "checksum";
pub const COUNT_ALIAS: &str = "cnt";

pub struct ScanQueries<'a> {
    dialect: &'a dyn Dialect,
}

impl<'a> ScanQueries<'a> {
    pub fn new(dialect: &'a dyn Dialect) -> Self {
        Self { dialect }
    }

    /// `SELECT cols FROM t WHERE key > ? AND key <= ? ORDER BY key ASC LIMIT n`.
    pub fn range_select(
        &self,
        table: &str,
        columns: &[String],
        key: &str,
        range: Option<&QueryRange>,
        limit: Option<usize>,
    ) -> (String, Vec<Value>) {
        let mut builder = with_range(select_columns(table, columns), key, range)
            .order_by(ident(key), Some(OrderDir::Asc));
        if let Some(limit) = limit {
            builder = builder.limit(limit);
        }
        self.render(builder)
    }

    /// All rows sharing one key value.
    pub fn point_select(
        &self,
        table: &str,
        columns: &[String],
        key: &str,
        key_value: &Value,
    ) -> (String, Vec<Value>) {
        let builder = select_columns(table, columns).compare(
            ident(key),
            BinaryOperator::Eq,
            value(key_value.clone()),
        );
        self.render(builder)
    }

    /// Unordered full read used when the table has no usable key.
    pub fn full_select(&self, table: &str, columns: &[String]) -> (String, Vec<Value>) {
        self.render(select_columns(table, columns))
    }

    pub fn key_domain(&self, table: &str, key: &str) -> String {
        let builder = SelectBuilder::new(vec![
            function("MIN", ident(key)).alias(MIN_KEY_ALIAS),
            function("MAX", ident(key)).alias(MAX_KEY_ALIAS),
        ])
        .from(TableRef::new(table));
        self.render(builder).0
    }

    /// `SELECT BIT_XOR(CAST(CRC32(col) AS UNSIGNED)) AS checksum, COUNT(1) AS cnt FROM t`,
    /// or `None` when the dialect has no CRC32.
    pub fn crc32_checksum(
        &self,
        table: &str,
        column: &str,
        key: Option<&str>,
        range: Option<&QueryRange>,
    ) -> Option<(String, Vec<Value>)> {
        let aggregate = self
            .dialect
            .crc32_aggregate(&self.dialect.quote_identifier(column))?;
        let mut builder = SelectBuilder::new(vec![
            Expr::Raw(aggregate).alias(CHECKSUM_ALIAS),
            Expr::Raw("COUNT(1)".into()).alias(COUNT_ALIAS),
        ])
        .from(TableRef::new(table));
        if let Some(key) = key {
            builder = with_range(builder, key, range);
        }
        Some(self.render(builder))
    }

    fn render(&self, builder: SelectBuilder) -> (String, Vec<Value>) {
        let mut renderer = Renderer::new(self.dialect);
        builder.build().render(&mut renderer);
        renderer.finish()
    }
}

fn select_columns(table: &str, columns: &[String]) -> SelectBuilder {
    SelectBuilder::new(columns.iter().map(|c| ident(c)).collect()).from(TableRef::new(table))
}

fn with_range(mut builder: SelectBuilder, key: &str, range: Option<&QueryRange>) -> SelectBuilder {
    let Some(range) = range else {
        return builder;
    };
    if let Some(lower) = &range.lower {
        let op = if range.lower_inclusive {
            BinaryOperator::GtEq
        } else {
            BinaryOperator::Gt
        };
        builder = builder.compare(ident(key), op, value(lower.clone()));
    }
    if let Some(upper) = &range.upper {
        builder = builder.compare(ident(key), BinaryOperator::LtEq, value(upper.clone()));
    }
    builder
}

fn function(name: &str, arg: Expr) -> Expr {
    Expr::FunctionCall {
        name: name.to_string(),
        args: vec![arg],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::dialect::{MySql, Postgres};

    fn cols() -> Vec<String> {
        vec!["order_id".into(), "user_id".into(), "status".into()]
    }

    #[test]
    fn range_select_uses_exclusive_lower_for_resumed_ranges() {
        let q = ScanQueries::new(&MySql);
        let range = QueryRange::new(Some(Value::Int(33)), false, Some(Value::Int(66)));
        let (sql, params) = q.range_select("t_order", &cols(), "order_id", Some(&range), Some(100));

        assert_eq!(
            sql,
            "SELECT `order_id`, `user_id`, `status` FROM `t_order` WHERE (`order_id` > ? AND `order_id` <= ?) ORDER BY `order_id` ASC LIMIT 100"
        );
        assert_eq!(params, vec![Value::Int(33), Value::Int(66)]);
    }

    #[test]
    fn range_select_inclusive_lower() {
        let q = ScanQueries::new(&Postgres);
        let range = QueryRange::new(Some(Value::Int(3)), true, None);
        let (sql, _) = q.range_select("t_order", &cols(), "order_id", Some(&range), None);
        assert!(sql.contains(r#"WHERE "order_id" >= $1 ORDER BY"#), "{sql}");
    }

    #[test]
    fn checksum_sql_matches_mysql_aggregate() {
        let q = ScanQueries::new(&MySql);
        let (sql, params) = q.crc32_checksum("foo_tbl", "foo_col", None, None).unwrap();
        assert_eq!(
            sql,
            "SELECT BIT_XOR(CAST(CRC32(`foo_col`) AS UNSIGNED)) AS `checksum`, COUNT(1) AS `cnt` FROM `foo_tbl`"
        );
        assert!(params.is_empty());

        assert!(
            ScanQueries::new(&Postgres)
                .crc32_checksum("foo_tbl", "foo_col", None, None)
                .is_none()
        );
    }

    #[test]
    fn key_domain_probe() {
        let sql = ScanQueries::new(&Postgres).key_domain("t_order", "order_id");
        assert_eq!(
            sql,
            r#"SELECT MIN("order_id") AS "min_key", MAX("order_id") AS "max_key" FROM "t_order""#
        );
    }

    #[test]
    fn point_select_binds_key() {
        let (sql, params) =
            ScanQueries::new(&MySql).point_select("t", &cols(), "user_id", &Value::Int(3));
        assert_eq!(
            sql,
            "SELECT `order_id`, `user_id`, `status` FROM `t` WHERE `user_id` = ?"
        );
        assert_eq!(params, vec![Value::Int(3)]);
    }
}
