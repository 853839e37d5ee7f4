//! Defines the `Dialect` trait for database-specific SQL syntax.

pub trait Dialect: Send + Sync {
    /// Wraps an identifier (like a table or column name) in the correct
    /// quotation marks for the dialect.
    ///
    /// - PostgreSQL uses double quotes: `"my_column"`
    /// - MySQL uses backticks: `` `my_column` ``
    fn quote_identifier(&self, ident: &str) -> String;

    /// Returns the placeholder for a parameterized query.
    ///
    /// - PostgreSQL uses `$1`, `$2`, etc.
    /// - MySQL uses `?`
    fn get_placeholder(&self, index: usize) -> String;

    /// Returns the name of the dialect (e.g., "PostgreSQL", "MySQL").
    fn name(&self) -> String;

    /// Aggregate expression XOR-ing the CRC32 of every value of an already
    /// quoted column, or `None` when the database has no CRC32 function.
    fn crc32_aggregate(&self, quoted_column: &str) -> Option<String>;
}

#[derive(Debug, Clone)]
pub struct Postgres;

impl Dialect for Postgres {
    fn quote_identifier(&self, ident: &str) -> String {
        format!(r#""{}""#, ident.replace('"', "\"\""))
    }

    fn get_placeholder(&self, index: usize) -> String {
        // PostgreSQL uses $1, $2, etc.
        format!("${}", index + 1)
    }

    fn name(&self) -> String {
        "PostgreSQL".into()
    }

    fn crc32_aggregate(&self, _quoted_column: &str) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone)]
pub struct MySql;

impl Dialect for MySql {
    fn quote_identifier(&self, ident: &str) -> String {
        format!("`{}`", ident.replace('`', "``"))
    }

    fn get_placeholder(&self, _index: usize) -> String {
        // MySQL uses ?
        "?".into()
    }

    fn name(&self) -> String {
        "MySQL".into()
    }

    fn crc32_aggregate(&self, quoted_column: &str) -> Option<String> {
        Some(format!("BIT_XOR(CAST(CRC32({quoted_column}) AS UNSIGNED))"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_embedded_quotes() {
        assert_eq!(MySql.quote_identifier("we`ird"), "`we``ird`");
        assert_eq!(Postgres.quote_identifier(r#"we"ird"#), r#""we""ird""#);
    }

    #[test]
    fn only_mysql_offers_crc32() {
        assert!(MySql.crc32_aggregate("`c`").is_some());
        assert!(Postgres.crc32_aggregate(r#""c""#).is_none());
    }
}
