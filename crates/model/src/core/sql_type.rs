use serde::{Deserialize, Serialize};
use std::fmt;

/// Declared SQL type of a unique key column, reduced to what range
/// splitting and position tracking care about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SqlType {
    TinyInt,
    SmallInt,
    Integer,
    BigInt,
    /// Fixed-point with zero scale, e.g. `DECIMAL(30,0)`.
    Numeric,
    Char,
    VarChar,
    Text,
    Other(String),
}

/// How a key column can be positioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Integer,
    String,
    Unsupported,
}

impl SqlType {
    /// Maps a driver/catalog type name to a `SqlType`. Unknown names are kept
    /// verbatim in `Other`.
    pub fn from_name(name: &str) -> Self {
        let lowered = name.trim().to_ascii_lowercase();
        if lowered.starts_with("character varying") {
            return SqlType::VarChar;
        }
        let base = lowered
            .split(|c: char| c == '(' || c.is_whitespace())
            .next()
            .unwrap_or_default();

        match base {
            "tinyint" | "int1" => SqlType::TinyInt,
            "smallint" | "int2" | "smallserial" => SqlType::SmallInt,
            "int" | "integer" | "int4" | "mediumint" | "serial" => SqlType::Integer,
            "bigint" | "int8" | "bigserial" => SqlType::BigInt,
            "numeric" | "decimal" => SqlType::Numeric,
            "char" | "bpchar" | "character" => SqlType::Char,
            "varchar" | "nvarchar" => SqlType::VarChar,
            "text" | "tinytext" | "mediumtext" | "longtext" => SqlType::Text,
            _ => SqlType::Other(name.to_string()),
        }
    }

    pub fn key_kind(&self) -> KeyKind {
        match self {
            SqlType::TinyInt
            | SqlType::SmallInt
            | SqlType::Integer
            | SqlType::BigInt
            | SqlType::Numeric => KeyKind::Integer,
            SqlType::Char | SqlType::VarChar | SqlType::Text => KeyKind::String,
            SqlType::Other(_) => KeyKind::Unsupported,
        }
    }
}

impl fmt::Display for SqlType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SqlType::TinyInt => "TINYINT",
            SqlType::SmallInt => "SMALLINT",
            SqlType::Integer => "INTEGER",
            SqlType::BigInt => "BIGINT",
            SqlType::Numeric => "NUMERIC",
            SqlType::Char => "CHAR",
            SqlType::VarChar => "VARCHAR",
            SqlType::Text => "TEXT",
            SqlType::Other(name) => name,
        };
        f.write_str(name)
    }
}
