use crate::{
    error::AdapterError,
    memory::MemorySource,
    source::RowSource,
    sql::{mysql::source::MySqlSource, postgres::source::PgSource},
};
use std::{fmt, str::FromStr, sync::Arc};

/// Database family behind a connection string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    MySql,
    Postgres,
    Memory,
}

impl FromStr for SourceKind {
    type Err = AdapterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(SourceKind::MySql),
            "pg" | "postgres" | "postgresql" => Ok(SourceKind::Postgres),
            "memory" => Ok(SourceKind::Memory),
            other => Err(AdapterError::UnsupportedKind(other.to_string())),
        }
    }
}

impl SourceKind {
    /// Kind implied by a URL scheme, e.g. `mysql://...`.
    pub fn from_url(url: &str) -> Result<Self, AdapterError> {
        let scheme = url
            .split_once("://")
            .map(|(scheme, _)| scheme)
            .ok_or_else(|| AdapterError::UnsupportedKind(url.to_string()))?;
        scheme.parse()
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SourceKind::MySql => "mysql",
            SourceKind::Postgres => "postgres",
            SourceKind::Memory => "memory",
        };
        f.write_str(name)
    }
}

#[derive(Clone)]
pub enum Adapter {
    MySql(MySqlSource),
    Postgres(PgSource),
    Memory(MemorySource),
}

impl Adapter {
    /// Opens a source for `url`, picking the driver from its scheme.
    pub async fn connect(url: &str) -> Result<Self, AdapterError> {
        match SourceKind::from_url(url)? {
            SourceKind::MySql => Ok(Adapter::MySql(MySqlSource::connect(url)?)),
            SourceKind::Postgres => Ok(Adapter::Postgres(PgSource::connect(url).await?)),
            SourceKind::Memory => {
                let name = url.trim_start_matches("memory://");
                Ok(Adapter::Memory(MemorySource::new(name)))
            }
        }
    }

    pub fn kind(&self) -> SourceKind {
        match self {
            Adapter::MySql(_) => SourceKind::MySql,
            Adapter::Postgres(_) => SourceKind::Postgres,
            Adapter::Memory(_) => SourceKind::Memory,
        }
    }

    pub fn source(&self) -> Arc<dyn RowSource> {
        match self {
            Adapter::MySql(source) => Arc::new(source.clone()),
            Adapter::Postgres(source) => Arc::new(source.clone()),
            Adapter::Memory(source) => Arc::new(source.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_from_scheme() {
        assert_eq!(
            SourceKind::from_url("mysql://u:p@localhost:3306/db").unwrap(),
            SourceKind::MySql
        );
        assert_eq!(
            SourceKind::from_url("postgresql://localhost/db").unwrap(),
            SourceKind::Postgres
        );
        assert!(SourceKind::from_url("ftp://host").is_err());
        assert!(SourceKind::from_url("no-scheme").is_err());
    }

    #[tokio::test]
    async fn memory_urls_need_no_server() {
        let adapter = Adapter::connect("memory://scratch").await.unwrap();
        assert_eq!(adapter.kind(), SourceKind::Memory);
        assert_eq!(adapter.source().name(), "scratch");
    }
}
