use connectors::{
    error::AdapterError,
    sql::base::error::{ConnectorError, DbError},
};
use engine_core::retry::RetryDisposition;
use mysql_async::Error as MySqlError;
use tokio_postgres::{Error as PgError, error::SqlState};

pub fn classify_adapter_error(err: &AdapterError) -> RetryDisposition {
    match err {
        AdapterError::Database(db_err) => classify_db_error(db_err),
        AdapterError::Connector(conn_err) => classify_connector_error(conn_err),
        AdapterError::UnsupportedKind(_) => RetryDisposition::Stop,
        AdapterError::Unsupported { .. } => RetryDisposition::Stop,
        AdapterError::Generic(_) => RetryDisposition::Stop,
    }
}

pub fn classify_db_error(err: &DbError) -> RetryDisposition {
    match err {
        DbError::Io(_) => RetryDisposition::Retry,
        DbError::MySqlError(mysql_err) => classify_mysql_error(mysql_err),
        DbError::PgError(pg_err) => classify_pg_error(pg_err),
        DbError::UnknownTable(_) => RetryDisposition::Stop,
        DbError::UnknownColumn { .. } => RetryDisposition::Stop,
        DbError::Decode { .. } => RetryDisposition::Stop,
        DbError::Unknown(_) => RetryDisposition::Stop,
    }
}

fn classify_connector_error(err: &ConnectorError) -> RetryDisposition {
    match err {
        ConnectorError::MySql(mysql_err) => classify_mysql_error(mysql_err),
        ConnectorError::Connection(pg_err) => classify_pg_error(pg_err),
        ConnectorError::InvalidUrl(_) => RetryDisposition::Stop,
        ConnectorError::TlsConfig(_) => RetryDisposition::Stop,
    }
}

fn classify_pg_error(err: &PgError) -> RetryDisposition {
    if err.is_closed() {
        return RetryDisposition::Retry;
    }

    match err.code() {
        Some(code) if is_retryable_pg_code(code) => RetryDisposition::Retry,
        _ => RetryDisposition::Stop,
    }
}

fn is_retryable_pg_code(code: &SqlState) -> bool {
    matches!(
        *code,
        SqlState::T_R_SERIALIZATION_FAILURE
            | SqlState::T_R_DEADLOCK_DETECTED
            | SqlState::LOCK_NOT_AVAILABLE
            | SqlState::TOO_MANY_CONNECTIONS
            | SqlState::ADMIN_SHUTDOWN
            | SqlState::CRASH_SHUTDOWN
            | SqlState::CANNOT_CONNECT_NOW
            | SqlState::CONNECTION_FAILURE
            | SqlState::CONNECTION_DOES_NOT_EXIST
            | SqlState::SQLCLIENT_UNABLE_TO_ESTABLISH_SQLCONNECTION
            | SqlState::CONNECTION_EXCEPTION
            | SqlState::QUERY_CANCELED
    )
}

fn classify_mysql_error(err: &MySqlError) -> RetryDisposition {
    match err {
        MySqlError::Io(_) => RetryDisposition::Retry,
        MySqlError::Server(server_err)
            if is_retryable_mysql_server_error(server_err.code, &server_err.state) =>
        {
            RetryDisposition::Retry
        }
        _ => RetryDisposition::Stop,
    }
}

/// Lock wait timeout, deadlock, lost or refused connections.
fn is_retryable_mysql_server_error(code: u16, state: &str) -> bool {
    const RETRYABLE_CODES: [u16; 8] = [1205, 1213, 2002, 2003, 2006, 2013, 1040, 1042];
    RETRYABLE_CODES.contains(&code) || matches!(state, "40001" | "HYT00" | "08S01")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn io_failures_are_retried() {
        let err = AdapterError::Database(DbError::Io(io::Error::new(
            io::ErrorKind::ConnectionReset,
            "reset",
        )));
        assert_eq!(classify_adapter_error(&err), RetryDisposition::Retry);
    }

    #[test]
    fn schema_and_capability_errors_stop() {
        let missing = AdapterError::Database(DbError::UnknownTable("t_order".into()));
        assert_eq!(classify_adapter_error(&missing), RetryDisposition::Stop);

        let unsupported = AdapterError::Unsupported {
            source_name: "pg".into(),
            operation: "CRC32 checksum".into(),
        };
        assert_eq!(classify_adapter_error(&unsupported), RetryDisposition::Stop);
    }

    #[test]
    fn mysql_deadlock_and_lock_wait_are_transient() {
        assert!(is_retryable_mysql_server_error(1213, "40001"));
        assert!(is_retryable_mysql_server_error(1205, "HY000"));
        assert!(!is_retryable_mysql_server_error(1146, "42S02"));
    }
}
