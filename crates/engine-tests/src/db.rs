#[cfg(test)]
mod tests {
    use crate::{
        TEST_MYSQL_URL, mysql_source, pg_client, pg_source, reset_mysql_orders,
        reset_postgres_schema, source_for,
        utils::{ORDER_COLUMNS, ORDERS, TableSink, context, order_spec, settings, stored_ids},
    };
    use connectors::{memory::MemorySource, source::RowSource};
    use engine_runtime::{JobItem, JobOutcome, MigrationJob};
    use model::{consistency::checksum::Checksum, core::value::Value};
    use std::sync::Arc;
    use tempfile::tempdir;
    use tracing_test::traced_test;

    #[traced_test]
    #[tokio::test]
    #[ignore = "needs a local MySQL"]
    async fn mysql_key_bounds_and_checksum() {
        reset_mysql_orders(40).await;
        let source = mysql_source();

        let bounds = source.key_bounds(ORDERS, "order_id").await.unwrap();
        assert_eq!(bounds.min, Some(Value::Int(1)));
        assert_eq!(bounds.max, Some(Value::Int(40)));

        assert!(source.supports_crc32());
        let summary = source
            .crc32_checksum(ORDERS, "status", Some("order_id"), None)
            .await
            .unwrap();
        assert_eq!(summary.records_count, 40);
        assert!(matches!(summary.checksum, Checksum::Crc32(_)));
    }

    #[traced_test]
    #[tokio::test]
    #[ignore = "needs a local MySQL"]
    async fn mysql_table_migrates_into_memory() {
        reset_mysql_orders(120).await;
        let dir = tempdir().unwrap();
        let ctx = context(&dir, settings("DATA_MATCH"));
        let target = MemorySource::new("target");
        target.create_table(ORDERS, ORDER_COLUMNS).await;

        let outcome = MigrationJob::new(
            JobItem::generate(vec![order_spec()]),
            source_for(TEST_MYSQL_URL).await,
            Arc::new(target.clone()),
            Arc::new(TableSink::new(target.clone())),
            ctx,
        )
        .run()
        .await
        .unwrap();

        let JobOutcome::Completed { inventory, check } = outcome else {
            panic!("expected a completed job, got {outcome:?}");
        };
        assert_eq!(inventory.rows, 120);
        assert!(check.passed);
        assert_eq!(stored_ids(&target, ORDERS, "order_id").await, (1..=120).collect::<Vec<_>>());
        assert!(logs_contain("Opening MySQL pool"));
    }

    #[traced_test]
    #[tokio::test]
    #[ignore = "needs a local Postgres"]
    async fn postgres_has_no_crc32() {
        reset_postgres_schema().await;
        let client = pg_client().await;
        client
            .batch_execute(
                r#"
            CREATE TABLE t_order (order_id BIGINT PRIMARY KEY, user_id INT, status TEXT);
            INSERT INTO t_order SELECT g, g % 7, 'NEW' FROM generate_series(1, 15) g;
        "#,
            )
            .await
            .unwrap();

        let source = pg_source().await;
        assert!(!source.supports_crc32());
        assert!(
            source
                .crc32_checksum(ORDERS, "status", Some("order_id"), None)
                .await
                .is_err()
        );

        let bounds = source.key_bounds(ORDERS, "order_id").await.unwrap();
        assert_eq!(bounds.min, Some(Value::Int(1)));
        assert_eq!(bounds.max, Some(Value::Int(15)));
    }
}
