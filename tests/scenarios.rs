// Crate-level scenarios (§8) exercised against a real ODBC data source.
// Point `ODBC_ENGINE_TEST_DSN` at any reachable driver (SQLite's ODBC
// driver is the lightest option for local runs) to enable these; they
// skip with a message otherwise, since the engine has no embedded
// database of its own to test against.

use odbc_engine_core::protocol::bulk::{BulkCell, BulkColumn, BulkColumnType, BulkPayload};
use odbc_engine_core::protocol::params::ParamValue;
use odbc_engine_core::protocol::{row, Value};
use odbc_engine_core::{bulk, cache, connection, execution, metrics, pool, statement, stream, transaction};

fn dsn() -> Option<String> {
    std::env::var("ODBC_ENGINE_TEST_DSN").ok()
}

macro_rules! require_dsn {
    () => {
        match dsn() {
            Some(d) => d,
            None => {
                eprintln!("skipping: ODBC_ENGINE_TEST_DSN not set");
                return;
            }
        }
    };
}

fn drop_table(conn_id: u32, table: &str) {
    let _ = execution::exec_query(conn_id, &format!("DROP TABLE {table}"));
}

#[test]
fn scenario_1_connect_exec_query_reports_metrics() {
    let dsn = require_dsn!();
    let conn_id = connection::connect(&dsn, cache::CacheConfig::default()).unwrap();

    let before = metrics::global().snapshot().queries;
    let encoded = execution::exec_query(conn_id, "SELECT 1 AS id, 'hi' AS msg").unwrap();
    let decoded = row::decode(&encoded).unwrap();

    assert_eq!(decoded.columns.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(), vec!["id", "msg"]);
    assert_eq!(decoded.rows.len(), 1);
    assert_eq!(decoded.rows[0][0], Value::Int32(1));
    assert_eq!(decoded.rows[0][1], Value::String("hi".to_string()));
    assert!(metrics::global().snapshot().queries > before);

    connection::disconnect(conn_id).unwrap();
}

#[test]
fn scenario_2_prepare_and_execute_reuses_cached_statement() {
    let dsn = require_dsn!();
    let conn_id = connection::connect(&dsn, cache::CacheConfig::default()).unwrap();
    let conn = odbc_engine_core::registries::connections().get(conn_id).unwrap();

    execution::exec_query(conn_id, "CREATE TABLE scenario2 (a INTEGER, b VARCHAR(32))").unwrap();

    let stmt_id = statement::prepare(&conn, "INSERT INTO scenario2 VALUES (?, ?)", None, 0).unwrap();

    execution::execute(stmt_id, &[ParamValue::Int32(1), ParamValue::String("a".to_string())], 0, 0).unwrap();
    let before = conn.cache().snapshot();
    execution::execute(stmt_id, &[ParamValue::Int32(2), ParamValue::Null], 0, 0).unwrap();
    let after = conn.cache().snapshot();

    assert_eq!(after.total_executions, before.total_executions + 1);
    assert!(after.cache_hits >= before.cache_hits + 1);

    drop_table(conn_id, "scenario2");
    connection::disconnect(conn_id).unwrap();
}

#[test]
fn scenario_3_batched_streaming_covers_every_row() {
    let dsn = require_dsn!();
    let conn_id = connection::connect(&dsn, cache::CacheConfig::default()).unwrap();

    execution::exec_query(conn_id, "CREATE TABLE scenario3 (n INTEGER)").unwrap();
    let conn = odbc_engine_core::registries::connections().get(conn_id).unwrap();
    let stmt_id = statement::prepare(&conn, "INSERT INTO scenario3 VALUES (?)", None, 0).unwrap();
    for n in 0..2000 {
        execution::execute(stmt_id, &[ParamValue::Int32(n)], 0, 0).unwrap();
    }

    let stream_id = stream::stream_start_batched(conn_id, "SELECT n FROM scenario3", 250, 64 * 1024).unwrap();
    let mut total_rows = 0usize;
    loop {
        let (encoded, has_more) = stream::stream_fetch(stream_id).unwrap();
        let decoded = row::decode(&encoded).unwrap();
        total_rows += decoded.rows.len();
        if !has_more {
            break;
        }
    }
    assert_eq!(total_rows, 2000);
    stream::stream_close(stream_id);

    drop_table(conn_id, "scenario3");
    connection::disconnect(conn_id).unwrap();
}

#[test]
fn scenario_4_pool_exhausts_then_reports_idle_state() {
    let dsn = require_dsn!();
    let pool_id = pool::pool_create(&dsn, 3).unwrap();

    let a = pool::pool_get_connection(pool_id).unwrap();
    let b = pool::pool_get_connection(pool_id).unwrap();
    let c = pool::pool_get_connection(pool_id).unwrap();
    assert!(pool::pool_get_connection(pool_id).is_err());

    pool::pool_release_connection(pool_id, a).unwrap();
    pool::pool_release_connection(pool_id, b).unwrap();
    pool::pool_release_connection(pool_id, c).unwrap();

    let (size, idle) = pool::pool_get_state(pool_id).unwrap();
    assert_eq!((size, idle), (3, 3));

    pool::pool_close(pool_id).unwrap();
}

#[test]
fn scenario_5_savepoint_rollback_keeps_only_first_insert() {
    let dsn = require_dsn!();
    let conn_id = connection::connect(&dsn, cache::CacheConfig::default()).unwrap();
    execution::exec_query(conn_id, "CREATE TABLE scenario5 (n INTEGER)").unwrap();
    let conn = odbc_engine_core::registries::connections().get(conn_id).unwrap();

    let txn_id = odbc_engine_core::registries::transactions()
        .insert_with(|id| transaction::Transaction::begin(id, &conn, transaction::IsolationLevel::ReadCommitted))
        .unwrap();
    let txn = odbc_engine_core::registries::transactions().get(txn_id).unwrap();

    execution::exec_query(conn_id, "INSERT INTO scenario5 VALUES (1)").unwrap();
    txn.savepoint_create(&conn, "sp").unwrap();
    execution::exec_query(conn_id, "INSERT INTO scenario5 VALUES (2)").unwrap();
    txn.savepoint_rollback(&conn, "sp").unwrap();

    let txn = odbc_engine_core::registries::transactions().remove(txn_id).unwrap();
    txn.commit(&conn).unwrap();

    let encoded = execution::exec_query(conn_id, "SELECT n FROM scenario5 ORDER BY n").unwrap();
    let decoded = row::decode(&encoded).unwrap();
    assert_eq!(decoded.rows, vec![vec![Value::Int32(1)]]);

    drop_table(conn_id, "scenario5");
    connection::disconnect(conn_id).unwrap();
}

#[test]
fn scenario_6_bulk_insert_array_reports_inserted_count() {
    let dsn = require_dsn!();
    let conn_id = connection::connect(&dsn, cache::CacheConfig::default()).unwrap();
    execution::exec_query(conn_id, "CREATE TABLE scenario6 (id INTEGER, name VARCHAR(32))").unwrap();

    let payload = BulkPayload {
        table_name: "scenario6".to_string(),
        columns: vec![
            BulkColumn { name: "id".to_string(), column_type: BulkColumnType::Int32, nullable: false, max_len: 0 },
            BulkColumn { name: "name".to_string(), column_type: BulkColumnType::Text, nullable: false, max_len: 32 },
        ],
        cells: vec![
            vec![Some(BulkCell::Int32(1)), Some(BulkCell::Int32(2))],
            vec![Some(BulkCell::Text("a".to_string())), Some(BulkCell::Text("b".to_string()))],
        ],
    };
    let encoded = odbc_engine_core::protocol::bulk::encode(&payload).unwrap();
    let inserted = bulk::bulk_insert_array(conn_id, &encoded).unwrap();
    assert_eq!(inserted, 2);

    drop_table(conn_id, "scenario6");
    connection::disconnect(conn_id).unwrap();
}
