// Driver connection wrapper (§4.12): the only place in the engine that
// touches `odbc_api::Connection` directly.

use odbc_api::handles::ParameterCollection;
use odbc_api::parameter::InputParameter;
use odbc_api::{ConnectionOptions, IntoParameter};

use crate::driver::cursor::{self, DriverCursor};
use crate::driver::environment;
use crate::driver::statement::DriverStatement;
use crate::error::EngineError;
use crate::protocol::multi::MultiFrame;
use crate::protocol::params::ParamValue;

pub struct DriverConnection {
    conn: odbc_api::Connection<'static>,
}

fn boxed_param(value: &ParamValue) -> Box<dyn InputParameter> {
    match value {
        ParamValue::Null => Box::new(None::<&str>.into_parameter()),
        ParamValue::String(s) => Box::new(s.clone().into_parameter()),
        ParamValue::Int32(v) => Box::new(v.into_parameter()),
        ParamValue::Int64(v) => Box::new(v.into_parameter()),
        ParamValue::Decimal(s) => Box::new(s.clone().into_parameter()),
        ParamValue::Binary(b) => Box::new(b.clone().into_parameter()),
    }
}

pub(crate) fn bind(params: &[ParamValue]) -> Vec<Box<dyn InputParameter>> {
    params.iter().map(boxed_param).collect()
}

impl DriverConnection {
    pub fn connect(connection_string: &str) -> Result<Self, EngineError> {
        let env = environment::global()?;
        let conn = env
            .connect_with_connection_string(connection_string, ConnectionOptions::default())
            .map_err(|e| EngineError::Connection(format!("connect failed: {e}")))?;
        Ok(Self { conn })
    }

    /// Like `connect`, but bounds the driver's login phase to
    /// `timeout_ms` milliseconds via `ConnectionOptions::login_timeout_sec`.
    pub fn connect_with_timeout(connection_string: &str, timeout_ms: u64) -> Result<Self, EngineError> {
        let env = environment::global()?;
        let options = ConnectionOptions {
            login_timeout_sec: Some((timeout_ms / 1000).max(1) as u32),
            ..Default::default()
        };
        let conn = env
            .connect_with_connection_string(connection_string, options)
            .map_err(|e| EngineError::Connection(format!("connect failed: {e}")))?;
        Ok(Self { conn })
    }

    /// The driver's reported DBMS name (`SQLGetInfo(SQL_DBMS_NAME)`), used
    /// by `odbc_detect_driver` to identify which backend a connection
    /// string resolves to without the caller needing driver-specific
    /// knowledge.
    pub fn dbms_name(&self) -> Result<String, EngineError> {
        self.conn
            .database_management_system_name()
            .map_err(|e| EngineError::Connection(format!("failed to query DBMS name: {e}")))
    }

    pub fn execute(&self, sql: &str, params: &[ParamValue]) -> Result<Option<DriverCursor<'_>>, EngineError> {
        let bound = bind(params);
        let cursor = self
            .conn
            .execute(sql, bound.as_slice() as &dyn ParameterCollection)
            .map_err(|e| EngineError::Query(format!("execute failed: {e}")))?;
        cursor.map(DriverCursor::new).transpose()
    }

    /// Like `execute`, but fetches from the driver in batches of
    /// `fetch_size` rows instead of the default — `stream_start_batched`'s
    /// knob for per-network-round-trip row count (§4.6).
    pub fn execute_streaming(
        &self,
        sql: &str,
        params: &[ParamValue],
        fetch_size: usize,
    ) -> Result<Option<DriverCursor<'_>>, EngineError> {
        let bound = bind(params);
        let cursor = self
            .conn
            .execute(sql, bound.as_slice() as &dyn ParameterCollection)
            .map_err(|e| EngineError::Query(format!("execute failed: {e}")))?;
        cursor
            .map(|c| DriverCursor::with_batch_size(c, fetch_size))
            .transpose()
    }

    /// `execute` with an explicit per-call query timeout, bound straight to
    /// odbc-api's own timeout parameter. Used for a prepared statement's
    /// `timeout_override_ms` (§4.5), which bypasses the statement cache
    /// since the cached `DriverStatement::execute` has no timeout hook.
    pub fn execute_with_timeout(
        &self,
        sql: &str,
        params: &[ParamValue],
        timeout: Option<std::time::Duration>,
        fetch_size: Option<usize>,
    ) -> Result<Option<DriverCursor<'_>>, EngineError> {
        let bound = bind(params);
        let cursor = self
            .conn
            .execute(sql, bound.as_slice() as &dyn ParameterCollection, timeout)
            .map_err(|e| EngineError::Query(format!("execute failed: {e}")))?;
        match (cursor, fetch_size) {
            (Some(c), Some(fs)) => DriverCursor::with_batch_size(c, fs).map(Some),
            (Some(c), None) => DriverCursor::new(c).map(Some),
            (None, _) => Ok(None),
        }
    }

    /// Runs `sql` and reports rows-affected for statements with no result
    /// set, via `Preallocated::row_count`, which the convenience `execute`
    /// path above cannot see once it reports `None`.
    pub fn execute_returning_affected(
        &self,
        sql: &str,
        params: &[ParamValue],
    ) -> Result<(Option<DriverCursor<'_>>, u64), EngineError> {
        let bound = bind(params);
        let mut prealloc = self
            .conn
            .preallocated()
            .map_err(|e| EngineError::Query(format!("preallocate failed: {e}")))?;
        let cursor = prealloc
            .execute(sql, bound.as_slice() as &dyn ParameterCollection)
            .map_err(|e| EngineError::Query(format!("execute failed: {e}")))?;
        match cursor {
            Some(c) => Ok((Some(DriverCursor::new(c)?), 0)),
            None => {
                let affected = prealloc
                    .row_count()
                    .map_err(|e| EngineError::Query(format!("row_count failed: {e}")))?
                    .unwrap_or(0) as u64;
                Ok((None, affected))
            }
        }
    }

    /// Runs `sql` and collects every chained result set in order
    /// (`SQLMoreResults`). A statement batch with no result set at all
    /// collapses to a single `Affected(0)` frame; interleaved DML between
    /// result-bearing statements in the same batch is not individually
    /// counted — only full result sets are materialized as frames.
    pub fn execute_multi(&self, sql: &str, params: &[ParamValue]) -> Result<Vec<MultiFrame>, EngineError> {
        let bound = bind(params);
        let mut frames = Vec::new();
        let mut current = self
            .conn
            .execute(sql, bound.as_slice() as &dyn ParameterCollection)
            .map_err(|e| EngineError::Query(format!("execute failed: {e}")))?;

        loop {
            let Some(raw_cursor) = current else { break };
            let (columns, rows, raw) = cursor::drain_and_unbind(raw_cursor)?;
            frames.push(MultiFrame::RowSet { columns, rows });
            current = raw
                .more_results()
                .map_err(|e| EngineError::Query(format!("more_results failed: {e}")))?;
        }

        if frames.is_empty() {
            frames.push(MultiFrame::Affected(0));
        }
        Ok(frames)
    }

    pub fn prepare(&self, sql: &str) -> Result<DriverStatement<'_>, EngineError> {
        let prepared = self
            .conn
            .prepare(sql)
            .map_err(|e| EngineError::Query(format!("prepare failed: {e}")))?;
        Ok(DriverStatement::new(prepared))
    }

    pub fn set_autocommit(&self, enabled: bool) -> Result<(), EngineError> {
        self.conn
            .set_autocommit(enabled)
            .map_err(|e| EngineError::Connection(format!("set_autocommit failed: {e}")))
    }

    pub fn commit(&self) -> Result<(), EngineError> {
        self.conn
            .commit()
            .map_err(|e| EngineError::Query(format!("commit failed: {e}")))
    }

    pub fn rollback(&self) -> Result<(), EngineError> {
        self.conn
            .rollback()
            .map_err(|e| EngineError::Query(format!("rollback failed: {e}")))
    }

    /// Runs a statement with no result set expected. Used for `SAVEPOINT`,
    /// `ROLLBACK TO SAVEPOINT`, and `RELEASE SAVEPOINT`, which odbc-api has
    /// no dedicated verbs for.
    pub fn exec_direct_statement(&self, sql: &str) -> Result<(), EngineError> {
        self.conn
            .execute(sql, (), None)
            .map_err(|e| EngineError::Query(format!("exec_direct failed: {e}")))?;
        Ok(())
    }

    pub fn is_healthy(&self) -> bool {
        self.execute("SELECT 1", &[]).is_ok()
    }

    /// `SQLTables` catalog introspection. Empty strings match "all" per
    /// the ODBC catalog function convention.
    pub fn catalog_tables(&self, catalog: &str, schema: &str, table: &str) -> Result<DriverCursor<'_>, EngineError> {
        let cursor = self
            .conn
            .tables(catalog, schema, table, "")
            .map_err(|e| EngineError::Query(format!("catalog tables query failed: {e}")))?;
        DriverCursor::new(cursor)
    }

    /// `SQLColumns` catalog introspection.
    pub fn catalog_columns(&self, catalog: &str, schema: &str, table: &str, column: &str) -> Result<DriverCursor<'_>, EngineError> {
        let cursor = self
            .conn
            .columns(catalog, schema, table, column)
            .map_err(|e| EngineError::Query(format!("catalog columns query failed: {e}")))?;
        DriverCursor::new(cursor)
    }

    /// `SQLGetTypeInfo`. `sql_data_type = None` requests every type the
    /// driver supports.
    pub fn catalog_type_info(&self, sql_data_type: Option<i16>) -> Result<DriverCursor<'_>, EngineError> {
        let cursor = self
            .conn
            .data_type(sql_data_type.unwrap_or(odbc_api::sys::SqlDataType::ALL_TYPES.0))
            .map_err(|e| EngineError::Query(format!("catalog type_info query failed: {e}")))?;
        DriverCursor::new(cursor)
    }
}

// `odbc_api::Connection` wraps a raw `SQLHDBC` and is neither `Send` nor
// `Sync` on its own. The engine hands connections across threads (pool
// checkout, FFI calls from arbitrary caller threads) and shares them behind
// `Arc`, so both are asserted here, following the same paired convention as
// every other ODBC handle wrapper in the ecosystem (driver/statement.rs,
// driver/cursor.rs). Every call still goes through the
// `parking_lot::Mutex<DriverConnection>` inside `crate::connection::Connection`
// (`Connection::with_driver`), which is what actually makes concurrent
// access sound — these impls only grant the compiler permission to move and
// share the value, the mutex is what serializes the driver calls themselves.
unsafe impl Send for DriverConnection {}
unsafe impl Sync for DriverConnection {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bind_produces_one_parameter_per_value() {
        let params = vec![
            ParamValue::Null,
            ParamValue::Int32(1),
            ParamValue::String("x".to_string()),
        ];
        assert_eq!(bind(&params).len(), 3);
    }
}
