// Prepared statement wrapper (§4.12), borrowed from its owning connection.

use odbc_api::handles::StatementImpl;
use odbc_api::ParameterCollection;

use crate::driver::connection::bind;
use crate::driver::cursor::DriverCursor;
use crate::error::EngineError;
use crate::protocol::params::ParamValue;

pub struct DriverStatement<'c> {
    prepared: odbc_api::Prepared<StatementImpl<'c>>,
}

impl<'c> DriverStatement<'c> {
    pub(crate) fn new(prepared: odbc_api::Prepared<StatementImpl<'c>>) -> Self {
        Self { prepared }
    }

    pub fn execute(&mut self, params: &[ParamValue]) -> Result<Option<DriverCursor<'_>>, EngineError> {
        let bound = bind(params);
        let cursor = self
            .prepared
            .execute(bound.as_slice() as &dyn ParameterCollection)
            .map_err(|e| EngineError::Query(format!("prepared execute failed: {e}")))?;
        cursor.map(DriverCursor::new).transpose()
    }

    pub fn parameter_count(&self) -> Result<i16, EngineError> {
        self.prepared
            .num_params()
            .map_err(|e| EngineError::Query(format!("num_params failed: {e}")))
    }
}

// `odbc_api::Prepared` wraps a raw `SQLHSTMT`, same situation as
// `DriverConnection` above. `CachedStatement` (crate::cache) stores this
// behind a `parking_lot::Mutex` keyed by SQL text, so every access is
// already serialized; these impls only unblock the registries/cache from
// requiring `Send + Sync` on their contents.
unsafe impl Send for DriverStatement<'_> {}
unsafe impl Sync for DriverStatement<'_> {}
