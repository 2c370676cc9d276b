// Catalog introspection: thin wrappers around the driver's `SQLTables` /
// `SQLColumns` / `SQLGetTypeInfo` calls, encoded through the same
// row-buffer codec as every other result set so a host binding needs no
// separate decode path for schema metadata.

use crate::error::EngineError;
use crate::execution::MAX_RESULT_BUFFER_BYTES;
use crate::protocol::row;
use crate::registries;

fn encode_capped(cursor: &mut crate::driver::DriverCursor<'_>) -> Result<Vec<u8>, EngineError> {
    let columns = cursor.columns();
    let mut rows = Vec::new();
    while let Some(batch) = cursor.fetch_batch()? {
        rows.extend(batch);
    }
    let encoded = row::encode(&columns, &rows)?;
    if encoded.len() > MAX_RESULT_BUFFER_BYTES {
        return Err(EngineError::BufferOverflow {
            actual: encoded.len(),
            cap: MAX_RESULT_BUFFER_BYTES,
        });
    }
    Ok(encoded)
}

pub fn catalog_tables(connection_id: u32, catalog: &str, schema: &str, table: &str) -> Result<Vec<u8>, EngineError> {
    let conn = registries::connections().get(connection_id)?;
    conn.with_driver(|driver| {
        let mut cursor = driver.catalog_tables(catalog, schema, table)?;
        encode_capped(&mut cursor)
    })
}

pub fn catalog_columns(connection_id: u32, catalog: &str, schema: &str, table: &str, column: &str) -> Result<Vec<u8>, EngineError> {
    let conn = registries::connections().get(connection_id)?;
    conn.with_driver(|driver| {
        let mut cursor = driver.catalog_columns(catalog, schema, table, column)?;
        encode_capped(&mut cursor)
    })
}

pub fn catalog_type_info(connection_id: u32, sql_data_type: Option<i16>) -> Result<Vec<u8>, EngineError> {
    let conn = registries::connections().get(connection_id)?;
    conn.with_driver(|driver| {
        let mut cursor = driver.catalog_type_info(sql_data_type)?;
        encode_capped(&mut cursor)
    })
}
