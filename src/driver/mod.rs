// ODBC driver adapter (§4.12). The only layer that touches `odbc_api`
// types directly; pool, cache, execution, stream, and bulk all program
// against `DriverConnection`/`DriverStatement`/`DriverCursor`.

pub mod connection;
pub mod cursor;
pub mod environment;
pub mod statement;
pub mod type_map;

pub use connection::DriverConnection;
pub use cursor::DriverCursor;
pub use statement::DriverStatement;
