// Process-wide ODBC environment (§4.12). ODBC environments are not meant to
// be churned, so the engine allocates exactly one and holds it for the
// process lifetime.

use once_cell::sync::OnceCell;
use odbc_api::Environment;

use crate::error::EngineError;

static ENVIRONMENT: OnceCell<Environment> = OnceCell::new();

pub fn global() -> Result<&'static Environment, EngineError> {
    ENVIRONMENT.get_or_try_init(|| {
        Environment::new().map_err(|e| EngineError::Connection(format!("failed to allocate ODBC environment: {e}")))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_environment_is_a_single_instance() {
        let a = global().unwrap() as *const Environment;
        let b = global().unwrap() as *const Environment;
        assert_eq!(a, b);
    }
}
