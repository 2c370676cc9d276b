// Transaction manager (§4.9): begin/commit/rollback with isolation level,
// plus nested savepoints emitted to the driver as `SAVEPOINT` / `ROLLBACK
// TO` / `RELEASE` since odbc-api has no dedicated verbs for them.

use parking_lot::Mutex;

use crate::connection::Connection;
use crate::error::EngineError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl IsolationLevel {
    pub fn from_code(code: u8) -> Result<Self, EngineError> {
        match code {
            0 => Ok(IsolationLevel::ReadUncommitted),
            1 => Ok(IsolationLevel::ReadCommitted),
            2 => Ok(IsolationLevel::RepeatableRead),
            3 => Ok(IsolationLevel::Serializable),
            other => Err(EngineError::Validation(format!("unknown isolation level code {other}"))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    RolledBack,
}

pub struct Transaction {
    pub id: u32,
    pub connection_id: u32,
    pub isolation: IsolationLevel,
    state: Mutex<TransactionState>,
}

impl Transaction {
    pub fn begin(id: u32, conn: &Connection, isolation: IsolationLevel) -> Result<Self, EngineError> {
        conn.begin_transaction()?;
        conn.with_driver(|driver| driver.set_autocommit(false))?;
        Ok(Self {
            id,
            connection_id: conn.id,
            isolation,
            state: Mutex::new(TransactionState::Active),
        })
    }

    fn ensure_active(&self) -> Result<(), EngineError> {
        if *self.state.lock() != TransactionState::Active {
            return Err(EngineError::TransactionClosed(self.id));
        }
        Ok(())
    }

    pub fn commit(&self, conn: &Connection) -> Result<(), EngineError> {
        self.ensure_active()?;
        conn.with_driver(|driver| {
            driver.commit()?;
            driver.set_autocommit(true)
        })?;
        *self.state.lock() = TransactionState::Committed;
        conn.end_transaction();
        Ok(())
    }

    pub fn rollback(&self, conn: &Connection) -> Result<(), EngineError> {
        self.ensure_active()?;
        conn.with_driver(|driver| {
            driver.rollback()?;
            driver.set_autocommit(true)
        })?;
        *self.state.lock() = TransactionState::RolledBack;
        conn.end_transaction();
        Ok(())
    }

    /// Best-effort rollback issued when a connection with an active
    /// transaction is dropped or closed. Errors are swallowed: there is no
    /// caller left to report them to, and the connection is going away
    /// regardless.
    pub fn auto_rollback(&self, conn: &Connection) {
        if *self.state.lock() == TransactionState::Active {
            let _ = conn.with_driver(|driver| driver.rollback());
            *self.state.lock() = TransactionState::RolledBack;
            conn.end_transaction();
        }
    }

    pub fn savepoint_create(&self, conn: &Connection, name: &str) -> Result<(), EngineError> {
        self.ensure_active()?;
        conn.with_driver(|driver| driver.exec_direct_statement(&format!("SAVEPOINT {name}")))
    }

    pub fn savepoint_rollback(&self, conn: &Connection, name: &str) -> Result<(), EngineError> {
        self.ensure_active()?;
        conn.with_driver(|driver| driver.exec_direct_statement(&format!("ROLLBACK TO SAVEPOINT {name}")))
    }

    pub fn savepoint_release(&self, conn: &Connection, name: &str) -> Result<(), EngineError> {
        self.ensure_active()?;
        conn.with_driver(|driver| driver.exec_direct_statement(&format!("RELEASE SAVEPOINT {name}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn isolation_level_rejects_unknown_codes() {
        assert!(IsolationLevel::from_code(4).is_err());
        assert_eq!(IsolationLevel::from_code(2).unwrap(), IsolationLevel::RepeatableRead);
    }
}
