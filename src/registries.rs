// Process-wide handle registries (§4.1): one `HandleRegistry` per entity
// kind, each independently mutex-protected so unrelated handle kinds never
// contend with each other.

use once_cell::sync::Lazy;

use crate::connection::Connection;
use crate::pool::Pool;
use crate::registry::HandleRegistry;
use crate::statement::Statement;
use crate::stream::Stream;
use crate::transaction::Transaction;

static CONNECTIONS: Lazy<HandleRegistry<Connection>> = Lazy::new(HandleRegistry::new);
static STATEMENTS: Lazy<HandleRegistry<Statement>> = Lazy::new(HandleRegistry::new);
static TRANSACTIONS: Lazy<HandleRegistry<Transaction>> = Lazy::new(HandleRegistry::new);
static STREAMS: Lazy<HandleRegistry<Stream>> = Lazy::new(HandleRegistry::new);
static POOLS: Lazy<HandleRegistry<Pool>> = Lazy::new(HandleRegistry::new);

pub fn connections() -> &'static HandleRegistry<Connection> {
    &CONNECTIONS
}

pub fn statements() -> &'static HandleRegistry<Statement> {
    &STATEMENTS
}

pub fn transactions() -> &'static HandleRegistry<Transaction> {
    &TRANSACTIONS
}

pub fn streams() -> &'static HandleRegistry<Stream> {
    &STREAMS
}

pub fn pools() -> &'static HandleRegistry<Pool> {
    &POOLS
}
