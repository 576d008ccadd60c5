//! Persistence session and connection contracts.
//!
//! ## Design
//!
//! The worker never talks to an ORM directly. A storage adapter implements
//! two traits:
//!
//! - `PersistenceSession`: the unit-of-work (identity map + pending changes)
//!   that must be cleared between jobs so records loaded by one job never leak
//!   into the next.
//! - `Connection`: the database link underneath the session, with just enough
//!   surface to probe it, drop it and open it again.
//!
//! A session that reports itself closed is unusable for the rest of the
//! process (typically after a failed flush rolled back its transaction). A
//! broken connection, on the other hand, is recoverable: the link is closed
//! and reopened in place.

use crate::error::ConnectionError;

/// SQL dialect of a connection, used to build the health probe statement.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Platform {
    Postgres,
    MySql,
    Sqlite,
    SqlServer,
    Oracle,
    Db2,
}

impl Platform {
    /// Cheapest statement that still requires a server round-trip.
    pub fn dummy_select_sql(&self) -> &'static str {
        match self {
            Platform::Oracle => "SELECT 1 FROM DUAL",
            Platform::Db2 => "SELECT 1 FROM sysibm.sysdummy1",
            Platform::Postgres | Platform::MySql | Platform::Sqlite | Platform::SqlServer => {
                "SELECT 1"
            }
        }
    }
}

/// Database link owned by a persistence session.
pub trait Connection {
    /// Resolve the active platform. Fails when the link is unusable.
    fn database_platform(&mut self) -> Result<Platform, ConnectionError>;

    /// Execute a statement, discarding any result rows.
    fn execute_query(&mut self, sql: &str) -> Result<(), ConnectionError>;

    /// Drop the underlying link. Closing an already-closed link is a no-op.
    fn close(&mut self);

    /// Open a fresh link.
    fn connect(&mut self) -> Result<(), ConnectionError>;

    /// Round-trip a trivial statement to detect a silently dropped link.
    fn ping(&mut self) -> Result<(), ConnectionError> {
        let platform = self.database_platform()?;
        self.execute_query(platform.dummy_select_sql())
    }
}

/// Unit-of-work session bound to a single connection.
pub trait PersistenceSession {
    type Conn: Connection;

    /// Whether the session can still be used.
    fn is_open(&self) -> bool;

    /// Detach every managed record (reset the identity map).
    fn clear(&mut self);

    /// The connection this session runs its queries on.
    fn connection(&mut self) -> &mut Self::Conn;
}
