use crate::schema::MIG_0001_INIT;
use crate::StoreError;
use parking_lot::Mutex;
use rusqlite::Connection;

/// Handle to the discovery database. The connection sits behind a mutex so
/// a `Db` can be shared across threads; each statement takes the lock.
pub struct Db {
    pub(crate) conn: Mutex<Connection>,
}

impl Db {
    pub fn open_or_create(path: impl AsRef<std::path::Path>) -> Result<Self, StoreError> {
        let conn = Connection::open(path)?;
        apply_pragmas(&conn)?;
        migrate(&conn)?;
        Ok(Db { conn: Mutex::new(conn) })
    }

    /// Private in-memory database, used by tests and throwaway sessions.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        apply_pragmas(&conn)?;
        migrate(&conn)?;
        Ok(Db { conn: Mutex::new(conn) })
    }
}

fn apply_pragmas(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.pragma_update(None, "journal_mode", &"WAL")?;
    conn.pragma_update(None, "synchronous", &"NORMAL")?;
    conn.pragma_update(None, "foreign_keys", &"ON")?;
    Ok(())
}

fn migrate(conn: &Connection) -> Result<(), rusqlite::Error> {
    // naive: if endpoints table doesn't exist, apply 0001
    let exists: i64 = conn.query_row(
        "SELECT COUNT(1) FROM sqlite_master WHERE type='table' AND name='endpoints'",
        [],
        |r| r.get(0),
    )?;
    if exists == 0 {
        conn.execute_batch(MIG_0001_INIT)?;
    }
    Ok(())
}
