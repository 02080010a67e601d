/// Session Management
///
/// Sessions nest. Only the outermost one talks to SQLite: entering it
/// starts a transaction, leaving it commits (and flushes the statement log
/// to the dump sink) or rolls back. Inner sessions only move the depth
/// counter, so an error caught inside a nested session does not undo the
/// work of the enclosing one.
use super::connection::Connector;
use super::errors::{DbError, DbResult};
use tracing::{debug, warn};

/// An open session. Dropping it without `commit` rolls back.
#[must_use = "a session rolls back when dropped without commit"]
pub struct Session<'c> {
    db: &'c Connector,
    open: bool,
}

impl<'c> Session<'c> {
    fn enter(db: &'c Connector) -> Self {
        let depth = db.inner.depth.get() + 1;
        db.inner.depth.set(depth);
        if depth == 1 {
            db.begin();
        }
        Session { db, open: true }
    }

    pub fn connector(&self) -> &'c Connector {
        self.db
    }

    pub fn commit(mut self) -> DbResult<()> {
        self.exit(true)
    }

    pub fn rollback(mut self) -> DbResult<()> {
        self.exit(false)
    }

    fn exit(&mut self, success: bool) -> DbResult<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;

        let depth = self.db.inner.depth.get().saturating_sub(1);
        self.db.inner.depth.set(depth);
        if depth > 0 {
            return Ok(());
        }

        let result = if success {
            match self.db.finish("COMMIT") {
                Ok(()) => {
                    self.db.flush_log();
                    Ok(())
                }
                Err(e) => {
                    if let Err(rollback) = self.db.finish("ROLLBACK") {
                        warn!("Rollback after failed commit also failed: {}", rollback);
                    }
                    Err(e)
                }
            }
        } else {
            self.db.finish("ROLLBACK")
        };
        self.db.clear_log();
        result
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        if self.open {
            if let Err(e) = self.exit(false) {
                warn!("Rollback on session drop failed: {}", e);
            }
        }
    }
}

impl Connector {
    /// Opens a (possibly nested) session.
    pub fn session(&self) -> Session<'_> {
        Session::enter(self)
    }

    /// Runs `body` inside a session, committing when it returns `Ok` and
    /// rolling back otherwise.
    pub fn transaction<T, E>(&self, body: impl FnOnce(&Connector) -> Result<T, E>) -> Result<T, E>
    where
        E: From<DbError>,
    {
        let session = self.session();
        match body(self) {
            Ok(value) => {
                session.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(e) = session.rollback() {
                    warn!("Rollback failed: {}", e);
                }
                Err(err)
            }
        }
    }

    /// Starts a SQLite transaction unless one is already open. Failures are
    /// not fatal: statements then run in autocommit mode.
    pub(super) fn begin(&self) {
        if self.in_backend_transaction() {
            return;
        }
        match self.with_connection(|conn| conn.execute_batch("BEGIN")) {
            Ok(()) => debug!("BEGIN"),
            Err(e) => warn!("Could not begin transaction: {}", e),
        }
    }

    pub(super) fn finish(&self, statement: &str) -> DbResult<()> {
        if !self.in_backend_transaction() {
            return Ok(());
        }
        debug!("{}", statement);
        self.with_connection(|conn| conn.execute_batch(statement))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::{ConnectOptions, Value};
    use tempfile::TempDir;

    fn count(db: &Connector) -> i64 {
        db.transaction(|db| {
            db.with_cursor(|db| {
                db.execute("SELECT count(*) FROM t", &[])?;
                Ok::<_, DbError>(db.fetch_one()?.and_then(|r| r[0].as_i64()).unwrap_or(-1))
            })
        })
        .unwrap()
    }

    fn insert(db: &Connector, n: i64) -> DbResult<()> {
        db.with_cursor(|db| db.execute("INSERT INTO t VALUES (?)", &[Value::Integer(n)]))
    }

    fn setup(dir: &TempDir) -> (Connector, Connector) {
        let path = dir.path().join("session.db");
        let db = Connector::open(&path, ConnectOptions::default()).unwrap();
        db.transaction(|db| db.with_cursor(|db| db.execute_script("CREATE TABLE t (n INTEGER)")))
            .unwrap();
        let observer = Connector::open(&path, ConnectOptions::default()).unwrap();
        (db, observer)
    }

    #[test]
    fn test_only_outermost_session_commits() {
        let dir = TempDir::new().unwrap();
        let (db, observer) = setup(&dir);

        let outer = db.session();
        {
            let inner = db.session();
            assert_eq!(db.depth(), 2);
            insert(&db, 1).unwrap();
            inner.commit().unwrap();
        }
        assert_eq!(db.depth(), 1);
        assert!(db.in_backend_transaction());
        assert_eq!(count(&observer), 0);

        outer.commit().unwrap();
        assert_eq!(db.depth(), 0);
        assert!(!db.in_backend_transaction());
        assert_eq!(count(&observer), 1);
    }

    #[test]
    fn test_caught_inner_error_still_commits() {
        let dir = TempDir::new().unwrap();
        let (db, observer) = setup(&dir);

        db.transaction(|db| {
            insert(db, 1)?;
            let inner: DbResult<()> = db.transaction(|db| {
                insert(db, 2)?;
                Err(DbError::Data("boom".into()))
            });
            assert!(inner.is_err());
            assert_eq!(db.depth(), 1);
            Ok::<_, DbError>(())
        })
        .unwrap();
        assert_eq!(count(&observer), 2);
    }

    #[test]
    fn test_propagated_inner_error_rolls_back_everything() {
        let dir = TempDir::new().unwrap();
        let (db, observer) = setup(&dir);

        let result: DbResult<()> = db.transaction(|db| {
            insert(db, 1)?;
            db.transaction(|db| {
                insert(db, 2)?;
                Err(DbError::Data("boom".into()))
            })
        });
        assert!(matches!(result, Err(DbError::Data(_))));
        assert_eq!(db.depth(), 0);
        assert!(!db.in_backend_transaction());
        assert_eq!(count(&observer), 0);
        assert_eq!(count(&db), 0);
    }

    #[test]
    fn test_failed_outer_session_rolls_back() {
        let dir = TempDir::new().unwrap();
        let (db, observer) = setup(&dir);

        let result: DbResult<()> = db.transaction(|db| {
            insert(db, 1)?;
            Err(DbError::Integrity("nope".into()))
        });
        assert!(result.is_err());
        assert_eq!(db.depth(), 0);
        assert_eq!(count(&observer), 0);
        assert_eq!(count(&db), 0);
    }

    #[test]
    fn test_dropped_session_rolls_back() {
        let dir = TempDir::new().unwrap();
        let (db, _observer) = setup(&dir);
        {
            let _session = db.session();
            insert(&db, 5).unwrap();
        }
        assert_eq!(db.depth(), 0);
        assert_eq!(count(&db), 0);
    }
}
