/// Cursor Scopes
///
/// Every statement runs on the innermost cursor of the connector's cursor
/// stack. `with_cursor` pushes a fresh cursor for the duration of a call;
/// `stream` pushes one that outlives the call and is handed to the caller
/// as a `RowStream`, so query results can be consumed lazily after the
/// producing function returned. Nested scopes never disturb each other's
/// pending rows.
use super::connection::{Connector, Outcome, Row};
use super::errors::{DbError, DbResult};
use std::collections::VecDeque;
use tracing::{trace, warn};

pub(super) struct Cursor {
    pub(super) id: u64,
    pub(super) columns: Vec<String>,
    pub(super) rows: VecDeque<Row>,
    pub(super) row_count: usize,
    pub(super) last_row_id: Option<i64>,
}

impl Cursor {
    fn new(id: u64) -> Self {
        Cursor {
            id,
            columns: Vec::new(),
            rows: VecDeque::new(),
            row_count: 0,
            last_row_id: None,
        }
    }

    fn load(&mut self, outcome: Outcome) {
        self.columns = outcome.columns;
        self.rows = outcome.rows;
        self.row_count = outcome.row_count;
        if outcome.last_row_id.is_some() {
            self.last_row_id = outcome.last_row_id;
        }
    }
}

/// Keeps a cursor on the stack until dropped.
struct CursorGuard {
    db: Connector,
    id: u64,
}

impl CursorGuard {
    fn open(db: &Connector) -> DbResult<Self> {
        if !db.session_opened() {
            return Err(DbError::Transaction(
                "A cursor can only be opened inside a session".into(),
            ));
        }
        let id = db.inner.next_cursor.get();
        db.inner.next_cursor.set(id + 1);
        db.inner.cursors.borrow_mut().push(Cursor::new(id));
        trace!("cursor {} opened", id);
        Ok(CursorGuard { db: db.clone(), id })
    }
}

impl Drop for CursorGuard {
    fn drop(&mut self) {
        let mut cursors = self.db.inner.cursors.borrow_mut();
        match cursors.iter().rposition(|c| c.id == self.id) {
            Some(pos) => {
                if pos + 1 != cursors.len() {
                    warn!("cursor {} closed while inner cursors are still open", self.id);
                }
                cursors.remove(pos);
                trace!("cursor {} closed", self.id);
            }
            None => warn!("cursor {} was already gone", self.id),
        }
    }
}

impl Connector {
    /// Runs `body` with a fresh cursor on top of the stack. The cursor is
    /// closed when `body` returns, whatever the outcome.
    pub fn with_cursor<T, E>(&self, body: impl FnOnce(&Connector) -> Result<T, E>) -> Result<T, E>
    where
        E: From<DbError>,
    {
        let _guard = CursorGuard::open(self)?;
        body(self)
    }

    /// Runs `body` with a fresh cursor and returns that cursor's pending
    /// rows as a stream. The cursor stays open until the stream is
    /// exhausted or dropped.
    pub fn stream<E>(&self, body: impl FnOnce(&Connector) -> Result<(), E>) -> Result<RowStream, E>
    where
        E: From<DbError>,
    {
        let guard = CursorGuard::open(self)?;
        body(self)?;
        Ok(RowStream { guard: Some(guard) })
    }

    /// Number of cursors currently open.
    pub fn open_cursors(&self) -> usize {
        self.inner.cursors.borrow().len()
    }

    pub(super) fn load_cursor(&self, id: u64, outcome: Outcome) {
        let mut cursors = self.inner.cursors.borrow_mut();
        if let Some(cursor) = cursors.iter_mut().rev().find(|c| c.id == id) {
            cursor.load(outcome);
        }
    }

    pub(super) fn take_row(&self, id: u64) -> Option<Row> {
        let mut cursors = self.inner.cursors.borrow_mut();
        cursors
            .iter_mut()
            .rev()
            .find(|c| c.id == id)
            .and_then(|c| c.rows.pop_front())
    }

    pub(super) fn cursor_state<T>(&self, id: u64, f: impl FnOnce(&Cursor) -> T) -> Option<T> {
        let cursors = self.inner.cursors.borrow();
        cursors.iter().rev().find(|c| c.id == id).map(f)
    }
}

/// Rows left on a cursor by a query, consumed one at a time.
///
/// Holding a stream keeps its cursor open (and the connector alive).
pub struct RowStream {
    guard: Option<CursorGuard>,
}

impl RowStream {
    /// A stream with no rows and no cursor behind it.
    pub fn empty() -> Self {
        RowStream { guard: None }
    }

    /// False once the stream was exhausted or closed.
    pub fn is_open(&self) -> bool {
        self.guard.is_some()
    }

    pub fn columns(&self) -> Vec<String> {
        self.guard
            .as_ref()
            .and_then(|g| g.db.cursor_state(g.id, |c| c.columns.clone()))
            .unwrap_or_default()
    }

    /// Releases the cursor without reading the remaining rows.
    pub fn close(&mut self) {
        self.guard = None;
    }
}

impl Iterator for RowStream {
    type Item = Row;

    fn next(&mut self) -> Option<Row> {
        let guard = self.guard.as_ref()?;
        let row = guard.db.take_row(guard.id);
        if row.is_none() {
            self.guard = None;
        }
        row
    }
}

impl std::fmt::Debug for RowStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RowStream")
            .field("cursor", &self.guard.as_ref().map(|g| g.id))
            .finish()
    }
}
