/// Connection Management Module
///
/// The `Connector` owns one SQLite connection together with the state the
/// register framework layers on top of it: the session depth, the stack of
/// open cursors, the statement log buffer and the set of attached record
/// types.
///
/// A connector is a cheap handle. Clones share the same connection; record
/// instances and row streams keep a clone so they can reach the database
/// after the call that produced them returned. It is deliberately not
/// `Send`: the framework assumes single-threaded use.
///
/// Statements only run inside a session (see `session.rs`) and a cursor
/// scope (see `cursor.rs`):
///
/// ```ignore
/// db.transaction(|db| {
///     db.with_cursor(|db| {
///         db.execute("INSERT INTO fund (isin, name) VALUES (?, ?)", &[isin, name])?;
///         db.last_row_id()
///     })
/// })?;
/// ```
use super::cursor::Cursor;
use super::errors::{DbError, DbResult};
use super::value::Value;
use rusqlite::{params_from_iter, Connection};
use std::any::{Any, TypeId};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::path::Path;
use std::rc::Rc;
use tracing::{debug, info};

/// A result row, in column order.
pub type Row = Vec<Value>;

/// Receives the SQL text captured by the statement log on every successful
/// outermost commit.
pub type DumpSink = Box<dyn Fn(&str)>;

/// Options for opening a connector.
#[derive(Default)]
pub struct ConnectOptions {
    /// Where captured statements go. Without a sink nothing is captured.
    pub dump: Option<DumpSink>,
}

impl ConnectOptions {
    pub fn with_dump(dump: impl Fn(&str) + 'static) -> Self {
        ConnectOptions {
            dump: Some(Box::new(dump)),
        }
    }
}

pub(super) struct Inner {
    pub(super) connection: RefCell<Option<Connection>>,
    /// Session nesting depth
    pub(super) depth: Cell<usize>,
    pub(super) cursors: RefCell<Vec<Cursor>>,
    pub(super) next_cursor: Cell<u64>,
    pub(super) dump: Option<DumpSink>,
    /// Statement log nesting depth
    pub(super) log_depth: Cell<usize>,
    pub(super) buffer: RefCell<String>,
    /// Attached record types by name
    pub(super) attached: RefCell<BTreeMap<&'static str, TypeId>>,
    /// Shared services, one per type
    pub(super) extensions: RefCell<HashMap<TypeId, Rc<dyn Any>>>,
}

/// Handle on a database connection and its register state.
#[derive(Clone)]
pub struct Connector {
    pub(super) inner: Rc<Inner>,
}

/// What a single statement left behind for its cursor.
pub(super) struct Outcome {
    pub(super) columns: Vec<String>,
    pub(super) rows: VecDeque<Row>,
    pub(super) row_count: usize,
    pub(super) last_row_id: Option<i64>,
}

impl Connector {
    /// Opens (or creates) the database file at `path`.
    pub fn open(path: impl AsRef<Path>, options: ConnectOptions) -> DbResult<Self> {
        let path = path.as_ref();
        let connection = Connection::open(path)?;
        info!("Opened connection to {}", path.display());
        Ok(Self::from_connection(connection, options))
    }

    pub fn open_in_memory(options: ConnectOptions) -> DbResult<Self> {
        let connection = Connection::open_in_memory()?;
        Ok(Self::from_connection(connection, options))
    }

    /// Wraps an already open connection.
    pub fn from_connection(connection: Connection, options: ConnectOptions) -> Self {
        Connector {
            inner: Rc::new(Inner {
                connection: RefCell::new(Some(connection)),
                depth: Cell::new(0),
                cursors: RefCell::new(Vec::new()),
                next_cursor: Cell::new(1),
                dump: options.dump,
                log_depth: Cell::new(0),
                buffer: RefCell::new(String::new()),
                attached: RefCell::new(BTreeMap::new()),
                extensions: RefCell::new(HashMap::new()),
            }),
        }
    }

    /// Closes the underlying connection. Further operations fail with an
    /// interface error; closing twice is a no-op.
    pub fn close(&self) -> DbResult<()> {
        let connection = self.inner.connection.borrow_mut().take();
        match connection {
            Some(connection) => {
                debug!("Closing connection {:#x}", self.id());
                connection.close().map_err(|(_, e)| DbError::from(e))
            }
            None => Ok(()),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.connection.borrow().is_none()
    }

    /// Identity of the connection behind this handle, shared by all clones.
    pub fn id(&self) -> usize {
        Rc::as_ptr(&self.inner) as usize
    }

    pub fn same_as(&self, other: &Connector) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Makes `value` available to everything holding this connection,
    /// replacing the previous value of its type.
    pub fn provide<T: 'static>(&self, value: T) {
        self.inner
            .extensions
            .borrow_mut()
            .insert(TypeId::of::<T>(), Rc::new(value));
    }

    pub fn provided<T: 'static>(&self) -> Option<Rc<T>> {
        let value = self.inner.extensions.borrow().get(&TypeId::of::<T>()).cloned()?;
        value.downcast::<T>().ok()
    }

    /// True while at least one session is open.
    pub fn session_opened(&self) -> bool {
        self.inner.depth.get() > 0
    }

    /// Current session nesting depth.
    pub fn depth(&self) -> usize {
        self.inner.depth.get()
    }

    /// True while SQLite itself has a transaction open.
    pub fn in_backend_transaction(&self) -> bool {
        self.inner
            .connection
            .borrow()
            .as_ref()
            .map_or(false, |c| !c.is_autocommit())
    }

    /// Sets a connection-level pragma. SQLite ignores some pragmas (such as
    /// `foreign_keys`) inside a transaction, so call this outside sessions.
    pub fn pragma(&self, name: &str, value: impl Into<Value>) -> DbResult<()> {
        let value = value.into();
        debug!("PRAGMA {} = {}", name, value.sql_literal());
        self.with_connection(|conn| conn.pragma_update(None, name, &value))
    }

    pub(super) fn with_connection<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> DbResult<T> {
        let connection = self.inner.connection.borrow();
        let connection = connection
            .as_ref()
            .ok_or_else(|| DbError::Interface("Cannot operate on a closed database".into()))?;
        f(connection).map_err(DbError::from)
    }

    fn active_cursor(&self) -> DbResult<u64> {
        if !self.session_opened() {
            return Err(DbError::Transaction(
                "Statements can only run inside a session".into(),
            ));
        }
        self.inner
            .cursors
            .borrow()
            .last()
            .map(|c| c.id)
            .ok_or_else(|| DbError::Interface("No cursor is open on this connection".into()))
    }

    /// Runs one statement on the innermost cursor. Result rows are kept on
    /// the cursor until fetched.
    pub fn execute(&self, sql: &str, params: &[Value]) -> DbResult<()> {
        let cursor = self.active_cursor()?;
        let outcome = self.with_connection(|conn| run_statement(conn, sql, params))?;
        self.trace(sql, params);
        self.load_cursor(cursor, outcome);
        Ok(())
    }

    /// Runs the same statement once per parameter row.
    pub fn execute_many<I>(&self, sql: &str, rows: I) -> DbResult<()>
    where
        I: IntoIterator<Item = Vec<Value>>,
    {
        let cursor = self.active_cursor()?;
        let mut total = Outcome {
            columns: Vec::new(),
            rows: VecDeque::new(),
            row_count: 0,
            last_row_id: None,
        };
        for params in rows {
            let outcome = self.with_connection(|conn| run_statement(conn, sql, &params))?;
            self.trace(sql, &params);
            total.row_count += outcome.row_count;
            total.last_row_id = outcome.last_row_id.or(total.last_row_id);
        }
        self.load_cursor(cursor, total);
        Ok(())
    }

    /// Runs a batch of semicolon-separated statements without parameters.
    pub fn execute_script(&self, sql: &str) -> DbResult<()> {
        let cursor = self.active_cursor()?;
        self.with_connection(|conn| conn.execute_batch(sql))?;
        self.trace(sql, &[]);
        self.load_cursor(
            cursor,
            Outcome {
                columns: Vec::new(),
                rows: VecDeque::new(),
                row_count: 0,
                last_row_id: None,
            },
        );
        Ok(())
    }

    /// Next pending row on the innermost cursor.
    pub fn fetch_one(&self) -> DbResult<Option<Row>> {
        let cursor = self.active_cursor()?;
        Ok(self.take_row(cursor))
    }

    /// All pending rows on the innermost cursor.
    pub fn fetch_all(&self) -> DbResult<Vec<Row>> {
        let cursor = self.active_cursor()?;
        let mut rows = Vec::new();
        while let Some(row) = self.take_row(cursor) {
            rows.push(row);
        }
        Ok(rows)
    }

    /// Rowid generated by the last non-query statement on the innermost cursor.
    pub fn last_row_id(&self) -> DbResult<Option<i64>> {
        let cursor = self.active_cursor()?;
        Ok(self.cursor_state(cursor, |c| c.last_row_id).flatten())
    }

    /// Rows changed by the last non-query statement on the innermost cursor.
    pub fn row_count(&self) -> DbResult<usize> {
        let cursor = self.active_cursor()?;
        Ok(self.cursor_state(cursor, |c| c.row_count).unwrap_or(0))
    }

    /// Column names of the last query on the innermost cursor.
    pub fn columns(&self) -> DbResult<Vec<String>> {
        let cursor = self.active_cursor()?;
        Ok(self
            .cursor_state(cursor, |c| c.columns.clone())
            .unwrap_or_default())
    }
}

impl fmt::Debug for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connector")
            .field("id", &format_args!("{:#x}", self.id()))
            .field("depth", &self.depth())
            .field("cursors", &self.inner.cursors.borrow().len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

fn run_statement(conn: &Connection, sql: &str, params: &[Value]) -> rusqlite::Result<Outcome> {
    let mut stmt = conn.prepare(sql)?;
    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

    if columns.is_empty() {
        let row_count = stmt.execute(params_from_iter(params.iter()))?;
        return Ok(Outcome {
            columns,
            rows: VecDeque::new(),
            row_count,
            last_row_id: Some(conn.last_insert_rowid()),
        });
    }

    let width = columns.len();
    let mut buffered = VecDeque::new();
    let mut rows = stmt.query(params_from_iter(params.iter()))?;
    while let Some(row) = rows.next()? {
        let mut values = Vec::with_capacity(width);
        for i in 0..width {
            values.push(Value::from(row.get_ref(i)?));
        }
        buffered.push_back(values);
    }
    Ok(Outcome {
        columns,
        rows: buffered,
        row_count: 0,
        last_row_id: None,
    })
}
