/// Statement Log
///
/// While a log scope is open (and the connector has a dump sink) every
/// statement that runs is captured as SQL text with its parameters
/// inlined. The capture is buffered per outermost session: a successful
/// commit hands it to the dump sink, a rollback throws it away.
use super::connection::Connector;
use super::errors::DbError;
use super::value::Value;

/// Guard for an open log scope. Scopes nest; capture stops when the
/// outermost one is dropped.
pub struct LogScope<'c> {
    db: &'c Connector,
}

impl Drop for LogScope<'_> {
    fn drop(&mut self) {
        let depth = self.db.inner.log_depth.get().saturating_sub(1);
        self.db.inner.log_depth.set(depth);
    }
}

impl Connector {
    /// Opens a log scope.
    pub fn log(&self) -> LogScope<'_> {
        if self.session_opened() {
            self.begin();
        }
        self.inner.log_depth.set(self.inner.log_depth.get() + 1);
        LogScope { db: self }
    }

    /// Runs `body` inside a log scope.
    pub fn logged<T, E>(&self, body: impl FnOnce(&Connector) -> Result<T, E>) -> Result<T, E>
    where
        E: From<DbError>,
    {
        let _scope = self.log();
        body(self)
    }

    /// True while statements are being captured.
    pub fn logging(&self) -> bool {
        self.inner.dump.is_some() && self.inner.log_depth.get() > 0
    }

    /// SQL captured since the outermost session started.
    pub fn pending_log(&self) -> String {
        self.inner.buffer.borrow().clone()
    }

    pub(super) fn trace(&self, sql: &str, params: &[Value]) {
        if !self.logging() {
            return;
        }
        let statement = expand_sql(sql, params);
        let mut buffer = self.inner.buffer.borrow_mut();
        buffer.push_str(statement.trim_end().trim_end_matches(';'));
        buffer.push_str(";\n");
    }

    pub(super) fn flush_log(&self) {
        if let Some(sink) = &self.inner.dump {
            let buffer = self.inner.buffer.borrow();
            if !buffer.is_empty() {
                sink(&buffer);
            }
        }
    }

    pub(super) fn clear_log(&self) {
        self.inner.buffer.borrow_mut().clear();
    }
}

/// Replaces the `?` (and `?NNN`) placeholders of `sql` with the literal
/// form of `params`. Question marks inside quoted strings or identifiers
/// are left alone, as are placeholders with no matching parameter.
pub fn expand_sql(sql: &str, params: &[Value]) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut quote: Option<char> = None;
    let mut next = 0;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match quote {
            Some(q) => {
                out.push(c);
                if c == q {
                    quote = None;
                }
            }
            None if c == '\'' || c == '"' || c == '`' => {
                quote = Some(c);
                out.push(c);
            }
            None if c == '[' => {
                quote = Some(']');
                out.push(c);
            }
            None if c == '?' => {
                let mut digits = String::new();
                while let Some(d) = chars.peek().filter(|d| d.is_ascii_digit()) {
                    digits.push(*d);
                    chars.next();
                }
                let index = if digits.is_empty() {
                    next += 1;
                    Some(next - 1)
                } else {
                    digits.parse::<usize>().ok().and_then(|n| n.checked_sub(1))
                };
                match index.and_then(|i| params.get(i)) {
                    Some(value) => out.push_str(&value.sql_literal()),
                    None => {
                        out.push('?');
                        out.push_str(&digits);
                    }
                }
            }
            None => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::{ConnectOptions, DbResult};
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_expand_sql() {
        let params = [Value::from("a'b"), Value::Integer(3), Value::Null];
        assert_eq!(
            expand_sql("INSERT INTO t VALUES (?, ?, ?)", &params),
            "INSERT INTO t VALUES ('a''b', 3, NULL)"
        );
        assert_eq!(
            expand_sql("SELECT '?' FROM t WHERE a = ?", &params[1..]),
            "SELECT '?' FROM t WHERE a = 3"
        );
        assert_eq!(expand_sql("SELECT ?2, ?1", &params[..2]), "SELECT 3, 'a''b'");
        assert_eq!(expand_sql("SELECT ?, ?", &params[..1]), "SELECT 'a''b', ?");
    }

    fn capture() -> (Connector, Rc<RefCell<Vec<String>>>) {
        let dumped = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&dumped);
        let db = Connector::open_in_memory(ConnectOptions::with_dump(move |sql| {
            sink.borrow_mut().push(sql.to_string())
        }))
        .unwrap();
        db.transaction(|db| db.with_cursor(|db| db.execute_script("CREATE TABLE t (n INTEGER)")))
            .unwrap();
        (db, dumped)
    }

    #[test]
    fn test_logged_statements_reach_sink_on_commit() {
        let (db, dumped) = capture();
        assert!(dumped.borrow().is_empty());

        db.transaction(|db| {
            db.with_cursor(|db| {
                db.execute("INSERT INTO t VALUES (?)", &[Value::Integer(1)])?;
                db.logged(|db| db.execute("INSERT INTO t VALUES (?)", &[Value::Integer(2)]))?;
                assert!(!db.logging());
                assert_eq!(db.pending_log(), "INSERT INTO t VALUES (2);\n");
                Ok::<_, DbError>(())
            })
        })
        .unwrap();

        assert_eq!(*dumped.borrow(), vec!["INSERT INTO t VALUES (2);\n".to_string()]);
        assert_eq!(db.pending_log(), "");
    }

    #[test]
    fn test_rollback_discards_log() {
        let (db, dumped) = capture();
        let result: DbResult<()> = db.transaction(|db| {
            db.with_cursor(|db| {
                db.logged(|db| db.execute("INSERT INTO t VALUES (1)", &[]))?;
                Err(DbError::Data("abort".into()))
            })
        });
        assert!(result.is_err());
        assert!(dumped.borrow().is_empty());
        assert_eq!(db.pending_log(), "");
    }

    #[test]
    fn test_no_capture_without_sink() {
        let db = Connector::open_in_memory(ConnectOptions::default()).unwrap();
        let _scope = db.log();
        assert!(!db.logging());
    }
}
