/// Store Initialization
///
/// Opens the fund database, creating its schema when the file is new, and
/// attaches every domain record type to the resulting connector.
use super::model;
use crate::core::db::{ConnectOptions, Connector, DbError, DumpSink, Value};
use crate::core::Result;
use std::fs;
use tracing::{error, info};

/// Schema shipped with the crate.
pub const BUNDLED_SCHEMA: &str = include_str!("../../sql/schema.sql");

pub const IN_MEMORY: &str = ":memory:";

pub struct StoreOptions {
    /// Schema used when the database has no tables yet
    pub schema: Option<String>,
    pub foreign_keys: bool,
    /// Receives the SQL of every committed change to the data
    pub dump: Option<DumpSink>,
}

impl Default for StoreOptions {
    fn default() -> Self {
        StoreOptions {
            schema: Some(BUNDLED_SCHEMA.to_string()),
            foreign_keys: true,
            dump: None,
        }
    }
}

/// Opens `database` (a path or `:memory:`).
///
/// A database without tables gets `options.schema`; without a schema the
/// empty file is removed again and a database error is returned.
pub fn open(database: &str, options: StoreOptions) -> Result<Connector> {
    let db = Connector::open(
        database,
        ConnectOptions {
            dump: options.dump,
        },
    )?;

    let tables = db.transaction(count_tables)?;
    if tables == 0 {
        match options.schema {
            Some(schema) => {
                info!("Creating schema in {}", database);
                db.transaction(|db| db.with_cursor(|db| db.logged(|db| db.execute_script(&schema))))?;
            }
            None => {
                let msg = format!("{}: empty database and no schema to create it", database);
                error!("{}", msg);
                if let Err(e) = db.close() {
                    error!("Closing {} failed: {}", database, e);
                }
                if database != IN_MEMORY {
                    if let Err(e) = fs::remove_file(database) {
                        error!("Removing {} failed: {}", database, e);
                    }
                }
                return Err(DbError::Database(msg).into());
            }
        }
    }

    db.pragma("foreign_keys", options.foreign_keys)?;
    db.attach(&model::entities())?;
    Ok(db)
}

fn count_tables(db: &Connector) -> Result<i64> {
    db.with_cursor(|db| {
        db.execute("SELECT count(name) FROM sqlite_master WHERE type = 'table'", &[])?;
        Ok(db
            .fetch_one()?
            .and_then(|row| row.first().and_then(Value::as_i64))
            .unwrap_or(0))
    })
}
