/// Register Framework
///
/// A small object-relational layer over SQLite. Record types declare their
/// fields once; a connector owns the connection and hands out sessions,
/// cursors and record factories bound to it.
///
/// ## Architecture
///
/// - **Errors** (`errors.rs`): driver-independent error taxonomy
/// - **Values** (`value.rs`): field values and the date/flag codec hooks
/// - **Connector** (`connection.rs`): connection ownership and the cursor surface
/// - **Cursors** (`cursor.rs`): cursor scopes and lazily drained row streams
/// - **Sessions** (`session.rs`): nested transactions with a single physical commit
/// - **Statement log** (`log.rs`): capture of executed SQL for the dump sink
/// - **Records** (`record.rs`): declarative record types and their persistence protocol
/// - **Registry** (`registry.rs`): attaching record types to a connector
///
/// ## Usage
///
/// Operations are written as functions taking a `&Connector`, wrapped in
/// `with_cursor` (or `stream` for queries), and called inside a session.
pub mod connection;
pub mod cursor;
pub mod errors;
pub mod log;
pub mod record;
pub mod registry;
pub mod session;
pub mod value;

pub use connection::{ConnectOptions, Connector, DumpSink, Row};
pub use cursor::RowStream;
pub use errors::{DbError, DbResult};
pub use log::{expand_sql, LogScope};
pub use record::{Field, Key, Record, RecordParts, RecordSchema, Records, Table};
pub use registry::{Bound, Entity};
pub use session::Session;
pub use value::{decode_date, decode_flag, encode_date, encode_flag, Value, DATE_FORMAT};
