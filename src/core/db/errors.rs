/// Database Error Taxonomy
///
/// Driver-independent error kinds. Every failure raised by the SQLite driver
/// is normalized into one of these variants at the cursor boundary, so the
/// model and the application never see `rusqlite` types.
///
/// The kinds follow the DB-API naming:
///
/// ```text
/// Error
/// ├── Interface
/// └── Database
///     ├── Internal, Operational, Programming
///     ├── Integrity, Data, NotSupported
///     └── NotStandard
///         └── Transaction
/// ```
use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum DbError {
    /// Unclassified error at the root of the hierarchy
    #[error("Error: {0}")]
    Error(String),

    /// Misuse of the database interface rather than of the database
    #[error("Interface error: {0}")]
    Interface(String),

    /// Generic database error with no more specific kind
    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal error: {0}")]
    Internal(String),

    /// Errors related to the database operation, not under the caller's control
    #[error("Operational error: {0}")]
    Operational(String),

    /// Bad SQL, wrong number of parameters and the like
    #[error("Programming error: {0}")]
    Programming(String),

    /// Constraint violations (duplicate keys, foreign keys, NOT NULL)
    #[error("Integrity error: {0}")]
    Integrity(String),

    /// Malformed or out of range values
    #[error("Data error: {0}")]
    Data(String),

    #[error("Not supported: {0}")]
    NotSupported(String),

    /// Raised by the driver outside the standard taxonomy, or by the
    /// register layer itself (e.g. a record type not attached to a connector)
    #[error("Non-standard error: {0}")]
    NotStandard(String),

    /// Operation attempted without an open session
    #[error("Transaction error: {0}")]
    Transaction(String),
}

impl DbError {
    /// Name of the kind, as it appears in the taxonomy.
    pub fn kind(&self) -> &'static str {
        match self {
            DbError::Error(_) => "Error",
            DbError::Interface(_) => "InterfaceError",
            DbError::Database(_) => "DatabaseError",
            DbError::Internal(_) => "InternalError",
            DbError::Operational(_) => "OperationalError",
            DbError::Programming(_) => "ProgrammingError",
            DbError::Integrity(_) => "IntegrityError",
            DbError::Data(_) => "DataError",
            DbError::NotSupported(_) => "NotSupportedError",
            DbError::NotStandard(_) => "NotStandardError",
            DbError::Transaction(_) => "TransactionError",
        }
    }

    /// Message carried by the error, without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            DbError::Error(m)
            | DbError::Interface(m)
            | DbError::Database(m)
            | DbError::Internal(m)
            | DbError::Operational(m)
            | DbError::Programming(m)
            | DbError::Integrity(m)
            | DbError::Data(m)
            | DbError::NotSupported(m)
            | DbError::NotStandard(m)
            | DbError::Transaction(m) => m,
        }
    }

    /// True for every kind below `DatabaseError` (and `DatabaseError` itself).
    pub fn is_database_error(&self) -> bool {
        !matches!(self, DbError::Error(_) | DbError::Interface(_))
    }

    /// True for `NotStandardError` and its subtype `TransactionError`.
    pub fn is_not_standard(&self) -> bool {
        matches!(self, DbError::NotStandard(_) | DbError::Transaction(_))
    }

    /// Builds the taxonomy member whose name matches `kind`, falling back to
    /// `NotStandard` when the name is unknown. Both `"Integrity"` and
    /// `"IntegrityError"` are accepted.
    pub fn from_kind(kind: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        match kind.trim_end_matches("Error") {
            "" => DbError::Error(message),
            "Interface" => DbError::Interface(message),
            "Database" => DbError::Database(message),
            "Internal" => DbError::Internal(message),
            "Operational" => DbError::Operational(message),
            "Programming" => DbError::Programming(message),
            "Integrity" => DbError::Integrity(message),
            "Data" => DbError::Data(message),
            "NotSupported" => DbError::NotSupported(message),
            "Transaction" => DbError::Transaction(message),
            _ => DbError::NotStandard(message),
        }
    }
}

/// Kind name that the SQLite result code maps to.
fn sqlite_kind(code: ErrorCode, extended_code: i32) -> &'static str {
    match code {
        ErrorCode::ConstraintViolation | ErrorCode::TypeMismatch => "IntegrityError",
        ErrorCode::TooBig => "DataError",
        ErrorCode::InternalMalfunction | ErrorCode::NotFound => "InternalError",
        ErrorCode::ApiMisuse | ErrorCode::ParameterOutOfRange => "InterfaceError",
        ErrorCode::PermissionDenied
        | ErrorCode::OperationAborted
        | ErrorCode::DatabaseBusy
        | ErrorCode::DatabaseLocked
        | ErrorCode::ReadOnly
        | ErrorCode::OperationInterrupted
        | ErrorCode::SystemIoFailure
        | ErrorCode::DiskFull
        | ErrorCode::CannotOpen
        | ErrorCode::FileLockingProtocolFailed
        | ErrorCode::SchemaChanged => "OperationalError",
        // SQLITE_ERROR: syntax errors, missing tables, ...
        ErrorCode::Unknown if extended_code & 0xff == 1 => "OperationalError",
        _ => "DatabaseError",
    }
}

impl From<rusqlite::Error> for DbError {
    fn from(err: rusqlite::Error) -> Self {
        let message = err.to_string();
        let kind = match &err {
            rusqlite::Error::SqliteFailure(failure, _) => {
                sqlite_kind(failure.code, failure.extended_code)
            }
            rusqlite::Error::InvalidParameterCount(..)
            | rusqlite::Error::InvalidParameterName(_)
            | rusqlite::Error::MultipleStatement
            | rusqlite::Error::ExecuteReturnedResults
            | rusqlite::Error::InvalidQuery => "ProgrammingError",
            rusqlite::Error::FromSqlConversionFailure(..)
            | rusqlite::Error::IntegralValueOutOfRange(..)
            | rusqlite::Error::InvalidColumnType(..)
            | rusqlite::Error::Utf8Error(_)
            | rusqlite::Error::NulError(_) => "DataError",
            rusqlite::Error::ToSqlConversionFailure(_) => "InterfaceError",
            _ => "NotStandardError",
        };
        DbError::from_kind(kind, message)
    }
}

pub type DbResult<T> = std::result::Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_hierarchy_queries() {
        assert!(DbError::Transaction("x".into()).is_not_standard());
        assert!(DbError::Transaction("x".into()).is_database_error());
        assert!(DbError::NotStandard("x".into()).is_not_standard());
        assert!(!DbError::Integrity("x".into()).is_not_standard());
        assert!(!DbError::Interface("x".into()).is_database_error());
        assert!(!DbError::Error("x".into()).is_database_error());
    }

    #[test]
    fn test_from_kind_falls_back_to_not_standard() {
        assert_eq!(
            DbError::from_kind("IntegrityError", "dup"),
            DbError::Integrity("dup".into())
        );
        assert_eq!(DbError::from_kind("Data", "bad"), DbError::Data("bad".into()));
        assert_eq!(
            DbError::from_kind("WeirdDriverError", "?"),
            DbError::NotStandard("?".into())
        );
    }

    #[test]
    fn test_constraint_violation_is_integrity_error() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (id INTEGER PRIMARY KEY); INSERT INTO t VALUES (1);")
            .unwrap();
        let err: DbError = conn.execute("INSERT INTO t VALUES (1)", []).unwrap_err().into();
        assert_eq!(err.kind(), "IntegrityError");
        assert!(err.message().contains("UNIQUE"));
    }

    #[test]
    fn test_missing_table_is_operational_error() {
        let conn = Connection::open_in_memory().unwrap();
        let err: DbError = conn.execute("DELETE FROM nowhere", []).unwrap_err().into();
        assert!(matches!(err, DbError::Operational(_)), "got {:?}", err);
    }

    #[test]
    fn test_bad_parameter_count_is_programming_error() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (a, b)").unwrap();
        let err: DbError = conn
            .execute("INSERT INTO t VALUES (?, ?)", [1])
            .unwrap_err()
            .into();
        assert!(matches!(err, DbError::Programming(_)), "got {:?}", err);
    }

    #[test]
    fn test_unclassified_driver_error_is_not_standard() {
        let err: DbError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, DbError::NotStandard(_)));
    }
}
