/// Fund database backend
///
/// - `store`: opening the database and attaching the record types
/// - `queries`: the SQL behind every record type
/// - `model`: funds, accounts, quotes and the operations on them
/// - `tasks`: quote extraction runs
pub mod model;
pub mod queries;
pub mod store;
pub mod tasks;

pub use store::{open, StoreOptions};
