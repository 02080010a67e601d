/// Records
///
/// A record type is declared once by a name and a field list; the field
/// list is a space-separated string where a trailing `*` marks primary key
/// fields (`"id* name"`). Decode hooks turn stored values into their
/// in-memory form (dates, flags), encode hooks turn them back.
///
/// Two traits split the work:
///
/// - `Record`: construction, field access, iteration and display. The
///   `record!` macro implements it for a struct.
/// - `Table`: how a record type is persisted (`insert_row`, `remove_row`,
///   `select`), plus the provided `insert`/`remove` that keep the
///   instance's stored state consistent.
///
/// ```ignore
/// record! {
///     /// A company
///     pub struct Company: "id* name" {}
/// }
/// ```
use super::connection::{Connector, Row};
use super::cursor::RowStream;
use super::errors::{DbError, DbResult};
use super::value::Value;
use crate::core::{FundError, Result};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

pub type Decoder = fn(Value) -> DbResult<Value>;
pub type Encoder = fn(&Value) -> Value;

const PRIMARY_KEY_MARK: char = '*';

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: &'static str,
    pub primary_key: bool,
}

/// Field layout and codec hooks of a record type.
#[derive(Debug)]
pub struct RecordSchema {
    name: &'static str,
    fields: Vec<Field>,
    decoders: HashMap<&'static str, Decoder>,
    encoders: HashMap<&'static str, Encoder>,
}

impl RecordSchema {
    pub fn declare(name: &'static str, fields: &'static str) -> Self {
        let fields = fields
            .split_whitespace()
            .map(|word| match word.strip_suffix(PRIMARY_KEY_MARK) {
                Some(name) => Field {
                    name,
                    primary_key: true,
                },
                None => Field {
                    name: word,
                    primary_key: false,
                },
            })
            .collect();
        RecordSchema {
            name,
            fields,
            decoders: HashMap::new(),
            encoders: HashMap::new(),
        }
    }

    /// Registers the decode hook for `field`.
    pub fn decode(mut self, field: &'static str, hook: Decoder) -> Self {
        debug_assert!(self.position(field).is_some(), "no field {} in {}", field, self.name);
        self.decoders.insert(field, hook);
        self
    }

    /// Registers the encode hook for `field`.
    pub fn encode(mut self, field: &'static str, hook: Encoder) -> Self {
        debug_assert!(self.position(field).is_some(), "no field {} in {}", field, self.name);
        self.encoders.insert(field, hook);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|f| f.name)
    }

    pub fn primary_key(&self) -> Vec<&'static str> {
        self.fields
            .iter()
            .filter(|f| f.primary_key)
            .map(|f| f.name)
            .collect()
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    fn decode_value(&self, index: usize, value: Value) -> DbResult<Value> {
        match self.decoders.get(self.fields[index].name) {
            Some(hook) => hook(value),
            None => Ok(value),
        }
    }

    fn encode_value(&self, index: usize, value: &Value) -> Value {
        match self.encoders.get(self.fields[index].name) {
            Some(hook) => hook(value),
            None => value.clone(),
        }
    }
}

/// Primary key of a record: a single value, or a tuple for composite keys.
#[derive(Debug, Clone, PartialEq)]
pub enum Key {
    Single(Value),
    Composite(Vec<Value>),
}

impl Key {
    pub fn single(&self) -> Option<&Value> {
        match self {
            Key::Single(v) => Some(v),
            Key::Composite(_) => None,
        }
    }
}

/// State shared by every record instance: its decoded values, whether it
/// mirrors a stored row, and the connector it is bound to.
#[derive(Clone, Default)]
pub struct RecordParts {
    values: Vec<Value>,
    attached: bool,
    db: Option<Connector>,
}

impl RecordParts {
    /// Builds the values from positional arguments followed by keyword
    /// arguments for the remaining fields.
    pub fn build(schema: &RecordSchema, args: Vec<Value>, kwargs: Vec<(&str, Value)>) -> Result<Self> {
        let mut slots: Vec<Option<Value>> = vec![None; schema.len()];
        let mut kwargs = kwargs;

        for (name, value) in kwargs.drain(..) {
            let index = schema.position(name).ok_or_else(|| {
                FundError::Type(format!(
                    "{}() got an unexpected keyword argument '{}'",
                    schema.name(),
                    name
                ))
            })?;
            if slots[index].is_some() {
                return Err(FundError::Type(format!(
                    "{}() got multiple values for argument '{}'",
                    schema.name(),
                    name
                )));
            }
            slots[index] = Some(value);
        }

        if args.len() > schema.len() {
            return Err(FundError::Type(format!(
                "{}() takes {} arguments but {} were given",
                schema.name(),
                schema.len(),
                args.len()
            )));
        }
        for (index, value) in args.into_iter().enumerate() {
            if slots[index].is_some() {
                return Err(FundError::Type(format!(
                    "{}() got multiple values for argument '{}'",
                    schema.name(),
                    schema.fields()[index].name
                )));
            }
            slots[index] = Some(value);
        }

        let mut values = Vec::with_capacity(schema.len());
        for (index, slot) in slots.into_iter().enumerate() {
            let value = slot.ok_or_else(|| {
                FundError::Type(format!(
                    "{}() missing required argument '{}'",
                    schema.name(),
                    schema.fields()[index].name
                ))
            })?;
            values.push(schema.decode_value(index, value)?);
        }

        Ok(RecordParts {
            values,
            attached: false,
            db: None,
        })
    }

    /// Builds stored state from a result row.
    fn materialize(schema: &RecordSchema, row: Row, db: &Connector) -> Result<Self> {
        if row.len() != schema.len() {
            return Err(DbError::Programming(format!(
                "{} expects {} columns, the query returned {}",
                schema.name(),
                schema.len(),
                row.len()
            ))
            .into());
        }
        let mut parts = Self::build(schema, row, Vec::new())?;
        parts.attached = true;
        parts.db = Some(db.clone());
        Ok(parts)
    }

    pub(super) fn bind(&mut self, db: Connector) {
        self.db = Some(db);
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    pub fn connector(&self) -> Option<&Connector> {
        self.db.as_ref()
    }

    fn set(&mut self, index: usize, value: Value) {
        self.values[index] = value;
    }

    fn write_back_key(&mut self, schema: &RecordSchema, generated: Value) -> DbResult<Key> {
        let key: Vec<usize> = (0..schema.len())
            .filter(|&i| schema.fields()[i].primary_key)
            .collect();
        if let [index] = key[..] {
            if self.values[index].is_null() {
                self.values[index] = schema.decode_value(index, generated)?;
            }
            return Ok(Key::Single(self.values[index].clone()));
        }
        Ok(Key::Composite(
            key.iter().map(|&i| self.values[i].clone()).collect(),
        ))
    }

    pub(super) fn fmt_repr(&self, schema: &RecordSchema, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", schema.name())?;
        for (index, (field, value)) in schema.field_names().zip(&self.values).enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}={}", field, value.sql_literal())?;
        }
        write!(f, ")")
    }
}

/// A declared record type.
pub trait Record: Sized {
    fn schema() -> &'static RecordSchema;
    fn from_parts(parts: RecordParts) -> Self;
    fn parts(&self) -> &RecordParts;
    fn parts_mut(&mut self) -> &mut RecordParts;

    /// Builds a detached, unbound instance from positional values.
    fn new<I>(args: I) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        Self::with_args(args, Vec::<(&str, Value)>::new())
    }

    /// Builds a detached, unbound instance from positional values followed
    /// by keyword values.
    fn with_args<I, K>(args: I, kwargs: K) -> Result<Self>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
        K: IntoIterator<Item = (&'static str, Value)>,
    {
        let args = args.into_iter().map(Into::into).collect();
        let kwargs = kwargs.into_iter().collect();
        RecordParts::build(Self::schema(), args, kwargs).map(Self::from_parts)
    }

    /// Decoded value of `name`.
    fn field(&self, name: &str) -> Option<&Value> {
        Self::schema()
            .position(name)
            .and_then(|i| self.parts().values().get(i))
    }

    /// Replaces the value of `name`, running its decode hook.
    fn set_field(&mut self, name: &str, value: impl Into<Value>) -> Result<()> {
        let schema = Self::schema();
        let index = schema.position(name).ok_or_else(|| {
            FundError::Type(format!("{} has no field '{}'", schema.name(), name))
        })?;
        let value = schema.decode_value(index, value.into())?;
        self.parts_mut().set(index, value);
        Ok(())
    }

    fn get_text(&self, name: &str) -> Option<&str> {
        self.field(name).and_then(Value::as_str)
    }

    fn get_int(&self, name: &str) -> Option<i64> {
        self.field(name).and_then(Value::as_i64)
    }

    fn get_real(&self, name: &str) -> Option<f64> {
        self.field(name).and_then(Value::as_f64)
    }

    fn get_date(&self, name: &str) -> Option<NaiveDate> {
        self.field(name).and_then(Value::as_date)
    }

    fn get_flag(&self, name: &str) -> Option<bool> {
        self.field(name).and_then(Value::as_bool)
    }

    /// Encoded field values in declared order, ready to be bound.
    fn values(&self) -> Vec<Value> {
        let schema = Self::schema();
        self.parts()
            .values()
            .iter()
            .enumerate()
            .map(|(i, v)| schema.encode_value(i, v))
            .collect()
    }

    /// Current primary key value(s).
    fn primary_key(&self) -> Key {
        let schema = Self::schema();
        let values = self.parts().values();
        let key: Vec<Value> = schema
            .fields()
            .iter()
            .zip(values)
            .filter(|(f, _)| f.primary_key)
            .map(|(_, v)| v.clone())
            .collect();
        match <[Value; 1]>::try_from(key) {
            Ok([single]) => Key::Single(single),
            Err(key) => Key::Composite(key),
        }
    }

    fn is_attached(&self) -> bool {
        self.parts().is_attached()
    }

    fn connector(&self) -> Option<&Connector> {
        self.parts().connector()
    }

    /// True when the instance mirrors a row of the database it is bound to.
    fn stored(&self) -> bool {
        self.is_attached() && self.connector().is_some()
    }

    /// Connector for lookups from this instance.
    fn bound(&self) -> Result<&Connector> {
        self.connector().ok_or_else(|| {
            FundError::Detached(format!(
                "{} is not bound to a connector",
                Self::schema().name()
            ))
        })
    }
}

/// Persistence protocol of a record type.
///
/// The `*_row` and `select` bodies only talk to the database; `insert`
/// and `remove` wrap them and keep the instance state consistent.
pub trait Table: Record + 'static {
    /// Criteria accepted by `select`.
    type Filter: Default;

    /// Stores the instance; returns the key generated by the database, if any.
    fn insert_row(&self, _db: &Connector) -> Result<Value> {
        Err(DbError::NotSupported(format!("{} cannot be inserted", Self::schema().name())).into())
    }

    fn remove_row(&self, _db: &Connector) -> Result<()> {
        Err(DbError::NotSupported(format!("{} cannot be removed", Self::schema().name())).into())
    }

    /// Produces the rows matching `filter`, one per instance, in field order.
    fn select(_db: &Connector, _filter: &Self::Filter) -> Result<RowStream> {
        Err(DbError::NotSupported(format!("{} cannot be queried", Self::schema().name())).into())
    }

    /// Stores the instance and returns its key. A null single-field key is
    /// replaced with the key the database generated.
    fn insert(&mut self) -> Result<Key> {
        let db = self
            .connector()
            .filter(|db| db.is_attached::<Self>())
            .cloned()
            .ok_or_else(|| {
                DbError::NotStandard(format!(
                    "{} is not attached to a connector",
                    Self::schema().name()
                ))
            })?;

        self.parts_mut().attached = true;
        match self.insert_row(&db) {
            Ok(generated) => Ok(self.parts_mut().write_back_key(Self::schema(), generated)?),
            Err(e) => {
                self.parts_mut().attached = false;
                Err(e)
            }
        }
    }

    /// Deletes the stored row. Returns false when there was nothing stored.
    fn remove(&mut self) -> Result<bool> {
        if !self.stored() {
            return Ok(false);
        }
        let db = self.bound()?.clone();
        self.remove_row(&db)?;
        self.parts_mut().attached = false;
        Ok(true)
    }
}

/// Lazily materialized query results.
pub struct Records<R> {
    rows: RowStream,
    db: Connector,
    marker: PhantomData<fn() -> R>,
}

impl<R: Record> Records<R> {
    pub(super) fn new(rows: RowStream, db: Connector) -> Self {
        Records {
            rows,
            db,
            marker: PhantomData,
        }
    }

    /// First record, releasing the rest.
    pub fn first(mut self) -> Result<Option<R>> {
        let first = self.next().transpose();
        self.rows.close();
        first
    }
}

impl<R: Record> Iterator for Records<R> {
    type Item = Result<R>;

    fn next(&mut self) -> Option<Result<R>> {
        let row = self.rows.next()?;
        Some(RecordParts::materialize(R::schema(), row, &self.db).map(R::from_parts))
    }
}

/// Declares a record struct and implements `Record` (plus `Display` and
/// `Debug`) for it. `cache` fields are memo slots for lazy lookups.
#[macro_export]
macro_rules! record {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident : $fields:literal {
            $( decode $dfield:ident => $dhook:expr; )*
            $( encode $efield:ident => $ehook:expr; )*
            $( cache $cfield:ident : $cty:ty; )*
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone)]
        $vis struct $name {
            parts: $crate::core::db::RecordParts,
            $( $cfield: $crate::once_cell::unsync::OnceCell<$cty>, )*
        }

        impl $crate::core::db::Record for $name {
            fn schema() -> &'static $crate::core::db::RecordSchema {
                static SCHEMA: $crate::once_cell::sync::OnceCell<$crate::core::db::RecordSchema> =
                    $crate::once_cell::sync::OnceCell::new();
                SCHEMA.get_or_init(|| {
                    $crate::core::db::RecordSchema::declare(stringify!($name), $fields)
                        $( .decode(stringify!($dfield), $dhook) )*
                        $( .encode(stringify!($efield), $ehook) )*
                })
            }

            fn from_parts(parts: $crate::core::db::RecordParts) -> Self {
                $name {
                    parts,
                    $( $cfield: $crate::once_cell::unsync::OnceCell::new(), )*
                }
            }

            fn parts(&self) -> &$crate::core::db::RecordParts {
                &self.parts
            }

            fn parts_mut(&mut self) -> &mut $crate::core::db::RecordParts {
                &mut self.parts
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                $crate::core::db::record::display(self, f)
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                $crate::core::db::record::display(self, f)
            }
        }
    };
}

/// `Name(field=value, ...)`
pub fn display<R: Record>(record: &R, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    record.parts().fmt_repr(R::schema(), f)
}
