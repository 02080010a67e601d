/// Record Registry
///
/// Record types become usable against a connector once attached to it.
/// Attaching registers the type under its schema name; `entity::<R>()`
/// then returns a `Bound<R>`, the factory and repository for that type on
/// that connector. Instances created through it carry the connector, so
/// they can be inserted and can resolve lookups later on.
use super::connection::Connector;
use super::errors::DbError;
use super::record::{Records, Table};
use super::value::Value;
use crate::core::{FundError, Result};
use std::any::TypeId;
use std::fmt;
use std::marker::PhantomData;
use tracing::debug;

/// Connector operations a record type name must not shadow.
const RESERVED: &[&str] = &[
    "attach", "close", "connection", "cursor", "entity", "execute", "execute_many",
    "execute_script", "fetch_all", "fetch_one", "id", "log", "session", "transaction",
];

/// A record type, as handed to `Connector::attach`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entity {
    pub name: &'static str,
    type_id: TypeId,
}

impl Entity {
    pub fn of<R: Table>() -> Self {
        Entity {
            name: R::schema().name(),
            type_id: TypeId::of::<R>(),
        }
    }
}

impl Connector {
    /// Attaches record types. Fails without attaching any of them when a
    /// name is reserved or already taken, even by the same type.
    pub fn attach(&self, entities: &[Entity]) -> Result<()> {
        {
            let attached = self.inner.attached.borrow();
            for (i, entity) in entities.iter().enumerate() {
                let taken = attached.contains_key(entity.name)
                    || entities[..i].iter().any(|e| e.name == entity.name);
                if taken || RESERVED.contains(&entity.name) {
                    return Err(FundError::NameConflict(format!(
                        "'{}' is already in use on this connector",
                        entity.name
                    )));
                }
            }
        }

        let mut attached = self.inner.attached.borrow_mut();
        for entity in entities {
            debug!("Attaching {} to connector {:#x}", entity.name, self.id());
            attached.insert(entity.name, entity.type_id);
        }
        Ok(())
    }

    pub fn is_attached<R: 'static>(&self) -> bool {
        self.inner
            .attached
            .borrow()
            .values()
            .any(|&id| id == TypeId::of::<R>())
    }

    /// Names of the attached record types.
    pub fn attached(&self) -> Vec<&'static str> {
        self.inner.attached.borrow().keys().copied().collect()
    }

    /// Factory and repository for an attached record type.
    pub fn entity<R: Table>(&self) -> Result<Bound<R>> {
        if !self.is_attached::<R>() {
            return Err(not_attached::<R>());
        }
        Ok(Bound {
            db: self.clone(),
            marker: PhantomData,
        })
    }
}

fn not_attached<R: Table>() -> FundError {
    DbError::NotStandard(format!(
        "{} is not attached to a connector",
        R::schema().name()
    ))
    .into()
}

/// A record type bound to a connector.
pub struct Bound<R> {
    db: Connector,
    marker: PhantomData<fn() -> R>,
}

impl<R> Clone for Bound<R> {
    fn clone(&self) -> Self {
        Bound {
            db: self.db.clone(),
            marker: PhantomData,
        }
    }
}

impl<R: Table> Bound<R> {
    pub fn connector(&self) -> &Connector {
        &self.db
    }

    pub fn name(&self) -> &'static str {
        R::schema().name()
    }

    /// Builds a new, not yet stored instance bound to this connector.
    pub fn new<I>(&self, args: I) -> Result<R>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
    {
        self.with_args(args, Vec::new())
    }

    pub fn with_args<I, K>(&self, args: I, kwargs: K) -> Result<R>
    where
        I: IntoIterator,
        I::Item: Into<Value>,
        K: IntoIterator<Item = (&'static str, Value)>,
    {
        let mut record = R::with_args(args, kwargs)?;
        record.parts_mut().bind(self.db.clone());
        Ok(record)
    }

    /// Stored instances matching `filter`, built as they are consumed.
    pub fn get(&self, filter: R::Filter) -> Result<Records<R>> {
        if !self.db.is_attached::<R>() {
            return Err(not_attached::<R>());
        }
        let rows = R::select(&self.db, &filter)?;
        Ok(Records::new(rows, self.db.clone()))
    }

    /// Every stored instance reachable through the default filter.
    pub fn all(&self) -> Result<Records<R>> {
        self.get(R::Filter::default())
    }
}

impl<R: Table> fmt::Debug for Bound<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bound<{}>({:#x})", self.name(), self.db.id())
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::db::ConnectOptions;
    use crate::record;

    record! {
        struct Broker: "id* name" {}
    }

    impl Table for Broker {
        type Filter = ();
    }

    record! {
        #[allow(non_camel_case_types)]
        struct session: "id*" {}
    }

    impl Table for session {
        type Filter = ();
    }

    fn connector() -> Connector {
        Connector::open_in_memory(ConnectOptions::default()).unwrap()
    }

    #[test]
    fn test_attach_twice_is_a_name_conflict() {
        let db = connector();
        db.attach(&[Entity::of::<Broker>()]).unwrap();

        let err = db.attach(&[Entity::of::<Broker>()]).unwrap_err();
        assert!(matches!(err, FundError::NameConflict(m) if m.contains("Broker")));
        assert!(db.is_attached::<Broker>());
        assert_eq!(db.attached(), ["Broker"]);
    }

    #[test]
    fn test_duplicates_in_one_call_attach_nothing() {
        let db = connector();
        let err = db.attach(&[Entity::of::<Broker>(), Entity::of::<Broker>()]);
        assert!(matches!(err, Err(FundError::NameConflict(_))));
        assert!(db.attached().is_empty());
    }

    #[test]
    fn test_reserved_names_are_rejected() {
        let db = connector();
        let err = db.attach(&[Entity::of::<Broker>(), Entity::of::<session>()]);
        assert!(matches!(err, Err(FundError::NameConflict(m)) if m.contains("session")));
        assert!(!db.is_attached::<Broker>());
        assert!(db.entity::<Broker>().is_err());
    }
}
