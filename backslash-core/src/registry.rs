//! Type-tag registry and response materialization.
//!
//! Decoded JSON objects carrying a `type` field are turned into typed
//! wrappers bound to the client they came from. Tags the registry does not
//! know are handed back as plain JSON, so newer servers keep working.

use serde_json::{Map, Value};
use std::collections::HashMap;
use strum::IntoEnumIterator;

use crate::{
    client::Client,
    entity::{Comment, Entity, ErrorRecord, Session, Suite, Test, User, Warning},
    object::ApiObject,
    Error, Result,
};

/// Builds a typed object from its owning client and its data.
pub type Constructor = fn(Client, Map<String, Value>) -> Object;

/// Object types known to the client.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[strum(serialize_all = "snake_case")]
pub enum ObjectKind {
    Session,
    Test,
    Error,
    Warning,
    Comment,
    Suite,
    User,
}

impl ObjectKind {
    pub fn constructor(self) -> Constructor {
        match self {
            ObjectKind::Session => |c, d| Object::Session(Session::new(c, d)),
            ObjectKind::Test => |c, d| Object::Test(Test::new(c, d)),
            ObjectKind::Error => |c, d| Object::Error(ErrorRecord::new(c, d)),
            ObjectKind::Warning => |c, d| Object::Warning(Warning::new(c, d)),
            ObjectKind::Comment => |c, d| Object::Comment(Comment::new(c, d)),
            ObjectKind::Suite => |c, d| Object::Suite(Suite::new(c, d)),
            ObjectKind::User => |c, d| Object::User(User::new(c, d)),
        }
    }
}

/// Immutable mapping from type tag to constructor.
#[derive(Clone)]
pub struct TypeRegistry {
    constructors: HashMap<String, Constructor>,
}

impl Default for TypeRegistry {
    /// Registry of every [`ObjectKind`].
    fn default() -> Self {
        ObjectKind::iter().fold(TypeRegistry::empty(), |registry, kind| {
            registry.with(kind.as_ref(), kind.constructor())
        })
    }
}

impl std::fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.constructors.keys()).finish()
    }
}

impl TypeRegistry {
    pub fn empty() -> TypeRegistry {
        TypeRegistry {
            constructors: HashMap::new(),
        }
    }

    pub fn with(mut self, tag: impl Into<String>, constructor: Constructor) -> TypeRegistry {
        self.constructors.insert(tag.into(), constructor);
        self
    }

    pub fn get(&self, tag: &str) -> Option<Constructor> {
        self.constructors.get(tag).copied()
    }

    /// Turns a decoded value into a typed object where possible. Never does I/O.
    pub fn materialize(&self, client: &Client, value: Value) -> Materialized {
        match value {
            Value::Null => Materialized::Null,
            Value::Object(map) => {
                let constructor = map
                    .get("type")
                    .and_then(Value::as_str)
                    .and_then(|tag| self.get(tag));
                match constructor {
                    Some(constructor) => Materialized::Object(constructor(client.clone(), map)),
                    None => Materialized::Value(Value::Object(map)),
                }
            }
            other => Materialized::Value(other),
        }
    }
}

/// A typed object of one of the registered kinds.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    Session(Session),
    Test(Test),
    Error(ErrorRecord),
    Warning(Warning),
    Comment(Comment),
    Suite(Suite),
    User(User),
}

impl Object {
    pub fn api_object(&self) -> &ApiObject {
        match self {
            Object::Session(o) => o.api_object(),
            Object::Test(o) => o.api_object(),
            Object::Error(o) => o.api_object(),
            Object::Warning(o) => o.api_object(),
            Object::Comment(o) => o.api_object(),
            Object::Suite(o) => o.api_object(),
            Object::User(o) => o.api_object(),
        }
    }

    pub fn kind(&self) -> ObjectKind {
        match self {
            Object::Session(_) => ObjectKind::Session,
            Object::Test(_) => ObjectKind::Test,
            Object::Error(_) => ObjectKind::Error,
            Object::Warning(_) => ObjectKind::Warning,
            Object::Comment(_) => ObjectKind::Comment,
            Object::Suite(_) => ObjectKind::Suite,
            Object::User(_) => ObjectKind::User,
        }
    }

    /// Converts into the concrete wrapper `T`.
    pub fn into_entity<T: Entity>(self) -> Result<T> {
        let kind = self.kind();
        T::from_object(self).ok_or_else(|| {
            Error::UnexpectedResponse(format!("expected a {} object, got a {kind}", T::KIND))
        })
    }
}

impl std::ops::Deref for Object {
    type Target = ApiObject;

    fn deref(&self) -> &ApiObject {
        self.api_object()
    }
}

/// Outcome of decoding a response.
#[derive(Debug, Clone, PartialEq)]
pub enum Materialized {
    Null,
    Object(Object),
    /// Anything that is not a registered typed object.
    Value(Value),
}

impl Materialized {
    pub fn is_null(&self) -> bool {
        matches!(self, Materialized::Null)
    }

    pub fn into_object(self) -> Result<Object> {
        match self {
            Materialized::Object(object) => Ok(object),
            other => Err(Error::UnexpectedResponse(format!(
                "expected a typed object, got {}",
                other.into_value()
            ))),
        }
    }

    pub fn into_entity<T: Entity>(self) -> Result<T> {
        self.into_object()?.into_entity()
    }

    /// JSON form; typed objects give back their data.
    pub fn into_value(self) -> Value {
        match self {
            Materialized::Null => Value::Null,
            Materialized::Object(object) => Value::Object(object.api_object().data().clone()),
            Materialized::Value(value) => value,
        }
    }

    /// Field of a typed object or of a plain JSON mapping.
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Materialized::Object(object) => object.data().get(name),
            Materialized::Value(value) => value.get(name),
            Materialized::Null => None,
        }
    }
}
