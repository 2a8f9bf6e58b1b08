//! Typed wrappers over [`ApiObject`].
//!
//! Every wrapper derefs to its [`ApiObject`] for field access. Behaviour
//! shared by several types lives in the capability traits of
//! [`containers`], implemented per type.

pub mod containers;
mod session;

pub use containers::{
    Commentable, ErrorContainer, MetadataHolder, NewError, NewWarning, RelatedEntityContainer,
    TimingContainer, WarningContainer,
};
pub use session::{SessionEnd, TestStart};

use serde_json::{Map, Value};

use crate::{
    client::Client,
    object::ApiObject,
    registry::{Object, ObjectKind},
};

/// A typed wrapper of one [`ObjectKind`].
pub trait Entity: Clone + Send + Sync + 'static {
    const KIND: ObjectKind;

    fn api_object(&self) -> &ApiObject;

    fn from_object(object: Object) -> Option<Self>;

    /// Name under which the object's id is passed to API functions.
    fn id_param(&self) -> String {
        format!("{}_id", Self::KIND)
    }
}

macro_rules! entity {
    ($(#[$meta:meta])* $name:ident => $kind:ident) => {
        $(#[$meta])*
        #[derive(Clone, PartialEq)]
        pub struct $name(ApiObject);

        impl $name {
            pub fn new(client: Client, data: Map<String, Value>) -> $name {
                $name(ApiObject::new(client, data))
            }

            /// Copy without the given fields; the receiver is untouched.
            pub fn without_fields(&self, fields: &[&str]) -> $name {
                $name(self.0.without_fields(fields))
            }
        }

        impl Entity for $name {
            const KIND: ObjectKind = ObjectKind::$kind;

            fn api_object(&self) -> &ApiObject {
                &self.0
            }

            fn from_object(object: Object) -> Option<$name> {
                match object {
                    Object::$kind(inner) => Some(inner),
                    _ => None,
                }
            }
        }

        impl std::ops::Deref for $name {
            type Target = ApiObject;

            fn deref(&self) -> &ApiObject {
                &self.0
            }
        }

        impl std::ops::DerefMut for $name {
            fn deref_mut(&mut self) -> &mut ApiObject {
                &mut self.0
            }
        }

        impl std::fmt::Debug for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                std::fmt::Debug::fmt(&self.0, f)
            }
        }

        impl From<$name> for Object {
            fn from(entity: $name) -> Object {
                Object::$kind(entity)
            }
        }
    };
}

entity!(
    /// A test session.
    Session => Session
);
entity!(
    /// A single test within a session.
    Test => Test
);
entity!(
    /// An error recorded on a session or a test.
    ErrorRecord => Error
);
entity!(Warning => Warning);
entity!(Comment => Comment);
entity!(Suite => Suite);
entity!(User => User);
