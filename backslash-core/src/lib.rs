//! # Backslash Core
//!
//! Transport, object materialization and lazy queries for the Backslash
//! test-reporting service.
//!
//! This crate provides:
//! - An HTTP transport with retries, gzip compression of large payloads and
//!   payload size limits
//! - A type-tag registry turning JSON responses into typed objects
//! - Lazy paginated queries over server-side collections
//! - Configuration and capability probing
//!
//! ## Architecture (block diagram)
//!
//! ```text
//! +---------------------+      +---------------------+      +---------------------+
//! | Client (shared)     | ---> | Transport           | ---> | Backslash server    |
//! | call / get / query  |      | retry + gzip + size |      | /api, /rest         |
//! +---------------------+      +---------------------+      +---------------------+
//!            |                         ^    |
//!            v                         |    v
//! +---------------------+              |  +---------------------+
//! | LazyQuery           | --get page---+  | Capabilities        |
//! | page cache + filter |                 | OPTIONS /api, once  |
//! +---------------------+                 +---------------------+
//!            |
//!            v
//! +---------------------+      +---------------------+
//! | TypeRegistry        | ---> | Session, Test, ...  |
//! | type tag -> ctor    |      | capability traits   |
//! +---------------------+      +---------------------+
//! ```
//!
//! Most users should use the main `backslash` crate rather than importing
//! `backslash-core` directly.

pub mod capabilities;
pub mod client;
pub mod config;
pub mod entity;
pub mod error;
pub mod filter;
pub mod http;
pub mod masking;
pub mod object;
pub mod params;
pub mod query;
pub mod registry;
pub mod retry;

pub use capabilities::{Capabilities, ServerFeatures};
pub use client::{Client, ClientBuilder};
pub use config::{get_config, Config, PayloadConfig, RetryConfig};
pub use entity::{
    Comment, Commentable, Entity, ErrorContainer, ErrorRecord, MetadataHolder, NewError,
    NewWarning, RelatedEntityContainer, Session, SessionEnd, Suite, Test, TestStart,
    TimingContainer, User, Warning, WarningContainer,
};
pub use error::{Error, Result};
pub use filter::{field, FieldFilter, Filter};
pub use object::ApiObject;
pub use params::{Param, Params};
pub use query::LazyQuery;
pub use registry::{Materialized, Object, ObjectKind, TypeRegistry};
