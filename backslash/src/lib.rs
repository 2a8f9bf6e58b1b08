//! # Backslash
//!
//! Async client for the Backslash test-reporting service.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use backslash::{Backslash, SessionStart, TestStart};
//!
//! #[tokio::main]
//! async fn main() -> backslash::Result<()> {
//!     let backslash = Backslash::new("https://backslash.example.com", Some("run-token".into()))?;
//!
//!     let session = backslash
//!         .report_session_start(SessionStart {
//!             hostname: Some("ci-01".into()),
//!             ..Default::default()
//!         })
//!         .await?;
//!     let test = session.report_test_start(TestStart::new("test_login")).await?;
//!     test.report_end(Some(0.8)).await?;
//!     session.report_end(Default::default()).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Queries
//!
//! Collections are exposed as lazy queries that fetch one page at a time:
//!
//! ```rust,no_run
//! use backslash::{field, Backslash};
//!
//! # async fn run(backslash: Backslash) -> backslash::Result<()> {
//! let mut failed = backslash
//!     .query_sessions()?
//!     .filter(field("num_failed_tests").gt(0));
//! let mut sessions = failed.iter();
//! while let Some(session) = sessions.next().await {
//!     println!("{:?}", session?.field("logical_id"));
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration
//!
//! [`Backslash::from_config`] accepts a [`Config`], usually loaded with
//! [`get_config`] from `backslash.toml` and `BACKSLASH_*` environment
//! variables.

mod client;
mod keepalive;

pub use client::{Backslash, SessionStart};
pub use keepalive::KeepAlive;

// Re-export core functionality
pub use backslash_core::{
    capabilities::{Capabilities, ServerFeatures},
    config::{get_config, Config, PayloadConfig, RetryConfig},
    entity::{
        Comment, Commentable, Entity, ErrorContainer, ErrorRecord, MetadataHolder, NewError,
        NewWarning, RelatedEntityContainer, Session, SessionEnd, Suite, Test, TestStart,
        TimingContainer, User, Warning, WarningContainer,
    },
    filter::{field, FieldFilter, Filter},
    masking, Client, ClientBuilder, Error, LazyQuery, Materialized, Object, ObjectKind, Param,
    Params, Result, TypeRegistry,
};
