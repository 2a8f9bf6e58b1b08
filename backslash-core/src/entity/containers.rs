//! Capability traits shared by sessions and tests.
//!
//! Each trait is a set of default methods built on [`Entity`]; a type opts in
//! with an empty `impl`.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use super::{Comment, Entity, ErrorRecord, Session, Test, Warning};
use crate::{params::Params, query::LazyQuery, Result};

/// Seconds since the epoch, the way the server stores timestamps.
fn epoch_seconds(timestamp: DateTime<Utc>) -> f64 {
    timestamp.timestamp_micros() as f64 / 1_000_000.0
}

/// Identity parameters of an entity: `{<type>_id: id}`.
fn identity<E: Entity>(entity: &E) -> Result<Params> {
    Ok(Params::new().insert(entity.id_param(), entity.api_object().id()?.clone()))
}

#[async_trait::async_trait]
pub trait MetadataHolder: Entity {
    async fn set_metadata(&self, key: &str, value: Value) -> Result<()> {
        let object = self.api_object();
        let params = Params::new()
            .insert("entity_type", object.type_tag())
            .insert("entity_id", object.id()?.clone())
            .insert("key", key)
            .insert("value", value);
        object.client().call("set_metadata", params).await?;
        Ok(())
    }

    async fn set_metadata_dict(&self, metadata: Map<String, Value>) -> Result<()> {
        let object = self.api_object();
        let params = Params::new()
            .insert("entity_type", object.type_tag())
            .insert("entity_id", object.id()?.clone())
            .insert("metadata", metadata);
        object.client().call("set_metadata_dict", params).await?;
        Ok(())
    }

    async fn get_metadata(&self) -> Result<Value> {
        let object = self.api_object();
        let params = Params::new()
            .insert("entity_type", object.type_tag())
            .insert("entity_id", object.id()?.clone());
        Ok(object.client().call("get_metadata", params).await?.into_value())
    }
}

/// Error to record with [`ErrorContainer::add_error`].
#[derive(Debug, Clone, Default)]
pub struct NewError {
    pub message: String,
    pub exception_type: Option<String>,
    pub traceback: Option<Value>,
    pub timestamp: Option<DateTime<Utc>>,
    pub is_failure: Option<bool>,
    /// Dropped when the server does not record interruptions.
    pub is_interruption: Option<bool>,
    /// Dropped when the server does not record fatal errors.
    pub is_fatal: Option<bool>,
}

impl NewError {
    pub fn new(message: impl Into<String>) -> NewError {
        NewError {
            message: message.into(),
            ..Default::default()
        }
    }
}

#[async_trait::async_trait]
pub trait ErrorContainer: Entity {
    async fn add_error(&self, error: NewError) -> Result<ErrorRecord> {
        let client = self.api_object().client();
        let features = client.features().await?;

        let mut params = identity(self)?
            .insert("message", error.message)
            .insert_opt("exception_type", error.exception_type)
            .insert_opt("traceback", error.traceback)
            .insert_opt("timestamp", error.timestamp.map(epoch_seconds))
            .insert_opt("is_failure", error.is_failure);
        if features.error_interruptions {
            params = params.insert_opt("is_interruption", error.is_interruption);
        }
        if features.error_fatal_flag {
            params = params.insert_opt("is_fatal", error.is_fatal);
        }

        client.call("add_error", params).await?.into_entity()
    }

    fn query_errors(&self) -> Result<LazyQuery> {
        let object = self.api_object();
        Ok(object
            .client()
            .query("/rest/errors")?
            .with_param(&self.id_param(), object.id_string()?))
    }
}

/// Warning to record with [`WarningContainer::add_warning`].
#[derive(Debug, Clone, Default)]
pub struct NewWarning {
    pub message: String,
    pub filename: Option<String>,
    pub lineno: Option<u32>,
    pub timestamp: Option<DateTime<Utc>>,
}

impl NewWarning {
    pub fn new(message: impl Into<String>) -> NewWarning {
        NewWarning {
            message: message.into(),
            ..Default::default()
        }
    }
}

#[async_trait::async_trait]
pub trait WarningContainer: Entity {
    async fn add_warning(&self, warning: NewWarning) -> Result<Warning> {
        let params = identity(self)?
            .insert("message", warning.message)
            .insert_opt("filename", warning.filename)
            .insert_opt("lineno", warning.lineno)
            .insert_opt("timestamp", warning.timestamp.map(epoch_seconds));
        self.api_object()
            .client()
            .call("add_warning", params)
            .await?
            .into_entity()
    }

    fn query_warnings(&self) -> Result<LazyQuery> {
        let object = self.api_object();
        Ok(object
            .client()
            .query("/rest/warnings")?
            .with_param(&self.id_param(), object.id_string()?))
    }
}

#[async_trait::async_trait]
pub trait Commentable: Entity {
    async fn post_comment(&self, comment: &str) -> Result<Comment> {
        let params = identity(self)?.insert("comment", comment);
        self.api_object()
            .client()
            .call("post_comment", params)
            .await?
            .into_entity()
    }

    fn get_comments(&self) -> Result<LazyQuery> {
        let object = self.api_object();
        Ok(object
            .client()
            .query("/rest/comments")?
            .with_param(&self.id_param(), object.id_string()?))
    }
}

#[async_trait::async_trait]
pub trait RelatedEntityContainer: Entity {
    async fn add_related_entity(&self, entity_type: &str, name: &str) -> Result<()> {
        let params = identity(self)?
            .insert("type", entity_type)
            .insert("name", name);
        self.api_object()
            .client()
            .call("add_related_entity", params)
            .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
pub trait TimingContainer: Entity {
    /// Parameters identifying the timed entity.
    fn timing_identity(&self) -> Result<Params> {
        identity(self)
    }

    async fn report_timing_start(&self, name: &str) -> Result<()> {
        let params = self.timing_identity()?.insert("name", name);
        self.api_object()
            .client()
            .call("report_timing_start", params)
            .await?;
        Ok(())
    }

    async fn report_timing_end(&self, name: &str) -> Result<()> {
        let params = self.timing_identity()?.insert("name", name);
        self.api_object()
            .client()
            .call("report_timing_end", params)
            .await?;
        Ok(())
    }

    async fn get_timings(&self) -> Result<Value> {
        let params = self.timing_identity()?;
        Ok(self
            .api_object()
            .client()
            .call("get_timings", params)
            .await?
            .into_value())
    }
}

impl MetadataHolder for Session {}
impl ErrorContainer for Session {}
impl WarningContainer for Session {}
impl Commentable for Session {}
impl RelatedEntityContainer for Session {}
impl TimingContainer for Session {}

impl MetadataHolder for Test {}
impl ErrorContainer for Test {}
impl WarningContainer for Test {}
impl Commentable for Test {}
impl RelatedEntityContainer for Test {}

impl TimingContainer for Test {
    /// Tests are timed within their session.
    fn timing_identity(&self) -> Result<Params> {
        Ok(identity(self)?.insert("session_id", self.get("session_id")?.clone()))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{capabilities::ServerFeatures, entity::test_util, Error};
    use chrono::TimeZone;
    use mockito::Matcher;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[tokio::test]
    async fn set_metadata() -> eyre::Result<()> {
        let mut server = mockito::Server::new_async().await;
        let m = server
            .mock("POST", "/api/set_metadata")
            .match_body(Matcher::Json(json!({
                "entity_type": "session",
                "entity_id": 1,
                "key": "build",
                "value": {"number": 7}
            })))
            .with_body(r#"{"result": null}"#)
            .expect(1)
            .create_async()
            .await;

        let client = test_util::client(server.url(), ServerFeatures::all());
        let session: Session = test_util::entity(&client, json!({"type": "session", "id": 1}));
        session.set_metadata("build", json!({"number": 7})).await?;

        m.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn get_metadata() -> eyre::Result<()> {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/api/get_metadata")
            .match_body(Matcher::Json(json!({"entity_type": "test", "entity_id": 3})))
            .with_body(r#"{"result": {"a": 1}}"#)
            .create_async()
            .await;

        let client = test_util::client(server.url(), ServerFeatures::all());
        let test: Test = test_util::entity(&client, json!({"type": "test", "id": 3}));
        assert_eq!(test.get_metadata().await?, json!({"a": 1}));
        Ok(())
    }

    #[tokio::test]
    async fn add_error_with_all_flags() -> eyre::Result<()> {
        let mut server = mockito::Server::new_async().await;
        let m = server
            .mock("POST", "/api/add_error")
            .match_body(Matcher::Json(json!({
                "test_id": 3,
                "message": "boom",
                "exception_type": "ValueError",
                "timestamp": 1700000000.5,
                "is_interruption": false,
                "is_fatal": true
            })))
            .with_body(r#"{"result": {"type": "error", "id": 11}}"#)
            .expect(1)
            .create_async()
            .await;

        let client = test_util::client(server.url(), ServerFeatures::all());
        let test: Test = test_util::entity(&client, json!({"type": "test", "id": 3}));
        let error = test
            .add_error(NewError {
                exception_type: Some("ValueError".into()),
                timestamp: Some(Utc.timestamp_opt(1_700_000_000, 500_000_000).unwrap()),
                is_interruption: Some(false),
                is_fatal: Some(true),
                ..NewError::new("boom")
            })
            .await?;

        m.assert_async().await;
        assert_eq!(error.id()?, &json!(11));
        Ok(())
    }

    #[tokio::test]
    async fn add_error_drops_unsupported_flags() -> eyre::Result<()> {
        let mut server = mockito::Server::new_async().await;
        let m = server
            .mock("POST", "/api/add_error")
            .match_body(Matcher::Json(json!({"session_id": 1, "message": "boom"})))
            .with_body(r#"{"result": {"type": "error", "id": 12}}"#)
            .expect(1)
            .create_async()
            .await;

        let client = test_util::client(server.url(), ServerFeatures::default());
        let session: Session = test_util::entity(&client, json!({"type": "session", "id": 1}));
        session
            .add_error(NewError {
                is_interruption: Some(true),
                is_fatal: Some(true),
                ..NewError::new("boom")
            })
            .await?;

        m.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn add_warning() -> eyre::Result<()> {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/api/add_warning")
            .match_body(Matcher::Json(json!({
                "session_id": 1,
                "message": "deprecated",
                "filename": "a.py",
                "lineno": 4
            })))
            .with_body(r#"{"result": {"type": "warning", "id": 2}}"#)
            .create_async()
            .await;

        let client = test_util::client(server.url(), ServerFeatures::all());
        let session: Session = test_util::entity(&client, json!({"type": "session", "id": 1}));
        let warning = session
            .add_warning(NewWarning {
                filename: Some("a.py".into()),
                lineno: Some(4),
                ..NewWarning::new("deprecated")
            })
            .await?;
        assert_eq!(warning.type_tag(), "warning");
        Ok(())
    }

    #[tokio::test]
    async fn post_comment_uses_type_id() -> eyre::Result<()> {
        let mut server = mockito::Server::new_async().await;
        let m = server
            .mock("POST", "/api/post_comment")
            .match_body(Matcher::Json(json!({"test_id": 3, "comment": "flaky"})))
            .with_body(r#"{"result": {"type": "comment", "id": 5, "comment": "flaky"}}"#)
            .expect(1)
            .create_async()
            .await;

        let client = test_util::client(server.url(), ServerFeatures::all());
        let test: Test = test_util::entity(&client, json!({"type": "test", "id": 3}));
        let comment = test.post_comment("flaky").await?;

        m.assert_async().await;
        assert_eq!(comment.get("comment")?, &json!("flaky"));
        Ok(())
    }

    #[test]
    fn collection_queries() -> eyre::Result<()> {
        let client = test_util::client("http://127.0.0.1:12345".into(), ServerFeatures::all());
        let session: Session = test_util::entity(&client, json!({"type": "session", "id": 1}));
        let test: Test = test_util::entity(&client, json!({"type": "test", "id": "t-3"}));

        assert_eq!(
            session.query_errors()?.url().as_str(),
            "http://127.0.0.1:12345/rest/errors?session_id=1"
        );
        assert_eq!(
            test.query_warnings()?.url().as_str(),
            "http://127.0.0.1:12345/rest/warnings?test_id=t-3"
        );
        assert_eq!(
            test.get_comments()?.url().as_str(),
            "http://127.0.0.1:12345/rest/comments?test_id=t-3"
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_timing_includes_session() -> eyre::Result<()> {
        let mut server = mockito::Server::new_async().await;
        let m = server
            .mock("POST", "/api/report_timing_start")
            .match_body(Matcher::Json(json!({"test_id": 3, "session_id": 1, "name": "setup"})))
            .with_body(r#"{"result": null}"#)
            .expect(1)
            .create_async()
            .await;

        let client = test_util::client(server.url(), ServerFeatures::all());
        let test: Test = test_util::entity(&client, json!({"type": "test", "id": 3, "session_id": 1}));
        test.report_timing_start("setup").await?;

        m.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_timing_without_session_field() {
        let client = test_util::client("http://127.0.0.1:12345".into(), ServerFeatures::all());
        let test: Test = test_util::entity(&client, json!({"type": "test", "id": 3}));
        let err = test.report_timing_end("setup").await.unwrap_err();
        assert!(matches!(err, Error::FieldNotFound(f) if f == "session_id"));
    }

    #[tokio::test]
    async fn related_entity() -> eyre::Result<()> {
        let mut server = mockito::Server::new_async().await;
        let m = server
            .mock("POST", "/api/add_related_entity")
            .match_body(Matcher::Json(json!({"session_id": 1, "type": "router", "name": "r1"})))
            .with_body(r#"{"result": null}"#)
            .expect(1)
            .create_async()
            .await;

        let client = test_util::client(server.url(), ServerFeatures::all());
        let session: Session = test_util::entity(&client, json!({"type": "session", "id": 1}));
        session.add_related_entity("router", "r1").await?;

        m.assert_async().await;
        Ok(())
    }
}
