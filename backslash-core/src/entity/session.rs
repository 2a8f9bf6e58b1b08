use serde_json::{Map, Value};
use tracing::*;

use super::{MetadataHolder, Session, Test};
use crate::{params::Params, query::LazyQuery, Error, Result};

/// Arguments of [`Session::report_end`].
#[derive(Debug, Clone, Default)]
pub struct SessionEnd {
    pub duration: Option<f64>,
    /// Dropped when the server does not track fatal errors per session.
    pub has_fatal_errors: Option<bool>,
}

/// Arguments of [`Session::report_test_start`].
#[derive(Debug, Clone, Default)]
pub struct TestStart {
    pub name: String,
    pub file_name: Option<String>,
    pub class_name: Option<String>,
    pub test_logical_id: Option<String>,
    pub test_index: Option<u64>,
    pub scm: Option<String>,
    pub file_hash: Option<String>,
    pub scm_revision: Option<String>,
    pub scm_dirty: Option<bool>,
    pub scm_local_branch: Option<String>,
    pub scm_remote_branch: Option<String>,
    pub is_interactive: Option<bool>,
    pub variation: Option<Value>,
    pub parameters: Option<Value>,
    pub metadata: Option<Map<String, Value>>,
}

impl TestStart {
    pub fn new(name: impl Into<String>) -> TestStart {
        TestStart {
            name: name.into(),
            ..Default::default()
        }
    }
}

impl Session {
    pub fn ui_url(&self) -> Result<String> {
        Ok(self
            .client()
            .ui_url(&format!("sessions/{}", self.display_id()?)))
    }

    async fn call_with_id(&self, function: &str, params: Params) -> Result<()> {
        let params = params.insert("id", self.id()?.clone());
        self.client().call(function, params).await?;
        Ok(())
    }

    async fn call_with_session_id(&self, function: &str, params: Params) -> Result<()> {
        let params = params.insert("session_id", self.id()?.clone());
        self.client().call(function, params).await?;
        Ok(())
    }

    pub async fn report_end(&self, end: SessionEnd) -> Result<()> {
        let mut params = Params::new().insert_opt("duration", end.duration);
        if self.client().features().await?.session_fatal_errors {
            params = params.insert_opt("has_fatal_errors", end.has_fatal_errors);
        }
        self.call_with_id("report_session_end", params).await
    }

    pub async fn report_interrupted(&self) -> Result<()> {
        self.call_with_id("report_session_interrupted", Params::new())
            .await
    }

    pub async fn send_keepalive(&self) -> Result<()> {
        self.call_with_session_id("send_keepalive", Params::new())
            .await
    }

    /// Reports a test starting within this session.
    ///
    /// Metadata goes inline when the server accepts it and is attached to
    /// the created test afterwards otherwise.
    pub async fn report_test_start(&self, start: TestStart) -> Result<Test> {
        let features = self.client().features().await?;

        let mut params = Params::new()
            .insert("session_id", self.id()?.clone())
            .insert("name", start.name)
            .insert_opt("file_name", start.file_name)
            .insert_opt("class_name", start.class_name)
            .insert_opt("test_logical_id", start.test_logical_id)
            .insert_opt("test_index", start.test_index)
            .insert_opt("scm", start.scm)
            .insert_opt("file_hash", start.file_hash)
            .insert_opt("scm_revision", start.scm_revision)
            .insert_opt("scm_dirty", start.scm_dirty)
            .insert_opt("is_interactive", start.is_interactive)
            .insert_opt("variation", start.variation)
            .insert_opt("parameters", start.parameters);
        if features.scm_branches {
            params = params
                .insert_opt("scm_local_branch", start.scm_local_branch)
                .insert_opt("scm_remote_branch", start.scm_remote_branch);
        }

        let mut deferred_metadata = None;
        match start.metadata {
            Some(metadata) if features.inline_test_metadata => {
                params = params.insert("metadata", metadata);
            }
            other => deferred_metadata = other,
        }

        let test: Test = self
            .client()
            .call("report_test_start", params)
            .await?
            .into_entity()?;

        if let Some(metadata) = deferred_metadata {
            debug!("server does not accept inline test metadata, setting it on {test:?}");
            test.set_metadata_dict(metadata).await?;
        }
        Ok(test)
    }

    /// Claims a test that was distributed to this session by a parallel run.
    ///
    /// Fails with [`Error::Unsupported`] when the server does not expose the
    /// endpoint.
    pub async fn report_test_distributed(&self, test_logical_id: &str) -> Result<Test> {
        if !self.client().features().await?.test_distribution {
            return Err(Error::Unsupported("report_test_distributed"));
        }
        let params = Params::new()
            .insert("session_id", self.id()?.clone())
            .insert("test_logical_id", test_logical_id);
        self.client()
            .call("report_test_distributed", params)
            .await?
            .into_entity()
    }

    /// Announces tests that are about to run.
    pub async fn report_upcoming_tests(&self, tests: Vec<Value>) -> Result<()> {
        if !self.client().features().await?.upcoming_tests {
            debug!("server does not accept upcoming tests, skipping");
            return Ok(());
        }
        let params = Params::new().insert("tests", tests);
        self.call_with_session_id("append_upcoming_tests", params)
            .await
    }

    pub async fn report_in_pdb(&self) -> Result<()> {
        self.call_with_session_id("report_in_pdb", Params::new())
            .await
    }

    pub async fn report_not_in_pdb(&self) -> Result<()> {
        self.call_with_session_id("report_not_in_pdb", Params::new())
            .await
    }

    pub async fn add_subject(
        &self,
        name: &str,
        product: Option<&str>,
        version: Option<&str>,
        revision: Option<&str>,
    ) -> Result<()> {
        let params = Params::new()
            .insert("name", name)
            .insert_opt("product", product)
            .insert_opt("version", version)
            .insert_opt("revision", revision);
        self.call_with_session_id("add_subject", params).await
    }

    pub async fn add_label(&self, label: &str) -> Result<()> {
        self.call_with_session_id("add_label", Params::new().insert("label", label))
            .await
    }

    pub async fn edit_status(&self, status: &str) -> Result<()> {
        self.call_with_id("edit_session_status", Params::new().insert("status", status))
            .await
    }

    pub async fn toggle_investigated(&self) -> Result<Value> {
        let params = Params::new().insert("session_id", self.id()?.clone());
        Ok(self
            .client()
            .call("toggle_investigated", params)
            .await?
            .into_value())
    }

    /// Tests of this session.
    pub fn query_tests(&self) -> Result<LazyQuery> {
        self.client()
            .query(&format!("/rest/sessions/{}/tests", self.id_string()?))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{capabilities::ServerFeatures, entity::test_util};
    use mockito::Matcher;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn session(client: &crate::client::Client) -> Session {
        test_util::entity(client, json!({"type": "session", "id": 1, "logical_id": "s_1"}))
    }

    #[test]
    fn ui_url_prefers_logical_id() -> eyre::Result<()> {
        let client = test_util::client("http://bs.example.com".into(), ServerFeatures::all());
        assert_eq!(
            session(&client).ui_url()?,
            "http://bs.example.com/#/sessions/s_1"
        );
        let plain: Session = test_util::entity(&client, json!({"type": "session", "id": 8}));
        assert_eq!(plain.ui_url()?, "http://bs.example.com/#/sessions/8");
        Ok(())
    }

    #[tokio::test]
    async fn report_end_gated() -> eyre::Result<()> {
        let mut server = mockito::Server::new_async().await;
        let old = server
            .mock("POST", "/api/report_session_end")
            .match_body(Matcher::Json(json!({"id": 1, "duration": 2.5})))
            .with_body(r#"{"result": null}"#)
            .expect(1)
            .create_async()
            .await;

        let client = test_util::client(server.url(), ServerFeatures::default());
        session(&client)
            .report_end(SessionEnd {
                duration: Some(2.5),
                has_fatal_errors: Some(true),
            })
            .await?;
        old.assert_async().await;

        let current = server
            .mock("POST", "/api/report_session_end")
            .match_body(Matcher::Json(json!({"id": 1, "has_fatal_errors": true})))
            .with_body(r#"{"result": null}"#)
            .expect(1)
            .create_async()
            .await;
        let client = test_util::client(server.url(), ServerFeatures::all());
        session(&client)
            .report_end(SessionEnd {
                duration: None,
                has_fatal_errors: Some(true),
            })
            .await?;
        current.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn report_test_start_inline_metadata() -> eyre::Result<()> {
        let mut server = mockito::Server::new_async().await;
        let m = server
            .mock("POST", "/api/report_test_start")
            .match_body(Matcher::Json(json!({
                "session_id": 1,
                "name": "test_login",
                "test_logical_id": "t_1",
                "scm_local_branch": "main",
                "metadata": {"k": "v"}
            })))
            .with_body(r#"{"result": {"type": "test", "id": 30, "session_id": 1}}"#)
            .expect(1)
            .create_async()
            .await;
        let dict = server
            .mock("POST", "/api/set_metadata_dict")
            .expect(0)
            .create_async()
            .await;

        let client = test_util::client(server.url(), ServerFeatures::all());
        let mut metadata = Map::new();
        metadata.insert("k".into(), json!("v"));
        let test = session(&client)
            .report_test_start(TestStart {
                test_logical_id: Some("t_1".into()),
                scm_local_branch: Some("main".into()),
                metadata: Some(metadata),
                ..TestStart::new("test_login")
            })
            .await?;

        m.assert_async().await;
        dict.assert_async().await;
        assert_eq!(test.id()?, &json!(30));
        Ok(())
    }

    #[tokio::test]
    async fn report_test_start_deferred_metadata() -> eyre::Result<()> {
        let mut server = mockito::Server::new_async().await;
        let start = server
            .mock("POST", "/api/report_test_start")
            .match_body(Matcher::Json(json!({"session_id": 1, "name": "test_login"})))
            .with_body(r#"{"result": {"type": "test", "id": 30}}"#)
            .expect(1)
            .create_async()
            .await;
        let dict = server
            .mock("POST", "/api/set_metadata_dict")
            .match_body(Matcher::Json(json!({
                "entity_type": "test",
                "entity_id": 30,
                "metadata": {"k": "v"}
            })))
            .with_body(r#"{"result": null}"#)
            .expect(1)
            .create_async()
            .await;

        let client = test_util::client(server.url(), ServerFeatures::default());
        let mut metadata = Map::new();
        metadata.insert("k".into(), json!("v"));
        session(&client)
            .report_test_start(TestStart {
                scm_local_branch: Some("main".into()),
                metadata: Some(metadata),
                ..TestStart::new("test_login")
            })
            .await?;

        start.assert_async().await;
        dict.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn upcoming_tests_skipped_when_unsupported() -> eyre::Result<()> {
        let mut server = mockito::Server::new_async().await;
        let m = server
            .mock("POST", "/api/append_upcoming_tests")
            .expect(0)
            .create_async()
            .await;

        let client = test_util::client(server.url(), ServerFeatures::default());
        session(&client)
            .report_upcoming_tests(vec![json!({"test_logical_id": "t_1"})])
            .await?;
        m.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn test_distributed_gated() -> eyre::Result<()> {
        let mut server = mockito::Server::new_async().await;
        let skipped = server
            .mock("POST", "/api/report_test_distributed")
            .expect(0)
            .create_async()
            .await;

        let client = test_util::client(server.url(), ServerFeatures::default());
        let err = session(&client)
            .report_test_distributed("t_1")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Unsupported("report_test_distributed")));
        skipped.assert_async().await;

        let mut server = mockito::Server::new_async().await;
        let m = server
            .mock("POST", "/api/report_test_distributed")
            .match_body(Matcher::Json(json!({"session_id": 1, "test_logical_id": "t_1"})))
            .with_body(r#"{"result": {"type": "test", "id": 31, "logical_id": "t_1"}}"#)
            .expect(1)
            .create_async()
            .await;
        let client = test_util::client(server.url(), ServerFeatures::all());
        let test = session(&client).report_test_distributed("t_1").await?;
        m.assert_async().await;
        assert_eq!(test.id()?, &json!(31));
        Ok(())
    }

    #[tokio::test]
    async fn session_id_calls() -> eyre::Result<()> {
        let mut server = mockito::Server::new_async().await;
        let keepalive = server
            .mock("POST", "/api/send_keepalive")
            .match_body(Matcher::Json(json!({"session_id": 1})))
            .with_body(r#"{"result": null}"#)
            .expect(1)
            .create_async()
            .await;
        let label = server
            .mock("POST", "/api/add_label")
            .match_body(Matcher::Json(json!({"session_id": 1, "label": "nightly"})))
            .with_body(r#"{"result": null}"#)
            .expect(1)
            .create_async()
            .await;
        let subject = server
            .mock("POST", "/api/add_subject")
            .match_body(Matcher::Json(json!({"session_id": 1, "name": "microwave", "version": "1.2"})))
            .with_body(r#"{"result": null}"#)
            .expect(1)
            .create_async()
            .await;

        let client = test_util::client(server.url(), ServerFeatures::all());
        let session = session(&client);
        session.send_keepalive().await?;
        session.add_label("nightly").await?;
        session
            .add_subject("microwave", None, Some("1.2"), None)
            .await?;

        keepalive.assert_async().await;
        label.assert_async().await;
        subject.assert_async().await;
        Ok(())
    }

    #[test]
    fn query_tests_path() -> eyre::Result<()> {
        let client = test_util::client("http://127.0.0.1:12345".into(), ServerFeatures::all());
        assert_eq!(
            session(&client).query_tests()?.url().as_str(),
            "http://127.0.0.1:12345/rest/sessions/1/tests"
        );
        Ok(())
    }
}
