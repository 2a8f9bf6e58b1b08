use backslash_core::{Client, Config, LazyQuery, Params, Result, Session};
use serde_json::{Map, Value};
use std::fmt::Display;
use tracing::*;

/// Arguments of [`Backslash::report_session_start`].
#[derive(Debug, Clone, Default)]
pub struct SessionStart {
    pub logical_id: Option<String>,
    /// Dropped when the server does not support nested sessions.
    pub parent_logical_id: Option<String>,
    pub hostname: Option<String>,
    pub total_num_tests: Option<u64>,
    pub user_email: Option<String>,
    pub metadata: Option<Map<String, Value>>,
    /// Seconds the server waits for a keepalive before marking the session
    /// as interrupted.
    pub keepalive_interval: Option<u64>,
    pub subjects: Option<Vec<Value>>,
    pub infrastructure: Option<String>,
}

/// Entry point of the Backslash client.
///
/// Derefs to [`Client`] for the lower-level calls.
#[derive(Debug, Clone)]
pub struct Backslash {
    client: Client,
}

impl Backslash {
    /// Connects to `url`; `http://` is assumed when no scheme is given.
    pub fn new(url: impl Into<String>, run_token: Option<String>) -> Result<Backslash> {
        Backslash::from_config(&Config::new(url, run_token))
    }

    pub fn from_config(cfg: &Config) -> Result<Backslash> {
        Ok(Backslash {
            client: Client::new(cfg)?,
        })
    }

    pub fn with_client(client: Client) -> Backslash {
        Backslash { client }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub async fn report_session_start(&self, start: SessionStart) -> Result<Session> {
        let mut params = Params::new()
            .insert_opt("logical_id", start.logical_id)
            .insert_opt("hostname", start.hostname)
            .insert_opt("total_num_tests", start.total_num_tests)
            .insert_opt("user_email", start.user_email)
            .insert_opt("metadata", start.metadata)
            .insert_opt("keepalive_interval", start.keepalive_interval)
            .insert_opt("subjects", start.subjects)
            .insert_opt("infrastructure", start.infrastructure);

        if let Some(parent_logical_id) = start.parent_logical_id {
            if self.client.features().await?.parent_logical_id {
                params = params.insert("parent_logical_id", parent_logical_id);
            } else {
                warn!("server does not support parent_logical_id, starting a top-level session");
            }
        }

        self.client
            .call("report_session_start", params)
            .await?
            .into_entity()
    }

    pub fn query_sessions(&self) -> Result<LazyQuery> {
        self.client.query("/rest/sessions")
    }

    /// Tests across all sessions.
    pub fn query_tests(&self) -> Result<LazyQuery> {
        self.client.query("/rest/tests")
    }

    /// Query over any collection path with extra `name=value` parameters.
    pub fn query<K, V>(
        &self,
        path: &str,
        params: impl IntoIterator<Item = (K, V)>,
    ) -> Result<LazyQuery>
    where
        K: AsRef<str>,
        V: Display,
    {
        Ok(params
            .into_iter()
            .fold(self.client.query(path)?, |query, (name, value)| {
                query.with_param(name.as_ref(), value)
            }))
    }

    pub async fn toggle_user_role(&self, user_id: impl Into<Value>, role: &str) -> Result<Value> {
        let params = Params::new().insert("user_id", user_id).insert("role", role);
        Ok(self
            .client
            .call("toggle_user_role", params)
            .await?
            .into_value())
    }

    pub async fn get_user_run_tokens(&self, user_id: impl Into<Value>) -> Result<Value> {
        let params = Params::new().insert("user_id", user_id);
        Ok(self
            .client
            .call("get_user_run_tokens", params)
            .await?
            .into_value())
    }

    pub async fn delete_comment(&self, comment_id: impl Into<Value>) -> Result<()> {
        self.client
            .call("delete_comment", Params::new().insert("comment_id", comment_id))
            .await?;
        Ok(())
    }

    /// Address of a page in the web UI, e.g. `get_ui_url("sessions/3")`.
    pub fn get_ui_url(&self, fragment: &str) -> String {
        self.client.ui_url(fragment)
    }
}

impl std::ops::Deref for Backslash {
    type Target = Client;

    fn deref(&self) -> &Client {
        &self.client
    }
}
