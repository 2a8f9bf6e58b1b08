use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use url::Url;

use crate::{client::Client, Error, Result};

/// Data of one server-side object plus the client it belongs to.
///
/// Two objects are equal when they share the same client handle and carry
/// identical data.
#[derive(Clone)]
pub struct ApiObject {
    client: Client,
    data: Map<String, Value>,
}

impl ApiObject {
    pub fn new(client: Client, data: Map<String, Value>) -> ApiObject {
        ApiObject { client, data }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn into_data(self) -> Map<String, Value> {
        self.data
    }

    /// Type tag, empty for untyped data.
    pub fn type_tag(&self) -> &str {
        self.data.get("type").and_then(Value::as_str).unwrap_or_default()
    }

    pub fn get(&self, field: &str) -> Result<&Value> {
        self.data
            .get(field)
            .ok_or_else(|| Error::FieldNotFound(field.to_string()))
    }

    pub fn get_as<T: DeserializeOwned>(&self, field: &str) -> Result<T> {
        Ok(T::deserialize(self.get(field)?)?)
    }

    pub fn id(&self) -> Result<&Value> {
        self.get("id")
    }

    pub fn logical_id(&self) -> Option<&str> {
        self.data.get("logical_id").and_then(Value::as_str)
    }

    /// Identifier shown in UI links: the logical id when present.
    pub fn display_id(&self) -> Result<String> {
        match self.logical_id() {
            Some(logical_id) => Ok(logical_id.to_string()),
            None => Ok(id_to_string(self.id()?)),
        }
    }

    /// Canonical server path of the object.
    pub fn api_path(&self) -> Result<String> {
        if let Some(path) = self.data.get("api_path").and_then(Value::as_str) {
            return Ok(path.to_string());
        }
        Ok(format!(
            "/rest/{}s/{}",
            self.type_tag(),
            id_to_string(self.id()?)
        ))
    }

    pub fn api_url(&self) -> Result<Url> {
        self.client.transport().url_for(&self.api_path()?)
    }

    /// Reloads the data from the server. The id must not change.
    pub async fn refresh(&mut self) -> Result<()> {
        let expected = self.id()?.clone();
        let mut body = self.client.get_raw(&self.api_path()?).await?;

        let fresh = match body.get_mut(self.type_tag()).map(Value::take) {
            Some(Value::Object(fresh)) => fresh,
            _ => {
                return Err(Error::UnexpectedResponse(format!(
                    "response to refresh has no \"{}\" object",
                    self.type_tag()
                )))
            }
        };
        let found = fresh.get("id").cloned().unwrap_or_default();
        if found != expected {
            return Err(Error::IdentityMismatch { expected, found });
        }

        self.data = fresh;
        Ok(())
    }

    /// Copy of the object without the given fields.
    pub fn without_fields(&self, fields: &[&str]) -> ApiObject {
        let data = self
            .data
            .iter()
            .filter(|(name, _)| !fields.contains(&name.as_str()))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        ApiObject::new(self.client.clone(), data)
    }

    pub(crate) fn id_string(&self) -> Result<String> {
        Ok(id_to_string(self.id()?))
    }
}

fn id_to_string(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl PartialEq for ApiObject {
    fn eq(&self, other: &Self) -> bool {
        self.client.ptr_eq(&other.client) && self.data == other.data
    }
}

impl std::fmt::Debug for ApiObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let id = self.data.get("id").map(id_to_string).unwrap_or_default();
        write!(f, "<API:{}:{}>", self.type_tag(), id)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::{config::Config, http::test::test_config};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn client() -> Client {
        Client::new(&Config::new("http://127.0.0.1:12345", None)).unwrap()
    }

    fn object(client: &Client, data: Value) -> ApiObject {
        let Value::Object(data) = data else {
            panic!("test data must be an object")
        };
        ApiObject::new(client.clone(), data)
    }

    #[test]
    fn equality() {
        let client = client();
        let a = object(&client, json!({"name": "data1"}));
        assert_eq!(a, a.clone());
        assert_eq!(a, object(&client, json!({"name": "data1"})));
        assert_ne!(a, object(&client, json!({"name": "data2"})));
    }

    #[test]
    fn not_equal_when_different_clients() {
        let a = object(&client(), json!({"name": "data1"}));
        let b = object(&client(), json!({"name": "data1"}));
        assert_ne!(a, b);
    }

    #[test]
    fn api_url_from_field() -> eyre::Result<()> {
        let obj = object(&client(), json!({"api_path": "/rest/objects/1"}));
        assert_eq!(obj.api_url()?.as_str(), "http://127.0.0.1:12345/rest/objects/1");
        Ok(())
    }

    #[test]
    fn api_path_from_type_and_id() -> eyre::Result<()> {
        let obj = object(&client(), json!({"type": "session", "id": 4}));
        assert_eq!(obj.api_path()?, "/rest/sessions/4");
        Ok(())
    }

    #[test]
    fn missing_field() {
        let obj = object(&client(), json!({"type": "session"}));
        assert!(matches!(obj.get("hostname"), Err(Error::FieldNotFound(f)) if f == "hostname"));
        assert!(matches!(obj.id(), Err(Error::FieldNotFound(_))));
    }

    #[test]
    fn typed_field() -> eyre::Result<()> {
        let obj = object(&client(), json!({"num_errors": 3, "hostname": "h1"}));
        assert_eq!(obj.get_as::<u32>("num_errors")?, 3);
        assert_eq!(obj.get_as::<String>("hostname")?, "h1");
        assert!(matches!(obj.get_as::<u32>("hostname"), Err(Error::Json(_))));
        Ok(())
    }

    #[test]
    fn display_id_prefers_logical_id() -> eyre::Result<()> {
        let client = client();
        let obj = object(&client, json!({"id": 1002, "logical_id": "abc_1"}));
        assert_eq!(obj.display_id()?, "abc_1");
        let obj = object(&client, json!({"id": 1002, "logical_id": null}));
        assert_eq!(obj.display_id()?, "1002");
        Ok(())
    }

    #[test]
    fn without_fields_leaves_original_untouched() {
        let client = client();
        let original = object(&client, json!({"type": "test", "id": 1, "traceback": [1, 2]}));
        let stripped = original.without_fields(&["traceback"]);

        assert_eq!(stripped, object(&client, json!({"type": "test", "id": 1})));
        assert!(original.get("traceback").is_ok());
        assert!(stripped.client().ptr_eq(original.client()));
    }

    #[test]
    fn debug_form() {
        let obj = object(&client(), json!({"type": "session", "id": 12}));
        assert_eq!(format!("{obj:?}"), "<API:session:12>");
    }

    #[tokio::test]
    async fn refresh_replaces_data() -> eyre::Result<()> {
        let mut server = mockito::Server::new_async().await;
        let m = server
            .mock("GET", "/rest/sessions/7")
            .with_body(r#"{"session": {"type": "session", "id": 7, "status": "SUCCESS"}}"#)
            .expect(1)
            .create_async()
            .await;

        let client = Client::new(&test_config(server.url()))?;
        let mut obj = object(&client, json!({"type": "session", "id": 7, "status": "RUNNING"}));
        obj.refresh().await?;

        m.assert_async().await;
        assert_eq!(obj.get("status")?, &json!("SUCCESS"));
        Ok(())
    }

    #[tokio::test]
    async fn refresh_detects_identity_change() -> eyre::Result<()> {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/rest/sessions/7")
            .with_body(r#"{"session": {"type": "session", "id": 8}}"#)
            .create_async()
            .await;

        let client = Client::new(&test_config(server.url()))?;
        let mut obj = object(&client, json!({"type": "session", "id": 7}));
        let err = obj.refresh().await.unwrap_err();

        assert!(matches!(err, Error::IdentityMismatch { .. }), "{err}");
        assert_eq!(obj.id()?, &json!(7));
        Ok(())
    }
}
