use serde_json::Value;
use std::sync::Arc;
use url::Url;

use crate::{
    capabilities::{Capabilities, ServerFeatures},
    config::Config,
    http::{unwrap_envelope, Transport},
    params::Params,
    query::LazyQuery,
    registry::{Materialized, TypeRegistry},
    Result,
};

/// Shared handle to one Backslash connection.
///
/// Cloning is cheap; every object materialized from a response holds a clone
/// of the handle it came from.
#[derive(Clone)]
pub struct Client(Arc<Inner>);

struct Inner {
    transport: Transport,
    registry: TypeRegistry,
    features: Option<ServerFeatures>,
    page_size: usize,
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<Client {}>", self.url())
    }
}

pub struct ClientBuilder {
    config: Config,
    registry: TypeRegistry,
    features: Option<ServerFeatures>,
}

impl ClientBuilder {
    /// Replaces the registry used to materialize typed objects.
    pub fn registry(mut self, registry: TypeRegistry) -> ClientBuilder {
        self.registry = registry;
        self
    }

    /// Uses a fixed feature set instead of probing the server.
    pub fn features(mut self, features: ServerFeatures) -> ClientBuilder {
        self.features = Some(features);
        self
    }

    pub fn build(self) -> Result<Client> {
        Ok(Client(Arc::new(Inner {
            transport: Transport::new(&self.config)?,
            registry: self.registry,
            features: self.features,
            page_size: self.config.page_size,
        })))
    }
}

impl Client {
    pub fn new(config: &Config) -> Result<Client> {
        Client::builder(config).build()
    }

    pub fn builder(config: &Config) -> ClientBuilder {
        ClientBuilder {
            config: config.clone(),
            registry: TypeRegistry::default(),
            features: None,
        }
    }

    pub fn transport(&self) -> &Transport {
        &self.0.transport
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.0.registry
    }

    pub fn url(&self) -> &Url {
        self.0.transport.base_url()
    }

    pub fn page_size(&self) -> usize {
        self.0.page_size
    }

    /// Whether both handles refer to the same connection.
    pub fn ptr_eq(&self, other: &Client) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// Address of a page in the web UI.
    pub fn ui_url(&self, fragment: &str) -> String {
        format!(
            "{}/#/{}",
            self.url().as_str().trim_end_matches('/'),
            fragment.trim_start_matches('/')
        )
    }

    /// Calls a named API function and materializes the result.
    pub async fn call(&self, name: &str, params: Params) -> Result<Materialized> {
        let body = self.0.transport.call_function(name, &params).await?;
        Ok(self.materialize(unwrap_envelope(body)))
    }

    pub async fn get(&self, path: &str) -> Result<Materialized> {
        let body = self.0.transport.get(path).await?;
        Ok(self.materialize(unwrap_envelope(body)))
    }

    /// Undecoded JSON body of a GET.
    pub async fn get_raw(&self, path: &str) -> Result<Value> {
        self.0.transport.get(path).await
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        self.0.transport.delete(path).await
    }

    pub async fn capabilities(&self) -> Result<Capabilities> {
        self.0.transport.capabilities().await
    }

    /// Feature set used for version-gated calls.
    pub async fn features(&self) -> Result<ServerFeatures> {
        match self.0.features {
            Some(features) => Ok(features),
            None => Ok(ServerFeatures::from(&self.capabilities().await?)),
        }
    }

    pub fn materialize(&self, value: Value) -> Materialized {
        self.0.registry.materialize(self, value)
    }

    /// Lazy query over the collection at `path`.
    pub fn query(&self, path: &str) -> Result<LazyQuery> {
        LazyQuery::new(self, path)
    }
}
