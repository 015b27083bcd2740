//! JSON Data API binding for the document store.
//!
//! Every operation is a single JSON command POSTed to one of three URLs:
//!
//! | URL | Commands |
//! |-----|----------|
//! | `{endpoint}/api/json/v1` | `findRerankingProviders` |
//! | `{endpoint}/api/json/v1/{keyspace}` | `findCollections`, `createCollection` |
//! | `{endpoint}/api/json/v1/{keyspace}/{collection}` | `insertOne`, `deleteMany` |
//!
//! The service answers HTTP 200 with an `errors` array when it refuses a
//! command; those become [`CatalogError::RemoteRejection`]. 5xx and 429
//! responses are [`CatalogError::Transient`], auth failures
//! [`CatalogError::Connectivity`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tracing::debug;

use crate::config::StoreSettings;
use crate::error::{CatalogError, Result};
use crate::models::Record;

use super::{CollectionSpec, DocumentStore, LexicalConfig, StoreProvisioner};

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Client for one database endpoint and keyspace.
#[derive(Clone)]
pub struct DataApiClient {
    client: Client,
    endpoint: String,
    keyspace: String,
}

impl DataApiClient {
    pub fn new(settings: &StoreSettings) -> Result<Self> {
        let endpoint = settings.endpoint.trim().trim_end_matches('/').to_string();
        if !(endpoint.starts_with("http://") || endpoint.starts_with("https://")) {
            return Err(CatalogError::Config(format!(
                "store endpoint must be an http(s) URL, got '{}'",
                endpoint
            )));
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            "Token",
            HeaderValue::from_str(settings.token.trim())
                .map_err(|_| CatalogError::Config("invalid store token".to_string()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        for (name, value) in &settings.options.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| CatalogError::Config(format!("invalid header name '{}'", name)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| CatalogError::Config(format!("invalid value for header '{}'", name)))?;
            headers.insert(name, value);
        }

        let timeout = settings.options.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout))
            .default_headers(headers)
            .build()
            .map_err(|e| CatalogError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint,
            keyspace: settings.keyspace.clone(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn api_root(&self) -> String {
        format!("{}/api/json/v1", self.endpoint)
    }

    fn keyspace_url(&self) -> String {
        format!("{}/{}", self.api_root(), self.keyspace)
    }

    fn collection_url(&self, name: &str) -> String {
        format!("{}/{}", self.keyspace_url(), name)
    }

    /// POST one command and return the response body.
    async fn command(&self, url: &str, body: &Value) -> Result<Value> {
        debug!("Data API POST {}", url);
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| CatalogError::from_transport(&e))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| CatalogError::from_transport(&e))?;

        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            return Err(CatalogError::Transient(format!("Data API {}: {}", status, text)));
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(CatalogError::Connectivity(format!(
                "Data API refused credentials ({}): {}",
                status, text
            )));
        }
        if !status.is_success() {
            return Err(CatalogError::RemoteRejection(format!(
                "Data API {}: {}",
                status, text
            )));
        }

        let json: Value = serde_json::from_str(&text)?;
        if let Some(errors) = json.get("errors").and_then(Value::as_array) {
            if !errors.is_empty() {
                let messages: Vec<String> = errors
                    .iter()
                    .map(|e| {
                        let code = e.get("errorCode").and_then(Value::as_str).unwrap_or("ERROR");
                        let message = e.get("message").and_then(Value::as_str).unwrap_or("");
                        format!("{}: {}", code, message)
                    })
                    .collect();
                return Err(CatalogError::RemoteRejection(messages.join("; ")));
            }
        }
        Ok(json)
    }

    async fn find_collections(&self) -> Result<Vec<Value>> {
        let body = json!({"findCollections": {"options": {"explain": true}}});
        let response = self.command(&self.keyspace_url(), &body).await?;
        Ok(response
            .pointer("/status/collections")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default())
    }
}

fn collection_name(entry: &Value) -> Option<&str> {
    // `explain: true` yields objects; older services return bare names.
    entry
        .get("name")
        .and_then(Value::as_str)
        .or_else(|| entry.as_str())
}

/// Body of a `createCollection` command.
pub fn create_collection_body(spec: &CollectionSpec, lexical: Option<&LexicalConfig>) -> Value {
    let mut service = json!({
        "provider": spec.embedding.provider,
        "modelName": spec.embedding.model,
    });
    if let Some(key) = &spec.embedding.provider_key {
        service["authentication"] = json!({"providerKey": key});
    }

    let mut options = json!({
        "vector": {
            "dimension": spec.vector_dimension,
            "metric": spec.vector_metric,
            "service": service,
        }
    });
    if let Some(lexical) = lexical {
        let filters: Vec<Value> = lexical
            .filters
            .iter()
            .map(|f| json!({"name": f.name}))
            .collect();
        options["lexical"] = json!({
            "enabled": true,
            "analyzer": {
                "tokenizer": {"name": lexical.tokenizer, "args": {}},
                "filters": filters,
            }
        });
    }

    json!({"createCollection": {"name": spec.name, "options": options}})
}

#[async_trait]
impl StoreProvisioner for DataApiClient {
    async fn collection_exists(&self, name: &str) -> Result<bool> {
        let collections = self.find_collections().await?;
        Ok(collections.iter().any(|c| collection_name(c) == Some(name)))
    }

    async fn lexical_enabled(&self, name: &str) -> Result<bool> {
        let collections = self.find_collections().await?;
        let entry = collections
            .iter()
            .find(|c| collection_name(c) == Some(name))
            .ok_or_else(|| CatalogError::RemoteRejection(format!("no collection '{}'", name)))?;
        Ok(entry
            .pointer("/options/lexical/enabled")
            .and_then(Value::as_bool)
            .unwrap_or(false))
    }

    async fn lexical_available(&self) -> Result<bool> {
        let body = json!({"findRerankingProviders": {}});
        let response = self.command(&self.api_root(), &body).await?;
        Ok(response
            .pointer("/status/rerankingProviders")
            .and_then(Value::as_object)
            .map(|providers| !providers.is_empty())
            .unwrap_or(false))
    }

    async fn create_collection(
        &self,
        spec: &CollectionSpec,
        lexical: Option<&LexicalConfig>,
    ) -> Result<bool> {
        let body = create_collection_body(spec, lexical);
        self.command(&self.keyspace_url(), &body).await?;
        Ok(lexical.is_some())
    }

    async fn get_collection(&self, name: &str) -> Result<Box<dyn DocumentStore>> {
        Ok(Box::new(DataApiCollection {
            api: self.clone(),
            name: name.to_string(),
        }))
    }
}

/// Handle on one collection.
pub struct DataApiCollection {
    api: DataApiClient,
    name: String,
}

#[async_trait]
impl DocumentStore for DataApiCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn insert(&self, document: &Record) -> Result<()> {
        let body = json!({"insertOne": {"document": document}});
        self.api
            .command(&self.api.collection_url(&self.name), &body)
            .await?;
        Ok(())
    }

    /// Repeats `deleteMany` while the service reports more data. A negative
    /// `deletedCount` (whole-collection truncation) is not counted.
    async fn delete_all(&self) -> Result<u64> {
        let url = self.api.collection_url(&self.name);
        let body = json!({"deleteMany": {}});
        let mut total = 0u64;
        loop {
            let response = self.api.command(&url, &body).await?;
            let deleted = response
                .pointer("/status/deletedCount")
                .and_then(Value::as_i64)
                .unwrap_or(0);
            if deleted > 0 {
                total += deleted as u64;
            }
            let more = response
                .pointer("/status/moreData")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            if !more {
                return Ok(total);
            }
        }
    }
}
