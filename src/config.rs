//! Configuration, built once at startup and passed by reference.
//!
//! Non-secret settings come from an optional TOML file (every section has
//! defaults, so no file is needed for the standard catalog layout). Store
//! and API credentials come only from the process environment, after a
//! `.env` file has been loaded by `main`.
//!
//! ```toml
//! [catalog]
//! root = "."
//!
//! [[families]]
//! name = "ConstructoBots"
//!
//! [collections]
//! products = "products"
//! vector_dimension = 1536
//!
//! [pacing]
//! image_delay_secs = 5
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::error::CatalogError;
use crate::retry::{Pacer, RetryPolicy};
use crate::split::{slugify, Families};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default = "default_families")]
    pub families: Vec<FamilyConfig>,
    #[serde(default)]
    pub collections: CollectionsConfig,
    #[serde(default)]
    pub pacing: PacingConfig,
    #[serde(default)]
    pub openai: OpenAiConfig,
    #[serde(skip)]
    pub env: Environment,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CatalogConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// Flat export consumed by `split`, relative to `root`.
    #[serde(default = "default_export_file")]
    pub export_file: PathBuf,
    /// Directory holding one sub-directory per family, relative to `root`.
    #[serde(default = "default_products_dir")]
    pub products_dir: PathBuf,
    #[serde(default = "default_prompts_file")]
    pub prompts_file: PathBuf,
    #[serde(default = "default_hero_image")]
    pub hero_image: PathBuf,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            export_file: default_export_file(),
            products_dir: default_products_dir(),
            prompts_file: default_prompts_file(),
            hero_image: default_hero_image(),
        }
    }
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}
fn default_export_file() -> PathBuf {
    PathBuf::from("products.jsonl")
}
fn default_products_dir() -> PathBuf {
    PathBuf::from("products")
}
fn default_prompts_file() -> PathBuf {
    PathBuf::from("image-prompts.jsonl")
}
fn default_hero_image() -> PathBuf {
    PathBuf::from("public/images/hero-background.png")
}

/// A product family. `slug` defaults to the lower-cased name without spaces.
#[derive(Debug, Deserialize, Clone)]
pub struct FamilyConfig {
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
}

fn default_families() -> Vec<FamilyConfig> {
    ["ConstructoBots", "LogicLeaps", "ImagiWorlds", "KinetiKits", "CreatiSpark"]
        .iter()
        .map(|name| FamilyConfig {
            name: name.to_string(),
            slug: None,
        })
        .collect()
}

#[derive(Debug, Deserialize, Clone)]
pub struct CollectionsConfig {
    #[serde(default = "default_products_collection")]
    pub products: String,
    #[serde(default = "default_documents_collection")]
    pub documents: String,
    #[serde(default = "default_vector_dimension")]
    pub vector_dimension: usize,
    #[serde(default = "default_vector_metric")]
    pub vector_metric: String,
    #[serde(default = "default_embedding_provider")]
    pub embedding_provider: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
}

impl Default for CollectionsConfig {
    fn default() -> Self {
        Self {
            products: default_products_collection(),
            documents: default_documents_collection(),
            vector_dimension: default_vector_dimension(),
            vector_metric: default_vector_metric(),
            embedding_provider: default_embedding_provider(),
            embedding_model: default_embedding_model(),
        }
    }
}

fn default_products_collection() -> String {
    "products".to_string()
}
fn default_documents_collection() -> String {
    "documents".to_string()
}
fn default_vector_dimension() -> usize {
    1536
}
fn default_vector_metric() -> String {
    "dot_product".to_string()
}
fn default_embedding_provider() -> String {
    "openai".to_string()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct PacingConfig {
    /// Delay between store inserts.
    #[serde(default)]
    pub insert_delay_ms: u64,
    /// Delay between image generation requests.
    #[serde(default = "default_image_delay_secs")]
    pub image_delay_secs: u64,
    /// Delay between chat completion requests.
    #[serde(default = "default_chat_delay_ms")]
    pub chat_delay_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            insert_delay_ms: 0,
            image_delay_secs: default_image_delay_secs(),
            chat_delay_ms: default_chat_delay_ms(),
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay_secs(),
        }
    }
}

fn default_image_delay_secs() -> u64 {
    5
}
fn default_chat_delay_ms() -> u64 {
    150
}
fn default_max_retries() -> u32 {
    2
}
fn default_retry_delay_secs() -> u64 {
    10
}

impl PacingConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.max_retries, Duration::from_secs(self.retry_delay_secs))
    }

    pub fn insert_pacer(&self) -> Pacer {
        Pacer::new(Duration::from_millis(self.insert_delay_ms))
    }

    pub fn image_pacer(&self) -> Pacer {
        Pacer::new(Duration::from_secs(self.image_delay_secs))
    }

    pub fn chat_pacer(&self) -> Pacer {
        Pacer::new(Duration::from_millis(self.chat_delay_ms))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct OpenAiConfig {
    #[serde(default = "default_image_model")]
    pub image_model: String,
    #[serde(default = "default_image_size")]
    pub image_size: String,
    #[serde(default = "default_hero_size")]
    pub hero_size: String,
    #[serde(default = "default_image_quality")]
    pub image_quality: String,
    #[serde(default = "default_chat_model")]
    pub chat_model: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            image_model: default_image_model(),
            image_size: default_image_size(),
            hero_size: default_hero_size(),
            image_quality: default_image_quality(),
            chat_model: default_chat_model(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_image_model() -> String {
    "dall-e-3".to_string()
}
fn default_image_size() -> String {
    "1024x1024".to_string()
}
fn default_hero_size() -> String {
    "1792x1024".to_string()
}
fn default_image_quality() -> String {
    "standard".to_string()
}
fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}
fn default_timeout_secs() -> u64 {
    120
}

/// Extra store client options from `ASTRA_CLIENT_KWARGS` (a JSON object).
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct ClientOptions {
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

/// Values read from the process environment.
#[derive(Debug, Clone, Default)]
pub struct Environment {
    pub store_endpoint: Option<String>,
    pub store_token: Option<String>,
    pub keyspace: String,
    pub provider_key_name: Option<String>,
    pub client_options: ClientOptions,
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
}

impl Environment {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let client_options = match get("ASTRA_CLIENT_KWARGS") {
            Some(raw) => parse_client_options(&raw).unwrap_or_else(|reason| {
                warn!("Ignoring ASTRA_CLIENT_KWARGS: {}", reason);
                ClientOptions::default()
            }),
            None => ClientOptions::default(),
        };

        Self {
            store_endpoint: get("ASTRA_DB_API_ENDPOINT"),
            store_token: get("ASTRA_DB_TOKEN"),
            keyspace: get("ASTRA_DB_KEYSPACE").unwrap_or_else(|| "default_keyspace".to_string()),
            provider_key_name: get("ASTRA_DB_INTEGRATION_OPENAI_KEY_NAME"),
            client_options,
            openai_api_key: get("OPENAI_API_KEY"),
            openai_base_url: get("OPENAI_BASE_URL")
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
        }
    }
}

/// Parse `ASTRA_CLIENT_KWARGS`. The error names only the position, since
/// serde messages quote offending values and the object may hold headers.
pub fn parse_client_options(raw: &str) -> std::result::Result<ClientOptions, String> {
    serde_json::from_str::<ClientOptions>(raw).map_err(|e| {
        format!(
            "{:?} error at line {} column {}",
            e.classify(),
            e.line(),
            e.column()
        )
    })
}

/// Everything needed to talk to the document store.
#[derive(Debug, Clone)]
pub struct StoreSettings {
    pub endpoint: String,
    pub token: String,
    pub keyspace: String,
    pub options: ClientOptions,
}

/// Everything needed to talk to the image/chat API.
#[derive(Debug, Clone)]
pub struct OpenAiSettings {
    pub api_key: String,
    pub base_url: String,
    pub timeout: Duration,
}

impl Config {
    /// Defaults for every section, with the given environment.
    pub fn with_env(env: Environment) -> Self {
        Self {
            catalog: CatalogConfig::default(),
            families: default_families(),
            collections: CollectionsConfig::default(),
            pacing: PacingConfig::default(),
            openai: OpenAiConfig::default(),
            env,
        }
    }

    pub fn families(&self) -> Families {
        Families::new(self.families.iter().map(|f| {
            let slug = f.slug.clone().unwrap_or_else(|| slugify(&f.name));
            (f.name.clone(), slug)
        }))
    }

    pub fn products_dir(&self) -> PathBuf {
        self.catalog.root.join(&self.catalog.products_dir)
    }

    pub fn export_path(&self) -> PathBuf {
        self.catalog.root.join(&self.catalog.export_file)
    }

    pub fn prompts_path(&self) -> PathBuf {
        self.catalog.root.join(&self.catalog.prompts_file)
    }

    pub fn hero_image_path(&self) -> PathBuf {
        self.catalog.root.join(&self.catalog.hero_image)
    }

    /// Store credentials, or a configuration error naming what is missing.
    pub fn require_store(&self) -> std::result::Result<StoreSettings, CatalogError> {
        match (&self.env.store_endpoint, &self.env.store_token) {
            (Some(endpoint), Some(token)) => Ok(StoreSettings {
                endpoint: endpoint.clone(),
                token: token.clone(),
                keyspace: self.env.keyspace.clone(),
                options: self.env.client_options.clone(),
            }),
            _ => Err(CatalogError::Config(
                "ASTRA_DB_TOKEN and ASTRA_DB_API_ENDPOINT must be set".to_string(),
            )),
        }
    }

    pub fn require_openai(&self) -> std::result::Result<OpenAiSettings, CatalogError> {
        let api_key = self
            .env
            .openai_api_key
            .clone()
            .ok_or_else(|| CatalogError::Config("OPENAI_API_KEY must be set".to_string()))?;
        Ok(OpenAiSettings {
            api_key,
            base_url: self.env.openai_base_url.clone(),
            timeout: Duration::from_secs(self.openai.timeout_secs),
        })
    }
}

/// Load settings from `path` (if given) and the process environment.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let mut config = match path {
        Some(path) => {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
            parse_config(&content)?
        }
        None => Config::with_env(Environment::default()),
    };
    config.env = Environment::from_env();
    validate(&config)?;
    Ok(config)
}

/// Parse TOML settings. The environment section is left empty.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse settings file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if config.families.is_empty() {
        anyhow::bail!("at least one [[families]] entry is required");
    }
    let mut seen = HashSet::new();
    for family in config.families().iter() {
        if family.1.is_empty() {
            anyhow::bail!("family '{}' has an empty slug", family.0);
        }
        if !seen.insert(family.1.to_string()) {
            anyhow::bail!("duplicate family slug '{}'", family.1);
        }
    }

    if config.collections.vector_dimension == 0 {
        anyhow::bail!("collections.vector_dimension must be > 0");
    }
    match config.collections.vector_metric.as_str() {
        "dot_product" | "cosine" | "euclidean" => {}
        other => anyhow::bail!(
            "Unknown vector metric: '{}'. Must be dot_product, cosine, or euclidean.",
            other
        ),
    }
    if config.openai.timeout_secs == 0 {
        anyhow::bail!("openai.timeout_secs must be > 0");
    }
    Ok(())
}
