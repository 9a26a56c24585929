//! neo4j-chat
//!
//! Ask natural-language questions about a Neo4j graph:
//! - Schema introspection with a TTL-cached snapshot
//! - LLM translation of the question into Cypher
//! - Static validation against a read-only policy and a denylist
//! - Bounded execution (timeout, row cap, connection retry)
//! - LLM summary of the rows with a deterministic fallback

pub mod api;
pub mod cypher;
pub mod error;
pub mod executor;
pub mod llm;
pub mod neo4j;
pub mod pipeline;
pub mod schema;
pub mod summarize;
pub mod translate;
pub mod validate;

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

pub use error::{ErrorKind, ErrorResponse, PipelineError};
pub use pipeline::{AskResponse, Pipeline};

// ============================================================================
// Config sections (YAML deserialization targets, then env overrides)
// ============================================================================

/// Top-level YAML configuration file structure
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub server: ServerConfig,
    pub neo4j: Neo4jConfig,
    pub llm: LlmConfig,
    pub pipeline: PipelineConfig,
}

/// HTTP server section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

/// Neo4j connection section
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Neo4jConfig {
    pub uri: String,
    pub user: String,
    pub password: String,
    /// Target database; `None` uses the server default.
    pub database: Option<String>,
    pub max_connections: usize,
    /// Records pulled per Bolt round trip.
    pub fetch_size: usize,
    pub acquire_timeout_ms: u64,
}

impl Default for Neo4jConfig {
    fn default() -> Self {
        Self {
            uri: "bolt://localhost:7687".into(),
            user: "neo4j".into(),
            password: "neo4j".into(),
            database: None,
            max_connections: 8,
            fetch_size: 200,
            acquire_timeout_ms: 5000,
        }
    }
}

impl Neo4jConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }
}

/// Completion provider section (any OpenAI-compatible endpoint)
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub url: String,
    pub model: String,
    pub api_key: Option<String>,
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:11434/v1/chat/completions".into(),
            model: "llama3.1".into(),
            api_key: None,
            timeout_ms: 30_000,
        }
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Question pipeline limits and policy
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Accept WRITE-intent queries. Off unless explicitly enabled.
    pub allow_writes: bool,
    pub row_limit: usize,
    pub query_timeout_ms: u64,
    pub schema_cache_ttl_s: u64,
    pub max_connection_attempts: u32,
    pub retry_base_delay_ms: u64,
    pub preview_rows: usize,
    pub preview_chars: usize,
    /// Drop embedding-sized lists from result rows.
    pub sanitize: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            allow_writes: false,
            row_limit: 100,
            query_timeout_ms: 10_000,
            schema_cache_ttl_s: 300,
            max_connection_attempts: 3,
            retry_base_delay_ms: 200,
            preview_rows: 20,
            preview_chars: 4000,
            sanitize: true,
        }
    }
}

impl PipelineConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn schema_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.schema_cache_ttl_s)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_millis(self.retry_base_delay_ms)
    }
}

// ============================================================================
// Runtime config
// ============================================================================

/// Application configuration
#[derive(Debug, Clone, Default)]
pub struct Config {
    pub neo4j: Neo4jConfig,
    pub llm: LlmConfig,
    pub pipeline: PipelineConfig,
    pub server_port: u16,
}

fn env_string(var: &str) -> Option<String> {
    std::env::var(var).ok().filter(|v| !v.is_empty())
}

fn env_parse<T: FromStr>(var: &str) -> Option<T> {
    let raw = env_string(var)?;
    match raw.parse() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!("Ignoring unparsable {}={}", var, raw);
            None
        }
    }
}

fn env_bool(var: &str) -> Option<bool> {
    match env_string(var)?.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        other => {
            tracing::warn!("Ignoring non-boolean {}={}", var, other);
            None
        }
    }
}

impl Config {
    /// Load configuration from environment variables only.
    /// Equivalent to from_yaml_and_env(None).
    pub fn from_env() -> Result<Self> {
        Self::from_yaml_and_env(None)
    }

    /// Load configuration from an optional YAML file, then override with env vars.
    ///
    /// Priority: env var > YAML > default
    ///
    /// If `yaml_path` is None, tries "config.yaml" in CWD. A missing file
    /// falls back to env vars / defaults.
    pub fn from_yaml_and_env(yaml_path: Option<&Path>) -> Result<Self> {
        let yaml = Self::load_yaml(yaml_path);
        let YamlConfig {
            server,
            neo4j,
            llm,
            pipeline,
        } = yaml;

        let config = Self {
            neo4j: Neo4jConfig {
                uri: env_string("NEO4J_URI").unwrap_or(neo4j.uri),
                user: env_string("NEO4J_USER").unwrap_or(neo4j.user),
                password: env_string("NEO4J_PASSWORD").unwrap_or(neo4j.password),
                database: env_string("NEO4J_DATABASE").or(neo4j.database),
                max_connections: env_parse("NEO4J_MAX_CONNECTIONS")
                    .unwrap_or(neo4j.max_connections),
                fetch_size: env_parse("NEO4J_FETCH_SIZE").unwrap_or(neo4j.fetch_size),
                acquire_timeout_ms: env_parse("NEO4J_ACQUIRE_TIMEOUT_MS")
                    .unwrap_or(neo4j.acquire_timeout_ms),
            },
            llm: LlmConfig {
                url: env_string("LLM_URL").unwrap_or(llm.url),
                model: env_string("LLM_MODEL").unwrap_or(llm.model),
                api_key: env_string("LLM_API_KEY").or(llm.api_key),
                timeout_ms: env_parse("LLM_TIMEOUT_MS").unwrap_or(llm.timeout_ms),
            },
            pipeline: PipelineConfig {
                allow_writes: env_bool("ALLOW_WRITES").unwrap_or(pipeline.allow_writes),
                row_limit: env_parse("ROW_LIMIT").unwrap_or(pipeline.row_limit),
                query_timeout_ms: env_parse("QUERY_TIMEOUT_MS")
                    .unwrap_or(pipeline.query_timeout_ms),
                schema_cache_ttl_s: env_parse("SCHEMA_CACHE_TTL_S")
                    .unwrap_or(pipeline.schema_cache_ttl_s),
                max_connection_attempts: env_parse("MAX_CONNECTION_ATTEMPTS")
                    .unwrap_or(pipeline.max_connection_attempts),
                retry_base_delay_ms: env_parse("RETRY_BASE_DELAY_MS")
                    .unwrap_or(pipeline.retry_base_delay_ms),
                preview_rows: env_parse("PREVIEW_ROWS").unwrap_or(pipeline.preview_rows),
                preview_chars: env_parse("PREVIEW_CHARS").unwrap_or(pipeline.preview_chars),
                sanitize: env_bool("SANITIZE_RESULTS").unwrap_or(pipeline.sanitize),
            },
            server_port: env_parse("SERVER_PORT").unwrap_or(server.port),
        };

        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<()> {
        anyhow::ensure!(self.pipeline.row_limit > 0, "pipeline.row_limit must be at least 1");
        anyhow::ensure!(
            self.pipeline.max_connection_attempts > 0,
            "pipeline.max_connection_attempts must be at least 1"
        );
        anyhow::ensure!(
            self.neo4j.max_connections > 0,
            "neo4j.max_connections must be at least 1"
        );
        Ok(())
    }

    /// Try to load and parse a YAML config file. Returns defaults on any failure.
    fn load_yaml(yaml_path: Option<&Path>) -> YamlConfig {
        let default_path = Path::new("config.yaml");
        let path = yaml_path.unwrap_or(default_path);

        match std::fs::read_to_string(path) {
            Ok(contents) => match serde_yaml::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    tracing::warn!("Failed to parse {}: {}. Using defaults.", path.display(), e);
                    YamlConfig::default()
                }
            },
            Err(_) => {
                tracing::debug!(
                    "No config file at {}, using env vars / defaults",
                    path.display()
                );
                YamlConfig::default()
            }
        }
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<Pipeline>,
    pub driver: Arc<dyn neo4j::GraphDriver>,
    pub config: Arc<Config>,
}

impl AppState {
    /// Connect to Neo4j, build the completion provider and wire the pipeline.
    pub async fn new(config: Config) -> Result<Self> {
        let driver: Arc<dyn neo4j::GraphDriver> = Arc::new(
            neo4j::Neo4jClient::connect(&config.neo4j)
                .await
                .context("Failed to connect to Neo4j")?,
        );
        let llm: Arc<dyn llm::CompletionProvider> = Arc::new(
            llm::HttpCompletionProvider::from_config(&config.llm)
                .context("Failed to build completion provider")?,
        );
        Ok(Self::from_parts(driver, llm, config))
    }

    /// Wire the pipeline over already-built collaborators.
    pub fn from_parts(
        driver: Arc<dyn neo4j::GraphDriver>,
        llm: Arc<dyn llm::CompletionProvider>,
        config: Config,
    ) -> Self {
        let pipeline = Pipeline::new(driver.clone(), llm, &config.pipeline, config.llm.timeout());
        Self {
            pipeline: Arc::new(pipeline),
            driver,
            config: Arc::new(config),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
