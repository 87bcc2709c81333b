//! Configuration management for Recall services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Embedding service configuration
    pub embedding: EmbeddingConfig,

    /// Memory retrieval configuration
    pub retrieval: RetrievalConfig,

    /// Insights worker configuration
    pub insights: InsightsConfig,

    /// Observability configuration
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Primary database URL (for writes)
    pub url: String,

    /// Read replica URL (optional, falls back to primary)
    pub read_url: Option<String>,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    /// Embedding provider: http, mock
    #[serde(default = "default_embedding_provider")]
    pub provider: String,

    /// API key for the embedding endpoint (optional for local servers)
    pub api_key: Option<String>,

    /// API base URL (OpenAI-compatible /embeddings endpoint)
    pub api_base: Option<String>,

    /// Model to use
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Embedding dimension
    #[serde(default = "default_embedding_dimension")]
    pub dimension: usize,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries
    #[serde(default = "default_embedding_retries")]
    pub max_retries: u32,

    /// Batch size for embedding requests
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

/// Tuning knobs for the hybrid retrieval engine
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetrievalConfig {
    /// Final number of memories returned per query
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Turns of the live session treated as "present", not memory
    #[serde(default = "default_session_history_limit")]
    pub session_history_limit: i64,

    /// Candidate limit for the vector generator
    #[serde(default = "default_vector_search_k")]
    pub vector_search_k: usize,

    /// Candidate limit for the keyword generator
    #[serde(default = "default_keyword_search_k")]
    pub keyword_search_k: usize,

    /// MMR diversity weight in [0, 1]: 0 = pure relevance, 1 = max anti-redundancy
    #[serde(default = "default_mmr_diversity")]
    pub mmr_diversity: f32,

    /// Age window (days) receiving the strongest recency boost
    #[serde(default = "default_recency_boost_days")]
    pub recency_boost_days: i64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InsightsConfig {
    /// Seconds between worker cycles
    #[serde(default = "default_cycle_interval")]
    pub cycle_interval_secs: u64,

    /// Conversations re-embedded per backfill pass
    #[serde(default = "default_backfill_batch_size")]
    pub backfill_batch_size: usize,

    /// Local hour (0-23) after which a Sunday digest becomes due
    #[serde(default = "default_digest_due_hour")]
    pub digest_due_hour: u32,

    /// Minimum days between digests
    #[serde(default = "default_digest_min_gap_days")]
    pub digest_min_gap_days: i64,

    /// Cosine similarity floor for raising a contradiction alert
    #[serde(default = "default_contradiction_threshold")]
    pub contradiction_similarity_threshold: f64,

    /// Only conversations older than this many days are contradiction candidates
    #[serde(default = "default_contradiction_lookback_days")]
    pub contradiction_lookback_days: i64,

    /// Nearest neighbors examined per screened conversation
    #[serde(default = "default_contradiction_neighbors")]
    pub contradiction_neighbors: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 30 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_max_connections() -> u32 { 20 }
fn default_min_connections() -> u32 { 2 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_embedding_provider() -> String { "http".to_string() }
fn default_embedding_model() -> String { crate::DEFAULT_EMBEDDING_MODEL.to_string() }
fn default_embedding_dimension() -> usize { crate::DEFAULT_EMBEDDING_DIMENSION }
fn default_embedding_timeout() -> u64 { 30 }
fn default_embedding_retries() -> u32 { 3 }
fn default_batch_size() -> usize { 32 }
fn default_top_k() -> usize { 6 }
fn default_session_history_limit() -> i64 { 10 }
fn default_vector_search_k() -> usize { 15 }
fn default_keyword_search_k() -> usize { 10 }
fn default_mmr_diversity() -> f32 { 0.3 }
fn default_recency_boost_days() -> i64 { 7 }
fn default_cycle_interval() -> u64 { 600 }
fn default_backfill_batch_size() -> usize { 16 }
fn default_digest_due_hour() -> u32 { 18 }
fn default_digest_min_gap_days() -> i64 { 6 }
fn default_contradiction_threshold() -> f64 { 0.7 }
fn default_contradiction_lookback_days() -> i64 { 30 }
fn default_contradiction_neighbors() -> usize { 5 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "recall".to_string() }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with defaults
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?

            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__SERVER__PORT=8081
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )

            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }

    /// Get the read database URL (falls back to primary)
    pub fn read_database_url(&self) -> &str {
        self.database.read_url.as_deref().unwrap_or(&self.database.url)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
                request_timeout_secs: default_request_timeout(),
                shutdown_timeout_secs: default_shutdown_timeout(),
            },
            database: DatabaseConfig {
                url: "postgres://localhost/recall".to_string(),
                read_url: None,
                max_connections: default_max_connections(),
                min_connections: default_min_connections(),
                connect_timeout_secs: default_connect_timeout(),
                idle_timeout_secs: default_idle_timeout(),
            },
            embedding: EmbeddingConfig {
                provider: default_embedding_provider(),
                api_key: None,
                api_base: None,
                model: default_embedding_model(),
                dimension: default_embedding_dimension(),
                timeout_secs: default_embedding_timeout(),
                max_retries: default_embedding_retries(),
                batch_size: default_batch_size(),
            },
            retrieval: RetrievalConfig::default(),
            insights: InsightsConfig {
                cycle_interval_secs: default_cycle_interval(),
                backfill_batch_size: default_backfill_batch_size(),
                digest_due_hour: default_digest_due_hour(),
                digest_min_gap_days: default_digest_min_gap_days(),
                contradiction_similarity_threshold: default_contradiction_threshold(),
                contradiction_lookback_days: default_contradiction_lookback_days(),
                contradiction_neighbors: default_contradiction_neighbors(),
            },
            observability: ObservabilityConfig {
                log_level: default_log_level(),
                json_logging: default_json_logging(),
                metrics_port: default_metrics_port(),
                service_name: default_service_name(),
            },
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            session_history_limit: default_session_history_limit(),
            vector_search_k: default_vector_search_k(),
            keyword_search_k: default_keyword_search_k(),
            mmr_diversity: default_mmr_diversity(),
            recency_boost_days: default_recency_boost_days(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.embedding.model, "bge-small-en-v1.5");
        assert_eq!(config.embedding.dimension, 384);
    }

    #[test]
    fn test_retrieval_defaults() {
        let config = RetrievalConfig::default();
        assert_eq!(config.top_k, 6);
        assert_eq!(config.session_history_limit, 10);
        assert_eq!(config.vector_search_k, 15);
        assert_eq!(config.keyword_search_k, 10);
        assert!((config.mmr_diversity - 0.3).abs() < f32::EPSILON);
        assert_eq!(config.recency_boost_days, 7);
    }

    #[test]
    fn test_read_database_fallback() {
        let config = AppConfig::default();
        assert_eq!(config.read_database_url(), "postgres://localhost/recall");
    }
}
