use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_DIR: &str = ".comicrag";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub library: LibraryConfig,

    #[serde(default)]
    pub workers: WorkerConfig,

    #[serde(default)]
    pub analysis: AnalysisConfig,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub embeddings: EmbeddingsConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub stream: StreamConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryConfig {
    /// Root of the persisted comic library
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Scratch space for archive extraction
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Where uploaded archives wait for their task
    #[serde(default = "default_upload_dir")]
    pub upload_dir: PathBuf,

    /// Accepted page image extensions (lowercase, without dot)
    #[serde(default = "default_image_extensions")]
    pub image_extensions: Vec<String>,

    /// Substrings marking a file as a cover image
    #[serde(default = "default_cover_keywords")]
    pub cover_keywords: Vec<String>,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            temp_dir: default_temp_dir(),
            upload_dir: default_upload_dir(),
            image_extensions: default_image_extensions(),
            cover_keywords: default_cover_keywords(),
        }
    }
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data/comicdb")
}

fn default_temp_dir() -> PathBuf {
    PathBuf::from("tmp")
}

fn default_upload_dir() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_image_extensions() -> Vec<String> {
    ["png", "jpg", "jpeg", "webp", "bmp", "gif"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_cover_keywords() -> Vec<String> {
    vec!["cover".to_string(), "folder".to_string()]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Number of archives processed at the same time
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,

    /// Upper bound on how long an idle worker sleeps before re-checking the queue
    #[serde(default = "default_idle_poll_ms")]
    pub idle_poll_ms: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            pool_size: default_pool_size(),
            idle_poll_ms: default_idle_poll_ms(),
        }
    }
}

impl WorkerConfig {
    pub fn idle_poll(&self) -> Duration {
        Duration::from_millis(self.idle_poll_ms)
    }
}

fn default_pool_size() -> usize {
    4
}

fn default_idle_poll_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Maximum in-flight image analysis calls within one chapter
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,

    /// Fixed delay between image analysis attempts
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    /// Attempt limit for image analysis; unset retries forever
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            max_concurrency: default_max_concurrency(),
            retry_delay_secs: default_retry_delay_secs(),
            max_attempts: None,
        }
    }
}

fn default_max_concurrency() -> usize {
    4
}

fn default_retry_delay_secs() -> u64 {
    5
}

/// Chat model settings shared by the vision and summary clients
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// API key, or an environment reference like `${OPENAI_API_KEY}`
    #[serde(default)]
    pub api_key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default = "default_vision_model")]
    pub vision_model: String,

    #[serde(default = "default_summary_model")]
    pub summary_model: String,

    #[serde(default = "default_vision_max_tokens")]
    pub vision_max_tokens: u32,

    #[serde(default = "default_summary_max_tokens")]
    pub summary_max_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: None,
            vision_model: default_vision_model(),
            summary_model: default_summary_model(),
            vision_max_tokens: default_vision_max_tokens(),
            summary_max_tokens: default_summary_max_tokens(),
        }
    }
}

fn default_vision_model() -> String {
    "gpt-4-vision-preview".to_string()
}

fn default_summary_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_vision_max_tokens() -> u32 {
    2048
}

fn default_summary_max_tokens() -> u32 {
    16384
}

impl GenerationConfig {
    /// Resolve the API key from configuration or environment
    pub fn load_api_key(&self) -> Result<String> {
        resolve_api_key(&self.api_key)
    }
}

/// Embedding provider selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    OpenAI,
    FastEmbed,
}

impl Default for EmbeddingProviderKind {
    fn default() -> Self {
        Self::OpenAI
    }
}

impl std::fmt::Display for EmbeddingProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::OpenAI => write!(f, "openai"),
            Self::FastEmbed => write!(f, "fastembed"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    #[serde(default)]
    pub provider: EmbeddingProviderKind,

    /// Embedding model name
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Override for the vector dimension (otherwise derived from the model)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimension: Option<usize>,

    /// API key for the OpenAI provider; falls back to `generation.api_key`
    #[serde(default)]
    pub api_key: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::default(),
            model: default_embedding_model(),
            dimension: None,
            api_key: String::new(),
            base_url: None,
        }
    }
}

fn default_embedding_model() -> String {
    "text-embedding-ada-002".to_string()
}

/// Vector index backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// Persistent LanceDB table
    Lancedb,
    /// In-process index, lost on restart
    Memory,
}

impl Default for StorageBackend {
    fn default() -> Self {
        Self::Lancedb
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,

    /// Path to the LanceDB database (relative to the library data dir)
    #[serde(default = "default_db_path")]
    pub db_path: String,

    #[serde(default = "default_table")]
    pub table: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::default(),
            db_path: default_db_path(),
            table: default_table(),
        }
    }
}

fn default_db_path() -> String {
    "index.lance".to_string()
}

fn default_table() -> String {
    "comic_chapters".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_http_host")]
    pub host: String,

    #[serde(default = "default_http_port")]
    pub port: u16,

    /// Largest accepted archive upload
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_http_host(),
            port: default_http_port(),
            max_upload_mb: default_max_upload_mb(),
        }
    }
}

impl ServerConfig {
    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_mb.saturating_mul(1024 * 1024)
    }
}

fn default_http_host() -> String {
    "127.0.0.1".to_string()
}

fn default_http_port() -> u16 {
    5001
}

fn default_max_upload_mb() -> usize {
    1024
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Number of nearest chapters fetched per query
    #[serde(default = "default_search_limit")]
    pub default_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: default_search_limit(),
        }
    }
}

fn default_search_limit() -> usize {
    1000
}

/// Live push settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamConfig {
    /// Latency bound for the tail loop when no change notification arrives
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,

    /// Replay the history of streams that already ended to late subscribers
    #[serde(default)]
    pub replay_finished_streams: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            keep_alive_secs: default_keep_alive_secs(),
            replay_finished_streams: false,
        }
    }
}

impl StreamConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_keep_alive_secs() -> u64 {
    15
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Write logs to a rolling file
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Also log to stderr
    #[serde(default = "default_true")]
    pub stderr: bool,

    /// File log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_dir")]
    pub directory: PathBuf,

    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,

    /// hourly, daily, minutely or never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            stderr: true,
            level: default_log_level(),
            directory: default_log_dir(),
            file_prefix: default_file_prefix(),
            rotation: default_rotation(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_file_prefix() -> String {
    "processing.log".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

/// Resolve an API key: explicit value, `${VAR}` reference, then `OPENAI_API_KEY`.
pub fn resolve_api_key(configured: &str) -> Result<String> {
    if !configured.is_empty() && !configured.starts_with("${") {
        return Ok(configured.to_string());
    }

    if configured.starts_with("${") && configured.ends_with('}') {
        let var_name = &configured[2..configured.len() - 1];
        return std::env::var(var_name)
            .with_context(|| format!("Environment variable {} not set", var_name));
    }

    std::env::var("OPENAI_API_KEY")
        .context("No API key configured and OPENAI_API_KEY environment variable not set")
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().trim_start_matches('.').to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

impl Config {
    /// Load configuration from the .comicrag directory, then apply environment overrides
    pub fn load(root: &Path) -> Result<Self> {
        let config_path = root.join(CONFIG_DIR).join(CONFIG_FILE);

        let mut config = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config from {:?}", config_path))?;

            toml::from_str(&content)
                .with_context(|| format!("Failed to parse config from {:?}", config_path))?
        } else {
            Config::default()
        };

        config.apply_env_overrides(|key| std::env::var(key).ok());
        config.resolve_paths(root);
        Ok(config)
    }

    /// Save configuration to the .comicrag directory
    pub fn save(&self, root: &Path) -> Result<()> {
        let config_dir = root.join(CONFIG_DIR);
        let config_path = config_dir.join(CONFIG_FILE);

        std::fs::create_dir_all(&config_dir)
            .with_context(|| format!("Failed to create config directory {:?}", config_dir))?;

        let content =
            toml::to_string_pretty(self).with_context(|| "Failed to serialize config")?;

        std::fs::write(&config_path, content)
            .with_context(|| format!("Failed to write config to {:?}", config_path))?;

        Ok(())
    }

    /// Apply the environment variables understood by existing deployments.
    ///
    /// `lookup` is injected so tests don't have to mutate the process environment.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("DATA_BASE_PATH") {
            self.library.data_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("TEMP_FOLDER") {
            self.library.temp_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup("SUPPORTED_FORMATS") {
            let list = split_list(&v);
            if !list.is_empty() {
                self.library.image_extensions = list;
            }
        }
        if let Some(v) = lookup("COVER_NAMES") {
            let list = split_list(&v);
            if !list.is_empty() {
                self.library.cover_keywords = list;
            }
        }
        if let Some(v) = lookup("MAX_CONCURRENT_REQUESTS") {
            match v.trim().parse::<usize>() {
                Ok(n) if n > 0 => self.analysis.max_concurrency = n,
                _ => tracing::warn!(value = %v, "Ignoring invalid MAX_CONCURRENT_REQUESTS"),
            }
        }
        if let Some(v) = lookup("OPENAI_API_BASE") {
            self.generation.base_url = Some(v.clone());
            if self.embeddings.base_url.is_none() {
                self.embeddings.base_url = Some(v);
            }
        }
        if let Some(v) = lookup("VISION_MODEL") {
            self.generation.vision_model = v;
        }
        if let Some(v) = lookup("SUMMARY_MODEL") {
            self.generation.summary_model = v;
        }
        if let Some(v) = lookup("EMBEDDING_MODEL") {
            self.embeddings.model = v;
        }
    }

    /// Make relative library and log paths relative to `root`
    fn resolve_paths(&mut self, root: &Path) {
        for path in [
            &mut self.library.data_dir,
            &mut self.library.temp_dir,
            &mut self.library.upload_dir,
            &mut self.logging.directory,
        ] {
            if path.is_relative() {
                *path = root.join(&*path);
            }
        }
    }

    /// Whether `root` already holds a config file
    pub fn is_initialized(root: &Path) -> bool {
        root.join(CONFIG_DIR).join(CONFIG_FILE).exists()
    }

    /// Get the path to the .comicrag directory
    pub fn comicrag_dir(root: &Path) -> PathBuf {
        root.join(CONFIG_DIR)
    }

    /// Get the path to the LanceDB database
    pub fn db_path(&self) -> PathBuf {
        self.library.data_dir.join(&self.storage.db_path)
    }

    /// Image analysis retry delay
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.analysis.retry_delay_secs)
    }
}
