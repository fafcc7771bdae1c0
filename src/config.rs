use std::path::PathBuf;
use std::time::Duration;

/// Application-level constants
pub const APP_NAME: &str = "Chartfill";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get the application data directory (~/Chartfill/ on all platforms)
pub fn app_data_dir() -> PathBuf {
    let home = dirs::home_dir().expect("Cannot determine home directory");
    home.join("Chartfill")
}

/// Get the document storage directory (staged upload files)
pub fn storage_dir() -> PathBuf {
    app_data_dir().join("storage")
}

/// Default tracing filter when RUST_LOG is unset
pub fn default_log_filter() -> String {
    "chartfill=info,tower_http=warn".to_string()
}

/// Tunable limits and thresholds for the document pipeline.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum files accepted in a single batch submission.
    pub max_files_per_batch: usize,
    /// Maximum size of a single uploaded file in bytes (50 MB).
    pub max_file_bytes: u64,
    /// Bounded worker pool size for concurrent document pipelines.
    pub worker_concurrency: usize,
    /// Timeout for a single extraction service call. Extraction dominates
    /// pipeline latency (minutes per document); a timeout maps to the
    /// distinct `extraction_timeout` error cause.
    pub extraction_timeout: Duration,
    /// Sections below this confidence are flagged for the validator.
    pub confidence_flag_threshold: f32,
    /// Minimum jaro-winkler similarity for a fuzzy patient match.
    pub fuzzy_match_floor: f64,
    /// Minimum confidence to accept an ai_match suggestion before
    /// falling back to plain lookup behavior.
    pub ai_match_floor: f32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_files_per_batch: 50,
            max_file_bytes: 50 * 1024 * 1024,
            worker_concurrency: 4,
            extraction_timeout: Duration::from_secs(300),
            confidence_flag_threshold: 0.70,
            fuzzy_match_floor: 0.88,
            ai_match_floor: 0.75,
        }
    }
}

/// Server process configuration, read from environment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: String,
    pub db_path: PathBuf,
    pub storage_dir: PathBuf,
    pub extraction_url: String,
    pub pipeline: PipelineConfig,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let data_dir = std::env::var("CHARTFILL_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| app_data_dir());
        Self {
            bind_addr: std::env::var("CHARTFILL_BIND")
                .unwrap_or_else(|_| "127.0.0.1:8710".to_string()),
            db_path: data_dir.join("chartfill.db"),
            storage_dir: data_dir.join("storage"),
            extraction_url: std::env::var("CHARTFILL_EXTRACTION_URL")
                .unwrap_or_else(|_| "http://localhost:9411".to_string()),
            pipeline: PipelineConfig::default(),
        }
    }
}
