use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ConfigError;
use crate::shape::OutputSpec;
use crate::transport::RetryPolicy;

pub const DEFAULT_UPLOAD_URL: &str =
    "https://labeling-m.turing.com/api/batches/upload/rlhf-metadata";
pub const DEFAULT_BATCHES_URL: &str = "https://labeling-m.turing.com/api/batches";
pub const DEFAULT_DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

/// Seconds to wait between files when publishing a whole directory unattended.
pub const UNATTENDED_DELAY_SECS: u64 = 60;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub transport: TransportConfig,
    pub publish: PublishConfig,
    pub crawl: CrawlConfig,
    pub batch: BatchConfig,
    pub output: Option<OutputSpec>,
}

impl Config {
    pub fn trace_loaded(&self) {
        info!(
            connect_timeout_secs = self.transport.connect_timeout_secs,
            read_timeout_secs = self.transport.read_timeout_secs,
            verify_tls = self.transport.verify_tls,
            project_id = self.publish.project_id,
            output_mapping = self.output.is_some(),
            "Loaded Config"
        );
        debug!(?self, "Config loaded (full debug)");
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.transport.validate()?;
        self.crawl.validate()?;
        self.batch.validate()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub connect_timeout_secs: u64,
    pub read_timeout_secs: u64,
    pub max_retries: u32,
    pub backoff_factor_secs: f64,
    pub verify_tls: bool,
    pub user_agent: String,
}

impl Default for TransportConfig {
    fn default() -> Self {
        TransportConfig {
            connect_timeout_secs: 20,
            read_timeout_secs: 600,
            max_retries: 4,
            backoff_factor_secs: 1.5,
            verify_tls: true,
            user_agent: "harvest-uploader/1.0".to_string(),
        }
    }
}

impl TransportConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            backoff_factor: Duration::try_from_secs_f64(self.backoff_factor_secs)
                .unwrap_or_default(),
            ..RetryPolicy::default()
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        check_range("transport.connect_timeout_secs", self.connect_timeout_secs, 5, 120)?;
        check_range("transport.read_timeout_secs", self.read_timeout_secs, 60, 1800)?;
        check_range("transport.max_retries", self.max_retries, 0, 10)?;
        if !(self.backoff_factor_secs.is_finite() && (0.0..=60.0).contains(&self.backoff_factor_secs)) {
            return Err(out_of_range("transport.backoff_factor_secs", self.backoff_factor_secs, 0, 60));
        }
        Ok(())
    }
}

/// Remote annotation platform endpoints and the project batches are registered under.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    pub upload_url: String,
    pub batches_url: String,
    pub project_id: i64,
    pub project_name: String,
    pub project_type: String,
}

impl Default for PublishConfig {
    fn default() -> Self {
        PublishConfig {
            upload_url: DEFAULT_UPLOAD_URL.to_string(),
            batches_url: DEFAULT_BATCHES_URL.to_string(),
            project_id: 0,
            project_name: String::new(),
            project_type: "rlhf".to_string(),
        }
    }
}

impl PublishConfig {
    /// Publishing needs a project to register batches under; crawling does not.
    pub fn validate_identity(&self) -> Result<(), ConfigError> {
        if self.project_id <= 0 {
            return Err(ConfigError::Missing {
                field: "publish.project_id",
            });
        }
        if self.project_name.trim().is_empty() {
            return Err(ConfigError::Missing {
                field: "publish.project_name",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    pub api_base: String,
    pub page_size: u32,
    pub max_page_attempts: u32,
    pub page_backoff_base: f64,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        CrawlConfig {
            api_base: DEFAULT_DRIVE_API_BASE.to_string(),
            page_size: 1000,
            max_page_attempts: 5,
            page_backoff_base: 1.5,
        }
    }
}

impl CrawlConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        check_range("crawl.page_size", self.page_size, 1, 1000)?;
        check_range("crawl.max_page_attempts", self.max_page_attempts, 1, 10)?;
        if !(self.page_backoff_base.is_finite() && (1.0..=10.0).contains(&self.page_backoff_base)) {
            return Err(out_of_range("crawl.page_backoff_base", self.page_backoff_base, 1, 10));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Pause between files; when unset each command picks its own default.
    pub delay_secs: Option<u64>,
    pub log_file: PathBuf,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfig {
            delay_secs: None,
            log_file: PathBuf::from("batch_upload_log.json"),
        }
    }
}

impl BatchConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(delay) = self.delay_secs {
            check_range("batch.delay_secs", delay, 0, 300)?;
        }
        Ok(())
    }
}

fn check_range<T>(field: &'static str, value: T, min: T, max: T) -> Result<(), ConfigError>
where
    T: PartialOrd + ToString,
{
    if value < min || value > max {
        return Err(ConfigError::OutOfRange {
            field,
            value: value.to_string(),
            min: min.to_string(),
            max: max.to_string(),
        });
    }
    Ok(())
}

fn out_of_range(field: &'static str, value: f64, min: u32, max: u32) -> ConfigError {
    ConfigError::OutOfRange {
        field,
        value: value.to_string(),
        min: min.to_string(),
        max: max.to_string(),
    }
}
