use serde::Deserialize;
use std::{path::PathBuf, time::Duration};
use thiserror::Error;

pub static USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

#[derive(Error, Debug)]
pub enum GrabError {
    #[error("webdriver error: {0}")]
    WebDriver(#[from] thirtyfour::error::WebDriverError),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("no data for {0:?}")]
    Timeout(Duration),

    #[error("unexpected status {0}")]
    Status(reqwest::StatusCode),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid url: {0}")]
    Url(#[from] url::ParseError),

    #[error("unknown error: {0}")]
    Unknown(#[from] anyhow::Error),
}

/// Fixed-delay retry discipline: at most `attempts` tries, `delay_ms` between
/// consecutive tries. No backoff, no jitter.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay_ms: u64,
}

impl RetryPolicy {
    pub const fn new(attempts: u32, delay_ms: u64) -> Self {
        Self { attempts, delay_ms }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }

    /// Sleeps between attempts. Called before every attempt but the first.
    pub async fn pause(&self, attempt: u32) {
        if attempt > 1 && self.delay_ms > 0 {
            tokio::time::sleep(self.delay()).await;
        }
    }
}

fn default_community() -> String {
    "https://steamcommunity.com".to_string()
}

fn default_driver() -> String {
    "http://localhost:9515".to_string()
}

fn default_download_dir() -> PathBuf {
    PathBuf::from("steam_screenshots")
}

fn default_output_file() -> PathBuf {
    PathBuf::from("output.txt")
}

fn default_log_file() -> PathBuf {
    PathBuf::from("log.txt")
}

fn default_max_pages() -> u32 {
    299
}

fn default_gallery_settle_ms() -> u64 {
    3000
}

fn default_detail_settle_ms() -> u64 {
    2000
}

fn default_extract_retry() -> RetryPolicy {
    RetryPolicy::new(6, 1000)
}

fn default_download_retry() -> RetryPolicy {
    RetryPolicy::new(3, 2000)
}

fn default_download_timeout() -> u64 {
    10
}

fn default_detail_pattern() -> String {
    "/sharedfiles/filedetails/".to_string()
}

fn default_asset_pattern() -> String {
    ".steamusercontent.com/ugc/".to_string()
}

#[derive(Deserialize, Debug, Clone)]
pub struct Config {
    pub profile: String,
    #[serde(default = "default_community")]
    pub community: String,

    #[serde(default = "default_driver")]
    pub driver: String,
    pub chromedriver: Option<PathBuf>,
    pub chrome_binary: Option<String>,
    pub user_data_dir: Option<String>,
    pub profile_directory: Option<String>,
    #[serde(default)]
    pub headless: bool,

    #[serde(default = "default_download_dir")]
    pub download_dir: PathBuf,
    #[serde(default = "default_output_file")]
    pub output_file: PathBuf,
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,

    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    #[serde(default = "default_gallery_settle_ms")]
    pub gallery_settle_ms: u64,
    #[serde(default = "default_detail_settle_ms")]
    pub detail_settle_ms: u64,
    #[serde(default = "default_extract_retry")]
    pub gallery_retry: RetryPolicy,
    #[serde(default = "default_extract_retry")]
    pub detail_retry: RetryPolicy,
    #[serde(default = "default_download_retry")]
    pub download_retry: RetryPolicy,
    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,

    #[serde(default = "default_detail_pattern")]
    pub detail_pattern: String,
    #[serde(default = "default_asset_pattern")]
    pub asset_pattern: String,
}

impl Config {
    pub fn from_json(text: &str) -> anyhow::Result<Self> {
        let config: Config = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.profile.trim().is_empty() {
            anyhow::bail!("profile must not be empty");
        }

        for (name, policy) in [
            ("gallery_retry", self.gallery_retry),
            ("detail_retry", self.detail_retry),
            ("download_retry", self.download_retry),
        ] {
            if policy.attempts == 0 {
                anyhow::bail!("{} needs at least one attempt", name);
            }
        }

        Ok(())
    }

    pub fn gallery_settle(&self) -> Duration {
        Duration::from_millis(self.gallery_settle_ms)
    }

    pub fn detail_settle(&self) -> Duration {
        Duration::from_millis(self.detail_settle_ms)
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    /// Port of the WebDriver endpoint, used when spawning chromedriver.
    pub fn driver_port(&self) -> anyhow::Result<u16> {
        let url = url::Url::parse(&self.driver)?;
        url.port_or_known_default()
            .ok_or_else(|| anyhow::anyhow!("driver endpoint {} has no port", self.driver))
    }
}

/// Everything a walk produced. `urls` is in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunResult {
    pub urls: Vec<String>,
    pub pages: u32,
    pub failed: usize,
}
