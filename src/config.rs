//! Configuration for the measure crawler.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::retry::RetryConfig;
use crate::scraper::{RateLimiter, BASE_URL};

/// Portal addressing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Substrings of the final URL that mean "redirected to the error page"
    #[serde(default = "default_not_found_markers")]
    pub not_found_markers: Vec<String>,
}

fn default_base_url() -> String {
    BASE_URL.to_string()
}

fn default_not_found_markers() -> Vec<String> {
    vec!["/error".to_string(), "/404".to_string(), "not-found".to_string()]
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            not_found_markers: default_not_found_markers(),
        }
    }
}

/// Browser launch and navigation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BrowserSettings {
    /// Chrome binary; falls back to `CHROME_PATH`, then the platform default
    #[serde(default)]
    pub chrome_path: Option<String>,
    #[serde(default = "default_headless")]
    pub headless: bool,
    #[serde(default = "default_window_width")]
    pub window_width: u32,
    #[serde(default = "default_window_height")]
    pub window_height: u32,
    #[serde(default)]
    pub user_agent: Option<String>,
    #[serde(default = "default_navigation_timeout_ms")]
    pub navigation_timeout_ms: u64,
    #[serde(default = "default_launch_timeout_ms")]
    pub launch_timeout_ms: u64,
    /// Reload once after navigating so the SPA re-renders for the new route
    #[serde(default = "default_reload_after_navigate")]
    pub reload_after_navigate: bool,
    #[serde(default)]
    pub extra_args: Vec<String>,
}

fn default_headless() -> bool {
    true
}

fn default_window_width() -> u32 {
    1920
}

fn default_window_height() -> u32 {
    1080
}

fn default_navigation_timeout_ms() -> u64 {
    60_000
}

fn default_launch_timeout_ms() -> u64 {
    30_000
}

fn default_reload_after_navigate() -> bool {
    true
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            chrome_path: None,
            headless: default_headless(),
            window_width: default_window_width(),
            window_height: default_window_height(),
            user_agent: None,
            navigation_timeout_ms: default_navigation_timeout_ms(),
            launch_timeout_ms: default_launch_timeout_ms(),
            reload_after_navigate: default_reload_after_navigate(),
            extra_args: Vec::new(),
        }
    }
}

impl BrowserSettings {
    pub fn navigation_timeout(&self) -> Duration {
        Duration::from_millis(self.navigation_timeout_ms)
    }

    pub fn launch_timeout(&self) -> Duration {
        Duration::from_millis(self.launch_timeout_ms)
    }

    /// Resolve the Chrome executable to launch
    pub fn executable(&self) -> String {
        if let Some(path) = self.chrome_path.as_deref().filter(|p| !p.trim().is_empty()) {
            return path.to_string();
        }
        if let Ok(path) = std::env::var("CHROME_PATH") {
            if !path.trim().is_empty() {
                return path;
            }
        }
        if cfg!(target_os = "macos") {
            "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome".to_string()
        } else if cfg!(target_os = "windows") {
            "C:\\Program Files\\Google\\Chrome\\Application\\chrome.exe".to_string()
        } else {
            "google-chrome".to_string()
        }
    }
}

/// Render-completion gate settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    #[serde(default = "default_gate_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Loading indicator that must be gone; empty disables the check
    #[serde(default = "default_loading_selector")]
    pub loading_selector: String,
    /// Element that must be present once the page has rendered, in addition
    /// to the section root; empty disables the check
    #[serde(default = "default_ready_selector")]
    pub ready_selector: String,
}

fn default_gate_timeout_ms() -> u64 {
    30_000
}

fn default_poll_interval_ms() -> u64 {
    250
}

fn default_loading_selector() -> String {
    "span.fa-spinner".to_string()
}

fn default_ready_selector() -> String {
    "h1".to_string()
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_gate_timeout_ms(),
            poll_interval_ms: default_poll_interval_ms(),
            loading_selector: default_loading_selector(),
            ready_selector: default_ready_selector(),
        }
    }
}

impl GateConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

/// Per-page retry settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    /// Total attempts per page, first one included
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
}

fn default_max_attempts() -> u32 {
    2
}

fn default_initial_delay_ms() -> u64 {
    2_000
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_multiplier() -> f64 {
    2.0
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
        }
    }
}

impl RetrySettings {
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_attempts.max(1) - 1,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            multiplier: self.multiplier,
        }
    }
}

/// Navigation pacing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_requests_per_minute")]
    pub requests_per_minute: u32,
    #[serde(default = "default_min_delay_secs")]
    pub min_delay_secs: f64,
    #[serde(default = "default_max_delay_secs")]
    pub max_delay_secs: f64,
}

fn default_requests_per_minute() -> u32 {
    30
}

fn default_min_delay_secs() -> f64 {
    0.5
}

fn default_max_delay_secs() -> f64 {
    1.5
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_minute: default_requests_per_minute(),
            min_delay_secs: default_min_delay_secs(),
            max_delay_secs: default_max_delay_secs(),
        }
    }
}

impl RateLimitConfig {
    pub fn limiter(&self) -> RateLimiter {
        RateLimiter::new(
            self.requests_per_minute,
            self.min_delay_secs,
            self.max_delay_secs,
        )
    }
}

/// Flat table format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Csv,
    Parquet,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            OutputFormat::Csv => "csv",
            OutputFormat::Parquet => "parquet",
        }
    }
}

/// Output locations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_dir")]
    pub dir: String,
    #[serde(default = "default_output_prefix")]
    pub prefix: String,
    #[serde(default)]
    pub format: OutputFormat,
}

fn default_output_dir() -> String {
    "output".to_string()
}

fn default_output_prefix() -> String {
    "cmit_scrape_flat".to_string()
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            prefix: default_output_prefix(),
            format: OutputFormat::default(),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub portal: PortalConfig,
    #[serde(default)]
    pub browser: BrowserSettings,
    #[serde(default)]
    pub gate: GateConfig,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl AppConfig {
    /// Load configuration from defaults, a config file and the environment.
    ///
    /// Without `path`, an optional `crawler.{toml,yaml,json}` in the working
    /// directory is used.
    pub fn load(path: Option<&str>) -> anyhow::Result<Self> {
        let file = match path {
            Some(path) => config::File::with_name(path).required(true),
            None => config::File::with_name("crawler").required(false),
        };

        let config = config::Config::builder()
            // Start with defaults
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(file)
            // Override with environment variables (CRAWLER_GATE__TIMEOUT_MS, etc.)
            .add_source(
                config::Environment::with_prefix("CRAWLER")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(config.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.portal.base_url, "https://cmit.cms.gov/cmit/#/MeasureView");
        assert_eq!(config.gate.loading_selector, "span.fa-spinner");
        assert_eq!(config.retry.max_attempts, 2);
        assert_eq!(config.output.format, OutputFormat::Csv);
        assert!(config.browser.reload_after_navigate);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: AppConfig = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default()).unwrap())
            .add_source(config::File::from_str(
                r#"
                [gate]
                timeout_ms = 45000

                [output]
                format = "parquet"
                "#,
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.gate.timeout(), Duration::from_secs(45));
        assert_eq!(config.gate.poll_interval(), Duration::from_millis(250));
        assert_eq!(config.output.format, OutputFormat::Parquet);
        assert_eq!(config.output.prefix, "cmit_scrape_flat");
    }

    #[test]
    fn test_retry_settings_to_backoff() {
        let retry = RetrySettings::default().retry_config();
        assert_eq!(retry.max_retries, 1);
        assert_eq!(retry.total_attempts(), 2);

        let single = RetrySettings {
            max_attempts: 0,
            ..Default::default()
        };
        assert_eq!(single.retry_config().total_attempts(), 1);
    }

    #[test]
    fn test_explicit_chrome_path_wins() {
        let settings = BrowserSettings {
            chrome_path: Some("/opt/chrome/chrome".to_string()),
            ..Default::default()
        };
        assert_eq!(settings.executable(), "/opt/chrome/chrome");
    }
}
