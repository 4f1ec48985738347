use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `MARKETPULSE__`.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub ingestion: IngestionConfig,
    #[serde(default)]
    pub oauth: OauthConfig,
    #[serde(default)]
    pub hashing: HashingConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
}

/// Upstream fetch tuning: timeouts, page sizes, lookback window.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestionConfig {
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_commerce_page_size")]
    pub commerce_page_size: u32,
    #[serde(default = "default_pixel_page_size")]
    pub pixel_page_size: u32,
    #[serde(default = "default_lookback_days")]
    pub lookback_days: i64,
}

/// OAuth client settings for the tag-manager provider.
#[derive(Debug, Clone, Deserialize)]
pub struct OauthConfig {
    #[serde(default)]
    pub google_client_id: String,
    #[serde(default)]
    pub google_client_secret: String,
    #[serde(default)]
    pub redirect_uri: String,
    #[serde(default = "default_google_token_endpoint")]
    pub google_token_endpoint: String,
}

/// Salt for the one-way PII field hash.
#[derive(Debug, Clone, Deserialize)]
pub struct HashingConfig {
    #[serde(default = "default_hash_salt")]
    pub salt: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    /// Most-recent events considered per analysis call.
    #[serde(default = "default_event_window")]
    pub event_window: usize,
}

fn default_connect_timeout_secs() -> u64 {
    10
}
fn default_fetch_timeout_secs() -> u64 {
    30
}
fn default_commerce_page_size() -> u32 {
    50
}
fn default_pixel_page_size() -> u32 {
    100
}
fn default_lookback_days() -> i64 {
    7
}
fn default_google_token_endpoint() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}
fn default_hash_salt() -> String {
    "marketpulse-dev-salt".to_string()
}
fn default_event_window() -> usize {
    1000
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: default_connect_timeout_secs(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            commerce_page_size: default_commerce_page_size(),
            pixel_page_size: default_pixel_page_size(),
            lookback_days: default_lookback_days(),
        }
    }
}

impl Default for OauthConfig {
    fn default() -> Self {
        Self {
            google_client_id: String::new(),
            google_client_secret: String::new(),
            redirect_uri: String::new(),
            google_token_endpoint: default_google_token_endpoint(),
        }
    }
}

impl Default for HashingConfig {
    fn default() -> Self {
        Self {
            salt: default_hash_salt(),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            event_window: default_event_window(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ingestion: IngestionConfig::default(),
            oauth: OauthConfig::default(),
            hashing: HashingConfig::default(),
            analysis: AnalysisConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder().add_source(
            config::Environment::with_prefix("MARKETPULSE")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build()?;
        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.ingestion.connect_timeout_secs, 10);
        assert_eq!(config.ingestion.commerce_page_size, 50);
        assert_eq!(config.ingestion.lookback_days, 7);
        assert_eq!(config.analysis.event_window, 1000);
        assert!(config.oauth.google_token_endpoint.contains("googleapis"));
    }
}
