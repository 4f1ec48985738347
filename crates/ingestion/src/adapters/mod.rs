//! Source adapters — one per upstream provider, behind a common trait.

mod commerce;
mod pixel;
mod tag_manager;

pub use commerce::CommerceAdapter;
pub use pixel::PixelAdapter;
pub use tag_manager::TagManagerAdapter;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use pulse_core::config::{IngestionConfig, OauthConfig};
use pulse_core::error::{PulseError, PulseResult};
use pulse_core::types::{ConnectionStatus, RawEvent, SourceType};

use crate::credentials::{CredentialStore, TokenManager};

/// Common contract all upstream providers are driven through.
///
/// `test_connection` reports soft failures as a structured status;
/// `fetch_events` surfaces hard failures as errors for the caller to
/// translate into data source state.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    fn source_type(&self) -> SourceType;

    async fn test_connection(
        &self,
        user_id: Uuid,
        config: &Value,
    ) -> PulseResult<ConnectionStatus>;

    async fn fetch_events(&self, user_id: Uuid, config: &Value) -> PulseResult<Vec<RawEvent>>;
}

/// Build the adapter for one source type.
pub fn build_adapter(
    source_type: SourceType,
    ingestion: &IngestionConfig,
    oauth: &OauthConfig,
    credentials: Arc<dyn CredentialStore>,
) -> Arc<dyn SourceAdapter> {
    match source_type {
        SourceType::TagManager => {
            let tokens = Arc::new(TokenManager::new(oauth.clone(), credentials.clone()));
            Arc::new(TagManagerAdapter::new(ingestion.clone(), credentials, tokens))
        }
        SourceType::Pixel => Arc::new(PixelAdapter::new(ingestion.clone())),
        SourceType::Commerce => Arc::new(CommerceAdapter::new(ingestion.clone())),
    }
}

/// One adapter per supported source type.
pub fn default_adapters(
    ingestion: &IngestionConfig,
    oauth: &OauthConfig,
    credentials: Arc<dyn CredentialStore>,
) -> HashMap<SourceType, Arc<dyn SourceAdapter>> {
    [SourceType::TagManager, SourceType::Pixel, SourceType::Commerce]
        .into_iter()
        .map(|st| {
            (
                st,
                build_adapter(st, ingestion, oauth, credentials.clone()),
            )
        })
        .collect()
}

pub(crate) fn connect_timeout(ingestion: &IngestionConfig) -> Duration {
    Duration::from_secs(ingestion.connect_timeout_secs)
}

pub(crate) fn fetch_timeout(ingestion: &IngestionConfig) -> Duration {
    Duration::from_secs(ingestion.fetch_timeout_secs)
}

/// Pull a required string field out of a provider config map.
pub(crate) fn config_field<'a>(config: &'a Value, key: &str) -> PulseResult<&'a str> {
    config
        .get(key)
        .and_then(Value::as_str)
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| PulseError::Config(format!("missing required configuration: {key}")))
}
