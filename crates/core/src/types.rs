use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Supported upstream marketing-data providers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    TagManager,
    Pixel,
    Commerce,
}

impl SourceType {
    /// Human-readable display name for this source.
    pub fn display_name(&self) -> &'static str {
        match self {
            SourceType::TagManager => "Google Tag Manager",
            SourceType::Pixel => "Facebook Pixel",
            SourceType::Commerce => "Shopify",
        }
    }

    /// Prefix carried by this source's namespaced event types.
    pub fn event_prefix(&self) -> &'static str {
        match self {
            SourceType::TagManager => "gtm_",
            SourceType::Pixel => "facebook_pixel_",
            SourceType::Commerce => "shopify_",
        }
    }

    /// Config fields a connection of this type must supply.
    pub fn required_config_fields(&self) -> &'static [&'static str] {
        match self {
            SourceType::TagManager => &["containerId"],
            SourceType::Pixel => &["pixelId", "accessToken"],
            SourceType::Commerce => &["shopDomain", "accessToken"],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SourceType::TagManager => "tag_manager",
            SourceType::Pixel => "pixel",
            SourceType::Commerce => "commerce",
        }
    }
}

/// Lifecycle status of a configured data source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSourceStatus {
    Active,
    Inactive,
    Error,
    NeedsReauth,
}

/// One configured connection to an upstream provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSourceConfig {
    pub id: Uuid,
    pub user_id: Uuid,
    pub source_type: SourceType,
    pub name: String,
    /// Provider-specific keys: container id, pixel id + token, shop domain + token.
    pub config: Value,
    pub status: DataSourceStatus,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub credential_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// An unvalidated, provider-shaped record returned by an adapter fetch.
/// Never persisted as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawEvent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<SourceType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_type: Option<String>,
    pub event_data: Value,
    pub timestamp: DateTime<Utc>,
}

impl RawEvent {
    pub fn new(event_type: impl Into<String>, event_data: Value, timestamp: DateTime<Utc>) -> Self {
        Self {
            source: None,
            event_type: Some(event_type.into()),
            event_data,
            timestamp,
        }
    }

    pub fn with_source(mut self, source: SourceType) -> Self {
        self.source = Some(source);
        self
    }
}

/// The common wrapper every canonical event's payload is stored in.
///
/// Field names are part of the produced interface and must stay camelCase
/// on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub source: SourceType,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub processed_at: DateTime<Utc>,
    pub data: Value,
}

/// The persisted, schema-checked representation of a raw event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataEvent {
    pub id: Uuid,
    pub data_source_id: Uuid,
    pub event_type: String,
    pub event_data: Envelope,
    pub processed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

/// Result of a connection test against an upstream provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionStatus {
    pub success: bool,
    pub message: String,
}

impl ConnectionStatus {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Result of a data source sync.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcome {
    pub success: bool,
    pub events_count: usize,
}
