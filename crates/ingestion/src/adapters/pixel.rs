//! Ad-pixel adapter: stateless access to the graph API's event listing.
//!
//! User data is carried through un-hashed here; the transformer applies the
//! one-way hash before anything is persisted.

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use pulse_core::config::IngestionConfig;
use pulse_core::error::{PulseError, PulseResult};
use pulse_core::types::{ConnectionStatus, RawEvent, SourceType};

use super::{config_field, connect_timeout, fetch_timeout, SourceAdapter};

const GRAPH_BASE_URL: &str = "https://graph.facebook.com/v18.0";

pub struct PixelAdapter {
    http: reqwest::Client,
    ingestion: IngestionConfig,
}

impl PixelAdapter {
    pub fn new(ingestion: IngestionConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            ingestion,
        }
    }

    async fn get_json(
        &self,
        url: &str,
        query: &[(&str, &str)],
        timeout: std::time::Duration,
    ) -> PulseResult<Value> {
        let response = self
            .http
            .get(url)
            .query(query)
            .timeout(timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(%status, %body, url, "pixel API call failed");
            return Err(PulseError::Connection(format!(
                "pixel API returned {status}"
            )));
        }
        Ok(response.json().await?)
    }

    /// Pixel metadata: name, creation time, last fired time.
    pub async fn pixel_info(&self, config: &Value) -> PulseResult<Value> {
        let pixel_id = config_field(config, "pixelId")?;
        let access_token = config_field(config, "accessToken")?;

        self.get_json(
            &format!("{GRAPH_BASE_URL}/{pixel_id}"),
            &[
                ("access_token", access_token),
                (
                    "fields",
                    "id,name,creation_time,last_fired_time,is_created_by_business",
                ),
            ],
            fetch_timeout(&self.ingestion),
        )
        .await
    }
}

#[async_trait]
impl SourceAdapter for PixelAdapter {
    fn source_type(&self) -> SourceType {
        SourceType::Pixel
    }

    async fn test_connection(
        &self,
        _user_id: Uuid,
        config: &Value,
    ) -> PulseResult<ConnectionStatus> {
        let (pixel_id, access_token) = match (
            config_field(config, "pixelId"),
            config_field(config, "accessToken"),
        ) {
            (Ok(p), Ok(t)) => (p, t),
            _ => {
                return Ok(ConnectionStatus::failed(
                    "Missing required configuration: pixelId and accessToken",
                ))
            }
        };

        let result = self
            .get_json(
                &format!("{GRAPH_BASE_URL}/{pixel_id}"),
                &[
                    ("access_token", access_token),
                    ("fields", "id,name,creation_time"),
                ],
                connect_timeout(&self.ingestion),
            )
            .await;

        Ok(match result {
            Ok(_) => ConnectionStatus::ok("Facebook Pixel connection successful"),
            Err(_) => ConnectionStatus::failed("Facebook Pixel connection test failed"),
        })
    }

    async fn fetch_events(&self, _user_id: Uuid, config: &Value) -> PulseResult<Vec<RawEvent>> {
        let pixel_id = config_field(config, "pixelId")?;
        let access_token = config_field(config, "accessToken")?;
        let limit = self.ingestion.pixel_page_size.to_string();

        let response = self
            .get_json(
                &format!("{GRAPH_BASE_URL}/{pixel_id}/events"),
                &[("access_token", access_token), ("limit", limit.as_str())],
                fetch_timeout(&self.ingestion),
            )
            .await?;

        let events = map_events_response(&response);
        info!(pixel_id, count = events.len(), "fetched pixel events");
        Ok(events)
    }
}

/// One raw event per item in the graph API event listing.
fn map_events_response(response: &Value) -> Vec<RawEvent> {
    let Some(items) = response.get("data").and_then(Value::as_array) else {
        return Vec::new();
    };

    items
        .iter()
        .map(|event| {
            let timestamp = event
                .get("event_time")
                .and_then(|v| match v {
                    Value::Number(n) => n.as_i64(),
                    Value::String(s) => s.parse::<i64>().ok(),
                    _ => None,
                })
                .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
                .unwrap_or_else(Utc::now);

            RawEvent::new(
                "facebook_pixel_event",
                json!({
                    "eventId": event.get("id"),
                    "eventName": event.get("event_name"),
                    "eventTime": event.get("event_time"),
                    "eventSourceUrl": event.get("event_source_url"),
                    "userData": event.get("user_data"),
                    "customData": event.get("custom_data"),
                    "actionSource": event.get("action_source"),
                }),
                timestamp,
            )
            .with_source(SourceType::Pixel)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_listing_maps_to_raw_events() {
        let response = json!({
            "data": [
                {
                    "id": "evt-1",
                    "event_name": "Purchase",
                    "event_time": "1700000000",
                    "event_source_url": "https://shop.example.com/checkout",
                    "user_data": {"em": "raw@example.com"},
                    "custom_data": {"value": 25.0, "currency": "USD"},
                    "action_source": "website",
                },
                {"id": "evt-2", "event_name": "PageView", "event_time": 1700000100},
            ]
        });

        let events = map_events_response(&response);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type.as_deref(), Some("facebook_pixel_event"));
        assert_eq!(events[0].source, Some(SourceType::Pixel));
        // Raw PII passes through untouched at this stage
        assert_eq!(events[0].event_data["userData"]["em"], "raw@example.com");
        assert_eq!(events[0].timestamp.timestamp(), 1_700_000_000);
        assert_eq!(events[1].timestamp.timestamp(), 1_700_000_100);
    }

    #[test]
    fn test_missing_or_empty_data_maps_to_no_events() {
        assert!(map_events_response(&json!({})).is_empty());
        assert!(map_events_response(&json!({"data": []})).is_empty());
        assert!(map_events_response(&json!({"data": null})).is_empty());
    }

    #[tokio::test]
    async fn test_incomplete_config_is_soft_failure() {
        let adapter = PixelAdapter::new(IngestionConfig::default());
        let status = adapter
            .test_connection(Uuid::new_v4(), &json!({"pixelId": "123"}))
            .await
            .unwrap();
        assert!(!status.success);
        assert!(status.message.contains("pixelId and accessToken"));
    }
}
