//! Event processor: turns raw provider payloads into persisted canonical
//! events.
//!
//! The per-event loop is the pipeline's isolation boundary. Every failure
//! below it — inference, structural validation, transformation, schema
//! mismatch, persistence — is caught, logged with the offending payload,
//! and converted into a drop so the rest of the batch continues.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use pulse_core::error::PulseResult;
use pulse_core::types::{DataEvent, RawEvent, SourceType};

use crate::schema::SchemaRegistry;
use crate::store::EventRepository;
use crate::transformer::Transformer;
use crate::validator;

/// Payload-shape rules for source inference, evaluated in order.
const SOURCE_SHAPE_RULES: &[(&str, SourceType)] = &[
    ("tagId", SourceType::TagManager),
    ("triggerId", SourceType::TagManager),
    ("variableId", SourceType::TagManager),
    ("eventId", SourceType::Pixel),
    ("eventName", SourceType::Pixel),
    ("orderId", SourceType::Commerce),
    ("customerId", SourceType::Commerce),
    ("productId", SourceType::Commerce),
];

/// Payload-shape rules for event-type inference, evaluated in order.
const EVENT_TYPE_SHAPE_RULES: &[(&str, &str)] = &[
    ("tagId", "gtm_tag"),
    ("triggerId", "gtm_trigger"),
    ("variableId", "gtm_variable"),
    ("eventId", "facebook_pixel_event"),
    ("orderId", "shopify_order"),
    ("customerId", "shopify_customer"),
    ("productId", "shopify_product"),
];

/// Infer the source type: explicit tag, then event-type prefix, then
/// payload shape.
pub fn infer_source_type(event: &RawEvent) -> Option<SourceType> {
    if let Some(source) = event.source {
        return Some(source);
    }

    if let Some(event_type) = event.event_type.as_deref() {
        for source in [SourceType::TagManager, SourceType::Pixel, SourceType::Commerce] {
            if event_type.starts_with(source.event_prefix()) {
                return Some(source);
            }
        }
    }

    SOURCE_SHAPE_RULES
        .iter()
        .find(|(field, _)| has_field(&event.event_data, field))
        .map(|(_, source)| *source)
}

/// Infer the namespaced event type: explicit field, then payload shape.
pub fn infer_event_type(event: &RawEvent) -> Option<String> {
    if let Some(event_type) = event.event_type.as_deref() {
        if !event_type.is_empty() {
            return Some(event_type.to_string());
        }
    }

    EVENT_TYPE_SHAPE_RULES
        .iter()
        .find(|(field, _)| has_field(&event.event_data, field))
        .map(|(_, event_type)| (*event_type).to_string())
}

fn has_field(data: &Value, field: &str) -> bool {
    data.get(field).map(|v| !v.is_null()).unwrap_or(false)
}

/// Per-event-type counts and recency for one data source.
#[derive(Debug, Clone)]
pub struct EventStats {
    pub total_events: usize,
    pub event_types: HashMap<String, usize>,
    pub recent_events: Vec<DataEvent>,
    pub last_processed: Option<DateTime<Utc>>,
}

pub struct EventProcessor {
    events: Arc<dyn EventRepository>,
    transformer: Arc<Transformer>,
    schemas: Arc<SchemaRegistry>,
}

impl EventProcessor {
    pub fn new(
        events: Arc<dyn EventRepository>,
        transformer: Arc<Transformer>,
        schemas: Arc<SchemaRegistry>,
    ) -> Self {
        Self {
            events,
            transformer,
            schemas,
        }
    }

    /// Process a fetched batch. One event's failure never aborts the rest.
    pub async fn process_events(
        &self,
        raw_events: &[RawEvent],
        data_source_id: Uuid,
    ) -> Vec<DataEvent> {
        let mut processed = Vec::new();

        for event in raw_events {
            match self.process_event(event, data_source_id).await {
                Ok(Some(data_event)) => processed.push(data_event),
                Ok(None) => {}
                Err(e) => {
                    warn!(error = %e, raw = %event.event_data, "failed to persist event");
                }
            }
        }

        processed
    }

    async fn process_event(
        &self,
        event: &RawEvent,
        data_source_id: Uuid,
    ) -> PulseResult<Option<DataEvent>> {
        let Some(source_type) = infer_source_type(event) else {
            warn!(raw = %event.event_data, "unable to infer source type, dropping event");
            return Ok(None);
        };
        let Some(event_type) = infer_event_type(event) else {
            warn!(raw = %event.event_data, "unable to infer event type, dropping event");
            return Ok(None);
        };

        if !validator::validate_raw_event(event) {
            warn!(raw = %event.event_data, "raw event failed structural check, dropping");
            return Ok(None);
        }

        let envelope = self
            .transformer
            .transform_event(source_type, &event_type, &event.event_data);

        if !self
            .schemas
            .validate_against_schema(&envelope.data, source_type, &event_type)
        {
            warn!(
                %event_type,
                raw = %event.event_data,
                "transformed event does not match schema, dropping"
            );
            return Ok(None);
        }

        let now = Utc::now();
        let data_event = DataEvent {
            id: Uuid::new_v4(),
            data_source_id,
            event_type,
            event_data: envelope,
            processed_at: now,
            created_at: now,
        };

        Ok(Some(self.events.insert(data_event).await?))
    }

    /// Re-run transform + schema mapping against each stored event's
    /// envelope data, overwriting the stored envelope in place on success.
    pub async fn reprocess_events(
        &self,
        data_source_id: Uuid,
        event_ids: &[Uuid],
    ) -> Vec<DataEvent> {
        let stored = self.events.find_by_ids(data_source_id, event_ids).await;
        let mut reprocessed = Vec::new();

        for mut event in stored {
            let source_type = event.event_data.source;
            let event_type = event.event_data.event_type.clone();

            let envelope =
                self.transformer
                    .transform_event(source_type, &event_type, &event.event_data.data);

            if !self
                .schemas
                .validate_against_schema(&envelope.data, source_type, &event_type)
            {
                warn!(event_id = %event.id, %event_type, "reprocessed event failed schema check, skipping");
                continue;
            }

            let now = Utc::now();
            match self
                .events
                .replace_event_data(event.id, envelope.clone(), now)
                .await
            {
                Ok(()) => {
                    event.event_data = envelope;
                    event.processed_at = now;
                    reprocessed.push(event);
                }
                Err(e) => {
                    warn!(event_id = %event.id, error = %e, "failed to overwrite reprocessed event");
                }
            }
        }

        reprocessed
    }

    /// Aggregate counts for one data source.
    pub async fn event_stats(&self, data_source_id: Uuid) -> EventStats {
        let total_events = self.events.count(data_source_id).await;
        let all = self.events.find_recent(data_source_id, total_events, 0).await;

        let mut event_types: HashMap<String, usize> = HashMap::new();
        for event in &all {
            *event_types.entry(event.event_type.clone()).or_default() += 1;
        }

        let recent_events: Vec<DataEvent> = all.iter().take(10).cloned().collect();
        let last_processed = recent_events.first().map(|e| e.processed_at);

        EventStats {
            total_events,
            event_types,
            recent_events,
            last_processed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryEventRepository;
    use serde_json::json;

    fn processor() -> (EventProcessor, Arc<InMemoryEventRepository>) {
        let repo = Arc::new(InMemoryEventRepository::new());
        let processor = EventProcessor::new(
            repo.clone(),
            Arc::new(Transformer::with_salt("test-salt")),
            Arc::new(SchemaRegistry::new()),
        );
        (processor, repo)
    }

    fn order_event(order_id: u64) -> RawEvent {
        RawEvent::new(
            "shopify_order",
            json!({
                "orderId": order_id,
                "orderNumber": order_id,
                "totalPrice": "49.99",
                "currency": "USD",
                "customer": {"id": 9},
                "createdAt": "2024-01-01T00:00:00Z",
            }),
            Utc::now(),
        )
        .with_source(SourceType::Commerce)
    }

    #[test]
    fn test_source_inference_priority() {
        // Explicit tag wins over everything
        let explicit = RawEvent::new("shopify_order", json!({"tagId": "1"}), Utc::now())
            .with_source(SourceType::Pixel);
        assert_eq!(infer_source_type(&explicit), Some(SourceType::Pixel));

        // Prefix match next
        let prefixed = RawEvent::new("gtm_tag", json!({"orderId": 1}), Utc::now());
        assert_eq!(infer_source_type(&prefixed), Some(SourceType::TagManager));

        // Shape heuristic last
        let shaped = RawEvent {
            source: None,
            event_type: None,
            event_data: json!({"orderId": 1}),
            timestamp: Utc::now(),
        };
        assert_eq!(infer_source_type(&shaped), Some(SourceType::Commerce));

        // Exhaustion yields None
        let opaque = RawEvent {
            source: None,
            event_type: None,
            event_data: json!({"mystery": true}),
            timestamp: Utc::now(),
        };
        assert_eq!(infer_source_type(&opaque), None);
    }

    #[test]
    fn test_event_type_inference_from_shape() {
        let shaped = RawEvent {
            source: None,
            event_type: None,
            event_data: json!({"customerId": 4}),
            timestamp: Utc::now(),
        };
        assert_eq!(infer_event_type(&shaped).as_deref(), Some("shopify_customer"));

        let opaque = RawEvent {
            source: None,
            event_type: None,
            event_data: json!({"mystery": true}),
            timestamp: Utc::now(),
        };
        assert_eq!(infer_event_type(&opaque), None);
    }

    #[tokio::test]
    async fn test_batch_isolation_on_malformed_event() {
        let (processor, _) = processor();
        let data_source_id = Uuid::new_v4();

        let malformed = RawEvent {
            source: None,
            event_type: None,
            event_data: json!({"nothing": "recognizable"}),
            timestamp: Utc::now(),
        };

        // Malformed event in the middle of the batch
        let batch = vec![order_event(1), malformed, order_event(2), order_event(3)];
        let processed = processor.process_events(&batch, data_source_id).await;

        assert_eq!(processed.len(), 3);
        let ids: Vec<i64> = processed
            .iter()
            .map(|e| e.event_data.data["id"].as_i64().unwrap())
            .collect();
        assert!(ids.contains(&1) && ids.contains(&2) && ids.contains(&3));
    }

    #[tokio::test]
    async fn test_order_scenario_end_to_end() {
        let (processor, repo) = processor();
        let data_source_id = Uuid::new_v4();

        let processed = processor
            .process_events(&[order_event(1)], data_source_id)
            .await;

        assert_eq!(processed.len(), 1);
        let event = &processed[0];
        assert_eq!(event.event_type, "shopify_order");
        assert_eq!(event.event_data.event_type, "shopify_order");
        assert_eq!(event.event_data.data["amount"], 49.99);
        assert_eq!(repo.count(data_source_id).await, 1);
    }

    #[tokio::test]
    async fn test_unknown_event_dropped_without_panic() {
        let (processor, repo) = processor();
        let data_source_id = Uuid::new_v4();

        let unknown = RawEvent::new("mystery_event", json!({"payload": 1}), Utc::now());
        let batch = vec![order_event(1), unknown];
        let processed = processor.process_events(&batch, data_source_id).await;

        assert_eq!(processed.len(), 1);
        assert_eq!(repo.count(data_source_id).await, 1);
    }

    #[tokio::test]
    async fn test_schema_mismatch_dropped() {
        let (processor, _) = processor();
        let data_source_id = Uuid::new_v4();

        // A gtm_tag whose transformed data will carry a non-string name
        let bad = RawEvent::new(
            "gtm_tag",
            json!({"tagId": "t1", "name": 42, "type": "ua"}),
            Utc::now(),
        )
        .with_source(SourceType::TagManager);

        let processed = processor.process_events(&[bad], data_source_id).await;
        assert!(processed.is_empty());
    }

    #[tokio::test]
    async fn test_reprocessing_is_idempotent() {
        let (processor, repo) = processor();
        let data_source_id = Uuid::new_v4();

        let processed = processor
            .process_events(&[order_event(1)], data_source_id)
            .await;
        let event_id = processed[0].id;

        let first = processor.reprocess_events(data_source_id, &[event_id]).await;
        assert_eq!(first.len(), 1);
        let after_first = first[0].event_data.data.clone();

        let second = processor.reprocess_events(data_source_id, &[event_id]).await;
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].event_data.data, after_first);

        // The stored event was overwritten in place, not duplicated
        assert_eq!(repo.count(data_source_id).await, 1);
    }

    #[tokio::test]
    async fn test_event_stats() {
        let (processor, _) = processor();
        let data_source_id = Uuid::new_v4();

        processor
            .process_events(
                &[order_event(1), order_event(2)],
                data_source_id,
            )
            .await;

        let stats = processor.event_stats(data_source_id).await;
        assert_eq!(stats.total_events, 2);
        assert_eq!(stats.event_types["shopify_order"], 2);
        assert!(stats.last_processed.is_some());
        assert_eq!(stats.recent_events.len(), 2);
    }
}
