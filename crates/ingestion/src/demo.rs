//! Demo-data seeding: provider-shaped synthetic events pushed through the
//! normal processing pipeline against an auto-created demo data source.

use chrono::{Duration, Utc};
use rand::Rng;
use serde_json::{json, Map, Value};
use tracing::info;
use uuid::Uuid;

use pulse_core::error::PulseResult;
use pulse_core::types::{
    DataEvent, DataSourceConfig, DataSourceStatus, RawEvent, SourceType,
};

use crate::service::IntegrationService;

/// Event kinds a demo batch draws from, per source.
pub fn event_kinds(source_type: SourceType) -> &'static [&'static str] {
    match source_type {
        SourceType::TagManager => &[
            "page_view",
            "click",
            "form_submit",
            "purchase",
            "add_to_cart",
            "scroll",
        ],
        SourceType::Pixel => &[
            "PageView",
            "AddToCart",
            "Purchase",
            "Lead",
            "CompleteRegistration",
            "ViewContent",
        ],
        SourceType::Commerce => &[
            "purchase",
            "add_to_cart",
            "view_product",
            "checkout_started",
            "checkout_completed",
            "customer_created",
        ],
    }
}

fn demo_config(source_type: SourceType) -> Value {
    match source_type {
        SourceType::TagManager => json!({"containerId": "GTM-DEMO"}),
        SourceType::Pixel => {
            json!({"pixelId": "demo_pixel_id", "accessToken": "demo_access_token"})
        }
        SourceType::Commerce => {
            json!({"shopDomain": "demo-shop", "accessToken": "demo_access_token"})
        }
    }
}

/// Build one synthetic raw event in the shape the matching provider emits.
pub fn demo_event(
    source_type: SourceType,
    event_kind: &str,
    base_data: &Value,
    index: usize,
) -> RawEvent {
    let mut rng = rand::thread_rng();
    let timestamp = Utc::now() - Duration::seconds(rng.gen_range(0..7 * 24 * 60 * 60));
    let event_type = format!("{}{}", source_type.event_prefix(), event_kind);

    let generated = match source_type {
        SourceType::TagManager => json!({
            "tagId": format!("tag_{}", index + 1),
            "triggerId": format!("trigger_{}", index + 1),
            "variableId": format!("variable_{}", index + 1),
            "pageUrl": format!("https://example.com/page{}", index + 1),
            "userId": format!("user_{}", rng.gen_range(0..1000)),
            "sessionId": format!("session_{}", rng.gen_range(0..10000)),
            "eventTimestamp": timestamp.to_rfc3339(),
            "pageTitle": format!("Page {}", rng.gen_range(1..=10)),
            "referrer": if rng.gen_bool(0.5) { "https://google.com" } else { "https://facebook.com" },
            "language": "en-US",
        }),
        SourceType::Pixel => json!({
            "eventId": format!("event_{}", index + 1),
            "eventName": event_kind,
            "pixelId": format!("pixel_{}", rng.gen_range(0..1000)),
            "userId": format!("user_{}", rng.gen_range(0..1000)),
            "sessionId": format!("session_{}", rng.gen_range(0..10000)),
            "eventTimestamp": timestamp.to_rfc3339(),
            "value": rng.gen_range(0..1000),
            "currency": "USD",
            "contentName": format!("Product {}", rng.gen_range(1..=20)),
            "contentCategory": (["Electronics", "Clothing", "Books", "Home"][rng.gen_range(0..4)]),
            "numItems": rng.gen_range(1..=5),
        }),
        SourceType::Commerce => json!({
            "orderId": format!("order_{}", index + 1),
            "customerId": format!("customer_{}", rng.gen_range(0..1000)),
            "productId": format!("product_{}", rng.gen_range(0..100)),
            "productTitle": format!("Product {}", index + 1),
            "productPrice": rng.gen_range(10..510),
            "currency": "USD",
            "quantity": rng.gen_range(1..=5),
            "eventTimestamp": timestamp.to_rfc3339(),
            "shopDomain": "demo-shop.myshopify.com",
            "customerEmail": format!("customer{}@example.com", rng.gen_range(0..1000)),
            "orderTotal": rng.gen_range(50..1050),
            "paymentMethod": (["credit_card", "paypal", "apple_pay"][rng.gen_range(0..3)]),
        }),
    };

    let mut event_data = Map::new();
    if let Some(base) = base_data.as_object() {
        event_data.extend(base.clone());
    }
    if let Some(generated) = generated.as_object() {
        event_data.extend(generated.clone());
    }

    RawEvent::new(event_type, Value::Object(event_data), timestamp).with_source(source_type)
}

/// A 50–100 event batch of random kinds for one source.
pub fn bulk_demo_events(source_type: SourceType) -> Vec<RawEvent> {
    let mut rng = rand::thread_rng();
    let kinds = event_kinds(source_type);
    let count = rng.gen_range(50..100);

    (0..count)
        .map(|i| {
            let kind = kinds[rng.gen_range(0..kinds.len())];
            demo_event(source_type, kind, &json!({}), i)
        })
        .collect()
}

impl IntegrationService {
    /// Find or create the demo data source a user's synthetic events land in.
    async fn demo_data_source(
        &self,
        user_id: Uuid,
        source_type: SourceType,
    ) -> PulseResult<DataSourceConfig> {
        let name = format!("Demo {} Data", source_type.display_name());
        if let Some(existing) = self
            .data_source_repository()
            .find_named(user_id, source_type, &name)
            .await
        {
            return Ok(existing);
        }

        let data_source = DataSourceConfig {
            id: Uuid::new_v4(),
            user_id,
            source_type,
            name,
            config: demo_config(source_type),
            status: DataSourceStatus::Active,
            last_sync_at: None,
            credential_id: None,
            created_at: Utc::now(),
        };
        self.data_source_repository().insert(data_source).await
    }

    /// Generate `count` synthetic events of one kind and run them through
    /// the normal processing pipeline.
    pub async fn store_demo_events(
        &self,
        user_id: Uuid,
        source_type: SourceType,
        event_kind: &str,
        base_data: &Value,
        count: usize,
    ) -> PulseResult<Vec<DataEvent>> {
        let data_source = self.demo_data_source(user_id, source_type).await?;

        let events: Vec<RawEvent> = (0..count)
            .map(|i| demo_event(source_type, event_kind, base_data, i))
            .collect();

        let processed = self.processor().process_events(&events, data_source.id).await;
        info!(
            data_source_id = %data_source.id,
            count = processed.len(),
            "demo events stored"
        );
        Ok(processed)
    }

    /// Seed a random mixed batch for one source.
    pub async fn seed_bulk_demo_events(
        &self,
        user_id: Uuid,
        source_type: SourceType,
    ) -> PulseResult<Vec<DataEvent>> {
        let data_source = self.demo_data_source(user_id, source_type).await?;
        let events = bulk_demo_events(source_type);
        let processed = self.processor().process_events(&events, data_source.id).await;
        info!(
            data_source_id = %data_source.id,
            source = source_type.as_str(),
            count = processed.len(),
            "bulk demo events seeded"
        );
        Ok(processed)
    }
}
