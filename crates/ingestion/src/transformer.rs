//! Conversion of provider-shaped payloads into the canonical envelope.
//!
//! Transformation is total: any input shape, including null or missing
//! nested fields, produces an envelope. Absent optional fields become null
//! or empty defaults, never errors.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

use pulse_core::types::{Envelope, SourceType};

use crate::schema::lossy_f64;

/// One-way obfuscation applied to user-identifying pixel fields.
///
/// Injected as a capability so the hash can be swapped; the default is a
/// salted SHA-256, never a reversible encoding.
pub trait FieldHasher: Send + Sync {
    fn hash_field(&self, value: &str) -> String;
}

/// Salted SHA-256 hex digest.
pub struct Sha256Hasher {
    salt: String,
}

impl Sha256Hasher {
    pub fn new(salt: impl Into<String>) -> Self {
        Self { salt: salt.into() }
    }
}

impl FieldHasher for Sha256Hasher {
    fn hash_field(&self, value: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.salt.as_bytes());
        hasher.update(b":");
        hasher.update(value.trim().to_lowercase().as_bytes());
        hex::encode(hasher.finalize())
    }
}

pub struct Transformer {
    hasher: Arc<dyn FieldHasher>,
}

impl Transformer {
    pub fn new(hasher: Arc<dyn FieldHasher>) -> Self {
        Self { hasher }
    }

    pub fn with_salt(salt: &str) -> Self {
        Self::new(Arc::new(Sha256Hasher::new(salt)))
    }

    /// Transform a raw provider payload into the canonical envelope.
    pub fn transform_event(
        &self,
        source_type: SourceType,
        event_type: &str,
        raw: &Value,
    ) -> Envelope {
        let (timestamp, data) = match source_type {
            SourceType::TagManager => (Utc::now(), self.transform_tag_manager(event_type, raw)),
            SourceType::Pixel => (
                unix_timestamp(raw.get("eventTime")).unwrap_or_else(Utc::now),
                self.transform_pixel(event_type, raw),
            ),
            SourceType::Commerce => (
                date_field(raw, "createdAt").unwrap_or_else(Utc::now),
                self.transform_commerce(event_type, raw),
            ),
        };

        Envelope {
            source: source_type,
            event_type: event_type.to_string(),
            timestamp,
            processed_at: Utc::now(),
            data,
        }
    }

    fn transform_tag_manager(&self, event_type: &str, raw: &Value) -> Value {
        match event_type {
            "gtm_tag" => json!({
                "id": field(raw, "tagId"),
                "name": field(raw, "name"),
                "type": field(raw, "type"),
                "triggers": {
                    "firing": array_or_empty(raw.get("firingTriggerId")),
                    "blocking": array_or_empty(raw.get("blockingTriggerId")),
                },
                "liveOnly": raw.get("liveOnly").and_then(Value::as_bool).unwrap_or(false),
                "parameters": array_or_empty(raw.get("parameter")),
            }),
            "gtm_trigger" => json!({
                "id": field(raw, "triggerId"),
                "name": field(raw, "name"),
                "type": field(raw, "type"),
                "filters": array_or_empty(raw.get("customEventFilter")),
                "conditions": array_or_empty(raw.get("filter")),
            }),
            "gtm_variable" => json!({
                "id": field(raw, "variableId"),
                "name": field(raw, "name"),
                "type": field(raw, "type"),
                "parameters": array_or_empty(raw.get("parameter")),
            }),
            _ => raw.clone(),
        }
    }

    fn transform_pixel(&self, event_type: &str, raw: &Value) -> Value {
        match event_type {
            "facebook_pixel_event" => json!({
                "id": field(raw, "eventId"),
                "name": field(raw, "eventName"),
                "sourceUrl": field(raw, "eventSourceUrl"),
                "userData": self.transform_user_data(raw.get("userData")),
                "customData": raw.get("customData").cloned().unwrap_or_else(|| json!({})),
                "actionSource": field(raw, "actionSource"),
            }),
            _ => raw.clone(),
        }
    }

    /// Hash every user-identifying field the pixel carries before it enters
    /// the canonical store.
    fn transform_user_data(&self, user_data: Option<&Value>) -> Value {
        const PII_FIELDS: &[(&str, &str)] = &[
            ("em", "email"),
            ("ph", "phone"),
            ("fn", "firstName"),
            ("ln", "lastName"),
            ("ct", "city"),
            ("st", "state"),
            ("zp", "zipCode"),
            ("country", "country"),
        ];

        let Some(user_data) = user_data.filter(|v| v.is_object()) else {
            return json!({});
        };

        let mut hashed = Map::new();
        for (raw_key, out_key) in PII_FIELDS {
            let value = user_data
                .get(*raw_key)
                .and_then(Value::as_str)
                .map(|v| json!(self.hasher.hash_field(v)))
                .unwrap_or(Value::Null);
            hashed.insert((*out_key).to_string(), value);
        }
        Value::Object(hashed)
    }

    fn transform_commerce(&self, event_type: &str, raw: &Value) -> Value {
        match event_type {
            "shopify_order" => json!({
                "id": field(raw, "orderId"),
                "number": field(raw, "orderNumber"),
                "amount": lossy_f64(raw.get("totalPrice")),
                "currency": field(raw, "currency"),
                "customer": transform_customer(raw.get("customer")),
                "lineItems": transform_line_items(raw.get("lineItems")),
                "status": {
                    "financial": field(raw, "financialStatus"),
                    "fulfillment": field(raw, "fulfillmentStatus"),
                },
                "dates": {
                    "created": field(raw, "createdAt"),
                    "updated": field(raw, "updatedAt"),
                },
            }),
            "shopify_customer" => {
                let first = raw.get("firstName").and_then(Value::as_str).unwrap_or("");
                let last = raw.get("lastName").and_then(Value::as_str).unwrap_or("");
                json!({
                    "id": field(raw, "customerId"),
                    "email": field(raw, "email"),
                    "name": {
                        "first": field(raw, "firstName"),
                        "last": field(raw, "lastName"),
                        "full": format!("{first} {last}").trim(),
                    },
                    "stats": {
                        "totalSpent": lossy_f64(raw.get("totalSpent")),
                        "ordersCount": raw.get("ordersCount").cloned().unwrap_or(json!(0)),
                    },
                    "state": field(raw, "state"),
                    "dates": {
                        "created": field(raw, "createdAt"),
                        "updated": field(raw, "updatedAt"),
                    },
                })
            }
            "shopify_product" => json!({
                "id": field(raw, "productId"),
                "title": field(raw, "title"),
                "handle": field(raw, "handle"),
                "vendor": field(raw, "vendor"),
                "type": field(raw, "productType"),
                "status": field(raw, "status"),
                "tags": split_tags(raw.get("tags")),
                "variants": transform_variants(raw.get("variants")),
                "images": transform_images(raw.get("images")),
                "dates": {
                    "created": field(raw, "createdAt"),
                    "updated": field(raw, "updatedAt"),
                },
            }),
            _ => raw.clone(),
        }
    }
}

fn field(raw: &Value, key: &str) -> Value {
    raw.get(key).cloned().unwrap_or(Value::Null)
}

fn array_or_empty(value: Option<&Value>) -> Value {
    match value {
        Some(v) if v.is_array() => v.clone(),
        _ => json!([]),
    }
}

fn date_field(raw: &Value, key: &str) -> Option<DateTime<Utc>> {
    raw.get(key)
        .and_then(Value::as_str)
        .and_then(|s| s.parse::<DateTime<Utc>>().ok())
}

fn unix_timestamp(value: Option<&Value>) -> Option<DateTime<Utc>> {
    let secs = match value {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.parse::<i64>().ok(),
        _ => None,
    }?;
    Utc.timestamp_opt(secs, 0).single()
}

fn split_tags(tags: Option<&Value>) -> Value {
    match tags.and_then(Value::as_str) {
        Some(s) if !s.trim().is_empty() => {
            json!(s.split(',').map(str::trim).collect::<Vec<_>>())
        }
        _ => json!([]),
    }
}

fn transform_customer(customer: Option<&Value>) -> Value {
    let Some(customer) = customer.filter(|v| v.is_object()) else {
        return Value::Null;
    };

    json!({
        "id": field(customer, "id"),
        "email": field(customer, "email"),
        "firstName": field(customer, "first_name"),
        "lastName": field(customer, "last_name"),
        "phone": field(customer, "phone"),
        "acceptsMarketing": field(customer, "accepts_marketing"),
        "totalSpent": lossy_f64(customer.get("total_spent")),
        "ordersCount": customer.get("orders_count").cloned().unwrap_or(json!(0)),
        "state": field(customer, "state"),
        "note": field(customer, "note"),
        "tags": split_tags(customer.get("tags")),
    })
}

fn transform_line_items(items: Option<&Value>) -> Value {
    let Some(items) = items.and_then(Value::as_array) else {
        return json!([]);
    };

    json!(items
        .iter()
        .map(|item| json!({
            "id": field(item, "id"),
            "productId": field(item, "product_id"),
            "variantId": field(item, "variant_id"),
            "title": field(item, "title"),
            "variantTitle": field(item, "variant_title"),
            "quantity": field(item, "quantity"),
            "price": lossy_f64(item.get("price")),
            "totalDiscount": lossy_f64(item.get("total_discount")),
            "sku": field(item, "sku"),
            "vendor": field(item, "vendor"),
            "fulfillmentStatus": field(item, "fulfillment_status"),
            "requiresShipping": field(item, "requires_shipping"),
            "taxable": field(item, "taxable"),
            "giftCard": field(item, "gift_card"),
        }))
        .collect::<Vec<_>>())
}

fn transform_variants(variants: Option<&Value>) -> Value {
    let Some(variants) = variants.and_then(Value::as_array) else {
        return json!([]);
    };

    json!(variants
        .iter()
        .map(|variant| json!({
            "id": field(variant, "id"),
            "title": field(variant, "title"),
            "price": lossy_f64(variant.get("price")),
            "compareAtPrice": lossy_f64(variant.get("compare_at_price")),
            "sku": field(variant, "sku"),
            "barcode": field(variant, "barcode"),
            "inventoryQuantity": variant.get("inventory_quantity").cloned().unwrap_or(json!(0)),
            "weight": lossy_f64(variant.get("weight")),
            "weightUnit": field(variant, "weight_unit"),
            "requiresShipping": field(variant, "requires_shipping"),
            "taxable": field(variant, "taxable"),
            "position": field(variant, "position"),
            "option1": field(variant, "option1"),
            "option2": field(variant, "option2"),
            "option3": field(variant, "option3"),
        }))
        .collect::<Vec<_>>())
}

fn transform_images(images: Option<&Value>) -> Value {
    let Some(images) = images.and_then(Value::as_array) else {
        return json!([]);
    };

    json!(images
        .iter()
        .map(|image| json!({
            "id": field(image, "id"),
            "src": field(image, "src"),
            "alt": field(image, "alt"),
            "width": field(image, "width"),
            "height": field(image, "height"),
            "position": field(image, "position"),
        }))
        .collect::<Vec<_>>())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transformer() -> Transformer {
        Transformer::with_salt("test-salt")
    }

    #[test]
    fn test_total_on_degenerate_input() {
        let t = transformer();
        for raw in [json!(null), json!([]), json!("x"), json!({})] {
            let envelope = t.transform_event(SourceType::Commerce, "shopify_order", &raw);
            assert_eq!(envelope.event_type, "shopify_order");
            assert_eq!(envelope.data["amount"], 0.0);
            assert!(envelope.data["customer"].is_null());
            assert_eq!(envelope.data["lineItems"], json!([]));
        }
    }

    #[test]
    fn test_order_amount_coercion() {
        let t = transformer();
        let raw = json!({
            "orderId": 1,
            "orderNumber": 1001,
            "totalPrice": "49.99",
            "currency": "USD",
            "customer": {"id": 9, "email": "a@b.co", "total_spent": "120.00"},
            "createdAt": "2024-01-01T00:00:00Z",
        });

        let envelope = t.transform_event(SourceType::Commerce, "shopify_order", &raw);
        assert_eq!(envelope.data["amount"], 49.99);
        assert_eq!(envelope.data["customer"]["id"], 9);
        assert_eq!(envelope.data["customer"]["totalSpent"], 120.0);
        assert_eq!(envelope.timestamp.timestamp(), 1_704_067_200);
    }

    #[test]
    fn test_unparseable_price_defaults_to_zero() {
        let t = transformer();
        let raw = json!({"orderId": 2, "totalPrice": "free!", "currency": "USD"});
        let envelope = t.transform_event(SourceType::Commerce, "shopify_order", &raw);
        assert_eq!(envelope.data["amount"], 0.0);
    }

    #[test]
    fn test_pixel_pii_is_hashed_one_way() {
        let t = transformer();
        let raw = json!({
            "eventId": "e-1",
            "eventName": "Purchase",
            "eventTime": "1700000000",
            "userData": {"em": "alice@example.com", "ph": "+15550100", "country": "US"},
        });

        let envelope = t.transform_event(SourceType::Pixel, "facebook_pixel_event", &raw);
        let email = envelope.data["userData"]["email"].as_str().unwrap();
        assert_ne!(email, "alice@example.com");
        assert_eq!(email.len(), 64);
        assert!(email.chars().all(|c| c.is_ascii_hexdigit()));
        // No raw value anywhere in the hashed block
        let user_data = envelope.data["userData"].to_string();
        assert!(!user_data.contains("alice"));
        // Absent fields are null, not errors
        assert!(envelope.data["userData"]["firstName"].is_null());
        assert_eq!(envelope.timestamp.timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_hashing_is_deterministic_and_salted() {
        let a = Sha256Hasher::new("salt-a");
        let b = Sha256Hasher::new("salt-b");
        assert_eq!(a.hash_field("x@y.z"), a.hash_field("x@y.z"));
        assert_ne!(a.hash_field("x@y.z"), b.hash_field("x@y.z"));
        // Normalized before hashing
        assert_eq!(a.hash_field(" X@Y.Z "), a.hash_field("x@y.z"));
    }

    #[test]
    fn test_gtm_tag_defaults() {
        let t = transformer();
        let raw = json!({"tagId": "t-1", "name": "GA4", "type": "gaawe"});
        let envelope = t.transform_event(SourceType::TagManager, "gtm_tag", &raw);
        assert_eq!(envelope.data["triggers"]["firing"], json!([]));
        assert_eq!(envelope.data["liveOnly"], false);
        assert_eq!(envelope.data["parameters"], json!([]));
    }

    #[test]
    fn test_unknown_pair_passes_raw_through() {
        let t = transformer();
        let raw = json!({"custom": {"nested": [1, 2, 3]}});
        let envelope = t.transform_event(SourceType::TagManager, "gtm_folder", &raw);
        assert_eq!(envelope.data, raw);
        assert_eq!(envelope.event_type, "gtm_folder");
    }

    #[test]
    fn test_product_tags_split() {
        let t = transformer();
        let raw = json!({"productId": 7, "title": "Mug", "handle": "mug", "tags": "sale, new , blue"});
        let envelope = t.transform_event(SourceType::Commerce, "shopify_product", &raw);
        assert_eq!(envelope.data["tags"], json!(["sale", "new", "blue"]));
    }
}
