//! Canonical shape definitions per (source, event type) pair.
//!
//! The registry is built once at startup and never mutated, so a single
//! instance can be shared across workers behind an `Arc` without locking.

use std::collections::HashMap;

use chrono::{DateTime, TimeZone, Utc};
use serde_json::{json, Value};

use pulse_core::types::SourceType;

/// Declared runtime type for a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Object,
    Array,
}

impl FieldType {
    fn matches(&self, value: &Value) -> bool {
        // A present-but-null field counts as absent, not as a type mismatch.
        if value.is_null() {
            return true;
        }
        match self {
            FieldType::String => value.is_string(),
            FieldType::Number => value.is_number(),
            FieldType::Boolean => value.is_boolean(),
            FieldType::Object => value.is_object(),
            FieldType::Array => value.is_array(),
        }
    }
}

/// Shape of one event kind's transformed `data` portion.
#[derive(Debug, Clone)]
pub struct EventSchema {
    pub required: &'static [&'static str],
    pub properties: &'static [(&'static str, FieldType)],
}

/// Immutable lookup table of event schemas keyed by (source, event type).
pub struct SchemaRegistry {
    schemas: HashMap<(SourceType, &'static str), EventSchema>,
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaRegistry {
    pub fn new() -> Self {
        use FieldType::*;

        let mut schemas = HashMap::new();

        schemas.insert(
            (SourceType::TagManager, "gtm_tag"),
            EventSchema {
                required: &["id", "name", "type"],
                properties: &[
                    ("id", String),
                    ("name", String),
                    ("type", String),
                    ("triggers", Object),
                    ("liveOnly", Boolean),
                    ("parameters", Array),
                ],
            },
        );
        schemas.insert(
            (SourceType::TagManager, "gtm_trigger"),
            EventSchema {
                required: &["id", "name", "type"],
                properties: &[
                    ("id", String),
                    ("name", String),
                    ("type", String),
                    ("filters", Array),
                    ("conditions", Array),
                ],
            },
        );
        schemas.insert(
            (SourceType::TagManager, "gtm_variable"),
            EventSchema {
                required: &["id", "name", "type"],
                properties: &[
                    ("id", String),
                    ("name", String),
                    ("type", String),
                    ("parameters", Array),
                ],
            },
        );
        schemas.insert(
            (SourceType::Pixel, "facebook_pixel_event"),
            EventSchema {
                required: &["id", "name"],
                properties: &[
                    ("id", String),
                    ("name", String),
                    ("sourceUrl", String),
                    ("userData", Object),
                    ("customData", Object),
                    ("actionSource", String),
                ],
            },
        );
        schemas.insert(
            (SourceType::Commerce, "shopify_order"),
            EventSchema {
                required: &["id", "amount", "currency"],
                properties: &[
                    ("id", Number),
                    ("number", Number),
                    ("amount", Number),
                    ("currency", String),
                    ("customer", Object),
                    ("lineItems", Array),
                    ("status", Object),
                    ("dates", Object),
                ],
            },
        );
        schemas.insert(
            (SourceType::Commerce, "shopify_customer"),
            EventSchema {
                required: &["id", "email"],
                properties: &[
                    ("id", Number),
                    ("email", String),
                    ("name", Object),
                    ("stats", Object),
                    ("state", String),
                    ("dates", Object),
                ],
            },
        );
        schemas.insert(
            (SourceType::Commerce, "shopify_product"),
            EventSchema {
                required: &["id", "title", "handle"],
                properties: &[
                    ("id", Number),
                    ("title", String),
                    ("handle", String),
                    ("vendor", String),
                    ("type", String),
                    ("status", String),
                    ("tags", Array),
                    ("variants", Array),
                    ("images", Array),
                ],
            },
        );

        Self { schemas }
    }

    pub fn get(&self, source_type: SourceType, event_type: &str) -> Option<&EventSchema> {
        self.schemas
            .iter()
            .find(|((st, et), _)| *st == source_type && *et == event_type)
            .map(|(_, schema)| schema)
    }

    /// Validate a transformed `data` payload against the registered schema.
    ///
    /// Pairs with no registered schema validate as true. That default is
    /// intentional: unknown event kinds pass through the pipeline unchecked
    /// rather than being dropped.
    pub fn validate_against_schema(
        &self,
        data: &Value,
        source_type: SourceType,
        event_type: &str,
    ) -> bool {
        let Some(schema) = self.get(source_type, event_type) else {
            return true;
        };

        let Some(map) = data.as_object() else {
            return false;
        };

        for field in schema.required {
            if !map.contains_key(*field) {
                return false;
            }
        }

        for (field, field_type) in schema.properties {
            if let Some(value) = map.get(*field) {
                if !field_type.matches(value) {
                    return false;
                }
            }
        }

        true
    }

    /// Best-effort normalization of a raw payload into a cross-source
    /// identity/timestamp/metadata shape.
    pub fn map_to_common_schema(
        &self,
        source_type: SourceType,
        event_type: &str,
        data: &Value,
    ) -> Value {
        json!({
            "id": extract_id(source_type, data),
            "type": event_type,
            "source": source_type,
            "timestamp": extract_timestamp(data),
            "data": map_common_fields(source_type, event_type, data),
            "metadata": extract_metadata(source_type, event_type, data),
        })
    }
}

/// Id fallback chain across source-specific id fields.
fn extract_id(source_type: SourceType, data: &Value) -> String {
    let candidates: &[&str] = match source_type {
        SourceType::TagManager => &["tagId", "triggerId", "variableId"],
        SourceType::Pixel => &["eventId"],
        SourceType::Commerce => &["orderId", "customerId", "productId"],
    };

    for field in candidates {
        match data.get(*field) {
            Some(Value::String(s)) => return s.clone(),
            Some(Value::Number(n)) => return n.to_string(),
            _ => {}
        }
    }
    String::new()
}

/// Timestamp fallback chain: `timestamp`, then `createdAt`, then unix-second
/// `eventTime`, then now.
fn extract_timestamp(data: &Value) -> DateTime<Utc> {
    if let Some(ts) = data.get("timestamp").and_then(Value::as_str) {
        if let Ok(parsed) = ts.parse::<DateTime<Utc>>() {
            return parsed;
        }
    }
    if let Some(created) = data.get("createdAt").and_then(Value::as_str) {
        if let Ok(parsed) = created.parse::<DateTime<Utc>>() {
            return parsed;
        }
    }
    if let Some(secs) = unix_seconds(data.get("eventTime")) {
        if let Some(parsed) = Utc.timestamp_opt(secs, 0).single() {
            return parsed;
        }
    }
    Utc::now()
}

fn unix_seconds(value: Option<&Value>) -> Option<i64> {
    match value {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.parse::<i64>().ok(),
        _ => None,
    }
}

fn map_common_fields(source_type: SourceType, event_type: &str, data: &Value) -> Value {
    let mut mapped = data.clone();
    let Some(map) = mapped.as_object_mut() else {
        return mapped;
    };

    match source_type {
        SourceType::Commerce => {
            if event_type.ends_with("order") {
                map.insert("amount".into(), json!(lossy_f64(data.get("totalPrice"))));
                map.insert(
                    "customerEmail".into(),
                    data.pointer("/customer/email").cloned().unwrap_or(Value::Null),
                );
                map.insert(
                    "status".into(),
                    data.get("financialStatus").cloned().unwrap_or(Value::Null),
                );
            } else if event_type.ends_with("customer") {
                let first = data.get("firstName").and_then(Value::as_str).unwrap_or("");
                let last = data.get("lastName").and_then(Value::as_str).unwrap_or("");
                map.insert("name".into(), json!(format!("{first} {last}").trim()));
                map.insert("totalSpent".into(), json!(lossy_f64(data.get("totalSpent"))));
                map.insert(
                    "ordersCount".into(),
                    data.get("ordersCount").cloned().unwrap_or(json!(0)),
                );
            }
        }
        SourceType::Pixel => {
            for field in ["eventName", "userData", "customData"] {
                let value = data.get(field).cloned().unwrap_or(Value::Null);
                map.insert(field.into(), value);
            }
        }
        SourceType::TagManager => {
            for field in ["name", "type"] {
                let value = data.get(field).cloned().unwrap_or(Value::Null);
                map.insert(field.into(), value);
            }
        }
    }

    mapped
}

fn extract_metadata(source_type: SourceType, event_type: &str, data: &Value) -> Value {
    let mut metadata = json!({
        "sourceType": source_type,
        "eventType": event_type,
        "processedAt": Utc::now(),
    });

    let marker = match source_type {
        SourceType::TagManager => "containerId",
        SourceType::Pixel => "pixelId",
        SourceType::Commerce => "shopDomain",
    };
    if let Some(value) = data.get(marker) {
        metadata[marker] = value.clone();
    }

    metadata
}

/// Parse a number out of a JSON value that may be a string, defaulting to 0.
pub(crate) fn lossy_f64(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse::<f64>().unwrap_or(0.0),
        _ => 0.0,
    }
}
