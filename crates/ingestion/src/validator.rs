//! Structural validation of provider configs and raw events.
//!
//! Pure predicates: no side effects, never panic, never error.

use serde_json::Value;

use pulse_core::types::{RawEvent, SourceType};

/// Check that a provider config carries every required field for its source
/// type as a non-empty string.
pub fn validate_config(source_type: SourceType, config: &Value) -> bool {
    let Some(map) = config.as_object() else {
        return false;
    };

    source_type.required_config_fields().iter().all(|field| {
        map.get(*field)
            .and_then(Value::as_str)
            .map(|v| !v.trim().is_empty())
            .unwrap_or(false)
    })
}

/// Same check for an untagged source-type string. Unknown types are invalid.
pub fn validate_config_for(source_type: &str, config: &Value) -> bool {
    match parse_source_type(source_type) {
        Some(st) => validate_config(st, config),
        None => false,
    }
}

pub fn parse_source_type(raw: &str) -> Option<SourceType> {
    match raw {
        "tag_manager" => Some(SourceType::TagManager),
        "pixel" => Some(SourceType::Pixel),
        "commerce" => Some(SourceType::Commerce),
        _ => None,
    }
}

/// A raw event is structurally usable when it names an event type and
/// carries a non-null payload.
pub fn validate_raw_event(event: &RawEvent) -> bool {
    let has_type = event
        .event_type
        .as_deref()
        .map(|t| !t.is_empty())
        .unwrap_or(false);
    has_type && !event.event_data.is_null()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    #[test]
    fn test_valid_configs_per_source() {
        assert!(validate_config(
            SourceType::TagManager,
            &json!({"containerId": "GTM-ABC123"})
        ));
        assert!(validate_config(
            SourceType::Pixel,
            &json!({"pixelId": "12345", "accessToken": "tok"})
        ));
        assert!(validate_config(
            SourceType::Commerce,
            &json!({"shopDomain": "my-shop", "accessToken": "tok"})
        ));
    }

    #[test]
    fn test_missing_or_empty_fields_rejected() {
        assert!(!validate_config(SourceType::TagManager, &json!({})));
        assert!(!validate_config(
            SourceType::TagManager,
            &json!({"containerId": "   "})
        ));
        assert!(!validate_config(
            SourceType::Pixel,
            &json!({"pixelId": "12345"})
        ));
        assert!(!validate_config(
            SourceType::Commerce,
            &json!({"shopDomain": "my-shop", "accessToken": 42})
        ));
    }

    #[test]
    fn test_non_object_config_rejected() {
        assert!(!validate_config(SourceType::Pixel, &json!("not a map")));
        assert!(!validate_config(SourceType::Pixel, &json!(null)));
        assert!(!validate_config(SourceType::Pixel, &json!([1, 2])));
    }

    #[test]
    fn test_unknown_source_type_rejected() {
        assert!(!validate_config_for(
            "spreadsheet",
            &json!({"anything": "x"})
        ));
        assert!(validate_config_for(
            "commerce",
            &json!({"shopDomain": "s", "accessToken": "t"})
        ));
    }

    #[test]
    fn test_raw_event_requires_type_and_data() {
        let ok = RawEvent::new("gtm_tag", json!({"tagId": "1"}), Utc::now());
        assert!(validate_raw_event(&ok));

        let no_type = RawEvent {
            source: None,
            event_type: None,
            event_data: json!({"tagId": "1"}),
            timestamp: Utc::now(),
        };
        assert!(!validate_raw_event(&no_type));

        let null_data = RawEvent::new("gtm_tag", Value::Null, Utc::now());
        assert!(!validate_raw_event(&null_data));
    }
}
