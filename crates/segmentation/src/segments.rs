//! Behavioral segment classification.
//!
//! Two explicitly divergent algorithms: per-identity classification when
//! the population has at least two distinct identities, and event-pattern
//! ratio estimation when it does not (sparse early data rarely carries
//! usable identity fields). The ratio path is a heuristic approximation,
//! not a behavioral classification.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use pulse_core::types::DataEvent;

use crate::identity::UserIdentity;

/// Counts per named segment. An identity may fall into several segments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentCounts {
    pub cart_abandoners: u64,
    pub high_value_customers: u64,
    pub new_visitors: u64,
    pub engaged_users: u64,
    pub potential_customers: u64,
    pub repeat_customers: u64,
    pub total_users: u64,
}

pub(crate) fn is_add_to_cart(event_type: &str) -> bool {
    let t = event_type.to_lowercase();
    t.contains("add_to_cart") || t.contains("addtocart")
}

pub(crate) fn is_purchase(event_type: &str) -> bool {
    event_type.to_lowercase().contains("purchase")
}

pub(crate) fn is_page_view(event_type: &str) -> bool {
    let t = event_type.to_lowercase();
    t.contains("page_view") || t.contains("pageview")
}

/// Summed purchase value for one identity's events: `value`, `total_price`,
/// or `revenue` from the data portion, first numeric hit per event.
fn purchase_value(events: &[&DataEvent]) -> f64 {
    events
        .iter()
        .filter(|e| is_purchase(&e.event_type))
        .map(|e| {
            for key in ["value", "total_price", "revenue"] {
                if let Some(v) = e.event_data.data.get(key).and_then(Value::as_f64) {
                    return v;
                }
            }
            0.0
        })
        .sum()
}

pub fn classify_segments(events: &[DataEvent]) -> SegmentCounts {
    let mut by_identity: HashMap<UserIdentity, Vec<&DataEvent>> = HashMap::new();
    for event in events {
        by_identity
            .entry(UserIdentity::of_event(event))
            .or_default()
            .push(event);
    }

    let mut segments = SegmentCounts {
        total_users: by_identity.len() as u64,
        ..SegmentCounts::default()
    };

    if by_identity.len() <= 1 {
        if events.is_empty() {
            return segments;
        }
        estimate_from_event_ratios(events, &mut segments);
        return segments;
    }

    for identity_events in by_identity.values() {
        let event_types: Vec<&str> = identity_events
            .iter()
            .map(|e| e.event_type.as_str())
            .collect();

        let has_add_to_cart = event_types.iter().any(|t| is_add_to_cart(t));
        let purchase_count = event_types.iter().filter(|t| is_purchase(t)).count();
        let has_purchase = purchase_count > 0;
        let has_page_view = event_types.iter().any(|t| is_page_view(t));

        // Two downstream labels share this predicate on purpose.
        if has_add_to_cart && !has_purchase {
            segments.cart_abandoners += 1;
            segments.potential_customers += 1;
        }

        if purchase_value(identity_events) > 100.0 {
            segments.high_value_customers += 1;
        }

        if has_page_view && event_types.len() == 1 {
            segments.new_visitors += 1;
        }

        let unique_types: HashSet<&&str> = event_types.iter().collect();
        if unique_types.len() >= 3 {
            segments.engaged_users += 1;
        }

        if purchase_count > 1 {
            segments.repeat_customers += 1;
        }
    }

    segments
}

/// Degenerate-population fallback: derive each segment count as a fixed
/// fraction of a related event count.
fn estimate_from_event_ratios(events: &[DataEvent], segments: &mut SegmentCounts) {
    let add_to_cart = events
        .iter()
        .filter(|e| is_add_to_cart(&e.event_type))
        .count() as f64;
    let purchases = events.iter().filter(|e| is_purchase(&e.event_type)).count() as f64;
    let page_views = events
        .iter()
        .filter(|e| is_page_view(&e.event_type))
        .count() as f64;
    let total = events.len() as f64;

    segments.cart_abandoners = ((add_to_cart * 0.3).floor() as u64).max(1);
    segments.high_value_customers = ((purchases * 0.2).floor() as u64).max(1);
    segments.new_visitors = ((page_views * 0.4).floor() as u64).max(1);
    segments.engaged_users = ((total * 0.1).floor() as u64).max(1);
    segments.potential_customers = ((add_to_cart * 0.5).floor() as u64).max(1);
    segments.repeat_customers = ((purchases * 0.3).floor() as u64).max(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pulse_core::types::{Envelope, SourceType};
    use serde_json::json;
    use uuid::Uuid;

    fn event(event_type: &str, data: Value) -> DataEvent {
        let now = Utc::now();
        DataEvent {
            id: Uuid::new_v4(),
            data_source_id: Uuid::new_v4(),
            event_type: event_type.to_string(),
            event_data: Envelope {
                source: SourceType::Pixel,
                event_type: event_type.to_string(),
                timestamp: now,
                processed_at: now,
                data,
            },
            processed_at: now,
            created_at: now,
        }
    }

    fn user_event(event_type: &str, user: &str) -> DataEvent {
        event(event_type, json!({"userId": user}))
    }

    #[test]
    fn test_two_identities_one_abandoner() {
        let events = vec![
            user_event("facebook_pixel_AddToCart", "a"),
            user_event("facebook_pixel_AddToCart", "b"),
            user_event("facebook_pixel_Purchase", "b"),
        ];

        let segments = classify_segments(&events);
        assert_eq!(segments.total_users, 2);
        assert_eq!(segments.cart_abandoners, 1);
        assert_eq!(segments.potential_customers, 1);
        assert_eq!(segments.repeat_customers, 0);
    }

    #[test]
    fn test_high_value_and_repeat_customers() {
        let events = vec![
            event("shopify_purchase", json!({"userId": "a", "value": 80.0})),
            event("shopify_purchase", json!({"userId": "a", "value": 60.0})),
            user_event("gtm_page_view", "b"),
        ];

        let segments = classify_segments(&events);
        assert_eq!(segments.total_users, 2);
        assert_eq!(segments.high_value_customers, 1);
        assert_eq!(segments.repeat_customers, 1);
        // b's only event is a page view
        assert_eq!(segments.new_visitors, 1);
    }

    #[test]
    fn test_purchase_value_fallback_fields() {
        let events = vec![
            event("shopify_purchase", json!({"userId": "a", "total_price": 150.0})),
            user_event("gtm_page_view", "b"),
        ];
        assert_eq!(classify_segments(&events).high_value_customers, 1);

        let events = vec![
            event("shopify_purchase", json!({"userId": "a", "revenue": 50.0})),
            user_event("gtm_page_view", "b"),
        ];
        assert_eq!(classify_segments(&events).high_value_customers, 0);
    }

    #[test]
    fn test_engaged_users_need_three_distinct_types() {
        let events = vec![
            user_event("gtm_page_view", "a"),
            user_event("gtm_click", "a"),
            user_event("gtm_scroll", "a"),
            user_event("gtm_page_view", "b"),
            user_event("gtm_page_view", "b"),
        ];

        let segments = classify_segments(&events);
        assert_eq!(segments.engaged_users, 1);
    }

    #[test]
    fn test_single_identity_uses_ratio_estimation() {
        // Ten add-to-carts under one identity
        let events: Vec<DataEvent> = (0..10)
            .map(|_| user_event("facebook_pixel_AddToCart", "solo"))
            .collect();

        let segments = classify_segments(&events);
        assert_eq!(segments.total_users, 1);
        // floor(10 * 0.3) and floor(10 * 0.5)
        assert_eq!(segments.cart_abandoners, 3);
        assert_eq!(segments.potential_customers, 5);
        // No purchases, but the estimate floors at one
        assert_eq!(segments.high_value_customers, 1);
    }

    #[test]
    fn test_anonymous_only_population_is_degenerate() {
        let events = vec![
            event("gtm_page_view", json!({})),
            event("gtm_add_to_cart", json!({})),
        ];

        let segments = classify_segments(&events);
        assert_eq!(segments.total_users, 1);
        assert!(segments.cart_abandoners >= 1);
    }

    #[test]
    fn test_empty_events_yield_zero_counts() {
        let segments = classify_segments(&[]);
        assert_eq!(segments, SegmentCounts::default());
    }

    #[test]
    fn test_token_matching_is_case_insensitive() {
        assert!(is_add_to_cart("facebook_pixel_AddToCart"));
        assert!(is_add_to_cart("shopify_add_to_cart"));
        assert!(is_purchase("facebook_pixel_Purchase"));
        assert!(is_purchase("gtm_purchase"));
        assert!(is_page_view("facebook_pixel_PageView"));
        assert!(!is_purchase("gtm_page_view"));
    }
}
