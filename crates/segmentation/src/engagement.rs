//! Engagement scoring from event diversity and per-user frequency.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use pulse_core::types::DataEvent;

use crate::identity::UserIdentity;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngagementMetrics {
    pub total_events: usize,
    pub unique_users: usize,
    pub events_per_user: f64,
    pub unique_event_types: usize,
    pub engagement_score: f64,
    pub diversity_score: f64,
    pub frequency_score: f64,
}

pub fn engagement_metrics(events: &[DataEvent]) -> EngagementMetrics {
    let total_events = events.len();

    // Only identified users count toward the denominator.
    let unique_users = events
        .iter()
        .map(UserIdentity::of_event)
        .filter(UserIdentity::is_known)
        .collect::<HashSet<_>>()
        .len();

    let unique_event_types = events
        .iter()
        .map(|e| e.event_type.as_str())
        .collect::<HashSet<_>>()
        .len();

    let events_per_user = if unique_users > 0 {
        total_events as f64 / unique_users as f64
    } else {
        0.0
    };

    let diversity_score = (unique_event_types as f64 / 10.0).min(1.0);
    let frequency_score = (events_per_user / 5.0).min(1.0);
    let engagement_score = (diversity_score + frequency_score) / 2.0;

    EngagementMetrics {
        total_events,
        unique_users,
        events_per_user,
        unique_event_types,
        engagement_score,
        diversity_score,
        frequency_score,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use pulse_core::types::{Envelope, SourceType};
    use serde_json::{json, Value};
    use uuid::Uuid;

    fn event(event_type: &str, data: Value) -> DataEvent {
        let now = Utc::now();
        DataEvent {
            id: Uuid::new_v4(),
            data_source_id: Uuid::new_v4(),
            event_type: event_type.to_string(),
            event_data: Envelope {
                source: SourceType::TagManager,
                event_type: event_type.to_string(),
                timestamp: now,
                processed_at: now,
                data,
            },
            processed_at: now,
            created_at: now,
        }
    }

    #[test]
    fn test_scores_bounded_and_averaged() {
        let events: Vec<DataEvent> = (0..20)
            .map(|i| event(&format!("gtm_kind_{i}"), json!({"userId": "u1"})))
            .collect();

        let metrics = engagement_metrics(&events);
        assert_eq!(metrics.unique_users, 1);
        assert_eq!(metrics.events_per_user, 20.0);
        // 20 distinct types and 20 events/user both cap at 1.0
        assert_eq!(metrics.diversity_score, 1.0);
        assert_eq!(metrics.frequency_score, 1.0);
        assert_eq!(metrics.engagement_score, 1.0);
    }

    #[test]
    fn test_anonymous_events_do_not_count_as_users() {
        let events = vec![
            event("gtm_page_view", json!({})),
            event("gtm_page_view", json!({"userId": "u1"})),
        ];

        let metrics = engagement_metrics(&events);
        assert_eq!(metrics.total_events, 2);
        assert_eq!(metrics.unique_users, 1);
        assert_eq!(metrics.events_per_user, 2.0);
    }

    #[test]
    fn test_no_identified_users_zeroes_frequency() {
        let events = vec![event("gtm_page_view", json!({}))];
        let metrics = engagement_metrics(&events);
        assert_eq!(metrics.unique_users, 0);
        assert_eq!(metrics.events_per_user, 0.0);
        assert_eq!(metrics.frequency_score, 0.0);
        // One event type out of ten
        assert!((metrics.diversity_score - 0.1).abs() < f64::EPSILON);
    }

    #[test]
    fn test_empty_events() {
        let metrics = engagement_metrics(&[]);
        assert_eq!(metrics.total_events, 0);
        assert_eq!(metrics.engagement_score, 0.0);
    }
}
