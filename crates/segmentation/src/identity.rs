//! End-user identity: the grouping key events are attributed by.

use std::collections::HashSet;

use serde_json::Value;

use pulse_core::types::DataEvent;

/// Explicit sum type rather than a sentinel string, so a real identifier can
/// never collide with the anonymous bucket.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UserIdentity {
    Known(String),
    Anonymous,
}

impl UserIdentity {
    /// Extract an identity from an envelope's data portion, falling back
    /// across the fields the three providers use.
    pub fn from_event_data(data: &Value) -> Self {
        for key in ["userId", "user_id", "customer_id"] {
            match data.get(key) {
                Some(Value::String(s)) if !s.is_empty() => {
                    return UserIdentity::Known(s.clone())
                }
                Some(Value::Number(n)) => return UserIdentity::Known(n.to_string()),
                _ => {}
            }
        }
        UserIdentity::Anonymous
    }

    pub fn of_event(event: &DataEvent) -> Self {
        Self::from_event_data(&event.event_data.data)
    }

    pub fn is_known(&self) -> bool {
        matches!(self, UserIdentity::Known(_))
    }
}

/// Number of distinct identities (the anonymous bucket counts as one).
pub fn distinct_identities(events: &[DataEvent]) -> usize {
    events
        .iter()
        .map(UserIdentity::of_event)
        .collect::<HashSet<_>>()
        .len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fallback_order() {
        assert_eq!(
            UserIdentity::from_event_data(&json!({"userId": "u1", "customer_id": 9})),
            UserIdentity::Known("u1".to_string())
        );
        assert_eq!(
            UserIdentity::from_event_data(&json!({"user_id": "u2"})),
            UserIdentity::Known("u2".to_string())
        );
        assert_eq!(
            UserIdentity::from_event_data(&json!({"customer_id": 42})),
            UserIdentity::Known("42".to_string())
        );
    }

    #[test]
    fn test_absent_or_empty_is_anonymous() {
        assert_eq!(
            UserIdentity::from_event_data(&json!({})),
            UserIdentity::Anonymous
        );
        assert_eq!(
            UserIdentity::from_event_data(&json!({"userId": ""})),
            UserIdentity::Anonymous
        );
        assert_eq!(
            UserIdentity::from_event_data(&json!({"userId": null})),
            UserIdentity::Anonymous
        );
    }

    #[test]
    fn test_literal_anonymous_string_stays_known() {
        // A provider could legitimately send the text "anonymous" as an id;
        // it must not collapse into the anonymous bucket.
        let identity = UserIdentity::from_event_data(&json!({"userId": "anonymous"}));
        assert!(identity.is_known());
        assert_ne!(identity, UserIdentity::Anonymous);
    }
}
