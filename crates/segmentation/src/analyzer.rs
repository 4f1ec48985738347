//! Top-level analysis: segments, engagement, and funnel over one event list.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use pulse_core::types::DataEvent;

use crate::engagement::{engagement_metrics, EngagementMetrics};
use crate::funnel::{conversion_funnel, ConversionFunnel};
use crate::identity::distinct_identities;
use crate::segments::{classify_segments, SegmentCounts};

/// Everything the recommendation layer consumes. Field names are part of
/// the produced interface.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserDataAnalysis {
    pub total_events: usize,
    pub events_by_type: HashMap<String, usize>,
    pub events_by_source: HashMap<String, usize>,
    pub time_range: String,
    pub user_segments: SegmentCounts,
    pub engagement_metrics: EngagementMetrics,
    pub conversion_funnel: ConversionFunnel,
    /// Set when segment counts came from the ratio-estimation fallback.
    pub low_confidence: bool,
}

/// Pure function of an already-fetched event list (callers pass the most
/// recent events, up to their configured window).
pub fn analyze_user_data(events: &[DataEvent]) -> UserDataAnalysis {
    let mut events_by_type: HashMap<String, usize> = HashMap::new();
    let mut events_by_source: HashMap<String, usize> = HashMap::new();
    for event in events {
        *events_by_type.entry(event.event_type.clone()).or_default() += 1;
        *events_by_source
            .entry(event.event_data.source.as_str().to_string())
            .or_default() += 1;
    }

    let low_confidence = distinct_identities(events) <= 1;
    debug!(
        total = events.len(),
        low_confidence, "analyzing user event data"
    );

    UserDataAnalysis {
        total_events: events.len(),
        events_by_type,
        events_by_source,
        time_range: time_range(events),
        user_segments: classify_segments(events),
        engagement_metrics: engagement_metrics(events),
        conversion_funnel: conversion_funnel(events),
        low_confidence,
    }
}

fn time_range(events: &[DataEvent]) -> String {
    let oldest = events.iter().map(|e| e.created_at).min();
    let newest = events.iter().map(|e| e.created_at).max();
    match (oldest, newest) {
        (Some(oldest), Some(newest)) => {
            format!("{} to {}", oldest.to_rfc3339(), newest.to_rfc3339())
        }
        _ => "No data".to_string(),
    }
}
