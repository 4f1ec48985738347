//! Campaign recommendation generation from analyzed event data.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use pulse_core::error::{PulseError, PulseResult};
use pulse_ingestion::store::{DataSourceRepository, EventRepository};
use pulse_segmentation::analyzer::{analyze_user_data, UserDataAnalysis};

use crate::provider::ContentProvider;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignRecommendation {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: CampaignData,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignData {
    pub campaigns: Vec<Campaign>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    pub name: String,
    pub audience: Audience,
    pub channels: Vec<Channel>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Audience {
    pub segment: String,
    pub size: u64,
    pub criteria: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    pub timing: String,
}

#[derive(Debug, Clone)]
pub enum RecommendationOutcome {
    /// The user has no connected data sources yet.
    NoDataSources { message: String },
    Recommendation(CampaignRecommendation),
}

pub struct CampaignRecommender {
    provider: Arc<dyn ContentProvider>,
    data_sources: Arc<dyn DataSourceRepository>,
    events: Arc<dyn EventRepository>,
    event_window: usize,
}

impl CampaignRecommender {
    pub fn new(
        provider: Arc<dyn ContentProvider>,
        data_sources: Arc<dyn DataSourceRepository>,
        events: Arc<dyn EventRepository>,
        event_window: usize,
    ) -> Self {
        Self {
            provider,
            data_sources,
            events,
            event_window,
        }
    }

    /// Analyze the user's recent events and ask the content provider for
    /// per-segment campaign recommendations.
    pub async fn generate_campaign_recommendations(
        &self,
        user_message: &str,
        user_id: Uuid,
    ) -> PulseResult<RecommendationOutcome> {
        let data_sources = self.data_sources.find_by_user(user_id).await;
        if data_sources.is_empty() {
            return Ok(RecommendationOutcome::NoDataSources {
                message: "Please connect your data sources first to get campaign recommendations."
                    .to_string(),
            });
        }

        let source_ids: Vec<Uuid> = data_sources.iter().map(|ds| ds.id).collect();
        let events = self
            .events
            .find_recent_for_sources(&source_ids, self.event_window)
            .await;
        let analysis = analyze_user_data(&events);

        let prompt = build_prompt(user_message, &analysis);
        let context = json!({ "dataAnalysis": analysis });
        let response = self.provider.generate_content(&prompt, &context).await?;

        let recommendation = parse_recommendation(&response)?;
        info!(
            user_id = %user_id,
            campaigns = recommendation.data.campaigns.len(),
            "campaign recommendations generated"
        );
        Ok(RecommendationOutcome::Recommendation(recommendation))
    }
}

/// Render the analysis into the provider prompt, one campaign per populated
/// segment, with the fixed response shape spelled out.
fn build_prompt(user_message: &str, analysis: &UserDataAnalysis) -> String {
    let segments = &analysis.user_segments;
    format!(
        r#"Based on the following data analysis and user query, generate multiple campaign recommendations - one for each user segment.

User Query: "{user_message}"

Data Analysis:
- Total Events: {total_events}
- Time Range: {time_range}
- User Segments: {user_segments}
- Engagement Metrics: {engagement}
- Conversion Funnel: {funnel}

Available Segments with User Counts:
- cart_abandoners: Users who added items to cart but didn't purchase ({cart_abandoners} users)
- high_value_customers: Users with high-value purchases ({high_value_customers} users)
- new_visitors: Users who only viewed pages ({new_visitors} users)
- engaged_users: Users with multiple interaction types ({engaged_users} users)
- potential_customers: Users who added to cart but haven't purchased ({potential_customers} users)
- repeat_customers: Users with multiple purchases ({repeat_customers} users)

Generate campaign recommendations for ALL segments that have users (size > 0). Each campaign should be tailored to that specific segment's behavior and needs.

Generate campaign recommendations in this JSON format:
{{
  "type": "campaign_recommendation",
  "data": {{
    "campaigns": [
      {{
        "id": "campaign_1",
        "name": "Campaign Name",
        "audience": {{
          "segment": "segment_name",
          "size": number,
          "criteria": "description"
        }},
        "channels": [
          {{
            "type": "email|sms|push|whatsapp",
            "message": "message content",
            "timing": "optimal_send_time"
          }}
        ]
      }}
    ]
  }}
}}"#,
        total_events = analysis.total_events,
        time_range = analysis.time_range,
        user_segments = json!(segments),
        engagement = json!(analysis.engagement_metrics),
        funnel = json!(analysis.conversion_funnel),
        cart_abandoners = segments.cart_abandoners,
        high_value_customers = segments.high_value_customers,
        new_visitors = segments.new_visitors,
        engaged_users = segments.engaged_users,
        potential_customers = segments.potential_customers,
        repeat_customers = segments.repeat_customers,
    )
}

/// Strip markdown code fences the provider may wrap its JSON in.
fn strip_code_fences(content: &str) -> &str {
    let trimmed = content.trim();

    for fence in ["```json", "```"] {
        if let Some(start) = trimmed.find(fence) {
            let after = &trimmed[start + fence.len()..];
            if let Some(end) = after.find("```") {
                return after[..end].trim();
            }
        }
    }
    trimmed
}

fn parse_recommendation(response: &str) -> PulseResult<CampaignRecommendation> {
    let payload = strip_code_fences(response);
    serde_json::from_str(payload).map_err(|e| {
        PulseError::Provider(format!("unparseable recommendation response: {e}"))
    })
}
