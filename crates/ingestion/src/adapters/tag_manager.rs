//! Tag-manager adapter: OAuth-credentialed access to the container
//! management API.
//!
//! A human-supplied public container id ("GTM-XXXX") is resolved to the
//! provider's numeric account/container/workspace triple before any entity
//! fetch; tags, triggers, and variables are then pulled with three
//! concurrent requests.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, info};
use uuid::Uuid;

use pulse_core::config::IngestionConfig;
use pulse_core::error::{PulseError, PulseResult};
use pulse_core::types::{ConnectionStatus, RawEvent, SourceType};

use crate::credentials::{CredentialStore, TokenManager};

use super::{config_field, connect_timeout, fetch_timeout, SourceAdapter};

const BASE_URL: &str = "https://www.googleapis.com/tagmanager/v2";

pub struct TagManagerAdapter {
    http: reqwest::Client,
    ingestion: IngestionConfig,
    credentials: Arc<dyn CredentialStore>,
    tokens: Arc<TokenManager>,
}

/// Numeric coordinates of a resolved container.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ContainerRef {
    account_id: String,
    container_id: String,
}

impl TagManagerAdapter {
    pub fn new(
        ingestion: IngestionConfig,
        credentials: Arc<dyn CredentialStore>,
        tokens: Arc<TokenManager>,
    ) -> Self {
        Self {
            http: reqwest::Client::new(),
            ingestion,
            credentials,
            tokens,
        }
    }

    /// Resolve a valid access token for the user's stored credential.
    async fn active_token(&self, user_id: Uuid) -> PulseResult<String> {
        let credential = self
            .credentials
            .find_active(user_id, SourceType::TagManager)
            .await
            .ok_or_else(|| {
                PulseError::Auth("tag manager account not connected".to_string())
            })?;
        self.tokens.valid_access_token(&credential).await
    }

    async fn get_json(
        &self,
        url: &str,
        token: &str,
        timeout: std::time::Duration,
    ) -> PulseResult<Value> {
        let response = self
            .http
            .get(url)
            .bearer_auth(token)
            .timeout(timeout)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            debug!(%status, %body, url, "tag manager API call failed");
            return Err(PulseError::Connection(format!(
                "tag manager API returned {status}"
            )));
        }
        Ok(response.json().await?)
    }

    /// Walk accounts → containers and match the public id.
    async fn resolve_container(&self, token: &str, public_id: &str) -> PulseResult<ContainerRef> {
        let timeout = fetch_timeout(&self.ingestion);
        let accounts = self
            .get_json(&format!("{BASE_URL}/accounts"), token, timeout)
            .await?;

        let accounts = accounts
            .get("account")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        if accounts.is_empty() {
            return Err(PulseError::Connection(
                "no tag manager accounts found".to_string(),
            ));
        }

        for account in &accounts {
            let Some(account_id) = account.get("accountId").and_then(Value::as_str) else {
                continue;
            };
            let containers = self
                .get_json(
                    &format!("{BASE_URL}/accounts/{account_id}/containers"),
                    token,
                    timeout,
                )
                .await?;

            if let Some(found) = find_container(&containers, public_id) {
                return Ok(ContainerRef {
                    account_id: account_id.to_string(),
                    container_id: found,
                });
            }
        }

        Err(PulseError::Connection(format!(
            "container {public_id} not found"
        )))
    }

    async fn resolve_workspace(&self, token: &str, container: &ContainerRef) -> PulseResult<String> {
        let url = format!(
            "{BASE_URL}/accounts/{}/containers/{}/workspaces",
            container.account_id, container.container_id
        );
        let workspaces = self
            .get_json(&url, token, fetch_timeout(&self.ingestion))
            .await?;

        find_workspace(&workspaces, &container.container_id)
            .ok_or_else(|| PulseError::Connection("workspace not found".to_string()))
    }
}

#[async_trait]
impl SourceAdapter for TagManagerAdapter {
    fn source_type(&self) -> SourceType {
        SourceType::TagManager
    }

    async fn test_connection(
        &self,
        user_id: Uuid,
        _config: &Value,
    ) -> PulseResult<ConnectionStatus> {
        let token = match self.active_token(user_id).await {
            Ok(token) => token,
            Err(PulseError::Auth(_)) => {
                return Ok(ConnectionStatus::failed(
                    "Tag manager account not connected. Please connect your account first.",
                ))
            }
            Err(e) => return Err(e),
        };

        let timeout = connect_timeout(&self.ingestion);
        let accounts = match self
            .get_json(&format!("{BASE_URL}/accounts"), &token, timeout)
            .await
        {
            Ok(accounts) => accounts,
            Err(_) => return Ok(ConnectionStatus::failed("Tag manager connection test failed")),
        };

        let account_list = accounts.get("account").and_then(Value::as_array);
        let Some(first) = account_list.and_then(|a| a.first()) else {
            return Ok(ConnectionStatus::failed("No tag manager accounts found"));
        };

        let account_id = first.get("accountId").and_then(Value::as_str).unwrap_or("");
        match self
            .get_json(
                &format!("{BASE_URL}/accounts/{account_id}/containers"),
                &token,
                timeout,
            )
            .await
        {
            Ok(_) => Ok(ConnectionStatus::ok("Tag manager connection successful")),
            Err(_) => Ok(ConnectionStatus::failed("Tag manager connection failed")),
        }
    }

    async fn fetch_events(&self, user_id: Uuid, config: &Value) -> PulseResult<Vec<RawEvent>> {
        let public_id = config_field(config, "containerId")?;
        let token = self.active_token(user_id).await?;

        let container = self.resolve_container(&token, public_id).await?;
        let workspace_id = self.resolve_workspace(&token, &container).await?;

        let workspace_url = format!(
            "{BASE_URL}/accounts/{}/containers/{}/workspaces/{workspace_id}",
            container.account_id, container.container_id
        );

        // Independent once the workspace path is known; fetch concurrently.
        let timeout = fetch_timeout(&self.ingestion);
        let tags_url = format!("{workspace_url}/tags");
        let triggers_url = format!("{workspace_url}/triggers");
        let variables_url = format!("{workspace_url}/variables");
        let (tags, triggers, variables) = tokio::try_join!(
            self.get_json(&tags_url, &token, timeout),
            self.get_json(&triggers_url, &token, timeout),
            self.get_json(&variables_url, &token, timeout),
        )?;

        let mut events = map_tags_response(&tags);
        events.extend(map_triggers_response(&triggers));
        events.extend(map_variables_response(&variables));

        info!(
            container = public_id,
            count = events.len(),
            "fetched tag manager entities"
        );
        Ok(events)
    }
}

fn find_container(response: &Value, public_id: &str) -> Option<String> {
    response
        .get("container")
        .and_then(Value::as_array)?
        .iter()
        .find(|c| c.get("publicId").and_then(Value::as_str) == Some(public_id))?
        .get("containerId")
        .and_then(Value::as_str)
        .map(String::from)
}

fn find_workspace(response: &Value, container_id: &str) -> Option<String> {
    response
        .get("workspace")
        .and_then(Value::as_array)?
        .iter()
        .find(|w| w.get("containerId").and_then(Value::as_str) == Some(container_id))?
        .get("workspaceId")
        .and_then(Value::as_str)
        .map(String::from)
}

/// One raw event per tag in a workspace tags listing.
fn map_tags_response(response: &Value) -> Vec<RawEvent> {
    items(response, "tag")
        .map(|tag| {
            RawEvent::new(
                "gtm_tag",
                json!({
                    "tagId": tag.get("tagId"),
                    "name": tag.get("name"),
                    "type": tag.get("type"),
                    "firingTriggerId": tag.get("firingTriggerId"),
                    "blockingTriggerId": tag.get("blockingTriggerId"),
                    "liveOnly": tag.get("liveOnly"),
                    "parameter": tag.get("parameter"),
                }),
                Utc::now(),
            )
            .with_source(SourceType::TagManager)
        })
        .collect()
}

fn map_triggers_response(response: &Value) -> Vec<RawEvent> {
    items(response, "trigger")
        .map(|trigger| {
            RawEvent::new(
                "gtm_trigger",
                json!({
                    "triggerId": trigger.get("triggerId"),
                    "name": trigger.get("name"),
                    "type": trigger.get("type"),
                    "customEventFilter": trigger.get("customEventFilter"),
                    "filter": trigger.get("filter"),
                }),
                Utc::now(),
            )
            .with_source(SourceType::TagManager)
        })
        .collect()
}

fn map_variables_response(response: &Value) -> Vec<RawEvent> {
    items(response, "variable")
        .map(|variable| {
            RawEvent::new(
                "gtm_variable",
                json!({
                    "variableId": variable.get("variableId"),
                    "name": variable.get("name"),
                    "type": variable.get("type"),
                    "parameter": variable.get("parameter"),
                }),
                Utc::now(),
            )
            .with_source(SourceType::TagManager)
        })
        .collect()
}

fn items<'a>(response: &'a Value, key: &str) -> impl Iterator<Item = &'a Value> {
    response
        .get(key)
        .and_then(Value::as_array)
        .map(|a| a.iter())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_container_match_on_public_id() {
        let response = json!({
            "container": [
                {"publicId": "GTM-AAA111", "containerId": "100", "accountId": "1"},
                {"publicId": "GTM-BBB222", "containerId": "200", "accountId": "1"},
            ]
        });

        assert_eq!(find_container(&response, "GTM-BBB222").as_deref(), Some("200"));
        assert!(find_container(&response, "GTM-MISSING").is_none());
        assert!(find_container(&json!({}), "GTM-AAA111").is_none());
    }

    #[test]
    fn test_workspace_match_on_container_id() {
        let response = json!({
            "workspace": [
                {"workspaceId": "7", "containerId": "200"},
                {"workspaceId": "9", "containerId": "300"},
            ]
        });

        assert_eq!(find_workspace(&response, "300").as_deref(), Some("9"));
        assert!(find_workspace(&response, "999").is_none());
    }

    #[test]
    fn test_tag_listing_maps_to_raw_events() {
        let response = json!({
            "tag": [
                {
                    "tagId": "12",
                    "name": "GA4 Config",
                    "type": "gaawc",
                    "firingTriggerId": ["2147479553"],
                    "liveOnly": false,
                },
                {"tagId": "13", "name": "Conversion", "type": "awct"},
            ]
        });

        let events = map_tags_response(&response);
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event_type.as_deref(), Some("gtm_tag"));
        assert_eq!(events[0].source, Some(SourceType::TagManager));
        assert_eq!(events[0].event_data["tagId"], "12");
        assert_eq!(events[1].event_data["firingTriggerId"], Value::Null);
    }

    #[test]
    fn test_empty_listings_map_to_no_events() {
        assert!(map_tags_response(&json!({})).is_empty());
        assert!(map_triggers_response(&json!({"trigger": []})).is_empty());
        assert!(map_variables_response(&json!({"variable": null})).is_empty());
    }

    #[test]
    fn test_trigger_and_variable_mapping() {
        let triggers = json!({"trigger": [{"triggerId": "5", "name": "All Pages", "type": "pageview"}]});
        let variables = json!({"variable": [{"variableId": "3", "name": "Page URL", "type": "u"}]});

        let trigger_events = map_triggers_response(&triggers);
        assert_eq!(trigger_events[0].event_type.as_deref(), Some("gtm_trigger"));
        assert_eq!(trigger_events[0].event_data["triggerId"], "5");

        let variable_events = map_variables_response(&variables);
        assert_eq!(variable_events[0].event_type.as_deref(), Some("gtm_variable"));
        assert_eq!(variable_events[0].event_data["name"], "Page URL");
    }
}
