//! Stored OAuth credentials and token lifecycle for the tag-manager source.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::info;
use url::Url;
use uuid::Uuid;

use pulse_core::config::OauthConfig;
use pulse_core::error::{PulseError, PulseResult};
use pulse_core::types::SourceType;

const GOOGLE_AUTH_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TAG_MANAGER_SCOPE: &str = "https://www.googleapis.com/auth/tagmanager.readonly";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialStatus {
    Active,
    Revoked,
}

/// A stored OAuth grant for one user and source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OauthCredential {
    pub id: Uuid,
    pub user_id: Uuid,
    pub source_type: SourceType,
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub status: CredentialStatus,
    pub created_at: DateTime<Utc>,
}

impl OauthCredential {
    pub fn is_expired(&self) -> bool {
        self.token_expires_at
            .map(|expires| expires < Utc::now())
            .unwrap_or(false)
    }
}

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn find_active(&self, user_id: Uuid, source_type: SourceType)
        -> Option<OauthCredential>;
    async fn insert(&self, credential: OauthCredential);
    async fn update_tokens(
        &self,
        id: Uuid,
        access_token: String,
        expires_at: DateTime<Utc>,
    ) -> PulseResult<()>;
    async fn revoke(&self, id: Uuid) -> PulseResult<()>;
}

/// DashMap-backed credential store.
pub struct InMemoryCredentialStore {
    credentials: DashMap<Uuid, OauthCredential>,
}

impl Default for InMemoryCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self {
            credentials: DashMap::new(),
        }
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn find_active(
        &self,
        user_id: Uuid,
        source_type: SourceType,
    ) -> Option<OauthCredential> {
        self.credentials
            .iter()
            .find(|entry| {
                let c = entry.value();
                c.user_id == user_id
                    && c.source_type == source_type
                    && c.status == CredentialStatus::Active
            })
            .map(|entry| entry.value().clone())
    }

    async fn insert(&self, credential: OauthCredential) {
        self.credentials.insert(credential.id, credential);
    }

    async fn update_tokens(
        &self,
        id: Uuid,
        access_token: String,
        expires_at: DateTime<Utc>,
    ) -> PulseResult<()> {
        let mut entry = self
            .credentials
            .get_mut(&id)
            .ok_or_else(|| PulseError::NotFound(format!("credential {id}")))?;
        entry.access_token = access_token;
        entry.token_expires_at = Some(expires_at);
        Ok(())
    }

    async fn revoke(&self, id: Uuid) -> PulseResult<()> {
        let mut entry = self
            .credentials
            .get_mut(&id)
            .ok_or_else(|| PulseError::NotFound(format!("credential {id}")))?;
        entry.status = CredentialStatus::Revoked;
        info!(credential_id = %id, "credential revoked");
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

/// Resolves valid access tokens, refreshing and persisting rotated tokens
/// when the stored one has expired.
pub struct TokenManager {
    http: reqwest::Client,
    oauth: OauthConfig,
    store: Arc<dyn CredentialStore>,
}

impl TokenManager {
    pub fn new(oauth: OauthConfig, store: Arc<dyn CredentialStore>) -> Self {
        Self {
            http: reqwest::Client::new(),
            oauth,
            store,
        }
    }

    /// Return a usable access token for the credential, refreshing first if
    /// the stored one has expired.
    pub async fn valid_access_token(&self, credential: &OauthCredential) -> PulseResult<String> {
        if !credential.is_expired() {
            return Ok(credential.access_token.clone());
        }
        self.refresh_access_token(credential).await
    }

    async fn refresh_access_token(&self, credential: &OauthCredential) -> PulseResult<String> {
        let refresh_token = credential.refresh_token.as_deref().ok_or_else(|| {
            PulseError::Auth("access token expired and no refresh token available".to_string())
        })?;

        let response = self
            .http
            .post(&self.oauth.google_token_endpoint)
            .json(&serde_json::json!({
                "client_id": self.oauth.google_client_id,
                "client_secret": self.oauth.google_client_secret,
                "refresh_token": refresh_token,
                "grant_type": "refresh_token",
            }))
            .send()
            .await
            .map_err(|e| PulseError::Auth(format!("token refresh request failed: {e}")))?;

        if !response.status().is_success() {
            return Err(PulseError::Auth(format!(
                "token refresh rejected with status {}",
                response.status()
            )));
        }

        let tokens: TokenResponse = response
            .json()
            .await
            .map_err(|e| PulseError::Auth(format!("token refresh response unreadable: {e}")))?;

        let expires_at = Utc::now() + Duration::seconds(tokens.expires_in);
        self.store
            .update_tokens(credential.id, tokens.access_token.clone(), expires_at)
            .await?;

        info!(credential_id = %credential.id, "access token refreshed");
        Ok(tokens.access_token)
    }
}

/// Payload round-tripped through the OAuth `state` parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthState {
    pub user_id: Uuid,
    pub source: SourceType,
}

pub fn encode_state(user_id: Uuid, source: SourceType) -> String {
    let state = AuthState { user_id, source };
    let json = serde_json::to_vec(&state).unwrap_or_default();
    base64::engine::general_purpose::STANDARD.encode(json)
}

pub fn decode_state(state: &str) -> PulseResult<AuthState> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(state)
        .map_err(|e| PulseError::Auth(format!("invalid state parameter: {e}")))?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Build the consent-screen URL for connecting a tag-manager account.
pub fn tag_manager_auth_url(oauth: &OauthConfig, user_id: Uuid) -> PulseResult<String> {
    let mut url = Url::parse(GOOGLE_AUTH_ENDPOINT)
        .map_err(|e| PulseError::Config(format!("bad auth endpoint: {e}")))?;
    url.query_pairs_mut()
        .append_pair("client_id", &oauth.google_client_id)
        .append_pair("redirect_uri", &oauth.redirect_uri)
        .append_pair("scope", TAG_MANAGER_SCOPE)
        .append_pair("response_type", "code")
        .append_pair("state", &encode_state(user_id, SourceType::TagManager))
        .append_pair("access_type", "offline")
        .append_pair("prompt", "consent");
    Ok(url.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential(expires_at: Option<DateTime<Utc>>, refresh: Option<&str>) -> OauthCredential {
        OauthCredential {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            source_type: SourceType::TagManager,
            access_token: "stored-token".to_string(),
            refresh_token: refresh.map(String::from),
            token_expires_at: expires_at,
            status: CredentialStatus::Active,
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_unexpired_token_returned_as_is() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let manager = TokenManager::new(OauthConfig::default(), store);
        let cred = credential(Some(Utc::now() + Duration::hours(1)), None);

        let token = manager.valid_access_token(&cred).await.unwrap();
        assert_eq!(token, "stored-token");
    }

    #[tokio::test]
    async fn test_missing_expiry_means_not_expired() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let manager = TokenManager::new(OauthConfig::default(), store);
        let cred = credential(None, None);

        let token = manager.valid_access_token(&cred).await.unwrap();
        assert_eq!(token, "stored-token");
    }

    #[tokio::test]
    async fn test_expired_without_refresh_token_is_auth_error() {
        let store = Arc::new(InMemoryCredentialStore::new());
        let manager = TokenManager::new(OauthConfig::default(), store);
        let cred = credential(Some(Utc::now() - Duration::hours(1)), None);

        let err = manager.valid_access_token(&cred).await.unwrap_err();
        assert!(err.is_auth());
    }

    #[tokio::test]
    async fn test_store_lifecycle() {
        let store = InMemoryCredentialStore::new();
        let cred = credential(None, Some("refresh"));
        let user_id = cred.user_id;
        let id = cred.id;
        store.insert(cred).await;

        let found = store
            .find_active(user_id, SourceType::TagManager)
            .await
            .unwrap();
        assert_eq!(found.id, id);

        store
            .update_tokens(id, "rotated".to_string(), Utc::now())
            .await
            .unwrap();
        let rotated = store
            .find_active(user_id, SourceType::TagManager)
            .await
            .unwrap();
        assert_eq!(rotated.access_token, "rotated");

        store.revoke(id).await.unwrap();
        assert!(store
            .find_active(user_id, SourceType::TagManager)
            .await
            .is_none());
    }

    #[test]
    fn test_state_round_trip() {
        let user_id = Uuid::new_v4();
        let encoded = encode_state(user_id, SourceType::TagManager);
        let decoded = decode_state(&encoded).unwrap();
        assert_eq!(decoded.user_id, user_id);
        assert_eq!(decoded.source, SourceType::TagManager);

        assert!(decode_state("%%%not-base64%%%").is_err());
    }

    #[test]
    fn test_auth_url_carries_scope_and_state() {
        let oauth = OauthConfig {
            google_client_id: "client-1".to_string(),
            redirect_uri: "https://app.example.com/callback".to_string(),
            ..OauthConfig::default()
        };
        let url = tag_manager_auth_url(&oauth, Uuid::new_v4()).unwrap();
        assert!(url.starts_with(GOOGLE_AUTH_ENDPOINT));
        assert!(url.contains("tagmanager.readonly"));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("client_id=client-1"));
    }
}
