//! Top-level orchestration: data source lifecycle, connection tests, and
//! syncs.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use dashmap::DashMap;
use serde_json::Value;
use tracing::{info, warn};
use uuid::Uuid;

use pulse_core::error::{PulseError, PulseResult};
use pulse_core::types::{
    ConnectionStatus, DataEvent, DataSourceConfig, DataSourceStatus, SourceType, SyncOutcome,
};

use crate::adapters::SourceAdapter;
use crate::processor::EventProcessor;
use crate::store::{DataSourceRepository, EventRepository};
use crate::validator;

#[derive(Debug, Clone)]
pub struct CreateDataSourceRequest {
    pub source_type: SourceType,
    pub name: String,
    pub config: Value,
}

pub struct IntegrationService {
    data_sources: Arc<dyn DataSourceRepository>,
    events: Arc<dyn EventRepository>,
    processor: Arc<EventProcessor>,
    adapters: HashMap<SourceType, Arc<dyn SourceAdapter>>,
    /// Data sources with a sync currently in flight.
    syncing: DashMap<Uuid, ()>,
}

/// Removes the in-flight marker when a sync ends, on any exit path.
struct SyncGuard<'a> {
    syncing: &'a DashMap<Uuid, ()>,
    id: Uuid,
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.syncing.remove(&self.id);
    }
}

impl IntegrationService {
    pub fn new(
        data_sources: Arc<dyn DataSourceRepository>,
        events: Arc<dyn EventRepository>,
        processor: Arc<EventProcessor>,
        adapters: HashMap<SourceType, Arc<dyn SourceAdapter>>,
    ) -> Self {
        Self {
            data_sources,
            events,
            processor,
            adapters,
            syncing: DashMap::new(),
        }
    }

    fn adapter(&self, source_type: SourceType) -> PulseResult<&Arc<dyn SourceAdapter>> {
        self.adapters
            .get(&source_type)
            .ok_or_else(|| PulseError::Config("unsupported data source type".to_string()))
    }

    /// Validate the config shape, then prove the connection live, then
    /// persist as active.
    pub async fn create_data_source(
        &self,
        user_id: Uuid,
        request: CreateDataSourceRequest,
    ) -> PulseResult<DataSourceConfig> {
        if !validator::validate_config(request.source_type, &request.config) {
            return Err(PulseError::Config(
                "invalid configuration for data source type".to_string(),
            ));
        }

        let status = self
            .test_connection(user_id, request.source_type, &request.config)
            .await;
        if !status.success {
            return Err(PulseError::Config(status.message));
        }

        let data_source = DataSourceConfig {
            id: Uuid::new_v4(),
            user_id,
            source_type: request.source_type,
            name: request.name,
            config: request.config,
            status: DataSourceStatus::Active,
            last_sync_at: None,
            credential_id: None,
            created_at: Utc::now(),
        };

        let saved = self.data_sources.insert(data_source).await?;
        info!(
            data_source_id = %saved.id,
            source = request.source_type.display_name(),
            "data source created"
        );
        Ok(saved)
    }

    /// Dispatch a connection test; every failure surfaces as a structured
    /// status with a sanitized message.
    pub async fn test_connection(
        &self,
        user_id: Uuid,
        source_type: SourceType,
        config: &Value,
    ) -> ConnectionStatus {
        let Ok(adapter) = self.adapter(source_type) else {
            return ConnectionStatus::failed("unsupported data source type");
        };

        match adapter.test_connection(user_id, config).await {
            Ok(status) => status,
            Err(e) => {
                warn!(error = %e, source = source_type.as_str(), "connection test errored");
                ConnectionStatus::failed(format!(
                    "{} connection test failed",
                    source_type.display_name()
                ))
            }
        }
    }

    /// Fetch a batch from the upstream provider and run it through the
    /// event processor. At most one sync per data source may be in flight.
    pub async fn sync_data_source(&self, id: Uuid, user_id: Uuid) -> PulseResult<SyncOutcome> {
        let data_source = self.get_data_source(id, user_id).await?;

        {
            use dashmap::mapref::entry::Entry;
            match self.syncing.entry(id) {
                Entry::Occupied(_) => return Err(PulseError::SyncInProgress(id)),
                Entry::Vacant(slot) => {
                    slot.insert(());
                }
            }
        }
        let _guard = SyncGuard {
            syncing: &self.syncing,
            id,
        };

        let adapter = self.adapter(data_source.source_type)?;
        let raw_events = match adapter.fetch_events(user_id, &data_source.config).await {
            Ok(events) => events,
            Err(e) => {
                let status = if e.is_auth() {
                    DataSourceStatus::NeedsReauth
                } else {
                    DataSourceStatus::Error
                };
                self.data_sources.set_status(id, status).await?;
                warn!(data_source_id = %id, error = %e, "sync failed while fetching");
                return Err(e);
            }
        };

        let processed = self.processor.process_events(&raw_events, id).await;

        self.data_sources
            .set_status(id, DataSourceStatus::Active)
            .await?;
        self.data_sources.set_last_sync(id, Utc::now()).await?;

        info!(
            data_source_id = %id,
            fetched = raw_events.len(),
            persisted = processed.len(),
            "sync completed"
        );

        Ok(SyncOutcome {
            success: true,
            events_count: processed.len(),
        })
    }

    pub async fn get_data_sources(&self, user_id: Uuid) -> Vec<DataSourceConfig> {
        self.data_sources.find_by_user(user_id).await
    }

    pub async fn get_data_source(&self, id: Uuid, user_id: Uuid) -> PulseResult<DataSourceConfig> {
        self.data_sources
            .find_by_id(id)
            .await
            .filter(|ds| ds.user_id == user_id)
            .ok_or_else(|| PulseError::NotFound("data source not found".to_string()))
    }

    /// Delete a data source and cascade removal of its events.
    pub async fn delete_data_source(&self, id: Uuid, user_id: Uuid) -> PulseResult<()> {
        self.get_data_source(id, user_id).await?;
        let removed = self.events.remove_for_data_source(id).await;
        self.data_sources.remove(id).await?;
        info!(data_source_id = %id, events_removed = removed, "data source deleted");
        Ok(())
    }

    /// Canonical events for one data source, newest first.
    pub async fn get_data_events(
        &self,
        data_source_id: Uuid,
        user_id: Uuid,
        limit: usize,
        offset: usize,
    ) -> PulseResult<Vec<DataEvent>> {
        self.get_data_source(data_source_id, user_id).await?;
        Ok(self.events.find_recent(data_source_id, limit, offset).await)
    }

    /// Force every data source backed by the revoked credential into
    /// `needs_reauth`.
    pub async fn handle_credential_revoked(
        &self,
        user_id: Uuid,
        source_type: SourceType,
    ) -> PulseResult<usize> {
        let mut flipped = 0;
        for data_source in self.data_sources.find_by_user(user_id).await {
            if data_source.source_type == source_type {
                self.data_sources
                    .set_status(data_source.id, DataSourceStatus::NeedsReauth)
                    .await?;
                flipped += 1;
            }
        }
        Ok(flipped)
    }

    pub(crate) fn processor(&self) -> &Arc<EventProcessor> {
        &self.processor
    }

    pub(crate) fn data_source_repository(&self) -> &Arc<dyn DataSourceRepository> {
        &self.data_sources
    }
}
