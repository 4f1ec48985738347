//! Repository seams for data sources and canonical events.
//!
//! Persistence is an external capability; the traits are the contract and
//! the DashMap-backed implementations serve tests and the demo binary.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use uuid::Uuid;

use pulse_core::error::{PulseError, PulseResult};
use pulse_core::types::{DataEvent, DataSourceConfig, DataSourceStatus, Envelope, SourceType};

#[async_trait]
pub trait DataSourceRepository: Send + Sync {
    async fn insert(&self, data_source: DataSourceConfig) -> PulseResult<DataSourceConfig>;
    async fn find_by_id(&self, id: Uuid) -> Option<DataSourceConfig>;
    /// All of a user's data sources, newest first.
    async fn find_by_user(&self, user_id: Uuid) -> Vec<DataSourceConfig>;
    async fn find_named(
        &self,
        user_id: Uuid,
        source_type: SourceType,
        name: &str,
    ) -> Option<DataSourceConfig>;
    async fn set_status(&self, id: Uuid, status: DataSourceStatus) -> PulseResult<()>;
    async fn set_last_sync(&self, id: Uuid, at: DateTime<Utc>) -> PulseResult<()>;
    async fn remove(&self, id: Uuid) -> PulseResult<()>;
}

#[async_trait]
pub trait EventRepository: Send + Sync {
    async fn insert(&self, event: DataEvent) -> PulseResult<DataEvent>;
    /// Events for one data source, newest first, paginated.
    async fn find_recent(&self, data_source_id: Uuid, limit: usize, offset: usize)
        -> Vec<DataEvent>;
    /// Most recent events across several data sources.
    async fn find_recent_for_sources(&self, data_source_ids: &[Uuid], limit: usize)
        -> Vec<DataEvent>;
    async fn find_by_ids(&self, data_source_id: Uuid, ids: &[Uuid]) -> Vec<DataEvent>;
    async fn count(&self, data_source_id: Uuid) -> usize;
    /// Overwrite a stored event's envelope in place (reprocessing).
    async fn replace_event_data(
        &self,
        id: Uuid,
        event_data: Envelope,
        processed_at: DateTime<Utc>,
    ) -> PulseResult<()>;
    /// Cascade delete; returns how many events were removed.
    async fn remove_for_data_source(&self, data_source_id: Uuid) -> usize;
}

pub struct InMemoryDataSourceRepository {
    sources: DashMap<Uuid, DataSourceConfig>,
}

impl Default for InMemoryDataSourceRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryDataSourceRepository {
    pub fn new() -> Self {
        Self {
            sources: DashMap::new(),
        }
    }

    fn with_entry<T>(
        &self,
        id: Uuid,
        apply: impl FnOnce(&mut DataSourceConfig) -> T,
    ) -> PulseResult<T> {
        let mut entry = self
            .sources
            .get_mut(&id)
            .ok_or_else(|| PulseError::NotFound(format!("data source {id}")))?;
        Ok(apply(entry.value_mut()))
    }
}

#[async_trait]
impl DataSourceRepository for InMemoryDataSourceRepository {
    async fn insert(&self, data_source: DataSourceConfig) -> PulseResult<DataSourceConfig> {
        self.sources.insert(data_source.id, data_source.clone());
        Ok(data_source)
    }

    async fn find_by_id(&self, id: Uuid) -> Option<DataSourceConfig> {
        self.sources.get(&id).map(|entry| entry.value().clone())
    }

    async fn find_by_user(&self, user_id: Uuid) -> Vec<DataSourceConfig> {
        let mut sources: Vec<DataSourceConfig> = self
            .sources
            .iter()
            .filter(|entry| entry.value().user_id == user_id)
            .map(|entry| entry.value().clone())
            .collect();
        sources.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        sources
    }

    async fn find_named(
        &self,
        user_id: Uuid,
        source_type: SourceType,
        name: &str,
    ) -> Option<DataSourceConfig> {
        self.sources
            .iter()
            .find(|entry| {
                let ds = entry.value();
                ds.user_id == user_id && ds.source_type == source_type && ds.name == name
            })
            .map(|entry| entry.value().clone())
    }

    async fn set_status(&self, id: Uuid, status: DataSourceStatus) -> PulseResult<()> {
        self.with_entry(id, |ds| ds.status = status)
    }

    async fn set_last_sync(&self, id: Uuid, at: DateTime<Utc>) -> PulseResult<()> {
        self.with_entry(id, |ds| ds.last_sync_at = Some(at))
    }

    async fn remove(&self, id: Uuid) -> PulseResult<()> {
        self.sources
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| PulseError::NotFound(format!("data source {id}")))
    }
}

pub struct InMemoryEventRepository {
    events: DashMap<Uuid, DataEvent>,
}

impl Default for InMemoryEventRepository {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryEventRepository {
    pub fn new() -> Self {
        Self {
            events: DashMap::new(),
        }
    }

    fn sorted_newest_first(&self, filter: impl Fn(&DataEvent) -> bool) -> Vec<DataEvent> {
        let mut events: Vec<DataEvent> = self
            .events
            .iter()
            .filter(|entry| filter(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        events.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        events
    }
}

#[async_trait]
impl EventRepository for InMemoryEventRepository {
    async fn insert(&self, event: DataEvent) -> PulseResult<DataEvent> {
        self.events.insert(event.id, event.clone());
        Ok(event)
    }

    async fn find_recent(
        &self,
        data_source_id: Uuid,
        limit: usize,
        offset: usize,
    ) -> Vec<DataEvent> {
        self.sorted_newest_first(|e| e.data_source_id == data_source_id)
            .into_iter()
            .skip(offset)
            .take(limit)
            .collect()
    }

    async fn find_recent_for_sources(
        &self,
        data_source_ids: &[Uuid],
        limit: usize,
    ) -> Vec<DataEvent> {
        self.sorted_newest_first(|e| data_source_ids.contains(&e.data_source_id))
            .into_iter()
            .take(limit)
            .collect()
    }

    async fn find_by_ids(&self, data_source_id: Uuid, ids: &[Uuid]) -> Vec<DataEvent> {
        ids.iter()
            .filter_map(|id| self.events.get(id))
            .filter(|entry| entry.value().data_source_id == data_source_id)
            .map(|entry| entry.value().clone())
            .collect()
    }

    async fn count(&self, data_source_id: Uuid) -> usize {
        self.events
            .iter()
            .filter(|entry| entry.value().data_source_id == data_source_id)
            .count()
    }

    async fn replace_event_data(
        &self,
        id: Uuid,
        event_data: Envelope,
        processed_at: DateTime<Utc>,
    ) -> PulseResult<()> {
        let mut entry = self
            .events
            .get_mut(&id)
            .ok_or_else(|| PulseError::NotFound(format!("event {id}")))?;
        entry.event_data = event_data;
        entry.processed_at = processed_at;
        Ok(())
    }

    async fn remove_for_data_source(&self, data_source_id: Uuid) -> usize {
        let ids: Vec<Uuid> = self
            .events
            .iter()
            .filter(|entry| entry.value().data_source_id == data_source_id)
            .map(|entry| *entry.key())
            .collect();
        for id in &ids {
            self.events.remove(id);
        }
        ids.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_core::types::Envelope;
    use serde_json::json;

    fn event(data_source_id: Uuid, created_at: DateTime<Utc>) -> DataEvent {
        DataEvent {
            id: Uuid::new_v4(),
            data_source_id,
            event_type: "gtm_tag".to_string(),
            event_data: Envelope {
                source: SourceType::TagManager,
                event_type: "gtm_tag".to_string(),
                timestamp: created_at,
                processed_at: created_at,
                data: json!({"id": "t"}),
            },
            processed_at: created_at,
            created_at,
        }
    }

    #[tokio::test]
    async fn test_pagination_newest_first() {
        let repo = InMemoryEventRepository::new();
        let ds = Uuid::new_v4();
        let base = Utc::now();
        for i in 0..5 {
            repo.insert(event(ds, base + chrono::Duration::seconds(i)))
                .await
                .unwrap();
        }

        let page = repo.find_recent(ds, 2, 0).await;
        assert_eq!(page.len(), 2);
        assert!(page[0].created_at >= page[1].created_at);

        let rest = repo.find_recent(ds, 10, 2).await;
        assert_eq!(rest.len(), 3);
    }

    #[tokio::test]
    async fn test_cascade_removal() {
        let repo = InMemoryEventRepository::new();
        let ds_a = Uuid::new_v4();
        let ds_b = Uuid::new_v4();
        repo.insert(event(ds_a, Utc::now())).await.unwrap();
        repo.insert(event(ds_a, Utc::now())).await.unwrap();
        repo.insert(event(ds_b, Utc::now())).await.unwrap();

        assert_eq!(repo.remove_for_data_source(ds_a).await, 2);
        assert_eq!(repo.count(ds_a).await, 0);
        assert_eq!(repo.count(ds_b).await, 1);
    }

    #[tokio::test]
    async fn test_find_by_ids_checks_ownership() {
        let repo = InMemoryEventRepository::new();
        let ds_a = Uuid::new_v4();
        let ds_b = Uuid::new_v4();
        let mine = repo.insert(event(ds_a, Utc::now())).await.unwrap();
        let other = repo.insert(event(ds_b, Utc::now())).await.unwrap();

        let found = repo.find_by_ids(ds_a, &[mine.id, other.id]).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].id, mine.id);
    }
}
