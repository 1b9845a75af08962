//! Reference data repository.
//!
//! Global catalogs (channels, event sources, currencies, attribution models) are read on
//! every ingest and journey build, so positive lookups are cached in small LRU maps.
//! Tenant directories (vendors, teams, agents, products) are always read through.

use std::{collections::HashMap, num::NonZeroUsize, sync::Arc};

use chrono::Utc;
use lru::LruCache;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::engine::registry::ModelDefinition;
use crate::error::{AttributionError, EngineResult};
use crate::models::{
    Agent, AttributionModel, Channel, Currency, EventSource, Product, Team, Vendor, agent,
    attribution_model, channel, currency, event_source, product, team, vendor,
};

const CACHE_CAPACITY: NonZeroUsize = match NonZeroUsize::new(64) {
    Some(capacity) => capacity,
    None => unreachable!(),
};

type Cache<V> = Arc<RwLock<LruCache<String, V>>>;

fn new_cache<V>() -> Cache<V> {
    Arc::new(RwLock::new(LruCache::new(CACHE_CAPACITY)))
}

async fn cached<V: Clone>(cache: &Cache<V>, key: &str) -> Option<V> {
    cache.read().await.peek(key).cloned()
}

async fn remember<V>(cache: &Cache<V>, key: String, value: V) {
    cache.write().await.put(key, value);
}

/// Repository for reference and directory lookups
#[derive(Clone)]
pub struct ReferenceDataRepository {
    db: DatabaseConnection,
    channels: Cache<channel::Model>,
    event_sources: Cache<event_source::Model>,
    currencies: Cache<currency::Model>,
    models: Cache<attribution_model::Model>,
}

impl ReferenceDataRepository {
    pub fn new(db: DatabaseConnection) -> Self {
        Self {
            db,
            channels: new_cache(),
            event_sources: new_cache(),
            currencies: new_cache(),
            models: new_cache(),
        }
    }

    pub async fn channel_by_name(&self, name: &str) -> EngineResult<Option<channel::Model>> {
        let key = name.trim().to_lowercase();
        if let Some(hit) = cached(&self.channels, &key).await {
            return Ok(Some(hit));
        }

        let found = Channel::find()
            .filter(channel::Column::Name.eq(key.clone()))
            .one(&self.db)
            .await?;
        if let Some(model) = &found {
            remember(&self.channels, key, model.clone()).await;
        }
        Ok(found)
    }

    pub async fn require_channel(&self, name: &str) -> EngineResult<channel::Model> {
        self.channel_by_name(name)
            .await?
            .ok_or_else(|| AttributionError::not_found("channel", name))
    }

    /// Resolves every name to a channel id; the first unknown name is reported.
    pub async fn channel_ids_for_names(&self, names: &[String]) -> EngineResult<Vec<Uuid>> {
        let mut ids = Vec::with_capacity(names.len());
        for name in names {
            ids.push(self.require_channel(name).await?.id);
        }
        Ok(ids)
    }

    pub async fn channels_by_ids(&self, ids: &[Uuid]) -> EngineResult<HashMap<Uuid, channel::Model>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = Channel::find()
            .filter(channel::Column::Id.is_in(ids.to_vec()))
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(|row| (row.id, row)).collect())
    }

    pub async fn require_event_source(&self, name: &str) -> EngineResult<event_source::Model> {
        let key = name.trim().to_lowercase();
        if let Some(hit) = cached(&self.event_sources, &key).await {
            return Ok(hit);
        }

        let found = EventSource::find()
            .filter(event_source::Column::Name.eq(key.clone()))
            .one(&self.db)
            .await?
            .ok_or_else(|| AttributionError::not_found("event_source", name))?;
        remember(&self.event_sources, key, found.clone()).await;
        Ok(found)
    }

    pub async fn event_sources_by_ids(
        &self,
        ids: &[Uuid],
    ) -> EngineResult<HashMap<Uuid, event_source::Model>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = EventSource::find()
            .filter(event_source::Column::Id.is_in(ids.to_vec()))
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(|row| (row.id, row)).collect())
    }

    pub async fn require_currency(&self, code: &str) -> EngineResult<currency::Model> {
        let key = code.trim().to_uppercase();
        if let Some(hit) = cached(&self.currencies, &key).await {
            return Ok(hit);
        }

        let found = Currency::find()
            .filter(currency::Column::Code.eq(key.clone()))
            .one(&self.db)
            .await?
            .ok_or_else(|| AttributionError::not_found("currency", code))?;
        remember(&self.currencies, key, found.clone()).await;
        Ok(found)
    }

    pub async fn currencies_by_ids(
        &self,
        ids: &[Uuid],
    ) -> EngineResult<HashMap<Uuid, currency::Model>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = Currency::find()
            .filter(currency::Column::Id.is_in(ids.to_vec()))
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(|row| (row.id, row)).collect())
    }

    pub async fn model_by_code(&self, code: &str) -> EngineResult<Option<attribution_model::Model>> {
        let key = code.trim().to_uppercase();
        if let Some(hit) = cached(&self.models, &key).await {
            return Ok(Some(hit));
        }

        let found = AttributionModel::find()
            .filter(attribution_model::Column::Code.eq(key.clone()))
            .one(&self.db)
            .await?;
        if let Some(model) = &found {
            remember(&self.models, key, model.clone()).await;
        }
        Ok(found)
    }

    pub async fn model_by_id(&self, id: Uuid) -> EngineResult<Option<attribution_model::Model>> {
        Ok(AttributionModel::find_by_id(id).one(&self.db).await?)
    }

    pub async fn list_models(&self) -> EngineResult<Vec<attribution_model::Model>> {
        Ok(AttributionModel::find()
            .order_by_asc(attribution_model::Column::Code)
            .all(&self.db)
            .await?)
    }

    // Tenant directories

    pub async fn vendor_by_code(&self, tenant_id: Uuid, code: &str) -> EngineResult<Option<vendor::Model>> {
        Ok(Vendor::find()
            .filter(vendor::Column::TenantId.eq(tenant_id))
            .filter(vendor::Column::Code.eq(code.trim()))
            .one(&self.db)
            .await?)
    }

    pub async fn agent_by_external_id(
        &self,
        tenant_id: Uuid,
        external_agent_id: &str,
    ) -> EngineResult<Option<agent::Model>> {
        Ok(Agent::find()
            .filter(agent::Column::TenantId.eq(tenant_id))
            .filter(agent::Column::ExternalAgentId.eq(external_agent_id.trim()))
            .one(&self.db)
            .await?)
    }

    pub async fn agents_by_ids(
        &self,
        tenant_id: Uuid,
        ids: &[Uuid],
    ) -> EngineResult<HashMap<Uuid, agent::Model>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows = Agent::find()
            .filter(agent::Column::TenantId.eq(tenant_id))
            .filter(agent::Column::Id.is_in(ids.to_vec()))
            .all(&self.db)
            .await?;
        Ok(rows.into_iter().map(|row| (row.id, row)).collect())
    }

    pub async fn product_by_external_id(
        &self,
        tenant_id: Uuid,
        external_product_id: &str,
    ) -> EngineResult<Option<product::Model>> {
        Ok(Product::find()
            .filter(product::Column::TenantId.eq(tenant_id))
            .filter(product::Column::ExternalProductId.eq(external_product_id.trim()))
            .one(&self.db)
            .await?)
    }

    pub async fn create_vendor(&self, tenant_id: Uuid, code: &str, name: &str) -> EngineResult<vendor::Model> {
        let now = Utc::now().fixed_offset();
        let model = vendor::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(tenant_id),
            code: Set(code.trim().to_string()),
            name: Set(name.to_string()),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        };
        Ok(model.insert(&self.db).await?)
    }

    pub async fn create_team(
        &self,
        tenant_id: Uuid,
        vendor_id: Option<Uuid>,
        name: &str,
    ) -> EngineResult<team::Model> {
        let now = Utc::now().fixed_offset();
        let model = team::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(tenant_id),
            vendor_id: Set(vendor_id),
            name: Set(name.to_string()),
            created_at: Set(now),
            updated_at: Set(now),
        };
        Ok(model.insert(&self.db).await?)
    }

    pub async fn create_agent(
        &self,
        tenant_id: Uuid,
        external_agent_id: &str,
        name: &str,
        team_id: Option<Uuid>,
        vendor_id: Option<Uuid>,
    ) -> EngineResult<agent::Model> {
        let now = Utc::now().fixed_offset();
        let model = agent::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(tenant_id),
            vendor_id: Set(vendor_id),
            team_id: Set(team_id),
            external_agent_id: Set(external_agent_id.trim().to_string()),
            name: Set(name.to_string()),
            email: Set(None),
            is_active: Set(true),
            created_at: Set(now),
            updated_at: Set(now),
        };
        Ok(model.insert(&self.db).await?)
    }

    pub async fn create_product(
        &self,
        tenant_id: Uuid,
        external_product_id: &str,
        name: &str,
        category: Option<&str>,
    ) -> EngineResult<product::Model> {
        let model = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            tenant_id: Set(tenant_id),
            external_product_id: Set(external_product_id.trim().to_string()),
            name: Set(name.to_string()),
            category: Set(category.map(str::to_string)),
            created_at: Set(Utc::now().fixed_offset()),
        };
        Ok(model.insert(&self.db).await?)
    }

    // Seeding

    /// Inserts the channel unless one with the same name exists; returns whether it was created.
    pub async fn ensure_channel(&self, name: &str, description: &str) -> EngineResult<bool> {
        if self.channel_by_name(name).await?.is_some() {
            return Ok(false);
        }
        channel::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            description: Set(Some(description.to_string())),
            created_at: Set(Utc::now().fixed_offset()),
        }
        .insert(&self.db)
        .await?;
        Ok(true)
    }

    pub async fn ensure_event_source(
        &self,
        name: &str,
        source_type: &str,
        description: &str,
    ) -> EngineResult<bool> {
        match self.require_event_source(name).await {
            Ok(_) => return Ok(false),
            Err(AttributionError::NotFound { .. }) => {}
            Err(other) => return Err(other),
        }
        event_source::ActiveModel {
            id: Set(Uuid::new_v4()),
            name: Set(name.to_string()),
            source_type: Set(source_type.to_string()),
            description: Set(Some(description.to_string())),
            created_at: Set(Utc::now().fixed_offset()),
        }
        .insert(&self.db)
        .await?;
        Ok(true)
    }

    pub async fn ensure_currency(&self, code: &str, name: &str) -> EngineResult<bool> {
        match self.require_currency(code).await {
            Ok(_) => return Ok(false),
            Err(AttributionError::NotFound { .. }) => {}
            Err(other) => return Err(other),
        }
        currency::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(code.to_uppercase()),
            name: Set(name.to_string()),
            created_at: Set(Utc::now().fixed_offset()),
        }
        .insert(&self.db)
        .await?;
        Ok(true)
    }

    pub async fn ensure_model(&self, definition: &ModelDefinition) -> EngineResult<bool> {
        if self.model_by_code(definition.code.as_str()).await?.is_some() {
            return Ok(false);
        }
        attribution_model::ActiveModel {
            id: Set(Uuid::new_v4()),
            code: Set(definition.code.as_str().to_string()),
            name: Set(definition.name.to_string()),
            description: Set(Some(definition.description.to_string())),
            params: Set(definition.params()),
            created_at: Set(Utc::now().fixed_offset()),
        }
        .insert(&self.db)
        .await?;
        Ok(true)
    }
}
