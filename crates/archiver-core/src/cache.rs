//! Entity lookup cache using moka
//!
//! Metadata records are read many times during aggregation (processes and
//! protocols are shared by many files). The cache is keyed by the remote URL
//! of the record or relation, is process-wide and can be switched off per run.

use crate::client::{record_self_link, MetadataSource};
use crate::config::CacheConfig;
use crate::error::ClientResult;
use async_trait::async_trait;
use moka::future::Cache;
use serde_json::Value;
use std::future::Future;
use std::time::Duration;

/// URL-keyed record cache
#[derive(Debug, Clone)]
pub struct EntityLookupCache {
    inner: Option<Cache<String, Value>>,
}

impl EntityLookupCache {
    /// Create cache from config; a disabled config never stores anything
    #[must_use]
    pub fn new(config: &CacheConfig) -> Self {
        if !config.enabled {
            return Self::disabled();
        }
        let mut builder = Cache::builder().max_capacity(config.max_capacity);
        if let Some(ttl) = config.ttl_secs {
            builder = builder.time_to_live(Duration::from_secs(ttl));
        }
        Self {
            inner: Some(builder.build()),
        }
    }

    /// Cache that never stores anything
    #[inline]
    #[must_use]
    pub fn disabled() -> Self {
        Self { inner: None }
    }

    /// Whether lookups are cached
    #[inline]
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Cached record for URL
    pub async fn get(&self, url: &str) -> Option<Value> {
        match &self.inner {
            Some(cache) => cache.get(url).await,
            None => None,
        }
    }

    /// Store record under URL
    pub async fn insert(&self, url: impl Into<String>, value: Value) {
        if let Some(cache) = &self.inner {
            cache.insert(url.into(), value).await;
        }
    }

    /// Get or fetch record
    ///
    /// # Errors
    /// Whatever the fetch returns; failures are not cached
    pub async fn try_get_or_insert_with<E, F, Fut>(&self, url: &str, fetch: F) -> Result<Value, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value, E>>,
    {
        if let Some(cached) = self.get(url).await {
            return Ok(cached);
        }

        let value = fetch().await?;
        self.insert(url, value.clone()).await;
        Ok(value)
    }

    /// Drop one URL
    pub async fn invalidate(&self, url: &str) {
        if let Some(cache) = &self.inner {
            cache.invalidate(url).await;
        }
    }

    /// Drop everything
    pub fn invalidate_all(&self) {
        if let Some(cache) = &self.inner {
            cache.invalidate_all();
        }
    }

    /// Approximate number of cached records
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.inner.as_ref().map_or(0, Cache::entry_count)
    }
}

impl Default for EntityLookupCache {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}

/// [`MetadataSource`] decorator that serves URL lookups from an [`EntityLookupCache`]
#[derive(Debug, Clone)]
pub struct CachedMetadataSource<S> {
    inner: S,
    cache: EntityLookupCache,
}

impl<S> CachedMetadataSource<S> {
    /// Wrap a source
    pub fn new(inner: S, cache: EntityLookupCache) -> Self {
        Self { inner, cache }
    }

    /// Cache in use
    #[inline]
    #[must_use]
    pub fn cache(&self) -> &EntityLookupCache {
        &self.cache
    }

    /// Wrapped source
    #[inline]
    #[must_use]
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

fn relation_url(entity: &Value, relation: &str) -> Option<String> {
    entity
        .pointer(&format!("/_links/{relation}/href"))
        .and_then(Value::as_str)
        .map(str::to_string)
}

#[async_trait]
impl<S: MetadataSource> MetadataSource for CachedMetadataSource<S> {
    async fn get_manifest(&self, manifest_id: &str) -> ClientResult<Value> {
        self.inner.get_manifest(manifest_id).await
    }

    async fn get_related_entities(
        &self,
        entity: &Value,
        relation: &str,
        entity_type: &str,
    ) -> ClientResult<Vec<Value>> {
        let Some(url) = relation_url(entity, relation) else {
            return self.inner.get_related_entities(entity, relation, entity_type).await;
        };

        let related = self
            .cache
            .try_get_or_insert_with(&url, || async {
                self.inner
                    .get_related_entities(entity, relation, entity_type)
                    .await
                    .map(Value::Array)
            })
            .await?;

        Ok(match related {
            Value::Array(items) => items,
            other => vec![other],
        })
    }

    async fn patch_entity_by_id(&self, entity_type: &str, id: &str, patch: &Value) -> ClientResult<Value> {
        let patched = self.inner.patch_entity_by_id(entity_type, id, patch).await?;
        if let Some(url) = record_self_link(&patched) {
            self.cache.invalidate(url).await;
        }
        Ok(patched)
    }

    async fn get_entity_by_uuid(&self, entity_type: &str, uuid: &str) -> ClientResult<Value> {
        self.inner.get_entity_by_uuid(entity_type, uuid).await
    }

    async fn get_entity_by_url(&self, url: &str) -> ClientResult<Value> {
        self.cache
            .try_get_or_insert_with(url, || self.inner.get_entity_by_url(url))
            .await
    }

    async fn mark_submission_archived(&self, submission_uuid: &str) -> ClientResult<()> {
        self.inner.mark_submission_archived(submission_uuid).await
    }
}
