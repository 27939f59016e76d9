//! Generic cached CRUD service applied to every entity.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::application::pagination::PageRequest;
use crate::application::repos::{RepoError, Store};
use crate::cache::{CacheAside, KeyBuilder};
use crate::domain::entities::{Entity, Validate};
use crate::domain::error::DomainError;

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },
    #[error("validation failed: {message}")]
    Validation { message: String },
    #[error("integrity violation: {message}")]
    Integrity { message: String },
    #[error(transparent)]
    Repo(#[from] RepoError),
}

impl From<DomainError> for ServiceError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation { message } => Self::Validation { message },
            DomainError::Integrity { message } => Self::Integrity { message },
        }
    }
}

/// Where an entity's entries live and how long they stay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CachePolicy {
    /// First key segment; every entry of the entity starts with `scope:`.
    pub scope: &'static str,
    /// `None` uses the cache default.
    pub ttl: Option<Duration>,
}

/// Veto run before a delete reaches the store.
#[async_trait]
pub trait DeleteGuard: Send + Sync {
    async fn check(&self, id: i64) -> Result<(), ServiceError>;
}

/// Finds a record equivalent to a draft so create can return it instead.
#[async_trait]
pub trait ExistingResolver<E: Entity>: Send + Sync {
    async fn resolve(&self, draft: &E::Draft) -> Result<Option<E>, ServiceError>;
}

pub struct EntityService<E: Entity> {
    store: Arc<dyn Store<E>>,
    cache: CacheAside,
    policy: CachePolicy,
    delete_guard: Option<Arc<dyn DeleteGuard>>,
    resolver: Option<Arc<dyn ExistingResolver<E>>>,
}

impl<E: Entity> Clone for EntityService<E> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            cache: self.cache.clone(),
            policy: self.policy,
            delete_guard: self.delete_guard.clone(),
            resolver: self.resolver.clone(),
        }
    }
}

impl<E: Entity> EntityService<E> {
    pub fn new(store: Arc<dyn Store<E>>, cache: CacheAside, policy: CachePolicy) -> Self {
        Self {
            store,
            cache,
            policy,
            delete_guard: None,
            resolver: None,
        }
    }

    pub fn with_delete_guard(mut self, guard: Arc<dyn DeleteGuard>) -> Self {
        self.delete_guard = Some(guard);
        self
    }

    pub fn with_existing_resolver(mut self, resolver: Arc<dyn ExistingResolver<E>>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    pub fn list_key(&self, page: PageRequest) -> String {
        KeyBuilder::new(self.policy.scope)
            .segment("list")
            .option("skip", page.skip)
            .option("limit", page.limit)
            .build()
    }

    pub fn id_key(&self, id: i64) -> String {
        KeyBuilder::new(self.policy.scope)
            .segment("id")
            .option("id", id)
            .build()
    }

    pub async fn list(&self, page: PageRequest) -> Result<Vec<E>, ServiceError> {
        let store = &self.store;
        self.cache
            .get_or_compute(&self.list_key(page), self.policy.ttl, || async move {
                store.list(page).await.map_err(ServiceError::from)
            })
            .await
    }

    pub async fn get(&self, id: i64) -> Result<E, ServiceError> {
        let store = &self.store;
        self.cache
            .get_or_compute(&self.id_key(id), self.policy.ttl, || async move {
                store.get(id).await?.ok_or(ServiceError::NotFound {
                    entity: E::NAME,
                    id,
                })
            })
            .await
    }

    pub async fn create(&self, draft: E::Draft) -> Result<E, ServiceError> {
        draft.validate()?;

        if let Some(resolver) = &self.resolver {
            if let Some(existing) = resolver.resolve(&draft).await? {
                info!(
                    target = "storefront::application::entity",
                    entity = E::NAME,
                    id = existing.id(),
                    "returning existing record instead of creating"
                );
                return Ok(existing);
            }
        }

        let created = self.store.create(&draft).await?;
        self.cache
            .invalidate_prefix(&format!("{}:", self.policy.scope))
            .await;
        Ok(created)
    }

    pub async fn update(&self, id: i64, draft: E::Draft) -> Result<E, ServiceError> {
        draft.validate()?;

        let updated = self
            .store
            .update(id, &draft)
            .await?
            .ok_or(ServiceError::NotFound {
                entity: E::NAME,
                id,
            })?;
        self.invalidate_record(id).await;
        Ok(updated)
    }

    pub async fn delete(&self, id: i64) -> Result<(), ServiceError> {
        if let Some(guard) = &self.delete_guard {
            guard.check(id).await?;
        }

        if !self.store.delete(id).await? {
            return Err(ServiceError::NotFound {
                entity: E::NAME,
                id,
            });
        }
        self.invalidate_record(id).await;
        Ok(())
    }

    async fn invalidate_record(&self, id: i64) {
        self.cache.invalidate_key(&self.id_key(id)).await;
        self.cache
            .invalidate_prefix(&format!("{}:list", self.policy.scope))
            .await;
    }
}
