//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;

use crate::application::pagination::PageRequest;
use crate::domain::entities::{Client, Entity};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("integrity error: {message}")]
    Integrity { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

/// Source of truth for one entity type.
#[async_trait]
pub trait Store<E: Entity>: Send + Sync {
    async fn list(&self, page: PageRequest) -> Result<Vec<E>, RepoError>;

    async fn get(&self, id: i64) -> Result<Option<E>, RepoError>;

    async fn create(&self, draft: &E::Draft) -> Result<E, RepoError>;

    /// Replace every field of `id`. `None` when the record does not exist.
    async fn update(&self, id: i64, draft: &E::Draft) -> Result<Option<E>, RepoError>;

    /// `false` when the record did not exist.
    async fn delete(&self, id: i64) -> Result<bool, RepoError>;
}

#[async_trait]
pub trait SalesHistoryRepo: Send + Sync {
    /// Whether any order detail references the product.
    async fn product_has_sales(&self, product_id: i64) -> Result<bool, RepoError>;
}

#[async_trait]
pub trait ClientDirectory: Send + Sync {
    async fn find_client_by_email(&self, email: &str) -> Result<Option<Client>, RepoError>;
}
