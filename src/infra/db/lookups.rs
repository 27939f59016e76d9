use async_trait::async_trait;

use crate::application::repos::{ClientDirectory, RepoError, SalesHistoryRepo};
use crate::domain::entities::Client;

use super::{PostgresRepositories, map_sqlx_error};

#[async_trait]
impl SalesHistoryRepo for PostgresRepositories {
    async fn product_has_sales(&self, product_id: i64) -> Result<bool, RepoError> {
        sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (SELECT 1 FROM order_details WHERE product_id = $1)",
        )
        .bind(product_id)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)
    }
}

#[async_trait]
impl ClientDirectory for PostgresRepositories {
    async fn find_client_by_email(&self, email: &str) -> Result<Option<Client>, RepoError> {
        sqlx::query_as::<_, Client>(
            r#"
            SELECT id, name, lastname, email, telephone
            FROM clients
            WHERE LOWER(email) = LOWER($1)
            ORDER BY id
            LIMIT 1
            "#,
        )
        .bind(email)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)
    }
}
