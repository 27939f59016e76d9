//! One generic CRUD store over any entity table.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{
    FromRow, Postgres, QueryBuilder,
    postgres::{PgPool, PgRow},
    query_builder::Separated,
};

use crate::application::pagination::PageRequest;
use crate::application::repos::{RepoError, Store};
use crate::domain::entities::Entity;

use super::util::map_sqlx_error;

/// How an entity maps onto its table. `id` is always a `BIGSERIAL` primary key.
pub trait Table: Entity + for<'r> FromRow<'r, PgRow> + Unpin {
    const TABLE: &'static str;

    /// Data columns in binding order, `id` excluded.
    const COLUMNS: &'static [&'static str];

    /// Bind one value per entry of [`Table::COLUMNS`], in order.
    fn push_values(draft: &Self::Draft, values: &mut Separated<'_, 'static, Postgres, &'static str>);
}

pub struct PgStore<E> {
    pool: Arc<PgPool>,
    _entity: PhantomData<fn() -> E>,
}

impl<E> PgStore<E> {
    pub(super) fn new(pool: Arc<PgPool>) -> Self {
        Self {
            pool,
            _entity: PhantomData,
        }
    }
}

fn select_list<E: Table>() -> String {
    let mut columns = String::from("id");
    for column in E::COLUMNS {
        columns.push_str(", ");
        columns.push_str(column);
    }
    columns
}

#[async_trait]
impl<E: Table> Store<E> for PgStore<E> {
    async fn list(&self, page: PageRequest) -> Result<Vec<E>, RepoError> {
        let mut qb: QueryBuilder<'static, Postgres> = QueryBuilder::new("SELECT ");
        qb.push(select_list::<E>());
        qb.push(" FROM ");
        qb.push(E::TABLE);
        qb.push(" ORDER BY id LIMIT ");
        qb.push_bind(i64::from(page.limit));
        qb.push(" OFFSET ");
        qb.push_bind(i64::from(page.skip));

        qb.build_query_as::<E>()
            .fetch_all(self.pool.as_ref())
            .await
            .map_err(map_sqlx_error)
    }

    async fn get(&self, id: i64) -> Result<Option<E>, RepoError> {
        let mut qb: QueryBuilder<'static, Postgres> = QueryBuilder::new("SELECT ");
        qb.push(select_list::<E>());
        qb.push(" FROM ");
        qb.push(E::TABLE);
        qb.push(" WHERE id = ");
        qb.push_bind(id);

        qb.build_query_as::<E>()
            .fetch_optional(self.pool.as_ref())
            .await
            .map_err(map_sqlx_error)
    }

    async fn create(&self, draft: &E::Draft) -> Result<E, RepoError> {
        let mut qb: QueryBuilder<'static, Postgres> = QueryBuilder::new("INSERT INTO ");
        qb.push(E::TABLE);
        qb.push(" (");
        qb.push(E::COLUMNS.join(", "));
        qb.push(") VALUES (");
        {
            let mut values = qb.separated(", ");
            E::push_values(draft, &mut values);
        }
        qb.push(") RETURNING ");
        qb.push(select_list::<E>());

        qb.build_query_as::<E>()
            .fetch_one(self.pool.as_ref())
            .await
            .map_err(map_sqlx_error)
    }

    async fn update(&self, id: i64, draft: &E::Draft) -> Result<Option<E>, RepoError> {
        let mut qb: QueryBuilder<'static, Postgres> = QueryBuilder::new("UPDATE ");
        qb.push(E::TABLE);
        qb.push(" SET (");
        qb.push(E::COLUMNS.join(", "));
        qb.push(") = ROW(");
        {
            let mut values = qb.separated(", ");
            E::push_values(draft, &mut values);
        }
        qb.push(") WHERE id = ");
        qb.push_bind(id);
        qb.push(" RETURNING ");
        qb.push(select_list::<E>());

        qb.build_query_as::<E>()
            .fetch_optional(self.pool.as_ref())
            .await
            .map_err(map_sqlx_error)
    }

    async fn delete(&self, id: i64) -> Result<bool, RepoError> {
        let mut qb: QueryBuilder<'static, Postgres> = QueryBuilder::new("DELETE FROM ");
        qb.push(E::TABLE);
        qb.push(" WHERE id = ");
        qb.push_bind(id);

        let result = qb
            .build()
            .execute(self.pool.as_ref())
            .await
            .map_err(map_sqlx_error)?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::entities::{Order, Product};

    #[test]
    fn select_list_starts_with_id() {
        assert_eq!(
            select_list::<Product>(),
            "id, name, price, stock, category_id"
        );
    }

    #[test]
    fn insert_binds_one_value_per_column() {
        let mut qb: QueryBuilder<'static, Postgres> = QueryBuilder::new("INSERT INTO ");
        qb.push(Order::TABLE);
        qb.push(" (");
        qb.push(Order::COLUMNS.join(", "));
        qb.push(") VALUES (");
        {
            let mut values = qb.separated(", ");
            let draft = crate::domain::entities::OrderDraft {
                date: time::macros::datetime!(2024-01-01 00:00:00 UTC),
                total: bigdecimal::BigDecimal::from(10),
                delivery_method: crate::domain::types::DeliveryMethod::OnHand,
                status: crate::domain::types::OrderStatus::Pending,
                client_id: 1,
                bill_id: None,
            };
            Order::push_values(&draft, &mut values);
        }
        qb.push(")");
        assert_eq!(
            qb.sql(),
            "INSERT INTO orders (date, total, delivery_method, status, client_id, bill_id) \
             VALUES ($1, $2, $3, $4, $5, $6)"
        );
    }
}
