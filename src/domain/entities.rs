//! Domain entities mirrored from persistent storage.
//!
//! Each record has a matching draft: the client-supplied fields used to create
//! or replace it. Drafts validate themselves before any store or cache access.

use bigdecimal::{BigDecimal, Zero};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use time::OffsetDateTime;

use crate::cache::codec::decimal_float;
use crate::domain::error::DomainError;
use crate::domain::types::{DeliveryMethod, OrderStatus, PaymentType};

/// A persisted record with a store-assigned id.
pub trait Entity: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    type Draft: Validate + Clone + DeserializeOwned + Send + Sync + 'static;

    /// Singular name used in errors and logs.
    const NAME: &'static str;

    fn id(&self) -> i64;

    /// Combine a draft with its assigned id.
    fn materialize(id: i64, draft: Self::Draft) -> Self;
}

pub trait Validate {
    fn validate(&self) -> Result<(), DomainError>;
}

fn check_len(field: &str, value: &str, min: usize, max: usize) -> Result<(), DomainError> {
    let len = value.trim().chars().count();
    if len < min || len > max {
        return Err(DomainError::validation(format!(
            "{field} must be between {min} and {max} characters"
        )));
    }
    Ok(())
}

fn check_not_blank(field: &str, value: &str) -> Result<(), DomainError> {
    if value.trim().is_empty() {
        return Err(DomainError::validation(format!("{field} must not be empty")));
    }
    Ok(())
}

fn check_positive(field: &str, value: &BigDecimal) -> Result<(), DomainError> {
    if *value <= BigDecimal::zero() {
        return Err(DomainError::validation(format!(
            "{field} must be greater than zero"
        )));
    }
    Ok(())
}

fn check_non_negative(field: &str, value: &BigDecimal) -> Result<(), DomainError> {
    if *value < BigDecimal::zero() {
        return Err(DomainError::validation(format!("{field} must not be negative")));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Category {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryDraft {
    pub name: String,
}

impl Validate for CategoryDraft {
    fn validate(&self) -> Result<(), DomainError> {
        check_len("name", &self.name, 1, 100)
    }
}

impl Entity for Category {
    type Draft = CategoryDraft;
    const NAME: &'static str = "category";

    fn id(&self) -> i64 {
        self.id
    }

    fn materialize(id: i64, draft: CategoryDraft) -> Self {
        Self {
            id,
            name: draft.name,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Product {
    pub id: i64,
    pub name: String,
    #[serde(with = "decimal_float")]
    pub price: BigDecimal,
    pub stock: i32,
    pub category_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductDraft {
    pub name: String,
    #[serde(with = "decimal_float")]
    pub price: BigDecimal,
    #[serde(default)]
    pub stock: i32,
    #[serde(default)]
    pub category_id: Option<i64>,
}

impl Validate for ProductDraft {
    fn validate(&self) -> Result<(), DomainError> {
        check_len("name", &self.name, 1, 200)?;
        check_positive("price", &self.price)?;
        if self.stock < 0 {
            return Err(DomainError::validation("stock must not be negative"));
        }
        Ok(())
    }
}

impl Entity for Product {
    type Draft = ProductDraft;
    const NAME: &'static str = "product";

    fn id(&self) -> i64 {
        self.id
    }

    fn materialize(id: i64, draft: ProductDraft) -> Self {
        Self {
            id,
            name: draft.name,
            price: draft.price,
            stock: draft.stock,
            category_id: draft.category_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Client {
    pub id: i64,
    pub name: String,
    pub lastname: String,
    pub email: String,
    pub telephone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientDraft {
    pub name: String,
    pub lastname: String,
    pub email: String,
    #[serde(default)]
    pub telephone: Option<String>,
}

impl Validate for ClientDraft {
    fn validate(&self) -> Result<(), DomainError> {
        check_not_blank("name", &self.name)?;
        check_not_blank("lastname", &self.lastname)?;
        let email = self.email.trim();
        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(()),
            _ => Err(DomainError::validation("email must be a valid address")),
        }
    }
}

impl Entity for Client {
    type Draft = ClientDraft;
    const NAME: &'static str = "client";

    fn id(&self) -> i64 {
        self.id
    }

    fn materialize(id: i64, draft: ClientDraft) -> Self {
        Self {
            id,
            name: draft.name,
            lastname: draft.lastname,
            email: draft.email,
            telephone: draft.telephone,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Address {
    pub id: i64,
    pub street: String,
    pub number: Option<String>,
    pub city: String,
    pub client_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressDraft {
    pub street: String,
    #[serde(default)]
    pub number: Option<String>,
    pub city: String,
    pub client_id: i64,
}

impl Validate for AddressDraft {
    fn validate(&self) -> Result<(), DomainError> {
        check_not_blank("street", &self.street)?;
        check_not_blank("city", &self.city)
    }
}

impl Entity for Address {
    type Draft = AddressDraft;
    const NAME: &'static str = "address";

    fn id(&self) -> i64 {
        self.id
    }

    fn materialize(id: i64, draft: AddressDraft) -> Self {
        Self {
            id,
            street: draft.street,
            number: draft.number,
            city: draft.city,
            client_id: draft.client_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Order {
    pub id: i64,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    #[serde(with = "decimal_float")]
    pub total: BigDecimal,
    pub delivery_method: DeliveryMethod,
    pub status: OrderStatus,
    pub client_id: i64,
    pub bill_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDraft {
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    #[serde(with = "decimal_float")]
    pub total: BigDecimal,
    pub delivery_method: DeliveryMethod,
    pub status: OrderStatus,
    pub client_id: i64,
    #[serde(default)]
    pub bill_id: Option<i64>,
}

impl Validate for OrderDraft {
    fn validate(&self) -> Result<(), DomainError> {
        check_non_negative("total", &self.total)
    }
}

impl Entity for Order {
    type Draft = OrderDraft;
    const NAME: &'static str = "order";

    fn id(&self) -> i64 {
        self.id
    }

    fn materialize(id: i64, draft: OrderDraft) -> Self {
        Self {
            id,
            date: draft.date,
            total: draft.total,
            delivery_method: draft.delivery_method,
            status: draft.status,
            client_id: draft.client_id,
            bill_id: draft.bill_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct OrderDetail {
    pub id: i64,
    pub quantity: i32,
    #[serde(with = "decimal_float")]
    pub price: BigDecimal,
    pub order_id: i64,
    pub product_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDetailDraft {
    pub quantity: i32,
    #[serde(with = "decimal_float")]
    pub price: BigDecimal,
    pub order_id: i64,
    pub product_id: i64,
}

impl Validate for OrderDetailDraft {
    fn validate(&self) -> Result<(), DomainError> {
        if self.quantity <= 0 {
            return Err(DomainError::validation("quantity must be greater than zero"));
        }
        check_positive("price", &self.price)
    }
}

impl Entity for OrderDetail {
    type Draft = OrderDetailDraft;
    const NAME: &'static str = "order detail";

    fn id(&self) -> i64 {
        self.id
    }

    fn materialize(id: i64, draft: OrderDetailDraft) -> Self {
        Self {
            id,
            quantity: draft.quantity,
            price: draft.price,
            order_id: draft.order_id,
            product_id: draft.product_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Bill {
    pub id: i64,
    pub bill_number: String,
    #[serde(with = "decimal_float::option", default)]
    pub discount: Option<BigDecimal>,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    #[serde(with = "decimal_float")]
    pub total: BigDecimal,
    pub payment_type: PaymentType,
    pub client_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BillDraft {
    pub bill_number: String,
    #[serde(with = "decimal_float::option", default)]
    pub discount: Option<BigDecimal>,
    #[serde(with = "time::serde::rfc3339")]
    pub date: OffsetDateTime,
    #[serde(with = "decimal_float")]
    pub total: BigDecimal,
    pub payment_type: PaymentType,
    pub client_id: i64,
}

impl Validate for BillDraft {
    fn validate(&self) -> Result<(), DomainError> {
        check_not_blank("bill_number", &self.bill_number)?;
        check_non_negative("total", &self.total)?;
        if let Some(discount) = &self.discount {
            check_non_negative("discount", discount)?;
        }
        Ok(())
    }
}

impl Entity for Bill {
    type Draft = BillDraft;
    const NAME: &'static str = "bill";

    fn id(&self) -> i64 {
        self.id
    }

    fn materialize(id: i64, draft: BillDraft) -> Self {
        Self {
            id,
            bill_number: draft.bill_number,
            discount: draft.discount,
            date: draft.date,
            total: draft.total,
            payment_type: draft.payment_type,
            client_id: draft.client_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Review {
    pub id: i64,
    pub rating: f64,
    pub comment: Option<String>,
    pub product_id: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewDraft {
    pub rating: f64,
    #[serde(default)]
    pub comment: Option<String>,
    pub product_id: i64,
}

impl Validate for ReviewDraft {
    fn validate(&self) -> Result<(), DomainError> {
        if !(1.0..=5.0).contains(&self.rating) {
            return Err(DomainError::validation("rating must be between 1 and 5"));
        }
        if let Some(comment) = &self.comment {
            check_len("comment", comment, 10, 1000)?;
        }
        Ok(())
    }
}

impl Entity for Review {
    type Draft = ReviewDraft;
    const NAME: &'static str = "review";

    fn id(&self) -> i64 {
        self.id
    }

    fn materialize(id: i64, draft: ReviewDraft) -> Self {
        Self {
            id,
            rating: draft.rating,
            comment: draft.comment,
            product_id: draft.product_id,
        }
    }
}
