use sqlx::{Postgres, query_builder::Separated};

use crate::domain::entities::{
    Address, AddressDraft, Bill, BillDraft, Category, CategoryDraft, Client, ClientDraft, Order,
    OrderDetail, OrderDetailDraft, OrderDraft, Product, ProductDraft, Review, ReviewDraft,
};

use super::store::Table;

type Values<'qb> = Separated<'qb, 'static, Postgres, &'static str>;

impl Table for Category {
    const TABLE: &'static str = "categories";
    const COLUMNS: &'static [&'static str] = &["name"];

    fn push_values(draft: &CategoryDraft, values: &mut Values<'_>) {
        values.push_bind(draft.name.trim().to_string());
    }
}

impl Table for Product {
    const TABLE: &'static str = "products";
    const COLUMNS: &'static [&'static str] = &["name", "price", "stock", "category_id"];

    fn push_values(draft: &ProductDraft, values: &mut Values<'_>) {
        values
            .push_bind(draft.name.trim().to_string())
            .push_bind(draft.price.clone())
            .push_bind(draft.stock)
            .push_bind(draft.category_id);
    }
}

impl Table for Client {
    const TABLE: &'static str = "clients";
    const COLUMNS: &'static [&'static str] = &["name", "lastname", "email", "telephone"];

    fn push_values(draft: &ClientDraft, values: &mut Values<'_>) {
        values
            .push_bind(draft.name.clone())
            .push_bind(draft.lastname.clone())
            .push_bind(draft.email.trim().to_string())
            .push_bind(draft.telephone.clone());
    }
}

impl Table for Address {
    const TABLE: &'static str = "addresses";
    const COLUMNS: &'static [&'static str] = &["street", "number", "city", "client_id"];

    fn push_values(draft: &AddressDraft, values: &mut Values<'_>) {
        values
            .push_bind(draft.street.clone())
            .push_bind(draft.number.clone())
            .push_bind(draft.city.clone())
            .push_bind(draft.client_id);
    }
}

impl Table for Order {
    const TABLE: &'static str = "orders";
    const COLUMNS: &'static [&'static str] = &[
        "date",
        "total",
        "delivery_method",
        "status",
        "client_id",
        "bill_id",
    ];

    fn push_values(draft: &OrderDraft, values: &mut Values<'_>) {
        values
            .push_bind(draft.date)
            .push_bind(draft.total.clone())
            .push_bind(draft.delivery_method)
            .push_bind(draft.status)
            .push_bind(draft.client_id)
            .push_bind(draft.bill_id);
    }
}

impl Table for OrderDetail {
    const TABLE: &'static str = "order_details";
    const COLUMNS: &'static [&'static str] = &["quantity", "price", "order_id", "product_id"];

    fn push_values(draft: &OrderDetailDraft, values: &mut Values<'_>) {
        values
            .push_bind(draft.quantity)
            .push_bind(draft.price.clone())
            .push_bind(draft.order_id)
            .push_bind(draft.product_id);
    }
}

impl Table for Bill {
    const TABLE: &'static str = "bills";
    const COLUMNS: &'static [&'static str] = &[
        "bill_number",
        "discount",
        "date",
        "total",
        "payment_type",
        "client_id",
    ];

    fn push_values(draft: &BillDraft, values: &mut Values<'_>) {
        values
            .push_bind(draft.bill_number.clone())
            .push_bind(draft.discount.clone())
            .push_bind(draft.date)
            .push_bind(draft.total.clone())
            .push_bind(draft.payment_type)
            .push_bind(draft.client_id);
    }
}

impl Table for Review {
    const TABLE: &'static str = "reviews";
    const COLUMNS: &'static [&'static str] = &["rating", "comment", "product_id"];

    fn push_values(draft: &ReviewDraft, values: &mut Values<'_>) {
        values
            .push_bind(draft.rating)
            .push_bind(draft.comment.clone())
            .push_bind(draft.product_id);
    }
}
