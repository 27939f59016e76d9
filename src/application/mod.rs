//! Application services: cached entity CRUD, health reporting, shared errors.

pub mod catalog;
pub mod entity;
pub mod error;
pub mod health;
pub mod pagination;
pub mod repos;
