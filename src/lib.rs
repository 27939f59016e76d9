//! Storefront: an e-commerce REST backend with a cache-aside service layer.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
