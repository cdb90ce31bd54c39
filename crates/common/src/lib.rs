//! Shared building blocks for the order courier services.

pub mod config;
pub mod db;
pub mod error;
pub mod redis_pool;
pub mod types;
