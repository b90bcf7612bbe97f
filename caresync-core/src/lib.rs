//! caresync-core: Shared infrastructure for caresync services.
pub mod config;
pub mod error;
pub mod middleware;
pub mod observability;
