//! Codecheck daemon library
//!
//! HTTP surface over the check lifecycle:
//! - `POST /api/upload`: validate, stage and submit a file
//! - `GET /api/check/:id`: status of one check
//! - `GET /api/checks`: recent checks
//! - `GET /health`: liveness

pub mod config;
pub mod error;
pub mod routes;
pub mod server;

pub use config::{CompletionMode, Config};
pub use error::{ApiError, ApiResult};
pub use server::{router, serve, AppState};
