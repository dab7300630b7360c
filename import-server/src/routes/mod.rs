//! HTTP route handlers grouped by resource.
//!
//! Handlers are annotated with `#[openapi]` so `rocket_okapi` can derive the
//! OpenAPI document mounted under `/api/docs`.

pub mod admin;
pub mod entities;
pub mod health;
pub mod imports;
