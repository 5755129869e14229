/// HTTP handlers for blog-service
///
/// - `web`: page handlers for the browser-facing site
/// - `api`: JSON endpoints under `/api/v1`
/// - `health`: probes for orchestration
/// - `render`: page context and redirect helpers shared by `web`
pub mod api;
pub mod health;
pub mod render;
pub mod web;

pub use health::{health_summary, liveness_check, readiness_summary};
