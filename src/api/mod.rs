//! HTTP surface for recording events and reading dashboards

pub mod handlers;
pub mod routes;

pub use routes::create_api_router;
