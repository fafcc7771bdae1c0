//! HTTP surface for the pipeline.
//!
//! External collaborators only consume these endpoints (upload, status
//! polling, validation actions, template configuration) or produce raw
//! input to them. Routes are nested under `/api/` and every call carries a
//! workspace id in the `X-Workspace-Id` header.

pub mod endpoints;
pub mod error;
pub mod router;
pub mod server;
pub mod types;

pub use error::ApiError;
pub use router::api_router;
pub use server::serve;
pub use types::ApiContext;
