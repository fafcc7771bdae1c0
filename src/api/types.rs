//! Shared types for the API layer.

use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::pipeline::batch::BatchOrchestrator;

use super::error::ApiError;

/// Shared context for all API routes.
#[derive(Clone)]
pub struct ApiContext {
    pub orchestrator: Arc<BatchOrchestrator>,
}

impl ApiContext {
    pub fn new(orchestrator: BatchOrchestrator) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
        }
    }
}

/// Workspace extractor — reads the `X-Workspace-Id` header.
///
/// Every endpoint is workspace-scoped; a missing header is an input error,
/// not a fallback to some global workspace.
pub struct Workspace(pub crate::models::WorkspaceId);

#[axum::async_trait]
impl<S> FromRequestParts<S> for Workspace
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get("X-Workspace-Id")
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(ApiError::MissingWorkspace)?;
        Ok(Workspace(crate::models::WorkspaceId::from(value)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[tokio::test]
    async fn workspace_header_extracted() {
        let request = Request::builder()
            .header("X-Workspace-Id", " clinic-7 ")
            .body(())
            .unwrap();
        let (mut parts, _) = request.into_parts();
        let workspace = Workspace::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(workspace.0.as_str(), "clinic-7");
    }

    #[tokio::test]
    async fn missing_header_rejected() {
        let request = Request::builder().body(()).unwrap();
        let (mut parts, _) = request.into_parts();
        let result = Workspace::from_request_parts(&mut parts, &()).await;
        assert!(matches!(result, Err(ApiError::MissingWorkspace)));
    }

    #[tokio::test]
    async fn empty_header_rejected() {
        let request = Request::builder()
            .header("X-Workspace-Id", "  ")
            .body(())
            .unwrap();
        let (mut parts, _) = request.into_parts();
        let result = Workspace::from_request_parts(&mut parts, &()).await;
        assert!(matches!(result, Err(ApiError::MissingWorkspace)));
    }
}
