pub mod batch;
pub mod document;
pub mod enums;
pub mod extraction;
pub mod patient;
pub mod template;
pub mod whitelist;

pub use batch::*;
pub use document::*;
pub use extraction::*;
pub use patient::*;
pub use template::*;

use serde::{Deserialize, Serialize};

/// Explicit tenant identifier threaded through every component call.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkspaceId(pub String);

impl WorkspaceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for WorkspaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for WorkspaceId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
