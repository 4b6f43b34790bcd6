// ============================
// crates/backend-lib/src/access.rs
// ============================
//! Seam for the external project access check that must precede a join.
use crate::error::RelayError;
use async_trait::async_trait;
use sketch_common::ConnectionId;

#[async_trait]
pub trait ProjectAccess: Send + Sync {
    /// Decide whether `connection` may join the session for `project_id`
    async fn authorize_join(&self, connection: ConnectionId, project_id: &str) -> Result<(), RelayError>;
}

/// Allows every join; for deployments where an upstream proxy already
/// enforced project permissions.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenAccess;

#[async_trait]
impl ProjectAccess for OpenAccess {
    async fn authorize_join(&self, _connection: ConnectionId, _project_id: &str) -> Result<(), RelayError> {
        Ok(())
    }
}
