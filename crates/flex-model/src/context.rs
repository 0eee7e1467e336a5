//! Caller identity handed to every engine operation

use crate::ids::{UserId, WorkspaceId};

/// Already-authorized caller scope
///
/// Authentication happens upstream; the engine only uses these values to
/// scope tables to a tenant and to stamp record authorship.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestContext {
    pub workspace_id: WorkspaceId,
    pub user_id: UserId,
}

impl RequestContext {
    #[inline]
    #[must_use]
    pub fn new(workspace_id: impl Into<String>, user_id: impl Into<String>) -> Self {
        Self {
            workspace_id: WorkspaceId::new(workspace_id),
            user_id: UserId::new(user_id),
        }
    }
}
