//! Cached follower membership lookups
//!
//! Answers "does F follow T?" from the membership store only; no upstream
//! traffic. A store failure is reported as an error rather than a `false`.

use crate::cache::MembershipStore;
use crate::ids::{FollowerId, TargetId};
use crate::{FollowSyncError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Social network served from the cache
pub const SOCIAL_FARCASTER: &str = "farcaster";

/// Action served from the cache
pub const ACTION_FOLLOW: &str = "follow";

/// Social action check as received from callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SocialActionRequest {
    pub social: String,
    pub action: String,
    /// Id of the acting user, as a string
    pub iduser: String,
}

impl SocialActionRequest {
    pub fn new(
        social: impl Into<String>,
        action: impl Into<String>,
        iduser: impl Into<String>,
    ) -> Self {
        Self {
            social: social.into(),
            action: action.into(),
            iduser: iduser.into(),
        }
    }

    fn is_farcaster_follow(&self) -> bool {
        self.social == SOCIAL_FARCASTER && self.action == ACTION_FOLLOW
    }
}

/// Read-only view over the membership store
#[derive(Clone)]
pub struct MembershipQuery {
    store: Arc<dyn MembershipStore>,
    default_target: Option<TargetId>,
}

impl MembershipQuery {
    pub fn new(store: Arc<dyn MembershipStore>) -> Self {
        Self {
            store,
            default_target: None,
        }
    }

    /// Target used by [`MembershipQuery::check_social_action`]
    pub fn with_default_target(mut self, target: impl Into<TargetId>) -> Self {
        let target = target.into();
        self.default_target = if target.is_blank() { None } else { Some(target) };
        self
    }

    pub fn default_target(&self) -> Option<&TargetId> {
        self.default_target.as_ref()
    }

    /// Whether `follower` is in the cached set of `target`
    pub async fn is_follower(&self, target: &TargetId, follower: FollowerId) -> Result<bool> {
        let found = self.store.contains(target, follower).await?;
        debug!(target = %target, follower = %follower, found, "Cached follow lookup");
        Ok(found)
    }

    /// Parse a raw user id, then look it up
    pub async fn check_follow(&self, target: &TargetId, raw_user_id: &str) -> Result<bool> {
        let follower: FollowerId = raw_user_id.parse()?;
        self.is_follower(target, follower).await
    }

    /// Answer a social action check from the cache.
    ///
    /// Only farcaster follows are cached; they are checked against the
    /// default target. Everything else is `Unsupported`.
    pub async fn check_social_action(&self, request: &SocialActionRequest) -> Result<bool> {
        if !request.is_farcaster_follow() {
            return Err(FollowSyncError::Unsupported {
                social: request.social.clone(),
                action: request.action.clone(),
            });
        }

        let target = self.default_target.as_ref().ok_or_else(|| {
            FollowSyncError::Config("No default target configured for follow checks".to_string())
        })?;

        self.check_follow(target, &request.iduser).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::InMemoryMembershipStore;

    async fn seeded() -> MembershipQuery {
        let store = Arc::new(InMemoryMembershipStore::new());
        store
            .add_batch(&TargetId::new("3"), &[FollowerId::new(10), FollowerId::new(11)])
            .await
            .unwrap();
        MembershipQuery::new(store).with_default_target("3")
    }

    #[tokio::test]
    async fn test_is_follower() {
        let query = seeded().await;
        let target = TargetId::new("3");

        assert!(query.is_follower(&target, FollowerId::new(10)).await.unwrap());
        assert!(!query.is_follower(&target, FollowerId::new(99)).await.unwrap());
        assert!(!query
            .is_follower(&TargetId::new("4"), FollowerId::new(10))
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_check_follow_rejects_garbage() {
        let query = seeded().await;
        let err = query
            .check_follow(&TargetId::new("3"), "not-a-number")
            .await
            .unwrap_err();
        assert!(matches!(err, FollowSyncError::InvalidFollowerId(_)));
    }

    #[tokio::test]
    async fn test_social_action() {
        let query = seeded().await;

        let follow = SocialActionRequest::new("farcaster", "follow", "11");
        assert!(query.check_social_action(&follow).await.unwrap());

        let stranger = SocialActionRequest::new("farcaster", "follow", "12");
        assert!(!query.check_social_action(&stranger).await.unwrap());

        let recast = SocialActionRequest::new("farcaster", "recast", "11");
        let err = query.check_social_action(&recast).await.unwrap_err();
        assert!(matches!(err, FollowSyncError::Unsupported { .. }));
    }

    #[tokio::test]
    async fn test_social_action_matches_exactly() {
        let query = seeded().await;

        for (social, action) in [
            ("Farcaster", "follow"),
            ("farcaster", "FOLLOW"),
            (" farcaster", "follow"),
        ] {
            let request = SocialActionRequest::new(social, action, "11");
            let err = query.check_social_action(&request).await.unwrap_err();
            assert!(matches!(err, FollowSyncError::Unsupported { .. }));
        }
    }

    #[tokio::test]
    async fn test_social_action_without_default_target() {
        let store = Arc::new(InMemoryMembershipStore::new());
        let query = MembershipQuery::new(store).with_default_target(" ");
        assert!(query.default_target().is_none());

        let follow = SocialActionRequest::new("farcaster", "follow", "11");
        let err = query.check_social_action(&follow).await.unwrap_err();
        assert!(matches!(err, FollowSyncError::Config(_)));
    }
}
