//! In-memory membership store

use super::{never_synced, MembershipStore};
use crate::ids::{FollowerId, TargetId};
use crate::{FollowSyncError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Process-local [`MembershipStore`] backed by hash sets
#[derive(Debug, Default)]
pub struct InMemoryMembershipStore {
    sets: RwLock<HashMap<TargetId, HashSet<FollowerId>>>,
    last_sync: RwLock<HashMap<TargetId, DateTime<Utc>>>,
}

impl InMemoryMembershipStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sorted snapshot of a target's set
    pub fn members(&self, target: &TargetId) -> Result<Vec<FollowerId>> {
        let sets = read(&self.sets)?;
        let mut members: Vec<FollowerId> = sets
            .get(target)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        members.sort();
        Ok(members)
    }
}

fn read<T>(lock: &RwLock<T>) -> Result<RwLockReadGuard<'_, T>> {
    lock.read()
        .map_err(|_| FollowSyncError::StorageUnavailable("in-memory store lock poisoned".into()))
}

fn write<T>(lock: &RwLock<T>) -> Result<RwLockWriteGuard<'_, T>> {
    lock.write()
        .map_err(|_| FollowSyncError::StorageUnavailable("in-memory store lock poisoned".into()))
}

#[async_trait]
impl MembershipStore for InMemoryMembershipStore {
    async fn add_batch_count_new(&self, target: &TargetId, ids: &[FollowerId]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut sets = write(&self.sets)?;
        let set = sets.entry(target.clone()).or_default();
        let added = ids.iter().filter(|id| set.insert(**id)).count();
        Ok(added as u64)
    }

    async fn contains(&self, target: &TargetId, id: FollowerId) -> Result<bool> {
        let sets = read(&self.sets)?;
        Ok(sets.get(target).is_some_and(|set| set.contains(&id)))
    }

    async fn count(&self, target: &TargetId) -> Result<u64> {
        let sets = read(&self.sets)?;
        Ok(sets.get(target).map_or(0, |set| set.len() as u64))
    }

    async fn clear(&self, target: &TargetId) -> Result<()> {
        write(&self.sets)?.remove(target);
        Ok(())
    }

    async fn set_last_sync_time(&self, target: &TargetId, at: DateTime<Utc>) -> Result<()> {
        write(&self.last_sync)?.insert(target.clone(), at);
        Ok(())
    }

    async fn get_last_sync_time(&self, target: &TargetId) -> Result<DateTime<Utc>> {
        let last_sync = read(&self.last_sync)?;
        Ok(last_sync.get(target).copied().unwrap_or_else(never_synced))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(raw: &[i64]) -> Vec<FollowerId> {
        raw.iter().copied().map(FollowerId::new).collect()
    }

    #[tokio::test]
    async fn test_add_counts_only_new() {
        let store = InMemoryMembershipStore::new();
        let target = TargetId::new("3");

        assert_eq!(store.add_batch_count_new(&target, &ids(&[1, 2, 3])).await.unwrap(), 3);
        assert_eq!(store.add_batch_count_new(&target, &ids(&[2, 3, 4])).await.unwrap(), 1);
        // Duplicates inside one batch count once
        assert_eq!(store.add_batch_count_new(&target, &ids(&[5, 5])).await.unwrap(), 1);
        assert_eq!(store.count(&target).await.unwrap(), 5);
    }

    #[tokio::test]
    async fn test_unknown_target_is_empty() {
        let store = InMemoryMembershipStore::new();
        let target = TargetId::new("nobody");

        assert!(!store.contains(&target, FollowerId::new(1)).await.unwrap());
        assert_eq!(store.count(&target).await.unwrap(), 0);
        assert_eq!(store.get_last_sync_time(&target).await.unwrap(), never_synced());
    }

    #[tokio::test]
    async fn test_clear_and_partitions() {
        let store = InMemoryMembershipStore::new();
        let a = TargetId::new("a");
        let b = TargetId::new("b");
        store.add_batch(&a, &ids(&[1, 2])).await.unwrap();
        store.add_batch(&b, &ids(&[2])).await.unwrap();

        store.clear(&a).await.unwrap();
        assert!(!store.contains(&a, FollowerId::new(1)).await.unwrap());
        assert!(store.contains(&b, FollowerId::new(2)).await.unwrap());
        assert_eq!(store.members(&b).unwrap(), ids(&[2]));
    }
}
