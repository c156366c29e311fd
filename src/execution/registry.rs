//! In-memory execution registry.
//!
//! The registry owns the authoritative copy of every [`ExecutionRecord`].
//! Callers get cloned snapshots and mutate through [`ExecutionRegistry::update`],
//! which is where the lifecycle invariants are enforced:
//!
//! - status never moves backwards;
//! - a terminal record is frozen, later patches are dropped;
//! - `end_time` is stamped when a record becomes terminal.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use super::{ExecutionRecord, ExecutionUpdate};

/// Shortest container id prefix accepted as a reference (docker's short id length).
pub const MIN_ID_PREFIX: usize = 12;

fn refers_to(record: &ExecutionRecord, reference: &str) -> bool {
    let Some(container_id) = record.container_id.as_deref() else {
        return false;
    };
    container_id == reference
        || (reference.len() >= MIN_ID_PREFIX && container_id.starts_with(reference))
        || record.container_name.as_deref() == Some(reference)
}

#[derive(Default)]
struct Inner {
    records: HashMap<String, ExecutionRecord>,
    /// Insertion order for listing.
    order: Vec<String>,
}

/// Concurrency-safe store of execution records keyed by id.
///
/// Cheap to clone; clones share the same store.
#[derive(Clone, Default)]
pub struct ExecutionRegistry {
    inner: Arc<RwLock<Inner>>,
}

impl ExecutionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a new `pending` record and return its id.
    pub async fn create(&self, launch_command: &str, test_command: &str) -> String {
        let id = Uuid::new_v4().to_string();
        let record = ExecutionRecord::new(
            id.clone(),
            launch_command.to_string(),
            test_command.to_string(),
        );

        let mut inner = self.inner.write().await;
        inner.records.insert(id.clone(), record);
        inner.order.push(id.clone());
        debug!(execution_id = %id, "execution created");
        id
    }

    /// Merge `patch` into the record. Returns whether it was applied.
    ///
    /// Unknown ids are a silent no-op so a driver racing a delete keeps going.
    pub async fn update(&self, id: &str, mut patch: ExecutionUpdate) -> bool {
        let mut inner = self.inner.write().await;
        let Some(record) = inner.records.get_mut(id) else {
            debug!(execution_id = %id, "update for unknown execution ignored");
            return false;
        };

        if record.status.is_terminal() {
            debug!(
                execution_id = %id,
                status = %record.status,
                "update for finished execution ignored"
            );
            return false;
        }

        if let Some(next) = patch.status {
            if !record.status.can_advance_to(next) {
                debug!(
                    execution_id = %id,
                    from = %record.status,
                    to = %next,
                    "backward status transition ignored"
                );
                return false;
            }
            if next.is_terminal() && patch.end_time.is_none() {
                patch.end_time = Some(Utc::now());
            }
        }

        patch.apply(record);
        true
    }

    pub async fn get(&self, id: &str) -> Option<ExecutionRecord> {
        self.inner.read().await.records.get(id).cloned()
    }

    /// Snapshot of every record, oldest first.
    pub async fn list(&self) -> Vec<ExecutionRecord> {
        let inner = self.inner.read().await;
        inner
            .order
            .iter()
            .filter_map(|id| inner.records.get(id).cloned())
            .collect()
    }

    /// Ids of records attached to a container reference.
    ///
    /// `reference` may be the full container id, a short id prefix of at
    /// least [`MIN_ID_PREFIX`] characters, or the container name.
    pub async fn find_by_container(&self, reference: &str) -> Vec<String> {
        let inner = self.inner.read().await;
        inner
            .order
            .iter()
            .filter(|id| {
                inner
                    .records
                    .get(id.as_str())
                    .is_some_and(|record| refers_to(record, reference))
            })
            .cloned()
            .collect()
    }

    pub async fn delete(&self, id: &str) -> bool {
        let mut inner = self.inner.write().await;
        if inner.records.remove(id).is_none() {
            return false;
        }
        inner.order.retain(|existing| existing != id);
        debug!(execution_id = %id, "execution deleted");
        true
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::ExecutionStatus;

    #[tokio::test]
    async fn test_create_is_immediately_visible_as_pending() {
        let registry = ExecutionRegistry::new();
        let id = registry.create("docker run alpine", "echo hi").await;

        let record = registry.get(&id).await.unwrap();
        assert_eq!(record.status, ExecutionStatus::Pending);
        assert_eq!(record.launch_command, "docker run alpine");
        assert_eq!(record.test_command, "echo hi");
        assert!(record.end_time.is_none());
        assert!(record.container_id.is_none());
    }

    #[tokio::test]
    async fn test_ids_are_unique() {
        let registry = ExecutionRegistry::new();
        let a = registry.create("docker run a", "true").await;
        let b = registry.create("docker run b", "true").await;
        assert_ne!(a, b);
        assert_eq!(registry.len().await, 2);
    }

    #[tokio::test]
    async fn test_unknown_id_operations_are_quiet() {
        let registry = ExecutionRegistry::new();
        assert!(registry.get("missing").await.is_none());
        assert!(!registry.update("missing", ExecutionUpdate::failed("boom")).await);
        assert!(!registry.delete("missing").await);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_delete_then_get_is_not_found() {
        let registry = ExecutionRegistry::new();
        let id = registry.create("docker run alpine", "true").await;
        assert!(registry.delete(&id).await);
        assert!(registry.get(&id).await.is_none());
        assert!(!registry.delete(&id).await);
        assert!(registry.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_list_preserves_insertion_order() {
        let registry = ExecutionRegistry::new();
        let first = registry.create("docker run one", "true").await;
        let second = registry.create("docker run two", "true").await;
        let third = registry.create("docker run three", "true").await;
        registry.delete(&second).await;

        let ids: Vec<String> = registry.list().await.into_iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![first, third]);
    }

    #[tokio::test]
    async fn test_terminal_status_stamps_end_time() {
        let registry = ExecutionRegistry::new();
        let id = registry.create("docker run alpine", "true").await;

        registry
            .update(&id, ExecutionUpdate::status(ExecutionStatus::Starting))
            .await;
        assert!(registry.get(&id).await.unwrap().end_time.is_none());

        registry
            .update(&id, ExecutionUpdate::status(ExecutionStatus::Failed))
            .await;
        let record = registry.get(&id).await.unwrap();
        assert_eq!(record.status, ExecutionStatus::Failed);
        assert!(record.end_time.is_some());
    }

    #[tokio::test]
    async fn test_terminal_records_are_frozen() {
        let registry = ExecutionRegistry::new();
        let id = registry.create("docker run alpine", "true").await;
        registry
            .update(&id, ExecutionUpdate::status(ExecutionStatus::Running))
            .await;
        assert!(registry.update(&id, ExecutionUpdate::stopped()).await);

        let applied = registry
            .update(
                &id,
                ExecutionUpdate {
                    status: Some(ExecutionStatus::Completed),
                    exit_code: Some(0),
                    ..Default::default()
                },
            )
            .await;
        assert!(!applied);

        let record = registry.get(&id).await.unwrap();
        assert_eq!(record.status, ExecutionStatus::Stopped);
        assert!(record.exit_code.is_none());
    }

    #[tokio::test]
    async fn test_backward_transition_is_dropped() {
        let registry = ExecutionRegistry::new();
        let id = registry.create("docker run alpine", "true").await;
        registry
            .update(&id, ExecutionUpdate::status(ExecutionStatus::Testing))
            .await;

        let applied = registry
            .update(
                &id,
                ExecutionUpdate {
                    status: Some(ExecutionStatus::Running),
                    container_id: Some("late".to_string()),
                    ..Default::default()
                },
            )
            .await;
        assert!(!applied);
        let record = registry.get(&id).await.unwrap();
        assert_eq!(record.status, ExecutionStatus::Testing);
        assert!(record.container_id.is_none());
    }

    #[tokio::test]
    async fn test_find_by_container() {
        let registry = ExecutionRegistry::new();
        let with = registry.create("docker run a", "true").await;
        let _without = registry.create("docker run b", "true").await;
        registry
            .update(
                &with,
                ExecutionUpdate {
                    status: Some(ExecutionStatus::Running),
                    container_id: Some("abc123".to_string()),
                    ..Default::default()
                },
            )
            .await;

        assert_eq!(registry.find_by_container("abc123").await, vec![with]);
        assert!(registry.find_by_container("zzz").await.is_empty());
    }

    #[tokio::test]
    async fn test_find_by_container_name_and_short_id() {
        let registry = ExecutionRegistry::new();
        let id = registry.create("docker run a", "true").await;
        let full = "4f1c2b3a9d8e7f6a5b4c3d2e1f0a9b8c7d6e5f4a3b2c1d0e9f8a7b6c5d4e3f2a";
        registry
            .update(
                &id,
                ExecutionUpdate {
                    status: Some(ExecutionStatus::Running),
                    container_id: Some(full.to_string()),
                    container_name: Some("web".to_string()),
                    ..Default::default()
                },
            )
            .await;

        assert_eq!(registry.find_by_container(&full[..12]).await, vec![id.clone()]);
        assert_eq!(registry.find_by_container("web").await, vec![id]);
        // too short to be an unambiguous prefix
        assert!(registry.find_by_container(&full[..4]).await.is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_creates() {
        let registry = ExecutionRegistry::new();
        let mut handles = Vec::new();
        for i in 0..32 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                registry.create(&format!("docker run img{i}"), "true").await
            }));
        }
        for handle in handles {
            let id = handle.await.unwrap();
            assert!(registry.get(&id).await.is_some());
        }
        assert_eq!(registry.len().await, 32);
    }
}
