//! Optimistic local mutations and what happens to them when the server
//! disagrees.
//!
//! A mutation is applied to local state before the remote call resolves.
//! The [`RollbackPolicy`] of the operation then decides whether a failure
//! keeps the local change, restores a snapshot, or only propagates.

use lingxi_core::{ApiError, ApiResult};
use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Shared, lock-protected store state.
///
/// Guards are never held across an await; every access goes through a
/// short closure.
#[derive(Debug, Default)]
pub struct StateCell<S> {
    inner: Arc<RwLock<S>>,
}

impl<S> Clone for StateCell<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S> StateCell<S> {
    pub fn new(state: S) -> Self {
        Self {
            inner: Arc::new(RwLock::new(state)),
        }
    }

    pub fn read<R>(&self, f: impl FnOnce(&S) -> R) -> R {
        f(&self.read_guard())
    }

    pub fn write<R>(&self, f: impl FnOnce(&mut S) -> R) -> R {
        f(&mut self.write_guard())
    }

    // A panic mid-write leaves plain data behind; keep serving it.
    fn read_guard(&self) -> RwLockReadGuard<'_, S> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, S> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<S: Clone> StateCell<S> {
    pub fn cloned(&self) -> S {
        self.read(S::clone)
    }
}

/// State that can capture and restore the part an operation touches.
pub trait Snapshotable {
    type Snapshot;

    fn snapshot(&self) -> Self::Snapshot;
    fn restore(&mut self, snapshot: Self::Snapshot);
}

/// What a failed remote call does to the optimistic change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RollbackPolicy {
    /// Keep the local change, log the failure, report success.
    KeepOnFailure,
    /// Restore the snapshot unless the failure carries `benign_status`, in
    /// which case the change is kept and the caller warns.
    RollbackUnlessBenign { benign_status: u16 },
    /// Keep the local change and hand the error to the caller.
    Propagate,
}

/// How an optimistic mutation resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome<T> {
    /// The server confirmed the change.
    Confirmed(T),
    /// The server failed, the local change stands anyway.
    SoftAccepted(ApiError),
    /// The snapshot was restored.
    RolledBack(ApiError),
    /// The local change stands and the caller must handle the error.
    Failed(ApiError),
}

impl<T> MutationOutcome<T> {
    /// Whether local state still reflects the mutation.
    pub fn kept_locally(&self) -> bool {
        !matches!(self, Self::RolledBack(_))
    }

    pub fn error(&self) -> Option<&ApiError> {
        match self {
            Self::Confirmed(_) => None,
            Self::SoftAccepted(err) | Self::RolledBack(err) | Self::Failed(err) => Some(err),
        }
    }

    /// `Ok(Some)` when confirmed, `Ok(None)` when soft-accepted, the error
    /// otherwise.
    pub fn into_result(self) -> ApiResult<Option<T>> {
        match self {
            Self::Confirmed(value) => Ok(Some(value)),
            Self::SoftAccepted(_) => Ok(None),
            Self::RolledBack(err) | Self::Failed(err) => Err(err),
        }
    }
}

/// Runs one optimistic mutation under a fixed policy.
#[derive(Debug, Clone, Copy)]
pub struct OptimisticMutator {
    policy: RollbackPolicy,
    operation: &'static str,
}

impl OptimisticMutator {
    pub fn new(operation: &'static str, policy: RollbackPolicy) -> Self {
        Self { policy, operation }
    }

    pub fn policy(&self) -> RollbackPolicy {
        self.policy
    }

    /// Apply `mutate` locally, await `remote`, and reconcile.
    ///
    /// The snapshot is taken and the mutation applied under one write lock,
    /// and a rollback restores the whole snapshot under one write lock, so
    /// no reader ever sees a half-applied state.
    pub async fn run<S, M, Fut, T>(
        &self,
        state: &StateCell<S>,
        mutate: M,
        remote: Fut,
    ) -> MutationOutcome<T>
    where
        S: Snapshotable,
        M: FnOnce(&mut S),
        Fut: Future<Output = ApiResult<T>>,
    {
        let snapshot = state.write(|s| {
            let snapshot = match self.policy {
                RollbackPolicy::RollbackUnlessBenign { .. } => Some(s.snapshot()),
                RollbackPolicy::KeepOnFailure | RollbackPolicy::Propagate => None,
            };
            mutate(s);
            snapshot
        });

        let err = match remote.await {
            Ok(value) => return MutationOutcome::Confirmed(value),
            Err(err) => err,
        };

        match (self.policy, snapshot) {
            (RollbackPolicy::KeepOnFailure, _) => {
                tracing::warn!(operation = self.operation, error = %err, "Remote call failed, keeping local change");
                MutationOutcome::SoftAccepted(err)
            }
            (RollbackPolicy::RollbackUnlessBenign { benign_status }, _)
                if err.status() == Some(benign_status) =>
            {
                tracing::warn!(
                    operation = self.operation,
                    status = benign_status,
                    error = %err,
                    "Benign server failure, keeping local change"
                );
                MutationOutcome::SoftAccepted(err)
            }
            (RollbackPolicy::RollbackUnlessBenign { .. }, Some(snapshot)) => {
                tracing::error!(operation = self.operation, error = %err, "Remote call failed, rolling back");
                state.write(|s| s.restore(snapshot));
                MutationOutcome::RolledBack(err)
            }
            (RollbackPolicy::RollbackUnlessBenign { .. }, None) | (RollbackPolicy::Propagate, _) => {
                tracing::error!(operation = self.operation, error = %err, "Remote call failed");
                MutationOutcome::Failed(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lingxi_core::AggregateCount;

    #[derive(Debug, Clone, PartialEq, Eq)]
    struct Shelf {
        items: Vec<u32>,
        count: AggregateCount,
        selected: Option<u32>,
    }

    impl Snapshotable for Shelf {
        type Snapshot = Shelf;

        fn snapshot(&self) -> Shelf {
            self.clone()
        }

        fn restore(&mut self, snapshot: Shelf) {
            *self = snapshot;
        }
    }

    fn shelf() -> StateCell<Shelf> {
        StateCell::new(Shelf {
            items: vec![1, 2, 3],
            count: AggregateCount::new(3),
            selected: Some(2),
        })
    }

    fn remove_two(s: &mut Shelf) {
        s.items.retain(|i| *i != 2);
        s.count.decrement();
        s.selected = None;
    }

    fn server_error(status: u16) -> ApiResult<()> {
        Err(ApiError::from_status(status, "boom"))
    }

    #[tokio::test]
    async fn rollback_restores_everything() {
        let state = shelf();
        let before = state.cloned();
        let mutator = OptimisticMutator::new(
            "remove",
            RollbackPolicy::RollbackUnlessBenign { benign_status: 500 },
        );
        let outcome = mutator.run(&state, remove_two, async { server_error(502) }).await;
        assert!(matches!(outcome, MutationOutcome::RolledBack(_)));
        assert_eq!(state.cloned(), before);
    }

    #[tokio::test]
    async fn benign_status_keeps_change() {
        let state = shelf();
        let mutator = OptimisticMutator::new(
            "remove",
            RollbackPolicy::RollbackUnlessBenign { benign_status: 500 },
        );
        let outcome = mutator.run(&state, remove_two, async { server_error(500) }).await;
        assert!(matches!(outcome, MutationOutcome::SoftAccepted(_)));
        assert_eq!(state.read(|s| s.items.clone()), vec![1, 3]);
        assert_eq!(outcome.into_result(), Ok(None));
    }

    #[tokio::test]
    async fn keep_and_propagate_never_restore() {
        for policy in [RollbackPolicy::KeepOnFailure, RollbackPolicy::Propagate] {
            let state = shelf();
            let outcome = OptimisticMutator::new("remove", policy)
                .run(&state, remove_two, async { server_error(502) })
                .await;
            assert!(outcome.kept_locally());
            assert_eq!(state.read(|s| s.count), AggregateCount::new(2));
            assert_eq!(
                outcome.into_result().is_err(),
                policy == RollbackPolicy::Propagate
            );
        }
    }

    #[tokio::test]
    async fn success_is_confirmed() {
        let state = shelf();
        let outcome = OptimisticMutator::new("remove", RollbackPolicy::Propagate)
            .run(&state, remove_two, async { Ok::<_, ApiError>(7) })
            .await;
        assert_eq!(outcome, MutationOutcome::Confirmed(7));
    }
}
