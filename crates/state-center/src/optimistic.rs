use std::future::Future;

use tracing::{debug, warn};

use scriptflow_core_types::{CachedEntity, SyncError};

use crate::view::{EntityView, Located};

/// Outcome of a successful [`OptimisticMutation::apply`].
#[derive(Clone, Debug, PartialEq)]
pub enum Mutated<E> {
    /// No view held the entity; nothing was written.
    NotCached,
    /// Every located copy shows `value` and the remote write succeeded.
    Committed { value: E, copies: usize },
}

/// Applies a local change to every cached copy of an entity before the
/// remote write, and restores every one of them if the write fails.
///
/// Views are patched in the order given; pass the single-entity view last.
/// Copies that enter a view while the write is pending are not rolled back.
pub struct OptimisticMutation<'a, E: CachedEntity> {
    views: Vec<&'a dyn EntityView<E>>,
}

impl<'a, E: CachedEntity> OptimisticMutation<'a, E> {
    pub fn across(views: Vec<&'a dyn EntityView<E>>) -> Self {
        Self { views }
    }

    /// First cached copy of `id`, in view order.
    pub fn current(&self, id: &E::Id) -> Option<E> {
        self.views.iter().find_map(|view| view.current(id))
    }

    /// Patch, write, and roll back on failure. The write receives the patched
    /// value of the first located copy; its error is returned unchanged.
    pub async fn apply<P, W, Fut>(
        &self,
        id: &E::Id,
        patch: P,
        write: W,
    ) -> Result<Mutated<E>, SyncError>
    where
        P: Fn(&mut E),
        W: FnOnce(E) -> Fut,
        Fut: Future<Output = Result<(), SyncError>>,
    {
        let located: Vec<(&dyn EntityView<E>, Located<E>)> = self
            .views
            .iter()
            .filter_map(|view| view.locate_and_patch(id, &patch).map(|found| (*view, found)))
            .collect();

        let Some(value) = located
            .first()
            .and_then(|(view, _)| view.current(id))
        else {
            debug!(?id, "optimistic mutation skipped: entity not cached");
            return Ok(Mutated::NotCached);
        };

        match write(value.clone()).await {
            Ok(()) => Ok(Mutated::Committed {
                value,
                copies: located.len(),
            }),
            Err(err) => {
                let restored = located
                    .iter()
                    .filter(|(view, found)| view.restore(found))
                    .count();
                warn!(
                    ?id,
                    located = located.len(),
                    restored,
                    error = %err,
                    "remote write failed; optimistic change rolled back"
                );
                Err(err)
            }
        }
    }
}
