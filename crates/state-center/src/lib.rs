//! In-memory state for the dashboard: bounded per-key entity lists, server
//! paging merged with pushes, and optimistic edits across cached views.

pub mod cache;
pub mod optimistic;
pub mod paging;
pub mod streak;
pub mod view;

#[cfg(test)]
mod test_support;

pub use cache::{EntityCache, Upsert};
pub use optimistic::{Mutated, OptimisticMutation};
pub use paging::{Page, PageRequest, PagedCache};
pub use streak::consecutive_failures;
pub use view::{EntityView, ListView, Located, SingleView};
