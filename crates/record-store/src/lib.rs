pub mod api;
mod eval;
pub mod memory;

pub use api::{EventSink, ListPage, RecordStore, Teardown};
pub use memory::{MemoryStore, StoreCalls, StoreOp};
