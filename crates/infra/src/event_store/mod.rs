//! Append-only guest record store.
//!
//! A guest's current state is the fold of its event stream; these types are
//! the storage boundary for those streams.

pub mod in_memory;
pub mod postgres;
pub mod r#trait;

pub use in_memory::InMemoryEventStore;
pub use postgres::PostgresEventStore;
pub use r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};
