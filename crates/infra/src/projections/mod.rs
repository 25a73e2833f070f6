//! Read models built from committed guest events.
//!
//! Projections are disposable: they can always be rebuilt from the record
//! store, they are partitioned by tenant, and they tolerate duplicate delivery.

pub mod guest_directory;

pub use guest_directory::{
    DirectoryPage, DirectoryQuery, DirectorySort, GuestDirectoryError, GuestDirectoryProjection, MAX_PAGE_SIZE,
};
