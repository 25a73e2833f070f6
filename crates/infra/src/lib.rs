//! Infrastructure layer: guest record store, command pipeline, read models and
//! the guest lifecycle service.

pub mod command_dispatcher;
pub mod event_store;
pub mod guest_service;
pub mod projections;
pub mod read_model;

pub use command_dispatcher::{CommandDispatcher, DispatchError, Dispatched};
pub use guest_service::{GuestDirectory, GuestError, GuestService, NewGuest, OccupancyChange, ProfileCorrection};
