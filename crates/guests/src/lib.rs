//! Guests domain module (occupancy lifecycle + loyalty enrollment, event-sourced).
//!
//! Business rules for a hotel guest record, implemented purely as deterministic
//! domain logic (no IO, no HTTP, no storage). Occupancy and loyalty are two
//! independent state machines hanging off the same aggregate.

pub mod guest;
pub mod loyalty;
pub mod occupancy;
pub mod profile;

pub use guest::{
    ActivateGuest, CorrectProfile, DeactivateGuest, EnrollLoyalty, Guest, GuestActivated,
    GuestCommand, GuestDeactivated, GuestEvent, GuestId, GuestLoggedIn, GuestProfileCorrected,
    GuestRegistered, LoyaltyEnrolled, LoyaltyUnenrolled, OccupancyUpdated, RecordLogin,
    RegisterGuest, UnenrollLoyalty, UpdateOccupancy, GUEST_AGGREGATE_TYPE,
};
pub use loyalty::{Loyalty, LoyaltyTier};
pub use occupancy::{Occupancy, OccupancyStatus, StayRecord, nights_between};
pub use profile::GuestProfile;
