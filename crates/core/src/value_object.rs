//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects have **no identity**: two values with the same attributes are
/// the same value. They are immutable; "changing" one means building a new one.
///
/// - **Value object**: a `StayRecord { room_number: "205", nights: 3, .. }`
/// - **Entity**: a `Guest { id: GuestId(..), .. }`
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq, Eq)]
/// struct RoomNumber(String);
///
/// impl ValueObject for RoomNumber {}
///
/// assert_eq!(RoomNumber("12A".into()), RoomNumber("12A".into()));
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
