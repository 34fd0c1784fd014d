//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects have no identity and are compared by their attribute values.
/// `Money(500)` read from the database and `Money(500)` produced by a credit are
/// the same value, while two accounts with the same balance are still two
/// different entities (see [`crate::Entity`]).
///
/// Implementors are immutable: arithmetic returns a new value instead of
/// mutating in place.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
