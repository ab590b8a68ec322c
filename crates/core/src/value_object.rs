//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value** — two instances
/// with the same attributes are the same value. `InterestRate` and
/// `AccountNumber` are value objects; an `Account` is not (it has identity).
///
/// To "modify" a value object, construct a new one. This keeps values safe to
/// share and copy like primitives.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
