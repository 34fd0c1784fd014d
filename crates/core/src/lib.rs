//! `ewallet-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns):
//! identifiers, exact money types and the domain error model.

pub mod entity;
pub mod error;
pub mod id;
pub mod money;
pub mod value_object;

pub use entity::Entity;
pub use error::{DomainError, DomainResult};
pub use id::{AccountId, TransactionId};
pub use money::{Amount, MAX_MONEY, MONEY_SCALE, Money};
pub use value_object::ValueObject;
