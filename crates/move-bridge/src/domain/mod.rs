//! # Domain Layer (Inner Hexagon)
//!
//! Pure types and rules for Move execution.
//! NO I/O, NO async, NO collaborator access.
//!
//! Dependencies point INWARD only: adapters and the service depend on this
//! layer, never the other way around.

pub mod entities;
pub mod invariants;
pub mod services;
pub mod type_tag;
pub mod value_objects;

pub use entities::*;
pub use invariants::*;
pub use services::*;
pub use type_tag::{StructTag, TypeTag, TypeTagError};
pub use value_objects::*;
