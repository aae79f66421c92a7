//! # Ports Layer (Middle Hexagon)
//!
//! Trait definitions for Move execution.
//! These are the interfaces between the bridge and the outside world.
//!
//! - **Driving Ports (Inbound)**: `MoveBridgeApi`
//! - **Driven Ports (Outbound)**: `MoveEngine`, `KvStore`, `GasMeter` and the
//!   ledger keepers
//! - No concrete implementations in this module

pub mod inbound;
pub mod outbound;

pub use inbound::*;
pub use outbound::*;
