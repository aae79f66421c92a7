//! # Adapters Layer (Outer Hexagon)
//!
//! In-memory implementations of the outbound ports plus a scripted Move
//! engine. Together they run the bridge end to end without a host chain.
//!
//! - `kv`: ordered byte map implementing `KvStore`
//! - `keepers`: account, bank, staking and community-pool keepers
//! - `router`: type-URL routing of ledger messages
//! - `engine`: closure-backed `MoveEngine` with a real loader cache
//! - `harness`: a wired bridge for tests

pub mod engine;
pub mod harness;
pub mod keepers;
pub mod kv;
pub mod router;

pub use engine::*;
pub use keepers::*;
pub use kv::*;
pub use router::*;
