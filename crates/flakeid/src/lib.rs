//! # flakeid
//!
//! Distributed, time-ordered 64-bit ID generation for a fleet of processes
//! that share a coordination store.
//!
//! An ID packs a millisecond timestamp, a data-center ID, a worker ID and a
//! per-millisecond sequence:
//!
//! ```text
//!  Bit Index:  63           63 62            24 23        18 17        12 11             0
//!              +--------------+----------------+------------+------------+---------------+
//!  Field:      | reserved (1) | timestamp (39) | dc id (6)  | worker (6) | sequence (12) |
//!              +--------------+----------------+------------+------------+---------------+
//! ```
//!
//! The worker ID is the one piece that has to be unique across live
//! processes. [`WorkerIdLeaseManager`] claims one from a shared
//! [`CoordinationStore`] under a TTL, and [`RenewalHandle`] keeps the claim
//! alive for the life of the process. [`GeneratorRegistry`] then hands out
//! exactly one generator per `(kind, data_center_id)`.
//!
//! ```
//! use flakeid::{GeneratorRegistry, IdGenerator};
//!
//! let registry = GeneratorRegistry::new(3).unwrap();
//! let generator = registry.get(Some(1)).unwrap();
//!
//! let a = generator.next_flake_id().unwrap();
//! let b = generator.next_flake_id().unwrap();
//! assert!(b > a);
//! assert_eq!(a.worker_id(), 3);
//! ```

mod error;
mod generator;
mod id;
mod lease;
mod registry;
mod status;
mod time;

pub use crate::error::*;
pub use crate::generator::*;
pub use crate::id::*;
pub use crate::lease::*;
pub use crate::registry::*;
pub use crate::status::*;
pub use crate::time::*;
