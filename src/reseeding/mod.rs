//! Background and synchronous reseeding.
//!
//! A [`ReseederLoop`] is a long-lived worker tied to one seed source; it
//! watches registered generators and replenishes any whose entropy count
//! has been exhausted. [`ThreadLocalRng`] and [`ReseedingThreadLocalRng`]
//! compose a generator with per-thread instantiation, and
//! [`EntropyBlockingRng`] trades throughput for strict accounting by
//! reseeding synchronously before every output call it cannot cover.

mod blocking;
mod thread_local;
mod worker;

pub use blocking::EntropyBlockingRng;
pub use thread_local::{ReseedingThreadLocalRng, ThreadLocalRng};
pub use worker::{Priority, ReseederConfig, ReseederHandle, ReseederLink, ReseederLoop};
