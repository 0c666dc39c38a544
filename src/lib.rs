//! Reseedable, entropy-accounting pseudo-random number generators.
//!
//! Every generator in this crate tracks how many bits of entropy remain in
//! its internal state and debits that count as random output is produced.
//! When the count is exhausted, a background [`ReseederLoop`] can replenish
//! the generator from a [`SeedSource`], or an [`EntropyBlockingRng`] can
//! refuse to emit output until a synchronous reseed has completed.
//!
//! # Architecture
//!
//! ```text
//! seed source → generator (debits entropy) → reseeder loop (replenishes)
//!                    ↓
//!              output methods (RandomExt)
//! ```
//!
//! # Design Principles
//!
//! - **Conservative accounting**: entropy is an upper bound on
//!   unpredictability, not a cryptographic guarantee
//! - **Reproducible**: two generators built from the same seed bytes yield
//!   identical output streams
//! - **Explicit lifetimes**: the reseeder is a value owned by the caller,
//!   not a hidden global thread
//! - **Uses standard primitives**: AES and ChaCha20 for the cipher engines,
//!   SHA-256/SHA3-256 for seed derivation
//!
//! # Example
//!
//! ```no_run
//! use entrand::{AesCounterRng, EntropyRng, OsSeedSource, RandomExt, ReseederLoop};
//! use std::sync::Arc;
//!
//! // A generator seeded from the operating system.
//! let rng: Arc<dyn EntropyRng> = Arc::new(AesCounterRng::with_source(&OsSeedSource).unwrap());
//!
//! // Replenish it in the background whenever its entropy runs out.
//! let reseeder = ReseederLoop::new(OsSeedSource);
//! reseeder.add(&rng);
//!
//! let roll = rng.next_i32_range(1, 7).unwrap();
//! let coin = rng.next_bool();
//! println!("rolled {roll}, flipped {coin}, {} bits left", rng.entropy_bits());
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_code)]

pub mod reseeding;
pub mod rng;
pub mod seed;

// Re-export commonly used types at crate root
pub use reseeding::{
    EntropyBlockingRng, Priority, ReseederConfig, ReseederHandle, ReseederLoop,
    ReseedingThreadLocalRng, ThreadLocalRng,
};
pub use rng::{
    AesCounterRng, CellularAutomatonRng, ChaChaCounterRng, EntropyRng, RandomExt, RandomWrapper,
    RngError, SplitMixRng,
};
pub use seed::{OsSeedSource, SeedError, SeedSource};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
