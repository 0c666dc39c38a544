//! The object-safe core contract every generator implements.

use crate::reseeding::ReseederLink;
use crate::seed::SeedError;

/// Errors produced by generator construction and seeding.
#[derive(Debug, thiserror::Error)]
pub enum RngError {
    /// The seed source failed.
    #[error(transparent)]
    Seed(#[from] SeedError),
    /// The supplied seed length is not accepted by this algorithm.
    #[error("seed length {got} outside accepted range {min}..={max}")]
    InvalidSeedLength {
        /// Shortest accepted seed, in bytes.
        min: usize,
        /// Longest accepted seed, in bytes.
        max: usize,
        /// Length actually supplied.
        got: usize,
    },
    /// A bounded-range method was called with `bound <= origin`.
    #[error("bound {bound} must be greater than origin {origin}")]
    InvalidBound {
        /// Inclusive lower end of the requested range.
        origin: i64,
        /// Exclusive upper end of the requested range.
        bound: i64,
    },
    /// The seed of a wrapped foreign generator is not known.
    #[error("seed of wrapped generator is unknown")]
    UnknownSeed,
}

/// An entropy-accounting pseudo-random number generator.
///
/// This is the object-safe core: raw bit production, the entropy counter,
/// the stashed-Gaussian slot and the seeding surface. The output methods
/// users actually call live on [`RandomExt`](crate::RandomExt), which is
/// implemented for every `EntropyRng`.
///
/// All methods take `&self`; implementations guard their algorithmic state
/// with an internal mutex and keep the entropy counter, the Gaussian slot
/// and the reseeder backlink in atomics outside it.
pub trait EntropyRng: Send + Sync {
    /// Returns `bits` uniformly distributed pseudo-random bits
    /// (`1 <= bits <= 32`) in the low positions of the result.
    ///
    /// Does not debit the entropy counter; callers account for what they
    /// actually emit.
    fn next_bits(&self, bits: u32) -> u32;

    /// Returns a full 64-bit word without debiting entropy.
    ///
    /// The default composes two [`next_bits`](Self::next_bits) calls, high
    /// word first. Generators with a native 64-bit step override this.
    fn next_u64_raw(&self) -> u64 {
        let high = self.next_bits(32) as u64;
        let low = self.next_bits(32) as u64;
        (high << 32) | low
    }

    /// Returns a uniform value in `[0, 1)` without debiting entropy.
    fn next_f64_raw(&self) -> f64 {
        let high = (self.next_bits(26) as u64) << 27;
        let low = self.next_bits(27) as u64;
        (high + low) as f64 * DOUBLE_UNIT
    }

    /// Fills `dest` with pseudo-random bytes without debiting entropy.
    ///
    /// The default draws one byte per [`next_bits`](Self::next_bits) call;
    /// buffered generators override this to copy their output directly.
    fn fill_bytes_raw(&self, dest: &mut [u8]) {
        for byte in dest.iter_mut() {
            *byte = self.next_bits(8) as u8;
        }
    }

    /// Subtracts `bits` from the entropy counter.
    ///
    /// When the counter crosses to zero or below and a reseeder is
    /// registered, the reseeder is nudged asynchronously. An
    /// [`EntropyBlockingRng`](crate::EntropyBlockingRng) instead blocks
    /// here until it holds the requested entropy.
    fn debit(&self, bits: i64);

    /// Returns the current entropy estimate in bits. May be negative.
    fn entropy_bits(&self) -> i64;

    /// Atomically takes the stashed second Gaussian value, if present.
    fn take_stashed_gaussian(&self) -> Option<f64>;

    /// Stores a Gaussian value for the next
    /// [`next_gaussian`](crate::RandomExt::next_gaussian) call.
    fn stash_gaussian(&self, value: f64);

    /// Replaces the seed and all state derived from it.
    ///
    /// Raises the entropy counter to `min(seed.len(), max accepted) * 8`
    /// bits, never lowering it. Fails with
    /// [`RngError::InvalidSeedLength`] if the algorithm does not accept a
    /// seed of this length.
    fn set_seed(&self, seed: &[u8]) -> Result<(), RngError>;

    /// Legacy 8-byte seeding path.
    ///
    /// The default forwards the little-endian bytes of `value` to
    /// [`set_seed`](Self::set_seed); algorithms with a different natural
    /// seed length override or reject it.
    fn set_seed_u64(&self, value: u64) -> Result<(), RngError> {
        self.set_seed(&value.to_le_bytes())
    }

    /// Returns a copy of the seed bytes this generator was last seeded
    /// with.
    ///
    /// Fails with [`RngError::UnknownSeed`] on a wrapper around a foreign
    /// instance whose seed was never supplied.
    fn seed(&self) -> Result<Vec<u8>, RngError>;

    /// Length in bytes of the seed a reseeder should generate for this
    /// generator.
    fn new_seed_length(&self) -> usize;

    /// Replaces the reseeder backlink, deregistering from the previous
    /// loop if it differs. Normally called through
    /// [`ReseederLoop::add`](crate::ReseederLoop::add) and
    /// [`remove`](crate::ReseederLoop::remove).
    fn set_reseeder(&self, link: Option<ReseederLink>);

    /// True if the most recent background reseed attempt for this
    /// generator gave up.
    fn reseed_failed(&self) -> bool;

    /// Records the outcome of a background reseed attempt. Intended for
    /// reseeder implementations.
    fn set_reseed_failed(&self, failed: bool);

    /// Debug description: type, hex-encoded seed, entropy count and
    /// algorithm-specific fields.
    fn dump(&self) -> String;
}

/// Number of pseudo-random bits in a `f32`.
pub(crate) const ENTROPY_OF_FLOAT: i64 = 24;

/// Number of pseudo-random bits in a `f64`.
pub(crate) const ENTROPY_OF_DOUBLE: i64 = 53;

pub(crate) const DOUBLE_UNIT: f64 = 1.0 / ((1u64 << 53) as f64);

/// Entropy in bits, rounded up, of a uniform `i32` in `[origin, bound)`.
pub(crate) fn entropy_of_range_32(origin: i32, bound: i32) -> i64 {
    let span = bound.wrapping_sub(origin).wrapping_sub(1) as u32;
    (32 - span.leading_zeros()) as i64
}

/// Entropy in bits, rounded up, of a uniform `i64` in `[origin, bound)`.
pub(crate) fn entropy_of_range_64(origin: i64, bound: i64) -> i64 {
    let span = bound.wrapping_sub(origin).wrapping_sub(1) as u64;
    (64 - span.leading_zeros()) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entropy_of_degenerate_range_is_zero() {
        assert_eq!(entropy_of_range_32(5, 6), 0);
        assert_eq!(entropy_of_range_64(-3, -2), 0);
    }

    #[test]
    fn test_entropy_of_small_ranges() {
        assert_eq!(entropy_of_range_32(0, 2), 1);
        assert_eq!(entropy_of_range_32(3, 10), 3);
        assert_eq!(entropy_of_range_32(0, 1000), 10);
        assert_eq!(entropy_of_range_64(0, 1 << 40), 40);
    }

    #[test]
    fn test_entropy_of_overflowing_range() {
        assert_eq!(entropy_of_range_32(i32::MIN, i32::MAX), 32);
        assert_eq!(entropy_of_range_64(i64::MIN, i64::MAX), 64);
    }
}
