//! Shared entropy-accounting state embedded in every generator.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;

use crate::reseeding::ReseederLink;

// Canonical NaN bit pattern marks the Gaussian slot as empty. The polar
// method can never produce NaN, so the sentinel is unambiguous.
const GAUSSIAN_EMPTY: u64 = 0x7ff8_0000_0000_0000;

/// Entropy counter, stashed-Gaussian slot and reseeder backlink.
///
/// Lives outside the generator's state mutex; every field is safe to touch
/// without holding the algorithmic lock.
pub(crate) struct Accountant {
    entropy_bits: AtomicI64,
    gaussian: AtomicU64,
    reseeder: Mutex<Option<ReseederLink>>,
    reseed_failed: AtomicBool,
}

impl Accountant {
    pub(crate) fn new() -> Self {
        Self {
            entropy_bits: AtomicI64::new(0),
            gaussian: AtomicU64::new(GAUSSIAN_EMPTY),
            reseeder: Mutex::new(None),
            reseed_failed: AtomicBool::new(false),
        }
    }

    /// Subtracts `bits` and nudges the registered reseeder when the
    /// counter lands at or below zero. Nudging an already-pending
    /// generator is a no-op.
    pub(crate) fn debit(&self, bits: i64) {
        let after = self.entropy_bits.fetch_sub(bits, Ordering::AcqRel) - bits;
        if after <= 0 {
            let slot = self.reseeder.lock().unwrap();
            if let Some(link) = slot.as_ref() {
                link.nudge();
            }
        }
    }

    /// Raises the counter to `min(seed_len, max_len) * 8` bits, never
    /// lowering it.
    pub(crate) fn credit_for_seed(&self, seed_len: usize, max_len: usize) {
        let bits = (seed_len.min(max_len) * 8) as i64;
        self.entropy_bits.fetch_max(bits, Ordering::AcqRel);
    }

    pub(crate) fn entropy_bits(&self) -> i64 {
        self.entropy_bits.load(Ordering::Acquire)
    }

    pub(crate) fn take_stashed_gaussian(&self) -> Option<f64> {
        let bits = self.gaussian.swap(GAUSSIAN_EMPTY, Ordering::AcqRel);
        let value = f64::from_bits(bits);
        if value.is_nan() {
            None
        } else {
            Some(value)
        }
    }

    pub(crate) fn stash_gaussian(&self, value: f64) {
        self.gaussian.store(value.to_bits(), Ordering::Release);
    }

    /// Swaps in the new backlink. The old loop is told to forget this
    /// generator unless the new link points at the same loop.
    pub(crate) fn set_reseeder(&self, link: Option<ReseederLink>) {
        let mut slot = self.reseeder.lock().unwrap();
        if let Some(old) = slot.take() {
            let same = link.as_ref().map_or(false, |new| old.same_loop(new));
            if !same {
                old.detach();
            }
        }
        *slot = link;
    }

    pub(crate) fn reseed_failed(&self) -> bool {
        self.reseed_failed.load(Ordering::Acquire)
    }

    pub(crate) fn set_reseed_failed(&self, failed: bool) {
        self.reseed_failed.store(failed, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debit_goes_negative() {
        let accountant = Accountant::new();
        accountant.credit_for_seed(4, 8);
        assert_eq!(accountant.entropy_bits(), 32);
        accountant.debit(64);
        assert_eq!(accountant.entropy_bits(), -32);
    }

    #[test]
    fn test_credit_never_lowers() {
        let accountant = Accountant::new();
        accountant.credit_for_seed(32, 48);
        assert_eq!(accountant.entropy_bits(), 256);
        accountant.credit_for_seed(4, 48);
        assert_eq!(accountant.entropy_bits(), 256);
    }

    #[test]
    fn test_credit_clamped_by_max_accepted() {
        let accountant = Accountant::new();
        accountant.credit_for_seed(64, 48);
        assert_eq!(accountant.entropy_bits(), 48 * 8);
    }

    #[test]
    fn test_gaussian_slot_starts_empty() {
        let accountant = Accountant::new();
        assert!(accountant.take_stashed_gaussian().is_none());
    }

    #[test]
    fn test_gaussian_slot_round_trip() {
        let accountant = Accountant::new();
        accountant.stash_gaussian(-1.25);
        assert_eq!(accountant.take_stashed_gaussian(), Some(-1.25));
        assert!(accountant.take_stashed_gaussian().is_none());
    }

    #[test]
    fn test_negative_zero_is_not_empty() {
        let accountant = Accountant::new();
        accountant.stash_gaussian(-0.0);
        assert_eq!(accountant.take_stashed_gaussian(), Some(-0.0));
    }
}
