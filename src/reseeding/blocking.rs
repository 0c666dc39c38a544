//! Output-blocking strict entropy accounting.

use std::sync::Mutex;
use std::time::Duration;

use crate::rng::{EntropyRng, RngError};
use crate::seed::SeedSource;

use super::worker::ReseederLink;

const RETRY_START: Duration = Duration::from_millis(100);
const RETRY_CAP: Duration = Duration::from_secs(10);

/// Wrapper that refuses to emit more entropy than it holds.
///
/// Before any output is produced, the requested debit is checked against
/// the inner generator's entropy count; if it cannot be covered, the
/// wrapper synchronously reseeds from its own [`SeedSource`] and only then
/// proceeds. Output calls therefore block rather than overdraw, which is
/// the behavior applications with strict accounting requirements want.
///
/// Requests larger than one full seed can credit are clamped to that
/// ceiling, so a 64-bit draw from a generator with a 4-byte seed fills the
/// counter and proceeds instead of blocking forever.
pub struct EntropyBlockingRng<R: EntropyRng> {
    inner: R,
    source: Box<dyn SeedSource>,
    // Serializes check-and-reseed so concurrent callers cannot both pass
    // the entropy check against the same balance.
    gate: Mutex<()>,
}

impl<R: EntropyRng> EntropyBlockingRng<R> {
    /// Wraps a generator with its own synchronous seed source.
    pub fn new(inner: R, source: impl SeedSource + 'static) -> Self {
        Self {
            inner,
            source: Box::new(source),
            gate: Mutex::new(()),
        }
    }

    /// The wrapped generator.
    pub fn inner(&self) -> &R {
        &self.inner
    }

    /// Unwraps the generator.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: EntropyRng> EntropyRng for EntropyBlockingRng<R> {
    fn next_bits(&self, bits: u32) -> u32 {
        self.inner.next_bits(bits)
    }

    fn next_u64_raw(&self) -> u64 {
        self.inner.next_u64_raw()
    }

    fn next_f64_raw(&self) -> f64 {
        self.inner.next_f64_raw()
    }

    fn fill_bytes_raw(&self, dest: &mut [u8]) {
        self.inner.fill_bytes_raw(dest);
    }

    fn debit(&self, bits: i64) {
        let _gate = self.gate.lock().unwrap();
        let ceiling = (self.inner.new_seed_length() * 8) as i64;
        let need = bits.min(ceiling);
        let mut backoff = RETRY_START;
        while self.inner.entropy_bits() < need {
            let length = self.inner.new_seed_length();
            match self.source.generate(length) {
                Ok(seed) => match self.inner.set_seed(&seed) {
                    Ok(()) => {
                        tracing::trace!(length, "blocking reseed completed");
                    }
                    Err(error) => {
                        tracing::warn!(%error, length, "inner generator rejected reseed");
                        break;
                    }
                },
                Err(error) => {
                    tracing::warn!(%error, "seed source failed, blocking output");
                    std::thread::sleep(backoff);
                    backoff = (backoff * 2).min(RETRY_CAP);
                }
            }
        }
        self.inner.debit(bits);
    }

    fn entropy_bits(&self) -> i64 {
        self.inner.entropy_bits()
    }

    fn take_stashed_gaussian(&self) -> Option<f64> {
        self.inner.take_stashed_gaussian()
    }

    fn stash_gaussian(&self, value: f64) {
        self.inner.stash_gaussian(value);
    }

    fn set_seed(&self, seed: &[u8]) -> Result<(), RngError> {
        self.inner.set_seed(seed)
    }

    fn set_seed_u64(&self, value: u64) -> Result<(), RngError> {
        self.inner.set_seed_u64(value)
    }

    fn seed(&self) -> Result<Vec<u8>, RngError> {
        self.inner.seed()
    }

    fn new_seed_length(&self) -> usize {
        self.inner.new_seed_length()
    }

    fn set_reseeder(&self, link: Option<ReseederLink>) {
        self.inner.set_reseeder(link);
    }

    fn reseed_failed(&self) -> bool {
        self.inner.reseed_failed()
    }

    fn set_reseed_failed(&self, failed: bool) {
        self.inner.set_reseed_failed(failed);
    }

    fn dump(&self) -> String {
        format!("EntropyBlockingRng {{ inner: {} }}", self.inner.dump())
    }
}
