//! Adapter over the SplitMix64 linear generator.

use std::sync::Mutex;

use rand_core::{RngCore, SeedableRng};
use rand_xoshiro::SplitMix64;

use crate::reseeding::ReseederLink;
use crate::seed::SeedSource;

use super::accountant::Accountant;
use super::contract::{EntropyRng, RngError};
use super::hex;

const SEED_LENGTH: usize = 8;

struct SplitMixState {
    seed: [u8; SEED_LENGTH],
    rng: SplitMix64,
}

/// Entropy-accounting adapter over a [`SplitMix64`] generator.
///
/// The underlying 64-bit linear state is replaced wholesale on `set_seed`,
/// so the adapter is fully reproducible from its 8-byte seed. Useful where
/// throughput matters more than unpredictability, typically behind a
/// [`ReseedingThreadLocalRng`](crate::ReseedingThreadLocalRng).
pub struct SplitMixRng {
    accountant: Accountant,
    state: Mutex<SplitMixState>,
}

impl SplitMixRng {
    /// Creates a generator seeded from the operating system.
    pub fn from_os_entropy() -> Result<Self, RngError> {
        Self::with_source(&crate::seed::OsSeedSource)
    }

    /// Creates a generator seeded from the given source.
    pub fn with_source(source: &dyn SeedSource) -> Result<Self, RngError> {
        let seed = source.generate(SEED_LENGTH)?;
        Self::from_seed(&seed)
    }

    /// Creates a generator from exactly eight seed bytes.
    pub fn from_seed(seed: &[u8]) -> Result<Self, RngError> {
        let seed = check_length(seed)?;
        let rng = Self {
            accountant: Accountant::new(),
            state: Mutex::new(SplitMixState {
                seed,
                rng: SplitMix64::from_seed(seed),
            }),
        };
        rng.accountant.credit_for_seed(SEED_LENGTH, SEED_LENGTH);
        Ok(rng)
    }
}

fn check_length(seed: &[u8]) -> Result<[u8; SEED_LENGTH], RngError> {
    seed.try_into().map_err(|_| RngError::InvalidSeedLength {
        min: SEED_LENGTH,
        max: SEED_LENGTH,
        got: seed.len(),
    })
}

impl EntropyRng for SplitMixRng {
    fn next_bits(&self, bits: u32) -> u32 {
        debug_assert!((1..=32).contains(&bits));
        let word = self.state.lock().unwrap().rng.next_u64();
        (word >> (64 - bits)) as u32
    }

    fn next_u64_raw(&self) -> u64 {
        self.state.lock().unwrap().rng.next_u64()
    }

    fn debit(&self, bits: i64) {
        self.accountant.debit(bits);
    }

    fn entropy_bits(&self) -> i64 {
        self.accountant.entropy_bits()
    }

    fn take_stashed_gaussian(&self) -> Option<f64> {
        self.accountant.take_stashed_gaussian()
    }

    fn stash_gaussian(&self, value: f64) {
        self.accountant.stash_gaussian(value);
    }

    fn set_seed(&self, seed: &[u8]) -> Result<(), RngError> {
        let seed = check_length(seed)?;
        {
            let mut state = self.state.lock().unwrap();
            state.seed = seed;
            state.rng = SplitMix64::from_seed(seed);
        }
        self.accountant.credit_for_seed(SEED_LENGTH, SEED_LENGTH);
        Ok(())
    }

    fn seed(&self) -> Result<Vec<u8>, RngError> {
        Ok(self.state.lock().unwrap().seed.to_vec())
    }

    fn new_seed_length(&self) -> usize {
        SEED_LENGTH
    }

    fn set_reseeder(&self, link: Option<ReseederLink>) {
        self.accountant.set_reseeder(link);
    }

    fn reseed_failed(&self) -> bool {
        self.accountant.reseed_failed()
    }

    fn set_reseed_failed(&self, failed: bool) {
        self.accountant.set_reseed_failed(failed);
    }

    fn dump(&self) -> String {
        let state = self.state.lock().unwrap();
        format!(
            "SplitMixRng {{ seed: {}, entropy_bits: {} }}",
            hex(&state.seed),
            self.accountant.entropy_bits(),
        )
    }
}
