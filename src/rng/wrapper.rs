//! Adapter bringing foreign `rand_core` generators under the
//! entropy-accounting contract.

use std::sync::Mutex;

use rand_core::{RngCore, SeedableRng};

use crate::reseeding::ReseederLink;
use crate::seed::SeedSource;

use super::accountant::Accountant;
use super::contract::{EntropyRng, RngError};
use super::hex;

struct WrappedState<R> {
    rng: R,
    /// `None` while wrapping a foreign instance whose seed was never
    /// supplied.
    seed: Option<Vec<u8>>,
}

/// Wraps any [`RngCore`] generator as an [`EntropyRng`].
///
/// The wrapper delegates output to the wrapped generator and maintains the
/// entropy count itself. Can be used to encapsulate away a change of
/// implementation in midstream.
///
/// `set_seed` accepts either a seed of the wrapped generator's native
/// length (rebuilt via [`SeedableRng::from_seed`]) or a legacy 8-byte seed
/// (via [`SeedableRng::seed_from_u64`], little-endian).
pub struct RandomWrapper<R> {
    accountant: Accountant,
    state: Mutex<WrappedState<R>>,
}

impl<R: RngCore + SeedableRng + Send> RandomWrapper<R> {
    /// Native seed length of the wrapped generator type, in bytes.
    pub fn native_seed_length() -> usize {
        R::Seed::default().as_mut().len()
    }

    /// Wraps a generator seeded from the operating system.
    pub fn from_os_entropy() -> Result<Self, RngError> {
        Self::with_source(&crate::seed::OsSeedSource)
    }

    /// Wraps a generator seeded from the given source.
    pub fn with_source(source: &dyn SeedSource) -> Result<Self, RngError> {
        let seed = source.generate(Self::native_seed_length())?;
        Self::from_seed_bytes(&seed)
    }

    /// Wraps a freshly built generator seeded with the given bytes.
    pub fn from_seed_bytes(seed: &[u8]) -> Result<Self, RngError> {
        let rng = build(seed)?;
        let wrapper = Self {
            accountant: Accountant::new(),
            state: Mutex::new(WrappedState {
                rng,
                seed: Some(seed.to_vec()),
            }),
        };
        wrapper
            .accountant
            .credit_for_seed(seed.len(), Self::native_seed_length());
        Ok(wrapper)
    }

    /// Wraps an existing instance whose internal state, and therefore
    /// seed, is unknown.
    ///
    /// [`seed`](EntropyRng::seed) fails with [`RngError::UnknownSeed`]
    /// until the next successful [`set_seed`](EntropyRng::set_seed). The
    /// instance is credited 64 bits of entropy.
    pub fn wrap(rng: R) -> Self {
        let wrapper = Self {
            accountant: Accountant::new(),
            state: Mutex::new(WrappedState { rng, seed: None }),
        };
        wrapper.accountant.credit_for_seed(8, 8);
        wrapper
    }
}

/// Builds the wrapped generator from seed bytes of the native length or
/// the legacy 8-byte form.
fn build<R: RngCore + SeedableRng + Send>(seed: &[u8]) -> Result<R, RngError> {
    let native = RandomWrapper::<R>::native_seed_length();
    if seed.len() == native {
        let mut native_seed = R::Seed::default();
        native_seed.as_mut().copy_from_slice(seed);
        Ok(R::from_seed(native_seed))
    } else if seed.len() == 8 {
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(seed);
        Ok(R::seed_from_u64(u64::from_le_bytes(bytes)))
    } else {
        Err(RngError::InvalidSeedLength {
            min: native.min(8),
            max: native.max(8),
            got: seed.len(),
        })
    }
}

impl<R: RngCore + SeedableRng + Send> EntropyRng for RandomWrapper<R> {
    fn next_bits(&self, bits: u32) -> u32 {
        debug_assert!((1..=32).contains(&bits));
        let word = self.state.lock().unwrap().rng.next_u32();
        word >> (32 - bits)
    }

    fn next_u64_raw(&self) -> u64 {
        // One call under the lock keeps 64-bit draws transactional.
        self.state.lock().unwrap().rng.next_u64()
    }

    fn fill_bytes_raw(&self, dest: &mut [u8]) {
        self.state.lock().unwrap().rng.fill_bytes(dest);
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
        let rng = build(seed)?;
        {
            let mut state = self.state.lock().unwrap();
            state.rng = rng;
            state.seed = Some(seed.to_vec());
        }
        self.accountant
            .credit_for_seed(seed.len(), Self::native_seed_length());
        Ok(())
    }

    fn seed(&self) -> Result<Vec<u8>, RngError> {
        self.state
            .lock()
            .unwrap()
            .seed
            .clone()
            .ok_or(RngError::UnknownSeed)
    }

    fn new_seed_length(&self) -> usize {
        Self::native_seed_length()
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
        let seed = match &state.seed {
            Some(seed) => hex(seed),
            None => "unknown".to_string(),
        };
        format!(
            "RandomWrapper<{}> {{ seed: {}, entropy_bits: {} }}",
            std::any::type_name::<R>(),
            seed,
            self.accountant.entropy_bits(),
        )
    }
}
