//! Generic cipher-in-counter-mode generator.
//!
//! A block or stream cipher is keyed from a hashed seed and run over an
//! incrementing counter; the cipher output is the random stream. The AES
//! and ChaCha engines plug into [`CounterRng`] through [`CounterCipher`].

use std::sync::Mutex;

use crate::reseeding::ReseederLink;
use crate::seed::SeedSource;

use super::accountant::Accountant;
use super::contract::{EntropyRng, RngError};
use super::hex;

/// A cipher engine usable as the core of a [`CounterRng`].
///
/// Implemented by the built-in [`AesCore`](crate::rng::AesCore) and
/// [`ChaChaCore`](crate::rng::ChaChaCore); the associated constants fix
/// the counter geometry and the accepted seed lengths.
pub trait CounterCipher: Send {
    /// Size in bytes of one counter block.
    const COUNTER_SIZE: usize;
    /// Number of counter blocks encrypted per refill.
    const BLOCKS_AT_ONCE: usize;
    /// Shortest accepted seed, in bytes.
    const MIN_SEED: usize;
    /// Longest supported key, in bytes.
    const MAX_KEY: usize;
    /// Seed length requested when constructing from a [`SeedSource`].
    const DEFAULT_SEED: usize;
    /// Human-readable engine name, used in dumps.
    const NAME: &'static str;

    /// Effective key length for a seed of `input_len` bytes.
    fn key_length(input_len: usize) -> usize;

    /// Companion digest deriving key material from the raw seed.
    fn hash_seed(seed: &[u8]) -> [u8; 32];

    /// Builds a cipher keyed with `key` (`key.len()` is a value the key
    /// clamp table can produce).
    fn new_cipher(key: &[u8]) -> Self;

    /// Encrypts `input` into `output`; both are
    /// `COUNTER_SIZE * BLOCKS_AT_ONCE` bytes.
    fn process(&mut self, input: &[u8], output: &mut [u8]);
}

struct CounterState<C> {
    cipher: C,
    /// The exact bytes last passed to `set_seed`, returned by `seed()`.
    seed: Vec<u8>,
    key_len: usize,
    counter: Vec<u8>,
    input: Vec<u8>,
    buffer: Vec<u8>,
    /// Next unread byte of `buffer`; `buffer.len()` forces a refill.
    index: usize,
}

/// Generator that encrypts an incrementing counter under a key derived
/// from the seed.
///
/// Two instances created from the same seed bytes produce byte-identical
/// output streams.
pub struct CounterRng<C: CounterCipher> {
    accountant: Accountant,
    state: Mutex<CounterState<C>>,
}

impl<C: CounterCipher> CounterRng<C> {
    /// Creates a generator seeded from the operating system.
    pub fn from_os_entropy() -> Result<Self, RngError> {
        Self::with_source(&crate::seed::OsSeedSource)
    }

    /// Creates a generator seeded from the given source.
    pub fn with_source(source: &dyn SeedSource) -> Result<Self, RngError> {
        let seed = source.generate(C::DEFAULT_SEED)?;
        Self::from_seed(&seed)
    }

    /// Creates a generator from explicit seed bytes.
    ///
    /// Accepts `MIN_SEED..=MAX_KEY + COUNTER_SIZE` bytes; see the concrete
    /// engine for the exact range.
    pub fn from_seed(seed: &[u8]) -> Result<Self, RngError> {
        let (cipher, key_len, counter) = derive::<C>(seed)?;
        let bytes_at_once = C::COUNTER_SIZE * C::BLOCKS_AT_ONCE;
        let state = CounterState {
            cipher,
            seed: seed.to_vec(),
            key_len,
            counter,
            input: vec![0; bytes_at_once],
            buffer: vec![0; bytes_at_once],
            index: bytes_at_once,
        };
        let rng = Self {
            accountant: Accountant::new(),
            state: Mutex::new(state),
        };
        rng.accountant
            .credit_for_seed(seed.len(), key_len + C::COUNTER_SIZE);
        Ok(rng)
    }
}

/// Validates a seed and derives the cipher, effective key length and
/// initial counter from it.
fn derive<C: CounterCipher>(seed: &[u8]) -> Result<(C, usize, Vec<u8>), RngError> {
    let max = C::MAX_KEY + C::COUNTER_SIZE;
    if seed.len() < C::MIN_SEED || seed.len() > max {
        return Err(RngError::InvalidSeedLength {
            min: C::MIN_SEED,
            max,
            got: seed.len(),
        });
    }
    let key_len = C::key_length(seed.len());
    let digest = C::hash_seed(seed);
    let cipher = C::new_cipher(&digest[..key_len]);
    // Seed bytes beyond the key become the low bytes of the counter.
    let mut counter = vec![0; C::COUNTER_SIZE];
    if seed.len() > key_len {
        let extra = seed.len() - key_len;
        counter[..extra].copy_from_slice(&seed[key_len..]);
    }
    Ok((cipher, key_len, counter))
}

/// Rebuilds all seed-derived state. The stored seed is only replaced once
/// the new key and counter are fully computed.
fn reseed<C: CounterCipher>(state: &mut CounterState<C>, seed: &[u8]) -> Result<(), RngError> {
    let (cipher, key_len, counter) = derive::<C>(seed)?;
    state.cipher = cipher;
    state.counter = counter;
    state.seed.clear();
    state.seed.extend_from_slice(seed);
    state.key_len = key_len;
    state.index = state.buffer.len();
    tracing::trace!(engine = C::NAME, seed_len = seed.len(), key_len, "reseeded");
    Ok(())
}

/// Encrypts the next batch of counter blocks into the buffer.
fn refill<C: CounterCipher>(state: &mut CounterState<C>) {
    let block = C::COUNTER_SIZE;
    for i in 0..C::BLOCKS_AT_ONCE {
        state.input[i * block..(i + 1) * block].copy_from_slice(&state.counter);
        increment(&mut state.counter);
    }
    state.cipher.process(&state.input, &mut state.buffer);
    state.index = 0;
}

/// Increments the counter as a little-endian big unsigned integer.
fn increment(counter: &mut [u8]) {
    for byte in counter.iter_mut() {
        *byte = byte.wrapping_add(1);
        if *byte != 0 {
            break;
        }
    }
}

impl<C: CounterCipher> EntropyRng for CounterRng<C> {
    fn next_bits(&self, bits: u32) -> u32 {
        debug_assert!((1..=32).contains(&bits));
        let mut state = self.state.lock().unwrap();
        if state.index + 4 > state.buffer.len() {
            refill(&mut state);
        }
        let word = u32::from_be_bytes(
            state.buffer[state.index..state.index + 4]
                .try_into()
                .unwrap(),
        );
        state.index += 4;
        word >> (32 - bits)
    }

    fn fill_bytes_raw(&self, dest: &mut [u8]) {
        let mut state = self.state.lock().unwrap();
        let mut filled = 0;
        while filled < dest.len() {
            if state.index >= state.buffer.len() {
                refill(&mut state);
            }
            let n = (dest.len() - filled).min(state.buffer.len() - state.index);
            dest[filled..filled + n]
                .copy_from_slice(&state.buffer[state.index..state.index + n]);
            state.index += n;
            filled += n;
        }
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
        let max_accepted = {
            let mut state = self.state.lock().unwrap();
            reseed(&mut state, seed)?;
            state.key_len + C::COUNTER_SIZE
        };
        self.accountant.credit_for_seed(seed.len(), max_accepted);
        Ok(())
    }

    fn seed(&self) -> Result<Vec<u8>, RngError> {
        Ok(self.state.lock().unwrap().seed.clone())
    }

    fn new_seed_length(&self) -> usize {
        let state = self.state.lock().unwrap();
        (state.key_len + C::COUNTER_SIZE).min(C::MAX_KEY + C::COUNTER_SIZE)
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
            "{} {{ seed: {}, entropy_bits: {}, key_len: {}, counter: {}, index: {} }}",
            C::NAME,
            hex(&state.seed),
            self.accountant.entropy_bits(),
            state.key_len,
            hex(&state.counter),
            state.index,
        )
    }
}
