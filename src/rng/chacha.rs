//! ChaCha20-in-counter-mode generator.

use chacha20::cipher::{NewCipher, StreamCipher};
use chacha20::ChaCha20Legacy;
use sha3::{Digest, Sha3_256};

use super::cipher::{CounterCipher, CounterRng};

// Nonce baked into the engine; the counter supplies all per-seed variation.
const FIXED_IV: [u8; 8] = [125, 13, 229, 134, 104, 167, 127, 81];

/// ChaCha20 engine for [`CounterRng`]: 64-byte counter blocks, one block
/// per refill, SHA3-256 seed derivation, fixed 8-byte IV.
pub struct ChaChaCore {
    cipher: ChaCha20Legacy,
}

impl CounterCipher for ChaChaCore {
    const COUNTER_SIZE: usize = 64;
    const BLOCKS_AT_ONCE: usize = 1;
    const MIN_SEED: usize = 16;
    const MAX_KEY: usize = 32;
    const DEFAULT_SEED: usize = 32;
    const NAME: &'static str = "ChaChaCounterRng";

    fn key_length(input_len: usize) -> usize {
        if input_len < 32 {
            16
        } else {
            32
        }
    }

    fn hash_seed(seed: &[u8]) -> [u8; 32] {
        Sha3_256::digest(seed).into()
    }

    fn new_cipher(key: &[u8]) -> Self {
        // A 16-byte effective key is expanded by repetition, mirroring the
        // 128-bit-key ChaCha construction.
        let mut full_key = [0u8; 32];
        if key.len() >= 32 {
            full_key.copy_from_slice(&key[..32]);
        } else {
            full_key[..16].copy_from_slice(&key[..16]);
            full_key[16..].copy_from_slice(&key[..16]);
        }
        Self {
            cipher: ChaCha20Legacy::new(&full_key.into(), &FIXED_IV.into()),
        }
    }

    fn process(&mut self, input: &[u8], output: &mut [u8]) {
        output.copy_from_slice(input);
        self.cipher.apply_keystream(output);
    }
}

/// ChaCha20-in-counter-mode generator.
///
/// Accepts seeds of 16 to 96 bytes: the key is the SHA3-256 of the seed
/// truncated to 16 bytes (seeds under 32 bytes) or 32 bytes, and any seed
/// bytes beyond the key length initialize the 64-byte counter.
pub type ChaChaCounterRng = CounterRng<ChaChaCore>;
