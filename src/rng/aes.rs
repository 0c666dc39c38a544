//! AES-in-counter-mode generator.

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit};
use aes::{Aes128, Aes256};
use sha2::{Digest, Sha256};

use super::cipher::{CounterCipher, CounterRng};

/// AES engine for [`CounterRng`]: 16-byte counter blocks, 16 blocks per
/// refill, SHA-256 seed derivation.
pub struct AesCore {
    cipher: AesVariant,
}

enum AesVariant {
    Aes128(Box<Aes128>),
    Aes256(Box<Aes256>),
}

impl CounterCipher for AesCore {
    const COUNTER_SIZE: usize = 16;
    const BLOCKS_AT_ONCE: usize = 16;
    const MIN_SEED: usize = 16;
    const MAX_KEY: usize = 32;
    const DEFAULT_SEED: usize = 32;
    const NAME: &'static str = "AesCounterRng";

    fn key_length(input_len: usize) -> usize {
        if input_len < 32 {
            16
        } else {
            32
        }
    }

    fn hash_seed(seed: &[u8]) -> [u8; 32] {
        Sha256::digest(seed).into()
    }

    fn new_cipher(key: &[u8]) -> Self {
        let cipher = match key.len() {
            16 => AesVariant::Aes128(Box::new(Aes128::new(GenericArray::from_slice(key)))),
            _ => AesVariant::Aes256(Box::new(Aes256::new(GenericArray::from_slice(key)))),
        };
        Self { cipher }
    }

    fn process(&mut self, input: &[u8], output: &mut [u8]) {
        for (plain, enc) in input.chunks_exact(16).zip(output.chunks_exact_mut(16)) {
            let plain = GenericArray::from_slice(plain);
            let enc = GenericArray::from_mut_slice(enc);
            match &self.cipher {
                AesVariant::Aes128(cipher) => cipher.encrypt_block_b2b(plain, enc),
                AesVariant::Aes256(cipher) => cipher.encrypt_block_b2b(plain, enc),
            }
        }
    }
}

/// AES-in-counter-mode generator.
///
/// Accepts seeds of 16 to 48 bytes: the key is the SHA-256 of the seed
/// truncated to 16 bytes (seeds under 32 bytes) or 32 bytes, and any seed
/// bytes beyond the key length initialize the counter.
pub type AesCounterRng = CounterRng<AesCore>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::{EntropyRng, RandomExt, RngError};

    #[test]
    fn test_reproducible_byte_stream() {
        let a = AesCounterRng::from_seed(&[0u8; 16]).unwrap();
        let b = AesCounterRng::from_seed(&[0u8; 16]).unwrap();
        let mut out_a = [0u8; 1024];
        let mut out_b = [0u8; 1024];
        a.fill_bytes(&mut out_a);
        b.fill_bytes(&mut out_b);
        assert_eq!(out_a, out_b);
        assert_ne!(out_a, [0u8; 1024]);
    }

    #[test]
    fn test_reproducible_word_stream() {
        let a = AesCounterRng::from_seed(&[7u8; 32]).unwrap();
        let b = AesCounterRng::from_seed(&[7u8; 32]).unwrap();
        for _ in 0..1024 {
            assert_eq!(a.next_i32(), b.next_i32());
        }
        assert_eq!(a.next_u64(), b.next_u64());
    }

    #[test]
    fn test_chunking_does_not_change_stream() {
        let a = AesCounterRng::from_seed(&[3u8; 16]).unwrap();
        let b = AesCounterRng::from_seed(&[3u8; 16]).unwrap();
        let mut whole = [0u8; 64];
        a.fill_bytes(&mut whole);
        let mut parts = [0u8; 64];
        b.fill_bytes(&mut parts[..24]);
        b.fill_bytes(&mut parts[24..]);
        assert_eq!(whole, parts);
    }

    #[test]
    fn test_first_bytes_span_two_counter_blocks() {
        // The first 32 bytes are the encryptions of counter block 0 and
        // block 1, so the two halves must differ.
        let rng = AesCounterRng::from_seed(&[0u8; 16]).unwrap();
        let mut out = [0u8; 32];
        rng.fill_bytes(&mut out);
        assert_ne!(&out[..16], &out[16..]);
    }

    #[test]
    fn test_seed_round_trip() {
        for len in [16, 24, 32, 48] {
            let seed: Vec<u8> = (0..len as u8).collect();
            let rng = AesCounterRng::from_seed(&seed).unwrap();
            assert_eq!(rng.seed().unwrap(), seed);
        }
    }

    #[test]
    fn test_rejects_bad_seed_lengths() {
        for len in [0, 8, 15, 49, 96] {
            assert!(matches!(
                AesCounterRng::from_seed(&vec![0u8; len]),
                Err(RngError::InvalidSeedLength { .. })
            ));
        }
    }

    #[test]
    fn test_counter_portion_changes_stream() {
        // Same key material, different counter bytes.
        let mut seed_a = vec![1u8; 48];
        let mut seed_b = vec![1u8; 48];
        seed_a[32..].fill(0);
        seed_b[32..].fill(9);
        let a = AesCounterRng::from_seed(&seed_a).unwrap();
        let b = AesCounterRng::from_seed(&seed_b).unwrap();
        assert_ne!(a.next_u64(), b.next_u64());
    }

    #[test]
    fn test_new_seed_length_tracks_key() {
        let small = AesCounterRng::from_seed(&[0u8; 16]).unwrap();
        assert_eq!(small.new_seed_length(), 32);
        let large = AesCounterRng::from_seed(&[0u8; 32]).unwrap();
        assert_eq!(large.new_seed_length(), 48);
    }

    #[test]
    fn test_entropy_credit_and_debit() {
        let rng = AesCounterRng::from_seed(&[0u8; 32]).unwrap();
        assert_eq!(rng.entropy_bits(), 256);
        rng.next_u64();
        assert_eq!(rng.entropy_bits(), 192);
        rng.set_seed(&[5u8; 48]).unwrap();
        assert_eq!(rng.entropy_bits(), 384);
    }

    #[test]
    fn test_set_seed_matches_fresh_instance() {
        let reseeded = AesCounterRng::from_seed(&[0u8; 16]).unwrap();
        reseeded.next_u64();
        reseeded.set_seed(&[9u8; 32]).unwrap();
        let fresh = AesCounterRng::from_seed(&[9u8; 32]).unwrap();
        for _ in 0..256 {
            assert_eq!(reseeded.next_i32(), fresh.next_i32());
        }
    }

    #[test]
    fn test_dump_mentions_seed_and_index() {
        let rng = AesCounterRng::from_seed(&[0xAB; 16]).unwrap();
        let dump = rng.dump();
        assert!(dump.contains("AesCounterRng"));
        assert!(dump.contains(&"ab".repeat(16)));
        assert!(dump.contains("index"));
    }

    #[test]
    fn test_concurrent_output_is_well_formed() {
        use std::sync::Arc;
        let rng = Arc::new(AesCounterRng::from_seed(&[1u8; 32]).unwrap());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let rng = Arc::clone(&rng);
            handles.push(std::thread::spawn(move || {
                let mut first_four = Vec::with_capacity(4);
                for i in 0..100_000u32 {
                    let v = rng.next_u64();
                    if i < 4 {
                        first_four.push(v);
                    }
                }
                first_four
            }));
        }
        let mut openings: Vec<Vec<u64>> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        // The counter never repeats, so no two threads can open with the
        // same word sequence.
        openings.sort();
        openings.dedup();
        assert_eq!(openings.len(), 8);
    }
}
