//! Platform cryptographic seed source.

use rand_core::{OsRng, RngCore};

use super::{SeedError, SeedSource};

/// Seed source backed by the operating system's cryptographic RNG.
///
/// This is the default source and the only one guaranteed to work on every
/// supported platform. The advantage of using it for seeding rather than as
/// the primary generator is that the generators it seeds are much faster.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsSeedSource;

impl SeedSource for OsSeedSource {
    fn generate(&self, length: usize) -> Result<Vec<u8>, SeedError> {
        let mut bytes = vec![0u8; length];
        OsRng
            .try_fill_bytes(&mut bytes)
            .map_err(|e| SeedError::Unavailable {
                reason: e.to_string(),
            })?;
        Ok(bytes)
    }
}
