//! Seed sources.
//!
//! A seed source produces fresh random bytes for seeding and reseeding
//! generators. The only implementation the core requires wraps the
//! platform's cryptographic random source; callers may supply their own
//! (hardware sources, remote services) as long as they honor the contract.

mod os;

pub use os::OsSeedSource;

/// Errors produced by a [`SeedSource`].
#[derive(Debug, Clone, thiserror::Error)]
pub enum SeedError {
    /// The underlying source could not produce random bytes.
    #[error("seed source unavailable: {reason}")]
    Unavailable {
        /// Description of the underlying failure.
        reason: String,
    },
    /// The source returned fewer bytes than requested.
    #[error("seed source returned {got} bytes, requested {requested}")]
    ShortRead {
        /// Number of bytes requested.
        requested: usize,
        /// Number of bytes actually produced.
        got: usize,
    },
}

/// A strategy for producing seed bytes.
///
/// Implementations must be safe for concurrent calls; a single source is
/// typically shared by one [`ReseederLoop`](crate::ReseederLoop) and any
/// number of generator constructors.
pub trait SeedSource: Send + Sync {
    /// Produces exactly `length` random bytes, or fails.
    fn generate(&self, length: usize) -> Result<Vec<u8>, SeedError>;

    /// Fills `dest` with random bytes.
    fn fill(&self, dest: &mut [u8]) -> Result<(), SeedError> {
        let bytes = self.generate(dest.len())?;
        if bytes.len() != dest.len() {
            return Err(SeedError::ShortRead {
                requested: dest.len(),
                got: bytes.len(),
            });
        }
        dest.copy_from_slice(&bytes);
        Ok(())
    }
}

/// Environment variable naming the API key for remote seed services.
///
/// Remote sources themselves are out of scope for this crate; the variable
/// is recognized here so alternative [`SeedSource`] implementations agree
/// on where the key lives.
pub const SEED_SOURCE_API_KEY_VAR: &str = "SEED_SOURCE_API_KEY";

/// Reads the remote seed service API key from the environment, if set.
pub fn web_api_key() -> Option<String> {
    std::env::var(SEED_SOURCE_API_KEY_VAR)
        .ok()
        .filter(|key| !key.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedSource(u8);

    impl SeedSource for FixedSource {
        fn generate(&self, length: usize) -> Result<Vec<u8>, SeedError> {
            Ok(vec![self.0; length])
        }
    }

    #[test]
    fn test_fill_uses_generate() {
        let source = FixedSource(0xAB);
        let mut buf = [0u8; 7];
        source.fill(&mut buf).unwrap();
        assert_eq!(buf, [0xAB; 7]);
    }

    #[test]
    fn test_generate_requested_length() {
        let source = FixedSource(1);
        assert_eq!(source.generate(33).unwrap().len(), 33);
    }
}
