//! The generator contract and the concrete algorithms.
//!
//! [`EntropyRng`] is the object-safe core every generator implements;
//! [`RandomExt`] is the blanket-implemented output surface built on top of
//! it. Concrete algorithms embed a shared entropy accountant by composition
//! rather than inheriting from a base type.

mod accountant;
mod aes;
mod automaton;
mod chacha;
mod cipher;
mod contract;
mod ext;
mod splitmix;
mod wrapper;

pub use aes::{AesCore, AesCounterRng};
pub use automaton::CellularAutomatonRng;
pub use chacha::{ChaChaCore, ChaChaCounterRng};
pub use cipher::{CounterCipher, CounterRng};
pub use contract::{EntropyRng, RngError};
pub use ext::{RandomExt, Stream};
pub use splitmix::SplitMixRng;
pub use wrapper::RandomWrapper;

/// Hex-encodes bytes for debug dumps.
pub(crate) fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write;
    bytes.iter().fold(
        String::with_capacity(bytes.len() * 2),
        |mut out, byte| {
            let _ = write!(out, "{byte:02x}");
            out
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_encoding() {
        assert_eq!(hex(&[0x00, 0xFF, 0x1A]), "00ff1a");
        assert_eq!(hex(&[]), "");
    }
}
