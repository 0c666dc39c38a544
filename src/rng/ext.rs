//! Output methods available on every generator.
//!
//! [`RandomExt`] is blanket-implemented for every [`EntropyRng`], including
//! trait objects. The convention throughout is debit first, then draw, so
//! a blocking wrapper can refuse to produce output it cannot account for.

use super::contract::{
    entropy_of_range_32, entropy_of_range_64, EntropyRng, RngError, ENTROPY_OF_DOUBLE,
    ENTROPY_OF_FLOAT,
};

/// Output surface shared by every entropy-accounting generator.
///
/// Each method documents the exact entropy debit it records. Methods that
/// reject out-of-range samples may consume more raw bits than they debit;
/// the debit reflects the information content of the output.
pub trait RandomExt: EntropyRng {
    /// Fills `dest` with random bytes. Debits `8 * dest.len()` bits.
    fn fill_bytes(&self, dest: &mut [u8]) {
        self.debit(8 * dest.len() as i64);
        self.fill_bytes_raw(dest);
    }

    /// Returns a uniform 32-bit word. Debits 32 bits.
    fn next_u32(&self) -> u32 {
        self.debit(32);
        self.next_bits(32)
    }

    /// Returns a uniform signed 32-bit value. Debits 32 bits.
    fn next_i32(&self) -> i32 {
        self.next_u32() as i32
    }

    /// Returns a uniform value in `[0, bound)`. Debits
    /// `ceil(log2(bound))` bits.
    fn next_u32_below(&self, bound: u32) -> Result<u32, RngError> {
        if bound == 0 {
            return Err(RngError::InvalidBound {
                origin: 0,
                bound: 0,
            });
        }
        self.debit((32 - (bound - 1).leading_zeros()) as i64);
        Ok(draw_below(self, bound))
    }

    /// Returns a uniform value in `[origin, bound)`. Debits
    /// `ceil(log2(bound - origin))` bits.
    ///
    /// When the range width overflows `i32`, full words are sampled and
    /// rejected until one falls inside the range.
    fn next_i32_range(&self, origin: i32, bound: i32) -> Result<i32, RngError> {
        if bound <= origin {
            return Err(RngError::InvalidBound {
                origin: origin as i64,
                bound: bound as i64,
            });
        }
        self.debit(entropy_of_range_32(origin, bound));
        Ok(draw_i32_range(self, origin, bound))
    }

    /// Returns a uniform 64-bit word. Debits 64 bits.
    ///
    /// All `2^64` values are possible, unlike generators that fold a
    /// 48-bit state into the result.
    fn next_u64(&self) -> u64 {
        self.debit(64);
        self.next_u64_raw()
    }

    /// Returns a uniform signed 64-bit value. Debits 64 bits.
    fn next_i64(&self) -> i64 {
        self.next_u64() as i64
    }

    /// Returns a uniform value in `[0, bound)`. Debits
    /// `ceil(log2(bound))` bits.
    fn next_u64_below(&self, bound: u64) -> Result<u64, RngError> {
        if bound == 0 {
            return Err(RngError::InvalidBound {
                origin: 0,
                bound: 0,
            });
        }
        self.debit((64 - (bound - 1).leading_zeros()) as i64);
        if bound <= i64::MAX as u64 {
            Ok(draw_i64_range(self, 0, bound as i64) as u64)
        } else {
            loop {
                let word = self.next_u64_raw();
                if word < bound {
                    return Ok(word);
                }
            }
        }
    }

    /// Returns a uniform value in `[origin, bound)`. Debits
    /// `ceil(log2(bound - origin))` bits.
    fn next_i64_range(&self, origin: i64, bound: i64) -> Result<i64, RngError> {
        if bound <= origin {
            return Err(RngError::InvalidBound { origin, bound });
        }
        self.debit(entropy_of_range_64(origin, bound));
        Ok(draw_i64_range(self, origin, bound))
    }

    /// Returns a uniform boolean. Debits 1 bit.
    fn next_bool(&self) -> bool {
        self.debit(1);
        self.next_bits(1) != 0
    }

    /// Returns a uniform value in `[0, 1)`. Debits 24 bits.
    fn next_f32(&self) -> f32 {
        self.debit(ENTROPY_OF_FLOAT);
        self.next_bits(24) as f32 / (1u32 << 24) as f32
    }

    /// Returns a uniform value in `[0, 1)`. Debits 53 bits.
    fn next_f64(&self) -> f64 {
        self.debit(ENTROPY_OF_DOUBLE);
        self.next_f64_raw()
    }

    /// Returns a uniform value in `[origin, bound)`. Debits 53 bits.
    fn next_f64_range(&self, origin: f64, bound: f64) -> Result<f64, RngError> {
        if bound < origin {
            return Err(RngError::InvalidBound {
                origin: origin as i64,
                bound: bound as i64,
            });
        }
        self.debit(ENTROPY_OF_DOUBLE);
        Ok(self.next_f64_raw() * (bound - origin) + origin)
    }

    /// Returns a normally distributed value with mean 0 and standard
    /// deviation 1, by the Marsaglia polar method against the lock-free
    /// stash slot.
    ///
    /// Debits 53 bits per call. This is an upper bound; samples rejected
    /// by the polar loop consume raw bits that are not charged.
    fn next_gaussian(&self) -> f64 {
        self.debit(ENTROPY_OF_DOUBLE);
        if let Some(stashed) = self.take_stashed_gaussian() {
            return stashed;
        }
        loop {
            let v1 = 2.0 * self.next_f64_raw() - 1.0;
            let v2 = 2.0 * self.next_f64_raw() - 1.0;
            let s = v1 * v1 + v2 * v2;
            if s < 1.0 && s != 0.0 {
                let multiplier = (-2.0 * s.ln() / s).sqrt();
                self.stash_gaussian(v2 * multiplier);
                return v1 * multiplier;
            }
        }
    }

    /// Returns true with the given probability.
    ///
    /// Instantly returns without debiting when `probability <= 0` or
    /// `probability >= 1`; otherwise debits exactly 1 bit, since only one
    /// bit is output.
    fn with_probability(&self, probability: f64) -> bool {
        if probability >= 1.0 {
            return true;
        }
        if probability <= 0.0 {
            return false;
        }
        self.debit(1);
        self.next_f64_raw() < probability
    }

    /// Chooses an element of `items` uniformly at random. Debits
    /// `ceil(log2(items.len()))` bits.
    ///
    /// Also the idiom for choosing an enum variant: pass a slice of the
    /// variants. Slices longer than `u32::MAX` are not supported.
    fn next_element<'a, T>(&self, items: &'a [T]) -> Result<&'a T, RngError> {
        if items.is_empty() {
            return Err(RngError::InvalidBound {
                origin: 0,
                bound: 0,
            });
        }
        debug_assert!(items.len() <= u32::MAX as usize);
        let index = self.next_u32_below(items.len() as u32)?;
        Ok(&items[index as usize])
    }

    /// A lazy sequence of `count` uniform `i32` values. `u64::MAX` means
    /// effectively unlimited.
    fn stream_i32(&self, count: u64) -> Stream<'_, Self, i32> {
        Stream::new(self, count, Box::new(|rng| rng.next_i32()))
    }

    /// A lazy sequence of `count` uniform values in `[origin, bound)`.
    fn stream_i32_range(
        &self,
        count: u64,
        origin: i32,
        bound: i32,
    ) -> Result<Stream<'_, Self, i32>, RngError> {
        if bound <= origin {
            return Err(RngError::InvalidBound {
                origin: origin as i64,
                bound: bound as i64,
            });
        }
        Ok(Stream::new(
            self,
            count,
            Box::new(move |rng| {
                rng.debit(entropy_of_range_32(origin, bound));
                draw_i32_range(rng, origin, bound)
            }),
        ))
    }

    /// A lazy sequence of `count` uniform `i64` values.
    fn stream_i64(&self, count: u64) -> Stream<'_, Self, i64> {
        Stream::new(self, count, Box::new(|rng| rng.next_i64()))
    }

    /// A lazy sequence of `count` uniform values in `[origin, bound)`.
    fn stream_i64_range(
        &self,
        count: u64,
        origin: i64,
        bound: i64,
    ) -> Result<Stream<'_, Self, i64>, RngError> {
        if bound <= origin {
            return Err(RngError::InvalidBound { origin, bound });
        }
        Ok(Stream::new(
            self,
            count,
            Box::new(move |rng| {
                rng.debit(entropy_of_range_64(origin, bound));
                draw_i64_range(rng, origin, bound)
            }),
        ))
    }

    /// A lazy sequence of `count` uniform values in `[0, 1)`.
    fn stream_f64(&self, count: u64) -> Stream<'_, Self, f64> {
        Stream::new(self, count, Box::new(|rng| rng.next_f64()))
    }

    /// A lazy sequence of `count` uniform values in `[origin, bound)`.
    fn stream_f64_range(
        &self,
        count: u64,
        origin: f64,
        bound: f64,
    ) -> Result<Stream<'_, Self, f64>, RngError> {
        if bound < origin {
            return Err(RngError::InvalidBound {
                origin: origin as i64,
                bound: bound as i64,
            });
        }
        Ok(Stream::new(
            self,
            count,
            Box::new(move |rng| {
                rng.debit(ENTROPY_OF_DOUBLE);
                rng.next_f64_raw() * (bound - origin) + origin
            }),
        ))
    }

    /// A lazy sequence of `count` normally distributed values.
    fn stream_gaussian(&self, count: u64) -> Stream<'_, Self, f64> {
        Stream::new(self, count, Box::new(|rng| rng.next_gaussian()))
    }
}

impl<R: EntropyRng + ?Sized> RandomExt for R {}

/// Lazy sequence of values drawn from a borrowed generator.
///
/// Streams are serial iterators. Bridging one to a parallel executor and
/// truncating it afterwards may over-consume entropy, since items already
/// drawn by other workers are discarded with their debits recorded.
pub struct Stream<'a, R: ?Sized, T> {
    rng: &'a R,
    remaining: u64,
    draw: Box<dyn Fn(&R) -> T + Send + 'a>,
}

impl<'a, R: ?Sized, T> Stream<'a, R, T> {
    pub(crate) fn new(rng: &'a R, count: u64, draw: Box<dyn Fn(&R) -> T + Send + 'a>) -> Self {
        Self {
            rng,
            remaining: count,
            draw,
        }
    }
}

impl<R: ?Sized, T> Iterator for Stream<'_, R, T> {
    type Item = T;

    fn next(&mut self) -> Option<T> {
        if self.remaining == 0 {
            return None;
        }
        // u64::MAX is the "effectively unlimited" sentinel and never counts down.
        if self.remaining != u64::MAX {
            self.remaining -= 1;
        }
        Some((self.draw)(self.rng))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        if self.remaining == u64::MAX {
            (usize::MAX, None)
        } else {
            let n = usize::try_from(self.remaining).unwrap_or(usize::MAX);
            (n, Some(n))
        }
    }
}

/// Uniform draw in `[0, bound)` without debiting entropy.
fn draw_below<R: EntropyRng + ?Sized>(rng: &R, bound: u32) -> u32 {
    if bound > i32::MAX as u32 {
        loop {
            let word = rng.next_bits(32);
            if word < bound {
                return word;
            }
        }
    }
    if bound.is_power_of_two() {
        return ((bound as u64 * rng.next_bits(31) as u64) >> 31) as u32;
    }
    loop {
        let bits = rng.next_bits(31) as i32;
        let value = bits % bound as i32;
        // Reject samples from the incomplete final cycle of the modulus.
        let complete = bits
            .checked_sub(value)
            .and_then(|d| d.checked_add(bound as i32 - 1))
            .is_some();
        if complete {
            return value as u32;
        }
    }
}

/// Uniform draw in `[origin, bound)` without debiting entropy. Requires
/// `bound > origin`.
fn draw_i32_range<R: EntropyRng + ?Sized>(rng: &R, origin: i32, bound: i32) -> i32 {
    let range = bound.wrapping_sub(origin);
    if range > 0 {
        origin.wrapping_add(draw_below(rng, range as u32) as i32)
    } else {
        // Range width overflows i32: sample full words and reject.
        loop {
            let word = rng.next_bits(32) as i32;
            if word >= origin && word < bound {
                return word;
            }
        }
    }
}

/// Uniform draw in `[origin, bound)` without debiting entropy. Requires
/// `bound > origin`.
fn draw_i64_range<R: EntropyRng + ?Sized>(rng: &R, origin: i64, bound: i64) -> i64 {
    let range = bound.wrapping_sub(origin);
    let bits = entropy_of_range_64(origin, bound);
    if bits == 0 {
        // A range of one needs no random bits.
        return origin;
    }
    loop {
        let output = if range < 0 {
            rng.next_u64_raw() as i64
        } else if bits > 32 {
            let low = rng.next_bits(32) as u64;
            let high = rng.next_bits((bits - 32) as u32) as u64;
            origin.wrapping_add((low | (high << 32)) as i64)
        } else {
            origin.wrapping_add(rng.next_bits(bits as u32) as i64)
        };
        if output >= origin && output < bound {
            return output;
        }
    }
}
