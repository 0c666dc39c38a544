//! Cellular-automaton generator.
//!
//! Port of Tony Pasqualoni's cellular automaton pseudo-random number
//! generator: 2056 cells evolved four at a time under a fixed rule table,
//! seeded from exactly four bytes and warmed up with a long discarded
//! pre-evolution before any output is taken.

use std::sync::Mutex;

use crate::reseeding::ReseederLink;
use crate::seed::SeedSource;

use super::accountant::Accountant;
use super::contract::{EntropyRng, RngError};
use super::hex;

const AUTOMATON_LENGTH: usize = 2056;
const SEED_LENGTH: usize = 4;

// Fixed rule table. Entries 256.. repeat the 256-entry cycle, truncated at
// the largest reachable index (two cells of 255 sum to 510).
const RULE: [u8; 511] = [
    100, 75, 16, 3, 229, 51, 197, 118, 24, 62, 198, 11, 141, 152, 241, 188,
    2, 17, 71, 47, 179, 177, 126, 231, 202, 243, 59, 25, 77, 196, 30, 134,
    199, 163, 34, 216, 21, 84, 37, 182, 224, 186, 64, 79, 225, 45, 143, 20,
    48, 147, 209, 221, 125, 29, 99, 12, 46, 190, 102, 220, 80, 215, 242, 105,
    15, 53, 0, 67, 68, 69, 70, 89, 109, 195, 170, 78, 210, 131, 42, 110,
    181, 145, 40, 114, 254, 85, 107, 87, 72, 192, 90, 201, 162, 122, 86, 252,
    94, 129, 98, 132, 193, 249, 156, 172, 219, 230, 153, 54, 180, 151, 83, 214,
    123, 88, 164, 167, 116, 117, 7, 27, 23, 213, 235, 5, 65, 124, 60, 127,
    236, 149, 44, 28, 58, 121, 191, 13, 250, 10, 232, 112, 101, 217, 183, 239,
    8, 32, 228, 174, 49, 113, 247, 158, 106, 218, 154, 66, 226, 157, 50, 26,
    253, 93, 205, 41, 133, 165, 61, 161, 187, 169, 6, 171, 81, 248, 56, 175,
    246, 36, 178, 52, 57, 212, 39, 176, 184, 185, 245, 63, 35, 189, 206, 76,
    104, 233, 194, 19, 43, 159, 108, 55, 200, 155, 14, 74, 244, 255, 222, 207,
    208, 137, 128, 135, 96, 144, 18, 95, 234, 139, 173, 92, 1, 203, 115, 223,
    130, 97, 91, 227, 146, 4, 31, 120, 211, 38, 22, 138, 140, 237, 238, 251,
    240, 160, 142, 119, 73, 103, 166, 33, 148, 9, 111, 136, 168, 150, 82, 204,
    100, 75, 16, 3, 229, 51, 197, 118, 24, 62, 198, 11, 141, 152, 241, 188,
    2, 17, 71, 47, 179, 177, 126, 231, 202, 243, 59, 25, 77, 196, 30, 134,
    199, 163, 34, 216, 21, 84, 37, 182, 224, 186, 64, 79, 225, 45, 143, 20,
    48, 147, 209, 221, 125, 29, 99, 12, 46, 190, 102, 220, 80, 215, 242, 105,
    15, 53, 0, 67, 68, 69, 70, 89, 109, 195, 170, 78, 210, 131, 42, 110,
    181, 145, 40, 114, 254, 85, 107, 87, 72, 192, 90, 201, 162, 122, 86, 252,
    94, 129, 98, 132, 193, 249, 156, 172, 219, 230, 153, 54, 180, 151, 83, 214,
    123, 88, 164, 167, 116, 117, 7, 27, 23, 213, 235, 5, 65, 124, 60, 127,
    236, 149, 44, 28, 58, 121, 191, 13, 250, 10, 232, 112, 101, 217, 183, 239,
    8, 32, 228, 174, 49, 113, 247, 158, 106, 218, 154, 66, 226, 157, 50, 26,
    253, 93, 205, 41, 133, 165, 61, 161, 187, 169, 6, 171, 81, 248, 56, 175,
    246, 36, 178, 52, 57, 212, 39, 176, 184, 185, 245, 63, 35, 189, 206, 76,
    104, 233, 194, 19, 43, 159, 108, 55, 200, 155, 14, 74, 244, 255, 222, 207,
    208, 137, 128, 135, 96, 144, 18, 95, 234, 139, 173, 92, 1, 203, 115, 223,
    130, 97, 91, 227, 146, 4, 31, 120, 211, 38, 22, 138, 140, 237, 238, 251,
    240, 160, 142, 119, 73, 103, 166, 33, 148, 9, 111, 136, 168, 150, 82,
];

struct AutomatonState {
    seed: [u8; SEED_LENGTH],
    cells: Vec<i32>,
    current_cell: usize,
}

/// Cellular-automaton generator with a 4-byte seed.
///
/// Two instances created from the same seed bytes produce identical output
/// streams. Seeding is comparatively expensive: the automaton is evolved
/// for over a million discarded steps before output begins.
pub struct CellularAutomatonRng {
    accountant: Accountant,
    state: Mutex<AutomatonState>,
}

impl CellularAutomatonRng {
    /// Creates a generator seeded from the operating system.
    pub fn from_os_entropy() -> Result<Self, RngError> {
        Self::with_source(&crate::seed::OsSeedSource)
    }

    /// Creates a generator seeded from the given source.
    pub fn with_source(source: &dyn SeedSource) -> Result<Self, RngError> {
        let seed = source.generate(SEED_LENGTH)?;
        Self::from_seed(&seed)
    }

    /// Creates a generator from exactly four seed bytes.
    pub fn from_seed(seed: &[u8]) -> Result<Self, RngError> {
        let seed = check_length(seed)?;
        let mut state = AutomatonState {
            seed,
            cells: vec![0; AUTOMATON_LENGTH],
            current_cell: AUTOMATON_LENGTH - 1,
        };
        seed_cells_and_pre_evolve(&mut state);
        let rng = Self {
            accountant: Accountant::new(),
            state: Mutex::new(state),
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

/// Writes the seed into the cell array and runs the discarded warm-up
/// evolution.
fn seed_cells_and_pre_evolve(state: &mut AutomatonState) {
    state.cells.fill(0);
    // The four seed bytes, recentered into 0..=255, become the top cells.
    state.cells[AUTOMATON_LENGTH - 1] = state.seed[0] as i8 as i32 + 128;
    state.cells[AUTOMATON_LENGTH - 2] = state.seed[1] as i8 as i32 + 128;
    state.cells[AUTOMATON_LENGTH - 3] = state.seed[2] as i8 as i32 + 128;
    state.cells[AUTOMATON_LENGTH - 4] = state.seed[3] as i8 as i32 + 128;
    state.current_cell = AUTOMATON_LENGTH - 1;

    let mut seed_word = i32::from_le_bytes(state.seed);
    if seed_word != -1 {
        seed_word = seed_word.wrapping_add(1);
    }
    for i in 0..AUTOMATON_LENGTH - 4 {
        state.cells[i] = (seed_word >> (i % 32)) & 0xFF;
    }

    // Evolve the automaton before returning any output.
    for _ in 0..AUTOMATON_LENGTH * AUTOMATON_LENGTH / 4 {
        step(state, 32);
    }
}

/// Advances four cells under the rule table and reads a 32-bit word.
fn step(state: &mut AutomatonState, bits: u32) -> u32 {
    let cells = &mut state.cells;
    let cell_d = state.current_cell;
    let cell_c = cell_d - 1;
    let cell_b = cell_c - 1;

    cells[cell_d] = RULE[(cells[cell_c] + cells[cell_d]) as usize] as i32;
    cells[cell_c] = RULE[(cells[cell_b] + cells[cell_c]) as usize] as i32;
    let cell_a = cell_b - 1;
    cells[cell_b] = RULE[(cells[cell_a] + cells[cell_b]) as usize] as i32;

    if cell_a == 0 {
        cells[0] = RULE[cells[0] as usize] as i32;
        state.current_cell = AUTOMATON_LENGTH - 1;
    } else {
        cells[cell_a] = RULE[(cells[cell_a - 1] + cells[cell_a]) as usize] as i32;
        state.current_cell -= 4;
    }

    let word = cells[cell_a] as u32
        | ((cells[cell_a + 1] as u32) << 8)
        | ((cells[cell_a + 2] as u32) << 16)
        | ((cells[cell_a + 3] as u32) << 24);
    word >> (32 - bits)
}

impl EntropyRng for CellularAutomatonRng {
    fn next_bits(&self, bits: u32) -> u32 {
        debug_assert!((1..=32).contains(&bits));
        let mut state = self.state.lock().unwrap();
        step(&mut state, bits)
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
            seed_cells_and_pre_evolve(&mut state);
        }
        self.accountant.credit_for_seed(SEED_LENGTH, SEED_LENGTH);
        tracing::trace!(seed = %hex(&seed), "reseeded automaton");
        Ok(())
    }

    fn set_seed_u64(&self, value: u64) -> Result<(), RngError> {
        self.set_seed(&(value as u32).to_le_bytes())
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
            "CellularAutomatonRng {{ seed: {}, entropy_bits: {}, current_cell: {} }}",
            hex(&state.seed),
            self.accountant.entropy_bits(),
            state.current_cell,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rng::{RandomExt, RngError};

    #[test]
    fn test_rule_table_shape() {
        assert_eq!(RULE.len(), 511);
        assert_eq!(&RULE[..255], &RULE[256..]);
    }

    #[test]
    fn test_deterministic_from_zero_seed() {
        let a = CellularAutomatonRng::from_seed(&[0, 0, 0, 0]).unwrap();
        let b = CellularAutomatonRng::from_seed(&[0, 0, 0, 0]).unwrap();
        let first_four: Vec<i32> = (0..4).map(|_| a.next_i32()).collect();
        let again: Vec<i32> = (0..4).map(|_| b.next_i32()).collect();
        assert_eq!(first_four, again);
        assert_ne!(first_four, vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_reproducible_long_stream() {
        let a = CellularAutomatonRng::from_seed(&[1, 2, 3, 4]).unwrap();
        let b = CellularAutomatonRng::from_seed(&[1, 2, 3, 4]).unwrap();
        for _ in 0..1024 {
            assert_eq!(a.next_i32(), b.next_i32());
        }
        let mut bytes_a = [0u8; 1024];
        let mut bytes_b = [0u8; 1024];
        a.fill_bytes(&mut bytes_a);
        b.fill_bytes(&mut bytes_b);
        assert_eq!(bytes_a, bytes_b);
    }

    #[test]
    fn test_seed_round_trip() {
        let rng = CellularAutomatonRng::from_seed(&[9, 8, 7, 6]).unwrap();
        assert_eq!(rng.seed().unwrap(), vec![9, 8, 7, 6]);
    }

    #[test]
    fn test_rejects_wrong_seed_length() {
        assert!(matches!(
            CellularAutomatonRng::from_seed(&[0, 0, 0]),
            Err(RngError::InvalidSeedLength { got: 3, .. })
        ));
        assert!(CellularAutomatonRng::from_seed(&[0; 5]).is_err());
    }

    #[test]
    fn test_entropy_exhausted_by_one_long() {
        let rng = CellularAutomatonRng::from_seed(&[0; 4]).unwrap();
        assert_eq!(rng.entropy_bits(), 32);
        rng.next_u64();
        assert!(rng.entropy_bits() <= 0);
    }

    #[test]
    fn test_set_seed_u64_uses_low_word() {
        let via_u64 = CellularAutomatonRng::from_seed(&[0; 4]).unwrap();
        via_u64.set_seed_u64(0xDEAD_BEEF_0102_0304).unwrap();
        let via_bytes = CellularAutomatonRng::from_seed(&0x0102_0304u32.to_le_bytes()).unwrap();
        for _ in 0..64 {
            assert_eq!(via_u64.next_i32(), via_bytes.next_i32());
        }
    }

    #[test]
    fn test_set_seed_matches_fresh_instance() {
        let reseeded = CellularAutomatonRng::from_seed(&[0; 4]).unwrap();
        reseeded.next_u64();
        reseeded.set_seed(&[4, 3, 2, 1]).unwrap();
        let fresh = CellularAutomatonRng::from_seed(&[4, 3, 2, 1]).unwrap();
        for _ in 0..64 {
            assert_eq!(reseeded.next_i32(), fresh.next_i32());
        }
    }

    #[test]
    fn test_byte_uniformity_chi_squared() {
        let rng = CellularAutomatonRng::from_seed(&[0, 0, 0, 0]).unwrap();
        let mut buckets = [0u64; 256];
        for _ in 0..1_000_000 {
            let word = rng.next_bits(32);
            for byte in word.to_le_bytes() {
                buckets[byte as usize] += 1;
            }
        }
        let total: u64 = buckets.iter().sum();
        let expected = total as f64 / 256.0;
        let chi_squared: f64 = buckets
            .iter()
            .map(|&count| {
                let diff = count as f64 - expected;
                diff * diff / expected
            })
            .sum();
        // Critical value for 255 degrees of freedom at p = 0.01.
        assert!(chi_squared < 310.457, "chi-squared = {chi_squared}");
    }
}
