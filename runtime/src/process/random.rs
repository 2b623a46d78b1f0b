/*!
 * Process Random
 * Per-process xorshift128+ generator, lazily seeded from OS entropy
 */

use crate::core::limits::RANDOM_SEED_BYTES;
use rand::rngs::OsRng;
use rand::RngCore;

/// Replaces an all-zero state, which xorshift can never leave
const NONZERO_STATE: u64 = 0x9E37_79B9_7F4A_7C15;

#[derive(Debug, Clone, Default)]
pub struct Xorshift {
    state0: u64,
    state1: u64,
    seeded: bool,
}

impl Xorshift {
    /// Unseeded generator; the first `next_u64` pulls a seed from the OS
    pub const fn new() -> Self {
        Self {
            state0: 0,
            state1: 0,
            seeded: false,
        }
    }

    /// Seed from the first 16 bytes of `seed`, zero-padded
    pub fn seed(&mut self, seed: &[u8]) {
        let mut bytes = [0u8; RANDOM_SEED_BYTES];
        let n = seed.len().min(RANDOM_SEED_BYTES);
        bytes[..n].copy_from_slice(&seed[..n]);

        let (lo, hi) = bytes.split_at(RANDOM_SEED_BYTES / 2);
        let mut word = [0u8; 8];
        word.copy_from_slice(lo);
        self.state0 = u64::from_le_bytes(word);
        word.copy_from_slice(hi);
        self.state1 = u64::from_le_bytes(word);

        if self.state0 == 0 && self.state1 == 0 {
            self.state0 = NONZERO_STATE;
        }
        self.seeded = true;
    }

    #[inline]
    pub fn is_seeded(&self) -> bool {
        self.seeded
    }

    pub fn next_u64(&mut self) -> u64 {
        if !self.seeded {
            let mut seed = [0u8; RANDOM_SEED_BYTES];
            OsRng.fill_bytes(&mut seed);
            self.seed(&seed);
        }

        let mut s1 = self.state0;
        let s0 = self.state1;
        self.state0 = s0;
        s1 ^= s1 << 23;
        self.state1 = s1 ^ s0 ^ (s1 >> 17) ^ (s0 >> 26);
        self.state1.wrapping_add(s0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_seed_same_sequence() {
        let mut a = Xorshift::new();
        let mut b = Xorshift::new();
        a.seed(b"0123456789abcdef-ignored");
        b.seed(b"0123456789abcdef");

        let xs: Vec<u64> = (0..8).map(|_| a.next_u64()).collect();
        let ys: Vec<u64> = (0..8).map(|_| b.next_u64()).collect();
        assert_eq!(xs, ys);
    }

    #[test]
    fn test_short_seed_is_zero_padded() {
        let mut a = Xorshift::new();
        let mut b = Xorshift::new();
        a.seed(&[1, 2, 3]);
        b.seed(&[1, 2, 3, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(a.next_u64(), b.next_u64());
    }

    #[test]
    fn test_zero_seed_still_produces_values() {
        let mut rng = Xorshift::new();
        rng.seed(&[]);
        let values: Vec<u64> = (0..4).map(|_| rng.next_u64()).collect();
        assert!(values.iter().any(|v| *v != 0));
    }

    #[test]
    fn test_lazy_seeding() {
        let mut rng = Xorshift::new();
        assert!(!rng.is_seeded());
        rng.next_u64();
        assert!(rng.is_seeded());
    }
}
