//! Bit-exact Mersenne Twister (MT19937) PRNG
//!
//! This module provides a bit-exact replica of the 32-bit Mersenne Twister
//! from Matsumoto and Nishimura's `mt19937ar.c`, including `init_by_array`
//! seeding, plus a rejection-sampled "below n" draw. Any seed therefore
//! replays the same walk on every platform.
//!
//! # Algorithm
//!
//! - State: 624 words, twisted in place when exhausted
//! - Seeding: `init_genrand(19650218)` followed by `init_by_array(key)`,
//!   where `key` is the seed split into little-endian 32-bit words
//! - `below(n)`: take the top `bit_length(n)` bits of successive outputs,
//!   reject anything `>= n`
//!
//! # Example
//!
//! ```rust,ignore
//! use random_walk::random::mersenne::Mt19937;
//!
//! let mut rng = Mt19937::new(0);
//! assert_eq!(rng.below(1000), 864);
//! ```

const N: usize = 624;
const M: usize = 397;

/// 32-bit Mersenne Twister
#[derive(Clone)]
pub struct Mt19937 {
    state: [u32; N],
    index: usize,
}

impl std::fmt::Debug for Mt19937 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mt19937")
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}

impl Mt19937 {
    const MATRIX_A: u32 = 0x9908_b0df;
    const UPPER_MASK: u32 = 0x8000_0000;
    const LOWER_MASK: u32 = 0x7fff_ffff;

    /// Seed used before the key is mixed in (fixed by `mt19937ar.c`).
    const ARRAY_SEED: u32 = 19_650_218;

    /// Create a generator from an integer seed.
    ///
    /// The seed is split into 32-bit words, least significant first; zero
    /// becomes the single-word key `[0]`.
    pub fn new(seed: u64) -> Self {
        let lo = seed as u32;
        let hi = (seed >> 32) as u32;
        if hi == 0 {
            Self::from_key(&[lo])
        } else {
            Self::from_key(&[lo, hi])
        }
    }

    /// Create a generator from an explicit key (`init_by_array`).
    pub fn from_key(key: &[u32]) -> Self {
        let key: &[u32] = if key.is_empty() { &[0] } else { key };
        let mut rng = Self::from_u32(Self::ARRAY_SEED);
        let mt = &mut rng.state;

        let mut i = 1usize;
        let mut j = 0usize;
        for _ in 0..N.max(key.len()) {
            let prev = mt[i - 1] ^ (mt[i - 1] >> 30);
            mt[i] = (mt[i] ^ prev.wrapping_mul(1_664_525))
                .wrapping_add(key[j])
                .wrapping_add(j as u32);
            i += 1;
            j += 1;
            if i >= N {
                mt[0] = mt[N - 1];
                i = 1;
            }
            if j >= key.len() {
                j = 0;
            }
        }
        for _ in 0..N - 1 {
            let prev = mt[i - 1] ^ (mt[i - 1] >> 30);
            mt[i] = (mt[i] ^ prev.wrapping_mul(1_566_083_941)).wrapping_sub(i as u32);
            i += 1;
            if i >= N {
                mt[0] = mt[N - 1];
                i = 1;
            }
        }
        // MSB is 1, assuring a non-zero initial array
        mt[0] = 0x8000_0000;
        rng
    }

    /// `init_genrand`: linear seeding of the whole state from one word.
    fn from_u32(seed: u32) -> Self {
        let mut state = [0u32; N];
        state[0] = seed;
        for i in 1..N {
            let prev = state[i - 1] ^ (state[i - 1] >> 30);
            state[i] = 1_812_433_253u32
                .wrapping_mul(prev)
                .wrapping_add(i as u32);
        }
        Self { state, index: N }
    }

    fn twist(&mut self) {
        for k in 0..N {
            let y = (self.state[k] & Self::UPPER_MASK)
                | (self.state[(k + 1) % N] & Self::LOWER_MASK);
            let mut next = self.state[(k + M) % N] ^ (y >> 1);
            if y & 1 != 0 {
                next ^= Self::MATRIX_A;
            }
            self.state[k] = next;
        }
        self.index = 0;
    }

    /// Next tempered 32-bit output (`genrand_uint32`).
    pub fn next_u32(&mut self) -> u32 {
        if self.index >= N {
            self.twist();
        }
        let mut y = self.state[self.index];
        self.index += 1;

        y ^= y >> 11;
        y ^= (y << 7) & 0x9d2c_5680;
        y ^= (y << 15) & 0xefc6_0000;
        y ^= y >> 18;
        y
    }

    /// Uniform integer in `[0, bound)`.
    ///
    /// Rejection sampling over the top `bit_length(bound)` bits of each raw
    /// output; the number of outputs consumed per call is part of the
    /// replay contract.
    ///
    /// # Panics
    ///
    /// Panics if `bound` is 0.
    pub fn below(&mut self, bound: u32) -> u32 {
        assert!(bound > 0, "bound must be positive");
        let bits = u32::BITS - bound.leading_zeros();
        loop {
            let r = self.next_u32() >> (32 - bits);
            if r < bound {
                return r;
            }
        }
    }
}
