// Pseudo-random number generator for the Wildcard game core.
//
// Implements xoshiro256++ (Blackman & Vigna, 2019) seeded through SplitMix64.
// Hand-rolled with no external dependencies so that every random decision in
// the game (deck draws, the special-pool coin, the starting player, card and
// identity UUIDs, the color picked for a timed-out player) comes from one
// small, portable generator.
//
// The host is the only peer that ever draws randomness during a game, so the
// generator does not need to be cryptographically strong; it needs to be
// unpredictable enough for card play and cheap to embed in the engine. A
// host created for a live session seeds from wall-clock entropy
// (`GameRng::from_entropy`); tests seed explicitly for reproducible games.

use serde::{Deserialize, Serialize};

/// Xoshiro256++ generator. One instance lives inside the host's rules engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GameRng {
    s: [u64; 4],
}

impl GameRng {
    /// Create a generator from a `u64` seed, expanded to the 256-bit internal
    /// state with SplitMix64. Equal seeds produce equal sequences.
    pub fn new(seed: u64) -> Self {
        let mut sm = seed;
        Self {
            s: [
                splitmix64(&mut sm),
                splitmix64(&mut sm),
                splitmix64(&mut sm),
                splitmix64(&mut sm),
            ],
        }
    }

    /// Create a generator seeded from the system clock.
    ///
    /// Good enough for shuffling cards between friends; a peer that wants a
    /// reproducible game (tests, replays) should use `new` instead.
    pub fn from_entropy() -> Self {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0xdeca_f0ff_ee5e_ed11);
        Self::new(nanos)
    }

    /// Next `u64` in the sequence.
    pub fn next_u64(&mut self) -> u64 {
        let result = (self.s[0].wrapping_add(self.s[3]))
            .rotate_left(23)
            .wrapping_add(self.s[0]);

        let t = self.s[1] << 17;

        self.s[2] ^= self.s[0];
        self.s[3] ^= self.s[1];
        self.s[1] ^= self.s[2];
        self.s[0] ^= self.s[3];

        self.s[2] ^= t;
        self.s[3] = self.s[3].rotate_left(45);

        result
    }

    /// Uniform integer in `[low, high)`, via rejection sampling to avoid
    /// modulo bias. Panics if `low >= high`.
    pub fn range_u64(&mut self, low: u64, high: u64) -> u64 {
        assert!(low < high, "range_u64: low must be less than high");
        let range = high - low;
        if range.is_power_of_two() {
            return low + (self.next_u64() & (range - 1));
        }
        let threshold = range.wrapping_neg() % range; // = (2^64 - range) % range
        loop {
            let r = self.next_u64();
            if r >= threshold {
                return low + (r % range);
            }
        }
    }

    /// Uniform index in `[0, len)`. Panics if `len == 0`.
    pub fn pick_index(&mut self, len: usize) -> usize {
        self.range_u64(0, len as u64) as usize
    }

    /// Fair coin flip.
    pub fn coin(&mut self) -> bool {
        self.next_u64() & 1 == 1
    }

    /// 128 random bits as two words, used for UUID v4 generation in the
    /// engine.
    pub fn next_128_bits(&mut self) -> (u64, u64) {
        (self.next_u64(), self.next_u64())
    }
}

/// SplitMix64, the xoshiro authors' recommended seed expander.
fn splitmix64(state: &mut u64) -> u64 {
    *state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
    let mut z = *state;
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}
