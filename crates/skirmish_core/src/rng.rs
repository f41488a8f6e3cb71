//! Seeded deterministic random numbers.
//!
//! The simulation never touches system randomness. Every random decision
//! draws from one [`SimRng`] that is serialized and hashed with the rest of
//! the state, so a replay with the same seed and the same intents rolls
//! exactly the same numbers.

use serde::{Deserialize, Serialize};

use crate::math::Fixed;

/// SplitMix64 generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SimRng {
    state: u64,
}

impl SimRng {
    /// Create a generator from a seed.
    #[must_use]
    pub const fn new(seed: u64) -> Self {
        Self {
            state: seed.wrapping_add(0x9E37_79B9_7F4A_7C15),
        }
    }

    /// Next raw 64-bit value.
    pub fn next_u64(&mut self) -> u64 {
        self.state = self.state.wrapping_add(0x9E37_79B9_7F4A_7C15);
        let mut z = self.state;
        z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
        z ^ (z >> 31)
    }

    /// Uniform value in `[0, 1)`.
    pub fn next_unit(&mut self) -> Fixed {
        // Top 32 bits become the fractional part of an I32F32.
        Fixed::from_bits((self.next_u64() >> 32) as i64)
    }

    /// Uniform value in `[low, high)`. Returns `low` for an empty range.
    pub fn next_range(&mut self, low: Fixed, high: Fixed) -> Fixed {
        if high <= low {
            return low;
        }
        low + (high - low) * self.next_unit()
    }

    /// Raw generator state, for hashing.
    #[must_use]
    pub const fn state(&self) -> u64 {
        self.state
    }
}
