/// core-lib/src/lut.rs
//!
//! Reverse lookup table: LFSR state -> ordinal position in the sequence.
//! Built once per format and shared read-only across every decoder that
//! uses it (a `traktor_mk2_cd` table is ~5,000,000 entries; decoders hold
//! a `&'static Lut`, never a copy).

use crate::error::LutError;

const EMPTY: u128 = u128::MAX;

/// Open-addressed, linear-probed `state -> position` map.
///
/// Sized to at least twice the number of entries it will hold, which keeps
/// the expected probe length low without needing a real hash-table crate
/// for what is, at its core, a single write-once bulk load followed by
/// read-only lookups.
pub struct Lut {
    keys: Vec<u128>,
    values: Vec<u32>,
}

impl Lut {
    /// Build a table mapping `seed, fwd(seed), fwd(fwd(seed)), ...` (a
    /// total of `length` states) to their position `0..length`.
    ///
    /// # Errors
    /// Returns [`LutError::BuildFailed`] if the backing storage cannot be
    /// allocated.
    ///
    /// # Panics
    /// Panics if a state repeats before `length` steps elapse: that would
    /// mean the catalog declares a `length` longer than the register's
    /// actual period, which is a corrupt static entry rather than a
    /// recoverable runtime condition (see spec for the "duplicate state"
    /// error category).
    pub fn build(
        seed: u128,
        bits: u32,
        taps: u128,
        length: u32,
    ) -> Result<Self, LutError> {
        let capacity = (length as usize)
            .checked_mul(2)
            .ok_or(LutError::BuildFailed)?
            .next_power_of_two();

        let mut keys = Vec::new();
        let mut values = Vec::new();
        keys.try_reserve_exact(capacity).map_err(|_| LutError::BuildFailed)?;
        values.try_reserve_exact(capacity).map_err(|_| LutError::BuildFailed)?;
        keys.resize(capacity, EMPTY);
        values.resize(capacity, 0);

        let mut lut = Self { keys, values };
        let mut x = seed;
        for position in 0..length {
            lut.insert(x, position);
            x = crate::lfsr::fwd(x, bits, taps);
        }
        Ok(lut)
    }

    fn slot(&self, key: u128) -> usize {
        let mask = self.keys.len() - 1;
        let mut hash = hash_u128(key) as usize & mask;
        loop {
            if self.keys[hash] == EMPTY || self.keys[hash] == key {
                return hash;
            }
            hash = (hash + 1) & mask;
        }
    }

    fn insert(&mut self, key: u128, position: u32) {
        let slot = self.slot(key);
        assert!(
            self.keys[slot] != key,
            "duplicate LFSR state {key:#x} at position {position}: \
             catalog declares a longer period than the register actually has"
        );
        self.keys[slot] = key;
        self.values[slot] = position;
    }

    /// Look up the ordinal position of `state`, if it is part of the
    /// format's sequence.
    #[must_use]
    pub fn lookup(&self, state: u128) -> Option<u32> {
        if state == EMPTY {
            return None;
        }
        let slot = self.slot(state);
        if self.keys[slot] == state {
            Some(self.values[slot])
        } else {
            None
        }
    }
}

/// A cheap 128-bit mixer (splitmix64-style, folded over both halves).
#[inline]
const fn hash_u128(key: u128) -> u64 {
    let lo = key as u64;
    let hi = (key >> 64) as u64;
    let mut h = lo ^ hi.rotate_left(32);
    h ^= h >> 33;
    h = h.wrapping_mul(0xff51_afd7_ed55_8ccd);
    h ^= h >> 33;
    h = h.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    h ^= h >> 33;
    h
}
