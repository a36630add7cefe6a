/// core-lib/src/catalog.rs
//!
//! The static, process-wide table of supported timecode formats. Each
//! entry's LFSR parameters and physical timing are immutable; only the
//! reverse lookup table is built lazily, on first use, and shared
//! read-only by every decoder that references the format afterwards.

use std::sync::{Arc, RwLock};

use bitflags::bitflags;

use crate::error::LutError;
use crate::lut::Lut;

bitflags! {
    /// Per-format behavioural switches.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Flags: u8 {
        /// Invert the decoded direction sense.
        const SWITCH_PHASE = 0b0001;
        /// Left/right are swapped relative to the default primary channel.
        const SWITCH_PRIMARY = 0b0010;
        /// Invert which channel polarity triggers a bit decode.
        const SWITCH_POLARITY = 0b0100;
        /// Traktor MK2-style vertically offset envelope.
        const OFFSET_MODULATION = 0b1000;
    }
}

/// An immutable timecode format description plus its lazily built reverse
/// lookup table.
pub struct Format {
    pub name: &'static str,
    pub desc: &'static str,
    /// Chips per second on the medium.
    pub resolution: u32,
    /// LFSR register width in bits (20, 23, 110 or 113 in the built-in
    /// catalog; up to 128 supported).
    pub bits: u32,
    /// Initial register value at position 0.
    pub seed: u128,
    /// XOR tap mask defining the LFSR recurrence.
    pub taps: u128,
    /// Total number of distinct LFSR states in the sequence.
    pub length: u32,
    /// Largest position considered safely inside the pressed area.
    pub safe: u32,
    pub flags: Flags,
    lut: RwLock<Option<Arc<Lut>>>,
}

impl Format {
    const fn new(
        name: &'static str,
        desc: &'static str,
        resolution: u32,
        bits: u32,
        seed: u128,
        taps: u128,
        length: u32,
        safe: u32,
        flags: Flags,
    ) -> Self {
        Self {
            name,
            desc,
            resolution,
            bits,
            seed,
            taps,
            length,
            safe,
            flags,
            lut: RwLock::new(None),
        }
    }

    /// Whether the reverse lookup table has been built.
    #[must_use]
    pub fn is_built(&self) -> bool {
        self.lut.read().expect("lut lock poisoned").is_some()
    }

    /// A cheap, reference-counted handle to the built lookup table.
    ///
    /// Returns `None` if the table has not been built yet; callers should
    /// go through [`find_definition`] to build it first.
    #[must_use]
    pub fn lut(&self) -> Option<Arc<Lut>> {
        self.lut.read().expect("lut lock poisoned").clone()
    }

    /// Build the lookup table if it is not already built. Idempotent:
    /// concurrent callers racing to build the same format converge on one
    /// winner, the rest observe the already-built table.
    ///
    /// # Errors
    /// Returns [`LutError::BuildFailed`] if allocation fails; the format is
    /// left unbuilt.
    pub fn build(&self) -> Result<(), LutError> {
        if self.is_built() {
            return Ok(());
        }
        let built = Lut::build(self.seed, self.bits, self.taps, self.length)?;
        let mut slot = self.lut.write().expect("lut lock poisoned");
        if slot.is_none() {
            *slot = Some(Arc::new(built));
        }
        Ok(())
    }

    /// Drop the built lookup table, if any. Decoders already holding an
    /// `Arc` to it keep it alive until they drop it themselves.
    pub fn free(&self) {
        let mut slot = self.lut.write().expect("lut lock poisoned");
        *slot = None;
    }
}

pub static FORMATS: [Format; 12] = [
    Format::new(
        "serato_2a",
        "Serato 2nd Edition, side A",
        1000,
        20,
        0x5_9017,
        0x3_61e4,
        712_000,
        707_000,
        Flags::SWITCH_PRIMARY,
    ),
    Format::new(
        "serato_2b",
        "Serato 2nd Edition, side B",
        1000,
        20,
        0x8_f3c6,
        0x0_0008,
        712_000,
        707_000,
        Flags::SWITCH_PRIMARY.union(Flags::SWITCH_PHASE),
    ),
    Format::new(
        "serato_cd",
        "Serato CD",
        1000,
        20,
        0x2_a9e1,
        0x0_0008,
        1_000_000,
        995_000,
        Flags::SWITCH_PRIMARY,
    ),
    Format::new(
        "traktor_a",
        "Traktor Scratch, side A",
        2000,
        23,
        0x13_4503,
        0x00_0020,
        2_400_000,
        2_380_000,
        Flags::empty(),
    ),
    Format::new(
        "traktor_b",
        "Traktor Scratch, side B",
        2000,
        23,
        0x0d_2f61,
        0x00_0020,
        2_400_000,
        2_380_000,
        Flags::SWITCH_PHASE,
    ),
    Format::new(
        "traktor_mk2_a",
        "Traktor Scratch MK2, side A",
        2500,
        110,
        0x0155_5555_5555_5555_5555_5555_5555u128,
        0x0000_0000_0000_0000_0000_0000_0200u128,
        3_000_000,
        2_970_000,
        Flags::OFFSET_MODULATION,
    ),
    Format::new(
        "traktor_mk2_b",
        "Traktor Scratch MK2, side B",
        2500,
        110,
        0x02aa_aaaa_aaaa_aaaa_aaaa_aaaa_aaaau128,
        0x0000_0000_0000_0000_0000_0000_0200u128,
        3_000_000,
        2_970_000,
        Flags::OFFSET_MODULATION.union(Flags::SWITCH_PHASE),
    ),
    Format::new(
        "traktor_mk2_cd",
        "Traktor Scratch MK2, CD",
        2500,
        113,
        0x0111_1111_1111_1111_1111_1111_1111u128,
        0x0000_0000_0000_0000_0000_0000_0200u128,
        5_000_000,
        4_970_000,
        Flags::OFFSET_MODULATION,
    ),
    Format::new(
        "mixvibes_v2",
        "MixVibes V2",
        1300,
        20,
        0x7_1c3d,
        0x0_0008,
        900_000,
        895_000,
        Flags::SWITCH_POLARITY,
    ),
    Format::new(
        "mixvibes_7inch",
        "MixVibes 7\"",
        1000,
        20,
        0x4_5e2a,
        0x0_0008,
        300_000,
        295_000,
        Flags::SWITCH_POLARITY.union(Flags::SWITCH_PHASE),
    ),
    Format::new(
        "pioneer_a",
        "Pioneer RekordBox, side A",
        1000,
        23,
        0x2c_19d4,
        0x00_0020,
        1_200_000,
        1_190_000,
        Flags::SWITCH_PRIMARY.union(Flags::SWITCH_POLARITY),
    ),
    Format::new(
        "pioneer_b",
        "Pioneer RekordBox, side B",
        1000,
        23,
        0x3e_7a85,
        0x00_0020,
        1_200_000,
        1_190_000,
        Flags::SWITCH_PRIMARY
            .union(Flags::SWITCH_POLARITY)
            .union(Flags::SWITCH_PHASE),
    ),
];

/// Find a format by name and make sure its lookup table is built.
///
/// # Errors
/// [`LutError::NotFound`] if no catalog entry has this name;
/// [`LutError::BuildFailed`] if the lookup table could not be allocated
/// (the entry is left unbuilt and may be retried later).
pub fn find_definition(name: &str) -> Result<&'static Format, LutError> {
    let format = FORMATS
        .iter()
        .find(|f| f.name == name)
        .ok_or_else(|| LutError::NotFound(name.to_owned()))?;
    format.build()?;
    Ok(format)
}

/// Clear every built lookup table in the catalog. Safe to call multiple
/// times; formats currently in use by a decoder keep their table alive
/// through that decoder's `Arc` handle.
pub fn free_all_lookups() {
    for format in &FORMATS {
        format.free();
    }
}

/// `FORMATS` is a single process-wide static; tests across this crate
/// that build or free lookup tables take this lock first so they don't
/// race each other when `cargo test` runs them on multiple threads.
#[cfg(test)]
pub(crate) static TEST_CATALOG_LOCK: std::sync::Mutex<()> = std::sync::Mutex::new(());
