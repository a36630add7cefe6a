//! Black-box integration suite for `core-lib`.
//!
//! Everything here goes through the public API only (`find_definition`,
//! `Decoder::new`, `Decoder::submit`, `Decoder::get_position`): no access
//! to crate-internal types, matching how this crate sits outside
//! `core-lib` as a host would.

#[cfg(test)]
mod reversal;
