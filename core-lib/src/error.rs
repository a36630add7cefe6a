/// core-lib/src/error.rs
use thiserror::Error;

/// Errors that can occur while resolving a timecode format or building its
/// reverse lookup table.
#[derive(Debug, Error)]
pub enum LutError {
    /// No catalog entry has this name.
    #[error("no timecode format named {0:?}")]
    NotFound(String),
    /// The lookup table could not be allocated.
    #[error("lookup table build failed (out of memory)")]
    BuildFailed,
    /// A decoder was constructed against a format whose table is not
    /// built yet; call [`crate::catalog::find_definition`] first.
    #[error("format {0:?} has no built lookup table")]
    NotBuilt(String),
}

/// Errors that can occur while allocating the optional monitor raster.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// The raster buffer of `size * size` bytes could not be allocated.
    #[error("monitor buffer allocation failed for size {size}")]
    AllocationFailed { size: usize },
}
