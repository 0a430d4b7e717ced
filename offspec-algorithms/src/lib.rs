//! offspec-algorithms: Off-specular reduction algorithms.
//!
//! This crate provides the numerical stages of an off-specular reduction:
//! - **Extraction** - raw counts to S(Qx, Qz) with error propagation and
//!   optional direct-beam normalization
//! - **Merge** - concatenation of trimmed runs into one point cloud
//! - **Rebin** - weighted or simple averaging onto a regular 2D grid, with
//!   1D cuts at fixed y values
//!
#![warn(missing_docs)]

mod extract;
mod merge;
mod processing;
pub mod rebin;

pub use extract::{
    extract, extract_off_specular, Normalization, NormalizationMismatch, NormalizationStatus,
};
pub use merge::merge;
pub use processing::{extract_reduction_list, rebin_extract, OffSpecMap};
pub use rebin::{closest_bin, rebin, select_axes, Cut, RebinConfig, RebinMode, RebinnedMap};

// Re-export the core types the algorithms operate on
pub use offspec_core::{MergedPointCloud, OffSpecAxes, OffSpecResult, Run};
