//! Error types for offspec-core.

use thiserror::Error;

/// Result type alias for offspec operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for offspec operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Scattering geometry cannot be computed.
    #[error("geometry error: {0}")]
    Geometry(#[from] GeometryError),

    /// Calibration or region-of-interest configuration is invalid.
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The requested cross-section is not part of a run.
    #[error("run {run}: no cross-section labelled '{label}'")]
    MissingCrossSection { run: u32, label: String },

    /// The cross-section has no cached off-specular result yet.
    #[error("run {run}: cross-section '{label}' has not been extracted")]
    NotExtracted { run: u32, label: String },

    /// JSON configuration could not be parsed.
    #[error("invalid JSON configuration: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration file could not be read.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while converting pixel/time-of-flight space into angles and
/// wavevectors. Fatal to the affected measurement.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    /// Time-of-flight edges are not strictly increasing.
    #[error("time-of-flight edges not strictly increasing at index {index} ({previous} -> {current})")]
    NonMonotonicTof {
        index: usize,
        previous: f64,
        current: f64,
    },

    /// A time-of-flight edge is zero or negative (infinite velocity).
    #[error("time-of-flight edge {index} is not positive: {value}")]
    NonPositiveTof { index: usize, value: f64 },

    /// Fewer than two time-of-flight edges were given.
    #[error("need at least two time-of-flight edges, got {0}")]
    TooFewTofEdges(usize),

    /// A flight distance is zero, negative or not finite.
    #[error("{name} must be strictly positive, got {value}")]
    NonPositiveDistance { name: &'static str, value: f64 },

    /// The active detector range along x contains no pixel.
    #[error("active pixel range [{start}, {end}) is empty")]
    EmptyActiveArea { start: usize, end: usize },
}

/// Errors in calibration or region-of-interest settings. Fatal to the
/// extraction of the affected measurement.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A pixel window is empty or inverted.
    #[error("{name} window [{min}, {max}) is empty")]
    EmptyWindow {
        name: &'static str,
        min: usize,
        max: usize,
    },

    /// A pixel window reaches past the detector.
    #[error("{name} window [{min}, {max}) exceeds detector size {size}")]
    WindowOutOfBounds {
        name: &'static str,
        min: usize,
        max: usize,
        size: usize,
    },

    /// Proton charge must be positive to normalize by exposure.
    #[error("proton charge must be strictly positive, got {0}")]
    NonPositiveProtonCharge(f64),

    /// A scale factor or calibration scalar is NaN or infinite.
    #[error("{name} must be finite, got {value}")]
    NonFinite { name: &'static str, value: f64 },

    /// The background curve does not match the time-of-flight axis.
    #[error("background has {actual} values, expected {expected} (one per time bin)")]
    BackgroundLength { expected: usize, actual: usize },

    /// A normalization curve does not match the time-of-flight axis.
    #[error("normalization has {actual} values, expected {expected} (one per time bin)")]
    NormalizationLength { expected: usize, actual: usize },

    /// A rebinning grid has no bin along one axis.
    #[error("rebinning grid must have at least one bin per axis, got {n_bins_x} x {n_bins_y}")]
    EmptyGrid { n_bins_x: usize, n_bins_y: usize },

    /// The histogram time axis does not match the number of edges.
    #[error("histogram has {bins} time bins but {edges} time-of-flight edges were given")]
    TofAxisMismatch { bins: usize, edges: usize },
}
