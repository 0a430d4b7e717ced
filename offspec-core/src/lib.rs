//! offspec-core: Core types for off-specular reflectivity reduction.
//!
//! This crate provides the measurement data model, instrument and
//! calibration configuration, error taxonomy, and the scattering
//! kinematics that map detector pixels and time-of-flight bins onto
//! reciprocal space.
//!

pub mod calibration;
pub mod error;
pub mod instrument;
pub mod kinematics;
pub mod measurement;
pub mod offspec;

pub use calibration::{BeamSettings, Calibration, OffSpecAxes, RegionOfInterest};
pub use error::{ConfigError, Error, GeometryError, Result};
pub use instrument::InstrumentDescriptor;
pub use kinematics::{tof_to_wavelength, validate_tof_edges, KinematicMap, H_OVER_M_NEUTRON};
pub use measurement::{CrossSection, Measurement, Run};
pub use offspec::{MergedPointCloud, OffSpecResult};
