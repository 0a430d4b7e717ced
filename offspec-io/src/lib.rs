//! offspec-io: Measurement loading and text output for offspec.
//!
//! Measurements and reduction lists are described in JSON; results are
//! written as delimited text tables named through an [`OutputNaming`]
//! template.
//!

mod error;
mod reader;
mod writer;

pub use error::{Error, Result};
pub use reader::{read_measurement, MeasurementFile, ReductionFile};
pub use writer::{write_cuts, DataFileWriter, OutputNaming, DEFAULT_TEMPLATE};
