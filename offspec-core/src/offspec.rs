//! Off-specular result containers.
//!
//! [`OffSpecResult`] holds the 2D arrays extracted from one measurement;
//! [`MergedPointCloud`] stores the flattened points of several runs in
//! Structure of Arrays (`SoA`) layout, ready for rebinning.

use ndarray::{Array1, Array2, ArrayView2, Axis, Slice};

/// Off-specular reflectivity of one measurement, indexed by `[pixel, time-bin]`.
#[derive(Clone, Debug, PartialEq)]
pub struct OffSpecResult {
    pub qx: Array2<f64>,
    pub qz: Array2<f64>,
    pub ki_z: Array2<f64>,
    pub kf_z: Array2<f64>,
    /// Normalized intensity.
    pub s: Array2<f64>,
    /// Intensity uncertainty, never negative.
    pub ds: Array2<f64>,
    /// Wavelength resolution per time bin (Å).
    pub d_wavelength: Array1<f64>,
}

impl OffSpecResult {
    /// `(n_pixels, n_tof_bins)`.
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        self.s.dim()
    }

    /// Number of time-of-flight bins.
    #[must_use]
    pub fn tof_bins(&self) -> usize {
        self.s.ncols()
    }

    /// Number of points in the result.
    #[must_use]
    pub fn len(&self) -> usize {
        self.s.len()
    }

    /// Returns true if the result holds no point.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.s.is_empty()
    }
}

/// Flattened off-specular points of a reduction list.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MergedPointCloud {
    pub qx: Vec<f64>,
    pub qz: Vec<f64>,
    pub ki_z: Vec<f64>,
    pub kf_z: Vec<f64>,
    /// `ki_z - kf_z` of each point.
    pub delta_k: Vec<f64>,
    pub s: Vec<f64>,
    pub ds: Vec<f64>,
}

impl MergedPointCloud {
    /// Creates an empty cloud with the given capacity.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            qx: Vec::with_capacity(capacity),
            qz: Vec::with_capacity(capacity),
            ki_z: Vec::with_capacity(capacity),
            kf_z: Vec::with_capacity(capacity),
            delta_k: Vec::with_capacity(capacity),
            s: Vec::with_capacity(capacity),
            ds: Vec::with_capacity(capacity),
        }
    }

    /// Returns the number of points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.s.len()
    }

    /// Returns true if the cloud is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.s.is_empty()
    }

    /// Append the time bins `[first, last)` of every pixel row of `result`,
    /// pixel-major. Returns the number of points added.
    pub fn append_window(&mut self, result: &OffSpecResult, first: usize, last: usize) -> usize {
        let last = last.min(result.tof_bins());
        if first >= last {
            return 0;
        }
        let slice = Slice::from(first..last);

        let before = self.len();
        self.qx.extend(tof_window(&result.qx, slice).iter());
        self.qz.extend(tof_window(&result.qz, slice).iter());
        self.ki_z.extend(tof_window(&result.ki_z, slice).iter());
        self.kf_z.extend(tof_window(&result.kf_z, slice).iter());
        self.delta_k.extend(
            tof_window(&result.ki_z, slice)
                .iter()
                .zip(tof_window(&result.kf_z, slice).iter())
                .map(|(ki, kf)| ki - kf),
        );
        self.s.extend(tof_window(&result.s, slice).iter());
        self.ds.extend(tof_window(&result.ds, slice).iter());
        self.len() - before
    }
}

fn tof_window(array: &Array2<f64>, slice: Slice) -> ArrayView2<'_, f64> {
    array.slice_axis(Axis(1), slice)
}
