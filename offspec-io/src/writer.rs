//! Delimited text writers for off-specular results.

use crate::Result;
use offspec_algorithms::{Cut, OffSpecMap};
use offspec_core::OffSpecResult;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Default output file name template.
pub const DEFAULT_TEMPLATE: &str = "REF_M_{numbers}_{item}_{state}.{type}";

/// File naming from a template with `{numbers}`, `{item}`, `{state}` and
/// `{type}` placeholders.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputNaming {
    template: String,
}

impl Default for OutputNaming {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPLATE)
    }
}

impl OutputNaming {
    #[must_use]
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Expand the template. Run numbers are joined with `+`.
    #[must_use]
    pub fn file_name(&self, numbers: &[u32], item: &str, state: &str, file_type: &str) -> String {
        let numbers = numbers
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join("+");
        self.template
            .replace("{numbers}", &numbers)
            .replace("{item}", item)
            .replace("{state}", state)
            .replace("{type}", file_type)
    }

    /// File name of a cut: the item encodes the y axis and the cut value,
    /// with `.` replaced by `_`. Whole values keep their decimal point.
    #[must_use]
    pub fn cut_file_name(&self, map: &OffSpecMap, cut: &Cut) -> String {
        let value = format!("{:?}", cut.value).replace('.', "_");
        let item = format!("OffSpec_cut_{}_{value}", map.y_label());
        self.file_name(&map.run_numbers, &item, &map.label, "txt")
    }
}

/// Writer for off-specular text tables.
pub struct DataFileWriter {
    writer: BufWriter<File>,
}

impl DataFileWriter {
    /// Creates a new file writer.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        let writer = BufWriter::new(file);
        Ok(Self { writer })
    }

    /// Writes the per-pixel, per-time-bin off-specular table of one
    /// cross-section, tab-delimited.
    ///
    /// Rows run over pixels then time bins.
    ///
    /// # Errors
    /// Returns an error if writing fails.
    pub fn write_off_specular(
        &mut self,
        result: &OffSpecResult,
        run: u32,
        label: &str,
    ) -> Result<()> {
        writeln!(self.writer, "# Off-specular data")?;
        writeln!(self.writer, "# Run: {run}")?;
        writeln!(self.writer, "# Cross-section: {label}")?;
        writeln!(self.writer, "# Qx\tQz\tki_z\tkf_z\tS\tdS")?;

        let columns = [
            &result.qx,
            &result.qz,
            &result.ki_z,
            &result.kf_z,
            &result.s,
            &result.ds,
        ];
        let (n_x, n_tof) = result.shape();
        for i in 0..n_x {
            for t in 0..n_tof {
                let row: Vec<String> = columns
                    .iter()
                    .map(|column| format!("{:.8e}", column[[i, t]]))
                    .collect();
                writeln!(self.writer, "{}", row.join("\t"))?;
            }
        }

        self.writer.flush()?;
        Ok(())
    }

    /// Writes the rebinned map as `x y I dI` rows, one per filled cell.
    ///
    /// # Errors
    /// Returns an error if writing fails.
    pub fn write_map(&mut self, map: &OffSpecMap) -> Result<()> {
        writeln!(self.writer, "# Rebinned off-specular map")?;
        writeln!(self.writer, "# Runs: {:?}", map.run_numbers)?;
        writeln!(self.writer, "# Cross-section: {}", map.label)?;
        writeln!(self.writer, "# {}\t{}\tI\tdI", map.x_label(), map.y_label())?;

        let grid = &map.map;
        for ((iy, ix), &intensity) in grid.intensity.indexed_iter() {
            if intensity.is_nan() {
                continue;
            }
            writeln!(
                self.writer,
                "{:.8e}\t{:.8e}\t{:.8e}\t{:.8e}",
                grid.x_centers[ix],
                grid.y_centers[iy],
                intensity,
                grid.error[[iy, ix]]
            )?;
        }

        self.writer.flush()?;
        Ok(())
    }

    /// Writes the full map row of a cut as space-delimited `x I dI`.
    ///
    /// # Errors
    /// Returns an error if writing fails.
    pub fn write_cut_row(&mut self, map: &OffSpecMap, cut: &Cut) -> Result<()> {
        let grid = &map.map;
        let intensity = grid.intensity.row(cut.row);
        let error = grid.error.row(cut.row);
        for ((x, i), di) in grid.x_centers.iter().zip(intensity).zip(error) {
            writeln!(self.writer, "{x:.18e} {i:.18e} {di:.18e}")?;
        }
        self.writer.flush()?;
        Ok(())
    }

    /// Flushes the writer.
    ///
    /// # Errors
    /// Returns an error if flushing fails.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

/// Write one file per cut into `output_dir`, creating it if needed.
/// Returns the written paths in cut order.
///
/// # Errors
/// Returns an error if the directory or a file cannot be written.
pub fn write_cuts<P: AsRef<Path>>(
    map: &OffSpecMap,
    output_dir: P,
    naming: &OutputNaming,
) -> Result<Vec<PathBuf>> {
    let output_dir = output_dir.as_ref();
    fs::create_dir_all(output_dir)?;

    let mut paths = Vec::with_capacity(map.cuts.len());
    for cut in &map.cuts {
        let path = output_dir.join(naming.cut_file_name(map, cut));
        let mut writer = DataFileWriter::create(&path)?;
        writer.write_cut_row(map, cut)?;
        log::info!("{}: wrote {}", cut.label, path.display());
        paths.push(path);
    }
    Ok(paths)
}
