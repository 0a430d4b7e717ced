//! offspec CLI
//!
//! Command-line front end for off-specular extraction and rebinning.
#![allow(
    clippy::uninlined_format_args,
    clippy::cast_precision_loss,
    clippy::too_many_lines
)]

use clap::{ArgAction, Parser, Subcommand};

use offspec_algorithms::{
    extract, extract_reduction_list, rebin_extract, Normalization, NormalizationStatus,
};
use offspec_core::{tof_to_wavelength, CrossSection, InstrumentDescriptor, Run};
use offspec_io::{read_measurement, write_cuts, DataFileWriter, OutputNaming, ReductionFile};
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error: {0}")]
    OffspecIo(#[from] offspec_io::Error),

    #[error("Core error: {0}")]
    Core(#[from] offspec_core::Error),
}

/// Off-specular reflectivity extraction and rebinning.
#[derive(Parser)]
#[command(name = "offspec")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log debug output (RUST_LOG overrides)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show information about a measurement file
    Info {
        /// Input measurement (JSON)
        input: PathBuf,

        /// Instrument description (JSON) to check the detector against
        #[arg(long)]
        instrument: Option<PathBuf>,
    },

    /// Extract the off-specular table of a single measurement
    Extract {
        /// Input measurement (JSON)
        input: PathBuf,

        /// Direct-beam measurement used for normalization
        #[arg(short, long)]
        direct_beam: Option<PathBuf>,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Merge, rebin and cut the runs of a reduction list
    Rebin {
        /// Reduction description (JSON)
        input: PathBuf,

        /// Output directory
        #[arg(short, long)]
        output: PathBuf,

        /// Use the simple mean instead of the weighted mean
        #[arg(long)]
        simple: bool,

        /// Number of bins along x
        #[arg(long)]
        bins_x: Option<usize>,

        /// Number of bins along y
        #[arg(long)]
        bins_y: Option<usize>,

        /// Output file name template
        #[arg(long)]
        template: Option<String>,

        /// Instrument description (JSON) used for direct-beam matching
        #[arg(long)]
        instrument: Option<PathBuf>,
    },
}

fn init_logging(verbose: u8) {
    let level = if verbose > 0 { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn load_instrument(path: Option<&Path>) -> Result<InstrumentDescriptor> {
    match path {
        Some(path) => Ok(InstrumentDescriptor::from_file(path)?),
        None => Ok(InstrumentDescriptor::ref_m_defaults()),
    }
}

/// Warn about runs whose beam settings do not match the direct beam.
fn check_direct_beam(
    instrument: &InstrumentDescriptor,
    runs: &[Run],
    label: &str,
    direct_beam: &CrossSection,
) {
    let Some(db_beam) = direct_beam.measurement().beam_settings() else {
        return;
    };
    for run in runs {
        let beam = run
            .cross_section(label)
            .ok()
            .and_then(|cs| cs.measurement().beam_settings());
        if let Some(beam) = beam {
            if !instrument.direct_beam_match(beam, db_beam, false) {
                log::warn!(
                    "run {}: beam settings differ from direct beam {}",
                    run.number,
                    direct_beam.measurement().run_number()
                );
            }
        }
    }
}

fn report_status(run: u32, status: &NormalizationStatus) {
    match status {
        NormalizationStatus::NotRequested => {}
        NormalizationStatus::Applied { unmeasurable_bins } => {
            println!(
                "Run {}: normalized ({} time bins without direct beam)",
                run, unmeasurable_bins
            );
        }
        NormalizationStatus::Skipped(mismatch) => {
            eprintln!("Run {}: {}", run, mismatch);
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Info { input, instrument } => {
            let cross_section = read_measurement(&input)?;
            let measurement = cross_section.measurement();
            let calibration = measurement.calibration();
            let roi = measurement.roi();
            let (n_x, n_y) = measurement.detector_shape();
            let edges = measurement.tof_edges();

            println!("File: {}", input.display());
            println!(
                "Run: {} [{}]",
                measurement.run_number(),
                measurement.cross_section()
            );
            println!("Detector: {} x {} pixels", n_x, n_y);
            println!("Time bins: {}", measurement.tof_bins());
            let last = edges.len() - 1;
            println!("TOF range: {:.1} - {:.1} us", edges[0], edges[last]);
            let wavelength = tof_to_wavelength(edges.view(), calibration.dist_mod_det);
            println!(
                "Wavelength range: {:.3} - {:.3} A",
                wavelength[last], wavelength[0]
            );
            println!("Total counts: {}", measurement.counts().sum());
            println!("Proton charge: {}", calibration.proton_charge);
            println!(
                "Distances: sample-detector {} m, moderator-detector {} m",
                calibration.dist_sam_det, calibration.dist_mod_det
            );
            println!(
                "Detector angle: {} deg (offset {} deg), direct pixel {}",
                calibration.dangle, calibration.dangle0, calibration.direct_pixel
            );
            println!(
                "Peak: {} in [{}, {}), low-res [{}, {})",
                roi.peak_position,
                roi.peak_roi.0,
                roi.peak_roi.1,
                roi.low_res_roi.0,
                roi.low_res_roi.1
            );
            println!(
                "Scattering angle 2theta: {:.4} deg",
                calibration.two_theta(roi.peak_position).to_degrees()
            );
            if let Some(beam) = measurement.beam_settings() {
                println!(
                    "Beam: lambda center {} A, slits {:?}",
                    beam.lambda_center, beam.slit_widths
                );
            }

            if let Some(path) = instrument {
                let instrument = InstrumentDescriptor::from_file(&path)?;
                println!("Instrument: {}", instrument.name);
                if (instrument.n_x_pixel, instrument.n_y_pixel) != (n_x, n_y) {
                    eprintln!(
                        "Detector shape {} x {} differs from {} ({} x {})",
                        n_x, n_y, instrument.name, instrument.n_x_pixel, instrument.n_y_pixel
                    );
                }
            }
        }

        Commands::Extract {
            input,
            direct_beam,
            output,
        } => {
            let start = Instant::now();
            let mut cross_section = read_measurement(&input)?;
            let norm = match &direct_beam {
                Some(path) => Some(Normalization::from_direct_beam(
                    read_measurement(path)?.measurement(),
                )),
                None => None,
            };

            let status = extract(&mut cross_section, norm.as_ref())?;
            let run = cross_section.measurement().run_number();
            let label = cross_section.measurement().cross_section().to_string();
            report_status(run, &status);

            let result =
                cross_section
                    .off_spec()
                    .ok_or_else(|| offspec_core::Error::NotExtracted {
                        run,
                        label: label.clone(),
                    })?;
            let mut writer = DataFileWriter::create(&output)?;
            writer.write_off_specular(result, run, &label)?;

            println!(
                "Extracted {} points from run {} [{}] in {:.2}s",
                result.len(),
                run,
                label,
                start.elapsed().as_secs_f64()
            );
            println!("Output: {}", output.display());
        }

        Commands::Rebin {
            input,
            output,
            simple,
            bins_x,
            bins_y,
            template,
            instrument,
        } => {
            let start = Instant::now();
            let mut reduction = ReductionFile::open(&input)?;
            reduction.simple |= simple;
            if let Some(n) = bins_x {
                reduction.n_bins_x = n;
            }
            if let Some(n) = bins_y {
                reduction.n_bins_y = n;
            }
            let naming = match template.or_else(|| reduction.output_template.clone()) {
                Some(template) => OutputNaming::new(template),
                None => OutputNaming::default(),
            };
            let label = reduction.cross_section.clone();

            let mut runs = reduction.load_runs()?;
            let direct_beam = reduction.load_direct_beam()?;
            if let Some((db, _)) = &direct_beam {
                let instrument = load_instrument(instrument.as_deref())?;
                check_direct_beam(&instrument, &runs, &label, db);
            }

            let results =
                extract_reduction_list(&mut runs, &label, direct_beam.as_ref().map(|(_, n)| n));
            let mut extracted = Vec::with_capacity(runs.len());
            for (run, result) in runs.into_iter().zip(results) {
                match result {
                    Ok(status) => {
                        report_status(run.number, &status);
                        extracted.push(run);
                    }
                    Err(e) => eprintln!("Run {}: skipped ({})", run.number, e),
                }
            }
            let runs = extracted;

            let config = reduction.rebin_config();
            let Some(result) = rebin_extract(&runs, &label, &reduction.cut_values, &config)?
            else {
                println!("Reduction list is empty; nothing written");
                return Ok(());
            };

            std::fs::create_dir_all(&output)?;
            let map_path =
                output.join(naming.file_name(&result.run_numbers, "OffSpec_map", &label, "txt"));
            let mut writer = DataFileWriter::create(&map_path)?;
            writer.write_map(&result)?;
            let cut_paths = write_cuts(&result, &output, &naming)?;

            println!(
                "Rebinned {} runs [{}] to {} x {} ({} vs {}) in {:.2}s",
                runs.len(),
                label,
                config.n_bins_x,
                config.n_bins_y,
                result.x_label(),
                result.y_label(),
                start.elapsed().as_secs_f64()
            );
            println!("Map: {}", map_path.display());
            for (cut, path) in result.cuts.iter().zip(&cut_paths) {
                println!("Cut {}: {}", cut.label, path.display());
            }
        }
    }

    Ok(())
}
