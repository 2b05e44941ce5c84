//! Chessboard Calibration Example
//!
//! Calibrates a camera from a directory of chessboard images, prints the
//! intrinsic matrix, the distortion coefficients and the reprojection statistics,
//! and optionally writes undistorted copies of the input images.
//!
//! Usage:
//! ```bash
//! cargo run --release --example calibrate -- \
//!   --images samples/left \
//!   --hcount 9 --vcount 6 \
//!   --undistorted output/undistorted
//! ```

use chessboard_calib::{Calibrator, ChessboardDetector, PatternSize, PlanarSolver};
use clap::Parser;
use flexi_logger::{colored_detailed_format, detailed_format, Duplicate, FileSpec, Logger};
use log::{info, warn};
use std::fs;
use std::path::{Path, PathBuf};

/// Chessboard camera calibration tool
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory containing the calibration images
    #[arg(short = 'i', long)]
    images: PathBuf,

    /// Inner corners per chessboard row
    #[arg(long, default_value_t = 9)]
    hcount: usize,

    /// Inner corners per chessboard column
    #[arg(long, default_value_t = 6)]
    vcount: usize,

    /// Directory for undistorted copies of the input images
    #[arg(short = 'u', long)]
    undistorted: Option<PathBuf>,

    /// Log the progress of the non-linear refinement
    #[arg(short, long)]
    verbose: bool,
}

fn list_images(dir: &Path) -> Result<Vec<PathBuf>, Box<dyn std::error::Error>> {
    let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| {
            path.extension()
                .and_then(|ext| ext.to_str())
                .map(|ext| {
                    matches!(
                        ext.to_ascii_lowercase().as_str(),
                        "png" | "jpg" | "jpeg" | "bmp" | "tif" | "tiff"
                    )
                })
                .unwrap_or(false)
        })
        .collect();
    paths.sort();
    Ok(paths)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let _logger = Logger::try_with_str("info")?
        .log_to_file(
            FileSpec::default()
                .directory("logs")
                .suppress_timestamp()
                .suffix("log"),
        )
        .duplicate_to_stdout(Duplicate::All)
        .format_for_files(detailed_format)
        .format_for_stdout(colored_detailed_format)
        // error;warn;info;debug;trace
        .set_palette("196;208;76;39;178".to_string())
        .start()?;

    let cli = Cli::parse();

    let paths = list_images(&cli.images)?;
    info!("Found {} images in {:?}", paths.len(), cli.images);

    let mut images = Vec::with_capacity(paths.len());
    for path in &paths {
        images.push(image::open(path)?.to_rgb8());
    }

    let pattern = PatternSize::new(cli.hcount, cli.vcount)?;
    let calibrator = Calibrator::builder(pattern)
        .detector(ChessboardDetector::new())
        .solver(PlanarSolver::new().verbose(cli.verbose))
        .calibrate(&images)?;

    let report = calibrator.report();
    for &index in &report.skipped {
        warn!("Skipped {:?}", paths[index]);
    }

    println!("Camera matrix:{}", calibrator.intrinsic_matrix());
    println!(
        "Distortion [k1, k2, p1, p2, k3]: {:?}",
        calibrator.distortion_coefficients()
    );
    println!(
        "Used {} of {} images, {:?}",
        report.used.len(),
        images.len(),
        report.projection_error
    );

    if let Some(dir) = &cli.undistorted {
        fs::create_dir_all(dir)?;
        for (path, image) in paths.iter().zip(&images) {
            let name = path.file_name().ok_or("Invalid image file name")?;
            calibrator.undistort(image).save(dir.join(name))?;
        }
        info!("Saved {} undistorted images to {:?}", images.len(), dir);
    }

    Ok(())
}
