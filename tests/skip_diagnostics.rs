//! Warnings emitted for images whose chessboard could not be found.
//!
//! This binary installs its own logger to record every message, so it holds a
//! single test.

mod common;

use chessboard_calib::{Calibrator, PatternSize};
use common::{tagged_images, ScriptedDetector};
use log::{Level, LevelFilter, Log, Metadata, Record};
use std::collections::BTreeSet;
use std::sync::{Mutex, OnceLock};

struct RecordingLogger {
    records: Mutex<Vec<(Level, String, String)>>,
}

impl Log for RecordingLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if let Ok(mut records) = self.records.lock() {
            records.push((
                record.level(),
                record.target().to_string(),
                record.args().to_string(),
            ));
        }
    }

    fn flush(&self) {}
}

static LOGGER: OnceLock<RecordingLogger> = OnceLock::new();

fn recorder() -> &'static RecordingLogger {
    let mut installed = false;
    let logger = LOGGER.get_or_init(|| {
        installed = true;
        RecordingLogger {
            records: Mutex::new(Vec::new()),
        }
    });
    if installed {
        log::set_logger(logger).unwrap();
        log::set_max_level(LevelFilter::Trace);
    }
    logger
}

/// Warnings raised by the calibrator since the last call.
fn take_calibrator_warnings(logger: &RecordingLogger) -> Vec<String> {
    logger
        .records
        .lock()
        .unwrap()
        .drain(..)
        .filter(|(level, target, _)| *level == Level::Warn && target.starts_with("chessboard_calib"))
        .map(|(_, _, message)| message)
        .collect()
}

#[test]
fn test_one_warning_per_skipped_image() {
    let logger = recorder();
    let camera = common::reference_camera();
    let pattern = PatternSize::new(9, 6).unwrap();
    let poses = common::board_poses(pattern, 10, 14.0);
    let images = tagged_images(poses.len(), 640, 480);

    // Every view detected: no warnings
    let views = poses
        .iter()
        .map(|pose| Some(common::project_corners(&camera, pattern, pose)))
        .collect();
    let calibrator = Calibrator::builder(pattern)
        .detector(ScriptedDetector { views })
        .calibrate(&images)
        .unwrap();
    assert_eq!(calibrator.report().used.len(), 10);
    assert!(take_calibrator_warnings(logger).is_empty());

    // Three views missing: three warnings, one per index
    let missing = [1usize, 4, 6];
    let views = poses
        .iter()
        .enumerate()
        .map(|(k, pose)| {
            (!missing.contains(&k)).then(|| common::project_corners(&camera, pattern, pose))
        })
        .collect();
    let calibrator = Calibrator::builder(pattern)
        .detector(ScriptedDetector { views })
        .calibrate(&images)
        .unwrap();
    assert_eq!(calibrator.report().used.len(), 7);

    let warnings = take_calibrator_warnings(logger);
    assert_eq!(warnings.len(), missing.len(), "{warnings:?}");
    let named: BTreeSet<usize> = warnings
        .iter()
        .map(|message| {
            message
                .split_whitespace()
                .nth(2)
                .and_then(|word| word.parse().ok())
                .unwrap_or_else(|| panic!("no image index in {message:?}"))
        })
        .collect();
    assert_eq!(named, missing.into_iter().collect::<BTreeSet<_>>());
}
