//! QR payload extraction.
//!
//! The scanner converts any raster image to 8-bit luminance and hands it to a
//! [`QrDetector`]. It never fails: every problem, from an unreadable file to a
//! panic inside the detector, comes back as [`ScanResult::error`].

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;

use image::{DynamicImage, GrayImage};
use serde::Serialize;
use tracing::{debug, warn};

/// Message reported when an image holds no detectable code.
pub const NO_CODE_FOUND: &str = "No QR code found in image";

/// Outcome of one decode attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanResult {
    /// The decoded text, if a code was read.
    pub payload: Option<String>,
    /// Why nothing was read.
    pub error: Option<String>,
}

impl ScanResult {
    /// A successful read.
    #[must_use]
    pub fn found(payload: impl Into<String>) -> Self {
        Self {
            payload: Some(payload.into()),
            error: None,
        }
    }

    /// A failed read.
    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            payload: None,
            error: Some(error.into()),
        }
    }

    /// Whether a payload was read.
    #[must_use]
    pub fn is_found(&self) -> bool {
        self.payload.is_some()
    }
}

/// One code located by a detector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Detection {
    /// The code was read.
    Decoded(String),
    /// The code was located but could not be read.
    Unreadable(String),
}

/// Something that can find and read QR codes in a luminance image.
pub trait QrDetector: Send + Sync {
    /// Every code in `image`, in the detector's own order.
    fn detect(&self, image: &GrayImage) -> Vec<Detection>;
}

/// [`QrDetector`] backed by the `rqrr` grid finder.
#[derive(Debug, Clone, Copy, Default)]
pub struct GridDetector;

impl QrDetector for GridDetector {
    #[allow(clippy::cast_possible_truncation)]
    fn detect(&self, image: &GrayImage) -> Vec<Detection> {
        let (width, height) = image.dimensions();
        let mut prepared =
            rqrr::PreparedImage::prepare_from_greyscale(width as usize, height as usize, |x, y| {
                image.get_pixel(x as u32, y as u32)[0]
            });

        prepared
            .detect_grids()
            .into_iter()
            .map(|grid| match grid.decode() {
                Ok((_meta, content)) => Detection::Decoded(content),
                Err(err) => Detection::Unreadable(format!("{err:?}")),
            })
            .collect()
    }
}

/// Reads QR payloads from images.
pub struct QrScanner {
    detector: Box<dyn QrDetector>,
}

impl fmt::Debug for QrScanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QrScanner").finish_non_exhaustive()
    }
}

impl Default for QrScanner {
    fn default() -> Self {
        Self::with_detector(GridDetector)
    }
}

impl QrScanner {
    /// Scanner using the default detector.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scanner using a custom detector.
    #[must_use]
    pub fn with_detector(detector: impl QrDetector + 'static) -> Self {
        Self {
            detector: Box::new(detector),
        }
    }

    /// Decode the first QR code in `image`.
    ///
    /// When several codes are present the first one the detector reports
    /// wins.
    #[must_use]
    pub fn decode(&self, image: &DynamicImage) -> ScanResult {
        let gray = image.to_luma8();
        let detections =
            match panic::catch_unwind(AssertUnwindSafe(|| self.detector.detect(&gray))) {
                Ok(detections) => detections,
                Err(panic) => {
                    let reason = panic_reason(panic.as_ref());
                    warn!("QR detector panicked: {}", reason);
                    return ScanResult::failed(scan_error(reason));
                }
            };

        let mut first_failure = None;
        for detection in detections {
            match detection {
                Detection::Decoded(payload) => {
                    debug!("Decoded QR payload {:?}", payload);
                    return ScanResult::found(payload);
                }
                Detection::Unreadable(reason) => {
                    debug!("Skipping unreadable QR code: {}", reason);
                    first_failure.get_or_insert(reason);
                }
            }
        }

        match first_failure {
            Some(reason) => {
                warn!("QR code found but could not be read: {}", reason);
                ScanResult::failed(scan_error(reason))
            }
            None => ScanResult::failed(NO_CODE_FOUND),
        }
    }

    /// Decode an encoded image (PNG, JPEG, ...) held in memory.
    #[must_use]
    pub fn decode_bytes(&self, bytes: &[u8]) -> ScanResult {
        match image::load_from_memory(bytes) {
            Ok(image) => self.decode(&image),
            Err(err) => {
                warn!("Failed to load image: {}", err);
                ScanResult::failed(scan_error(err))
            }
        }
    }

    /// Decode an image file.
    #[must_use]
    pub fn decode_file(&self, path: impl AsRef<Path>) -> ScanResult {
        let path = path.as_ref();
        match image::open(path) {
            Ok(image) => self.decode(&image),
            Err(err) => {
                warn!("Failed to load image {}: {}", path.display(), err);
                ScanResult::failed(scan_error(err))
            }
        }
    }
}

/// Decode the first QR code in `image` with the default detector.
#[must_use]
pub fn decode(image: &DynamicImage) -> ScanResult {
    QrScanner::default().decode(image)
}

fn scan_error(reason: impl fmt::Display) -> String {
    format!("Error scanning QR code: {reason}")
}

fn panic_reason(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "detector panicked".to_string()
    }
}
