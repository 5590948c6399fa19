//! Frame ingestion sources.
//!
//! This module provides sources of camera frames:
//! - Synthetic frames (`stub://`) for demos and tests
//! - A directory of still images, replayed in name order (feature: ingest-image)
//!
//! A source yields `Ok(None)` once the stream has ended; the session treats
//! that as a clean end of stream.

#[cfg(feature = "ingest-image")]
pub mod image_dir;
pub mod synthetic;

#[cfg(feature = "ingest-image")]
pub use image_dir::ImageDirSource;
pub use synthetic::SyntheticSource;

use anyhow::Result;

use crate::config::CameraSettings;
use crate::frame::Frame;

/// Statistics for a frame source.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub url: String,
}

pub trait FrameSource: Send {
    /// Open the underlying device or file set.
    fn connect(&mut self) -> Result<()>;

    /// Capture the next frame, or `None` at end of stream.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Check if the source is healthy.
    fn is_healthy(&self) -> bool;

    fn stats(&self) -> SourceStats;
}

/// Open the source named by `settings.url`.
///
/// `stub://<name>` selects the synthetic source; a `dir://<path>` URL or a
/// plain local path selects the image directory source.
pub fn open_source(settings: &CameraSettings) -> Result<Box<dyn FrameSource>> {
    if settings.url.starts_with("stub://") {
        return Ok(Box::new(SyntheticSource::new(settings.clone())));
    }
    let path = settings.url.strip_prefix("dir://").unwrap_or(&settings.url);
    if path.trim().is_empty() || path.contains("://") {
        anyhow::bail!("unsupported camera url '{}'", settings.url);
    }
    open_image_dir(path)
}

#[cfg(feature = "ingest-image")]
fn open_image_dir(path: &str) -> Result<Box<dyn FrameSource>> {
    Ok(Box::new(ImageDirSource::new(path)?))
}

#[cfg(not(feature = "ingest-image"))]
fn open_image_dir(_path: &str) -> Result<Box<dyn FrameSource>> {
    anyhow::bail!("image directory ingestion requires the ingest-image feature")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_urls_open_synthetic_source() -> Result<()> {
        let settings = CameraSettings {
            url: "stub://kitchen".to_string(),
            ..CameraSettings::default()
        };
        let mut source = open_source(&settings)?;
        source.connect()?;
        assert!(source.next_frame()?.is_some());
        assert_eq!(source.stats().url, "stub://kitchen");
        Ok(())
    }

    #[test]
    fn remote_urls_are_rejected() {
        let settings = CameraSettings {
            url: "rtsp://camera/stream".to_string(),
            ..CameraSettings::default()
        };
        assert!(open_source(&settings).is_err());
    }
}
