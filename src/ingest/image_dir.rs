//! Still-image directory source.
//!
//! Replays every JPEG/PNG file in a local directory, in file-name order, as a
//! finite frame stream. Files are decoded in-memory to RGB8.

use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::time::Instant;

use super::{FrameSource, SourceStats};
use crate::frame::Frame;

pub struct ImageDirSource {
    dir: PathBuf,
    files: Vec<PathBuf>,
    next_index: usize,
    frames_captured: u64,
}

impl ImageDirSource {
    pub fn new<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        if !dir.is_dir() {
            return Err(anyhow!("image source {} is not a directory", dir.display()));
        }
        Ok(Self {
            dir,
            files: Vec::new(),
            next_index: 0,
            frames_captured: 0,
        })
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| matches!(ext.to_ascii_lowercase().as_str(), "jpg" | "jpeg" | "png"))
        .unwrap_or(false)
}

impl FrameSource for ImageDirSource {
    fn connect(&mut self) -> Result<()> {
        let mut files = Vec::new();
        for entry in std::fs::read_dir(&self.dir)
            .with_context(|| format!("failed to list {}", self.dir.display()))?
        {
            let path = entry?.path();
            if path.is_file() && is_image(&path) {
                files.push(path);
            }
        }
        files.sort();
        log::info!(
            "ImageDirSource: {} image(s) in {}",
            files.len(),
            self.dir.display()
        );
        self.files = files;
        self.next_index = 0;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        let Some(path) = self.files.get(self.next_index) else {
            return Ok(None);
        };
        self.next_index += 1;
        let decoded = image::open(path)
            .with_context(|| format!("failed to decode {}", path.display()))?
            .to_rgb8();
        let (width, height) = decoded.dimensions();
        self.frames_captured += 1;
        Ok(Some(Frame::new(
            decoded.into_raw(),
            width,
            height,
            Instant::now(),
        )?))
    }

    fn is_healthy(&self) -> bool {
        self.dir.is_dir()
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frames_captured,
            url: format!("dir://{}", self.dir.display()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replays_images_in_name_order() -> Result<()> {
        let dir = tempfile::tempdir()?;
        image::RgbImage::new(4, 2).save(dir.path().join("b.png"))?;
        image::RgbImage::new(2, 2).save(dir.path().join("a.png"))?;
        std::fs::write(dir.path().join("notes.txt"), "skip me")?;

        let mut source = ImageDirSource::new(dir.path())?;
        source.connect()?;
        let first = source.next_frame()?.expect("first frame");
        assert_eq!((first.width, first.height), (2, 2));
        let second = source.next_frame()?.expect("second frame");
        assert_eq!((second.width, second.height), (4, 2));
        assert!(source.next_frame()?.is_none());
        assert_eq!(source.stats().frames_captured, 2);
        Ok(())
    }
}
