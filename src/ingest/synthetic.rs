//! Synthetic frame source (`stub://`).
//!
//! Produces a moving gradient at the configured size. Useful with the
//! `scripted` or `null` detector backends where pixel content is irrelevant.

use anyhow::Result;
use std::time::Instant;

use super::{FrameSource, SourceStats};
use crate::config::CameraSettings;
use crate::frame::Frame;

pub struct SyntheticSource {
    settings: CameraSettings,
    frame_count: u64,
    scene_state: u8,
    connected: bool,
}

impl SyntheticSource {
    pub fn new(settings: CameraSettings) -> Self {
        Self {
            settings,
            frame_count: 0,
            scene_state: 0,
            connected: false,
        }
    }

    fn generate_synthetic_pixels(&mut self) -> Vec<u8> {
        let pixel_count = (self.settings.width as usize) * (self.settings.height as usize) * 3;
        if self.frame_count % 50 == 0 {
            self.scene_state = self.scene_state.wrapping_add(1);
        }
        let mut pixels = vec![0u8; pixel_count];
        for (i, pixel) in pixels.iter_mut().enumerate() {
            *pixel = ((i as u64 + self.frame_count + self.scene_state as u64) % 256) as u8;
        }
        pixels
    }
}

impl FrameSource for SyntheticSource {
    fn connect(&mut self) -> Result<()> {
        log::info!("SyntheticSource: connected to {}", self.settings.url);
        self.connected = true;
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self
            .settings
            .max_frames
            .is_some_and(|max| self.frame_count >= max)
        {
            return Ok(None);
        }
        self.frame_count += 1;
        let pixels = self.generate_synthetic_pixels();
        let frame = Frame::new(
            pixels,
            self.settings.width,
            self.settings.height,
            Instant::now(),
        )?;
        Ok(Some(frame))
    }

    fn is_healthy(&self) -> bool {
        self.connected
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.frame_count,
            url: self.settings.url.clone(),
        }
    }
}
