use anyhow::Result;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::RawDetection;

/// Backend used when no model is available. Never detects anything, so the
/// stream keeps running with an empty pending list.
#[derive(Default)]
pub struct NullBackend;

impl NullBackend {
    pub fn new() -> Self {
        Self
    }
}

impl DetectorBackend for NullBackend {
    fn name(&self) -> &'static str {
        "null"
    }

    fn detect(&mut self, _pixels: &[u8], _width: u32, _height: u32) -> Result<Vec<RawDetection>> {
        Ok(Vec::new())
    }
}
