use anyhow::Result;

use crate::detect::result::RawDetection;

/// Detector backend trait.
///
/// A backend is the black-box model: it turns one RGB8 frame into a list of
/// labelled boxes. It holds no stabilization state and must not write to disk.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame.
    ///
    /// `pixels` is tightly packed RGB8, `width * height * 3` bytes.
    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<RawDetection>>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}
