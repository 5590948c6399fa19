use std::collections::VecDeque;
use std::path::Path;

use anyhow::{anyhow, Result};

use crate::detect::backend::DetectorBackend;
use crate::detect::result::RawDetection;

/// Replays a fixed list of per-frame detections, one entry per `detect` call.
///
/// Once the script is exhausted every further frame yields no detections,
/// unless the backend was built with [`ScriptedBackend::looping`].
pub struct ScriptedBackend {
    script: Vec<Vec<RawDetection>>,
    queue: VecDeque<Vec<RawDetection>>,
    looping: bool,
}

impl ScriptedBackend {
    pub fn new(script: Vec<Vec<RawDetection>>) -> Self {
        Self {
            queue: script.iter().cloned().collect(),
            script,
            looping: false,
        }
    }

    /// Load a script from a JSON file holding an array of frames, each an
    /// array of `{label, confidence, bbox: {x1, y1, x2, y2}}`.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow!("failed to read detection script {}: {}", path.display(), e))?;
        let script: Vec<Vec<RawDetection>> = serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid detection script {}: {}", path.display(), e))?;
        Ok(Self::new(script))
    }

    pub fn looping(mut self) -> Self {
        self.looping = true;
        self
    }

    pub fn remaining(&self) -> usize {
        self.queue.len()
    }
}

impl DetectorBackend for ScriptedBackend {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(&mut self, _pixels: &[u8], _width: u32, _height: u32) -> Result<Vec<RawDetection>> {
        if self.queue.is_empty() && self.looping {
            self.queue = self.script.iter().cloned().collect();
        }
        Ok(self.queue.pop_front().unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::BoundingBox;

    fn apple() -> RawDetection {
        RawDetection::new("Apple", 0.9, BoundingBox::new(1.0, 2.0, 30.0, 40.0))
    }

    #[test]
    fn replays_then_runs_dry() -> Result<()> {
        let mut backend = ScriptedBackend::new(vec![vec![apple()], vec![]]);
        assert_eq!(backend.detect(&[], 0, 0)?, vec![apple()]);
        assert!(backend.detect(&[], 0, 0)?.is_empty());
        assert!(backend.detect(&[], 0, 0)?.is_empty());
        assert_eq!(backend.remaining(), 0);
        Ok(())
    }

    #[test]
    fn looping_restarts_script() -> Result<()> {
        let mut backend = ScriptedBackend::new(vec![vec![apple()]]).looping();
        assert_eq!(backend.detect(&[], 0, 0)?.len(), 1);
        assert_eq!(backend.detect(&[], 0, 0)?.len(), 1);
        Ok(())
    }

    #[test]
    fn loads_script_from_json() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("script.json");
        std::fs::write(
            &path,
            r#"[[{"label":"Pizza","confidence":0.8,"bbox":{"x1":5.0,"y1":6.0,"x2":50.0,"y2":60.0}}],[]]"#,
        )?;
        let mut backend = ScriptedBackend::from_path(&path)?;
        let first = backend.detect(&[], 0, 0)?;
        assert_eq!(first[0].label, "Pizza");
        assert_eq!(backend.remaining(), 1);
        Ok(())
    }

    #[test]
    fn rejects_malformed_script() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(ScriptedBackend::from_path(&path).is_err());
    }
}
