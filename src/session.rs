//! Per-stream detection session.
//!
//! A `DetectionSession` owns the stabilizer for one camera stream and is
//! driven by a single thread. Other threads (the API) see its output only
//! through a [`PendingBoard`] handle. The board holds the last non-empty
//! pending list, so a candidate stays visible to the user across frames in
//! which the model misses it. Confirmations are queued on the board and
//! applied by the session before its next frame.

use anyhow::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::detect::{BackendRegistry, RawDetection};
use crate::frame::Frame;
use crate::ingest::FrameSource;
use crate::stabilizer::{IdentityKey, PendingDetection, Stabilizer};

const HEALTH_LOG_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Default)]
struct BoardState {
    pending: Vec<PendingDetection>,
    confirmations: Vec<IdentityKey>,
    published_frames: u64,
    /// Set while a session publishes; confirmations are only queued then.
    active: bool,
}

/// Shared view of a session's pending candidates.
#[derive(Clone, Debug, Default)]
pub struct PendingBoard {
    inner: Arc<Mutex<BoardState>>,
}

impl PendingBoard {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, BoardState> {
        // Plain data, safe to use after a poisoning panic.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Last non-empty pending list published by the session, minus
    /// candidates confirmed since.
    pub fn current(&self) -> Vec<PendingDetection> {
        self.state().pending.clone()
    }

    pub fn published_frames(&self) -> u64 {
        self.state().published_frames
    }

    /// Ask the session to stop proposing `key`. It disappears from
    /// [`PendingBoard::current`] immediately. With no session running there
    /// is nothing to suppress and the request is not queued.
    pub fn request_confirmation(&self, key: IdentityKey) {
        let mut state = self.state();
        state.pending.retain(|p| p.identity_key() != key);
        if state.active {
            state.confirmations.push(key);
        }
    }

    /// Confirmations waiting for the session's next frame.
    pub fn queued_confirmations(&self) -> usize {
        self.state().confirmations.len()
    }

    /// Forget everything and stop queueing confirmations until the next
    /// publish.
    pub fn clear(&self) {
        let mut state = self.state();
        state.pending.clear();
        state.confirmations.clear();
        state.active = false;
    }

    fn publish(&self, pending: Vec<PendingDetection>) {
        let mut state = self.state();
        if !pending.is_empty() {
            state.pending = pending;
        }
        state.published_frames += 1;
        state.active = true;
    }

    fn take_confirmations(&self) -> Vec<IdentityKey> {
        std::mem::take(&mut self.state().confirmations)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StreamEnd {
    EndOfStream,
    Shutdown,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SessionStats {
    pub frames_processed: u64,
    pub ended_by: StreamEnd,
}

pub struct DetectionSession {
    stabilizer: Stabilizer,
    detector: BackendRegistry,
    board: PendingBoard,
    frames_processed: u64,
}

impl DetectionSession {
    pub fn new(stabilizer: Stabilizer, detector: BackendRegistry, board: PendingBoard) -> Self {
        Self {
            stabilizer,
            detector,
            board,
            frames_processed: 0,
        }
    }

    pub fn board(&self) -> &PendingBoard {
        &self.board
    }

    pub fn stabilizer(&self) -> &Stabilizer {
        &self.stabilizer
    }

    /// Detect, stabilize and publish one frame.
    pub fn process_frame(&mut self, frame: &Frame) -> Vec<PendingDetection> {
        let detections = self
            .detector
            .detect(frame.pixels(), frame.width, frame.height);
        self.process_detections(&detections, frame.captured_at)
    }

    /// Stabilize detections observed at `now` and publish the pending list.
    pub fn process_detections(
        &mut self,
        detections: &[RawDetection],
        now: Instant,
    ) -> Vec<PendingDetection> {
        for key in self.board.take_confirmations() {
            if !self.stabilizer.confirm(&key) {
                log::debug!("confirmation for untracked candidate {:?}", key);
            }
        }
        let pending = self.stabilizer.process_frame(detections, now);
        self.board.publish(pending.clone());
        self.frames_processed += 1;
        pending
    }

    /// Drive frames from `source` until it ends or `shutdown` is set.
    ///
    /// Frames are paced to at most `target_fps`. The board is cleared when the
    /// stream stops, since candidates do not outlive their stream.
    pub fn run(
        &mut self,
        source: &mut dyn FrameSource,
        shutdown: &AtomicBool,
        target_fps: u32,
    ) -> Result<SessionStats> {
        source.connect()?;
        let frame_interval = Duration::from_secs(1) / target_fps.max(1);
        let mut last_health_log = Instant::now();

        let ended_by = loop {
            if shutdown.load(Ordering::SeqCst) {
                break StreamEnd::Shutdown;
            }
            let started = Instant::now();
            let Some(frame) = source.next_frame()? else {
                break StreamEnd::EndOfStream;
            };
            let pending = self.process_frame(&frame);

            if last_health_log.elapsed() >= HEALTH_LOG_INTERVAL {
                let stats = source.stats();
                log::info!(
                    "stream health={} frames={} url={} tracked={} pending={} queued={}",
                    source.is_healthy(),
                    stats.frames_captured,
                    stats.url,
                    self.stabilizer.tracked_len(),
                    pending.len(),
                    self.board.queued_confirmations()
                );
                last_health_log = Instant::now();
            }

            if let Some(rest) = frame_interval.checked_sub(started.elapsed()) {
                std::thread::sleep(rest);
            }
        };

        self.board.clear();
        self.stabilizer.reset();
        log::info!(
            "stream stopped ({:?}) after {} frames",
            ended_by,
            self.frames_processed
        );
        Ok(SessionStats {
            frames_processed: self.frames_processed,
            ended_by,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{BoundingBox, ScriptedBackend};
    use crate::stabilizer::StabilizerSettings;

    fn session(script: Vec<Vec<RawDetection>>) -> DetectionSession {
        let mut registry = BackendRegistry::new();
        registry.register(ScriptedBackend::new(script));
        DetectionSession::new(
            Stabilizer::new(StabilizerSettings::default(), ["Apple", "Pizza"]),
            registry,
            PendingBoard::new(),
        )
    }

    fn apple() -> RawDetection {
        RawDetection::new("Apple", 0.9, BoundingBox::new(12.0, 34.0, 100.0, 120.0))
    }

    #[test]
    fn board_holds_last_non_empty_list() {
        let mut s = session(vec![]);
        let t0 = Instant::now();
        s.process_detections(&[apple()], t0);
        assert!(s.board().current().is_empty());
        s.process_detections(&[apple()], t0 + Duration::from_millis(600));
        assert_eq!(s.board().current().len(), 1);

        let frame = s.process_detections(&[], t0 + Duration::from_millis(700));
        assert!(frame.is_empty());
        assert_eq!(s.board().current().len(), 1);
        assert_eq!(s.board().published_frames(), 3);
    }

    #[test]
    fn confirmations_are_not_queued_without_a_session() {
        let board = PendingBoard::new();
        board.request_confirmation(IdentityKey::from_pixels("Apple", [1, 2, 3, 4]));
        assert_eq!(board.queued_confirmations(), 0);

        let mut s = session(vec![]);
        let board = s.board().clone();
        s.process_detections(&[], Instant::now());
        board.request_confirmation(IdentityKey::from_pixels("Apple", [1, 2, 3, 4]));
        assert_eq!(board.queued_confirmations(), 1);

        board.clear();
        for _ in 0..3 {
            board.request_confirmation(IdentityKey::from_pixels("Apple", [1, 2, 3, 4]));
        }
        assert_eq!(board.queued_confirmations(), 0);
    }

    #[test]
    fn confirmation_is_applied_before_next_frame() {
        let mut s = session(vec![]);
        let board = s.board().clone();
        let t0 = Instant::now();
        s.process_detections(&[apple()], t0);
        let pending = s.process_detections(&[apple()], t0 + Duration::from_millis(600));
        board.request_confirmation(pending[0].identity_key());
        assert!(board.current().is_empty());

        let pending = s.process_detections(&[apple()], t0 + Duration::from_millis(700));
        assert!(pending.is_empty());
        assert_eq!(s.stabilizer().tracked_len(), 1);
    }

    #[test]
    fn process_frame_uses_registry_output() -> Result<()> {
        let mut s = session(vec![vec![apple()], vec![apple()]]);
        let t0 = Instant::now();
        let first = Frame::new(vec![0; 3], 1, 1, t0)?;
        let second = Frame::new(vec![0; 3], 1, 1, t0 + Duration::from_millis(800))?;
        assert!(s.process_frame(&first).is_empty());
        assert_eq!(s.process_frame(&second).len(), 1);
        Ok(())
    }

    #[test]
    fn run_stops_on_shutdown_flag() -> Result<()> {
        let mut s = session(vec![]);
        let mut source = crate::ingest::SyntheticSource::new(crate::config::CameraSettings {
            url: "stub://test".to_string(),
            width: 2,
            height: 2,
            ..Default::default()
        });
        let shutdown = AtomicBool::new(true);
        let stats = s.run(&mut source, &shutdown, 30)?;
        assert_eq!(stats.ended_by, StreamEnd::Shutdown);
        assert_eq!(stats.frames_processed, 0);
        Ok(())
    }
}
