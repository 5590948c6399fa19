//! Detection stabilization.
//!
//! Raw model output is independent per frame: boxes jitter, confidence
//! fluctuates and the same object is redetected on every frame. The
//! [`Stabilizer`] matches detections across frames with a deliberately cheap
//! identity key and only proposes a candidate to the user once it has been
//! seen again after `stabilization_delay`.
//!
//! Candidate lifecycle:
//!
//! - first observation: tracked, not reported
//! - re-observed with age >= `stabilization_delay`: pending in that frame,
//!   reported with its latest confidence and box
//! - not observed in a frame: not reported in that frame
//! - confirmed through [`Stabilizer::confirm`]: no longer reported
//! - age >= `staleness_window`: evicted, regardless of state
//!
//! Age is always measured from the first observation, so eviction is a fixed
//! time-to-live rather than an idle timeout. Re-observing the object after
//! eviction starts a fresh candidate.

use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};

use crate::config::DetectionSettings;
use crate::detect::{BoundingBox, RawDetection};

/// Label plus floored top-left corner.
///
/// Any movement of the top-left corner by a pixel or more yields a different
/// key, which restarts the stabilization delay for that object.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct IdentityKey {
    pub label: String,
    pub x1: i32,
    pub y1: i32,
}

impl IdentityKey {
    pub fn new(label: &str, bbox: &BoundingBox) -> Self {
        Self {
            label: label.to_string(),
            x1: bbox.x1.floor() as i32,
            y1: bbox.y1.floor() as i32,
        }
    }

    /// Key of a candidate identified by its integer pixel box.
    pub fn from_pixels(label: &str, bbox: [i32; 4]) -> Self {
        Self {
            label: label.to_string(),
            x1: bbox[0],
            y1: bbox[1],
        }
    }
}

/// Snapshot of a candidate handed to the caller for confirmation.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PendingDetection {
    pub food: String,
    pub confidence: f32,
    pub bbox: [i32; 4],
}

impl PendingDetection {
    pub fn identity_key(&self) -> IdentityKey {
        IdentityKey::from_pixels(&self.food, self.bbox)
    }
}

#[derive(Clone, Debug)]
struct TrackedCandidate {
    confidence: f32,
    bbox: BoundingBox,
    first_seen: Instant,
    confirmed: bool,
    order: u64,
}

impl TrackedCandidate {
    fn snapshot(&self, label: &str) -> PendingDetection {
        PendingDetection {
            food: label.to_string(),
            confidence: self.confidence,
            bbox: self.bbox.to_pixels(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StabilizerSettings {
    pub stabilization_delay: Duration,
    pub staleness_window: Duration,
}

impl Default for StabilizerSettings {
    fn default() -> Self {
        Self {
            stabilization_delay: Duration::from_millis(500),
            staleness_window: Duration::from_secs(5),
        }
    }
}

impl From<&DetectionSettings> for StabilizerSettings {
    fn from(settings: &DetectionSettings) -> Self {
        Self {
            stabilization_delay: settings.stabilization_delay,
            staleness_window: settings.staleness_window,
        }
    }
}

/// Per-stream candidate tracker. Not shared; one stream drives it.
pub struct Stabilizer {
    settings: StabilizerSettings,
    vocabulary: HashSet<String>,
    candidates: HashMap<IdentityKey, TrackedCandidate>,
    next_order: u64,
}

impl Stabilizer {
    /// `vocabulary` is the set of labels the model may produce; anything else
    /// is dropped on input.
    pub fn new<I, S>(settings: StabilizerSettings, vocabulary: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            settings,
            vocabulary: vocabulary.into_iter().map(Into::into).collect(),
            candidates: HashMap::new(),
            next_order: 0,
        }
    }

    pub fn from_settings(settings: &DetectionSettings) -> Self {
        Self::new(settings.into(), settings.classes.iter().cloned())
    }

    /// Number of candidates currently tracked, pending or not.
    pub fn tracked_len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_tracked(&self, key: &IdentityKey) -> bool {
        self.candidates.contains_key(key)
    }

    /// Feed one frame's raw detections observed at `now` and return the
    /// candidates of this frame that are pending confirmation, in order of
    /// first sighting.
    ///
    /// An empty `detections` slice still ages out stale candidates.
    pub fn process_frame(&mut self, detections: &[RawDetection], now: Instant) -> Vec<PendingDetection> {
        let mut ready: Vec<IdentityKey> = Vec::new();
        for det in detections {
            if !self.vocabulary.contains(&det.label) {
                log::debug!("ignoring detection with unknown label '{}'", det.label);
                continue;
            }
            let key = IdentityKey::new(&det.label, &det.bbox);
            match self.candidates.get_mut(&key) {
                None => {
                    let order = self.next_order;
                    self.next_order += 1;
                    self.candidates.insert(
                        key,
                        TrackedCandidate {
                            confidence: det.confidence,
                            bbox: det.bbox,
                            first_seen: now,
                            confirmed: false,
                            order,
                        },
                    );
                }
                Some(cand) => {
                    cand.confidence = det.confidence;
                    cand.bbox = det.bbox;
                    let age = now.saturating_duration_since(cand.first_seen);
                    if !cand.confirmed
                        && age >= self.settings.stabilization_delay
                        && !ready.contains(&key)
                    {
                        log::trace!(
                            "candidate {} at ({}, {}) pending, age {:?}",
                            key.label,
                            key.x1,
                            key.y1,
                            age
                        );
                        ready.push(key);
                    }
                }
            }
        }

        self.evict_stale(now);

        let mut pending: Vec<(&IdentityKey, &TrackedCandidate)> = ready
            .iter()
            .filter_map(|key| self.candidates.get_key_value(key))
            .collect();
        pending.sort_by_key(|(_, cand)| cand.order);
        pending
            .into_iter()
            .map(|(key, cand)| cand.snapshot(&key.label))
            .collect()
    }

    /// Mark a candidate as confirmed so it is no longer proposed. Returns
    /// false when the key is not tracked (already evicted or never seen).
    pub fn confirm(&mut self, key: &IdentityKey) -> bool {
        match self.candidates.get_mut(key) {
            Some(cand) => {
                cand.confirmed = true;
                true
            }
            None => false,
        }
    }

    /// Drop all tracked state.
    pub fn reset(&mut self) {
        self.candidates.clear();
    }

    fn evict_stale(&mut self, now: Instant) {
        let window = self.settings.staleness_window;
        let before = self.candidates.len();
        self.candidates
            .retain(|_, cand| now.saturating_duration_since(cand.first_seen) < window);
        let evicted = before - self.candidates.len();
        if evicted > 0 {
            log::trace!("evicted {} stale candidate(s)", evicted);
        }
    }
}
