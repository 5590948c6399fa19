//! Food Lens
//!
//! Webcam food recognition and calorie logging.
//!
//! # Architecture
//!
//! Frames flow from a source through a black-box detector into a per-stream
//! stabilizer, which turns noisy per-frame detections into a short list of
//! pending candidates. A user confirms a candidate through the API, and the
//! confirmation is written to the food log together with that day's calorie
//! aggregate.
//!
//! ```text
//! FrameSource -> BackendRegistry -> Stabilizer -> PendingBoard -> (user) -> FoodTracker -> FoodLog
//! ```
//!
//! # Module Structure
//!
//! - `ingest`, `frame`: frame sources and frames
//! - `detect`: detector backends (the model seam)
//! - `stabilizer`, `session`: candidate tracking for one stream
//! - `calories`, `tracker`, `store`, `clock`: calorie lookup and persistence
//! - `api`, `config`: HTTP surface and configuration
//! - `cli`: the `food_log` command

pub mod api;
pub mod calories;
pub mod cli;
pub mod clock;
pub mod config;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod session;
pub mod stabilizer;
pub mod store;
pub mod tracker;

pub use calories::{CalorieTable, CategoryTotals, FoodInfo, NutritionalSummary};
pub use clock::{Clock, FixedClock, LocalClock};
pub use config::{CameraSettings, DetectionSettings, FoodLensConfig};
pub use detect::{BackendRegistry, BoundingBox, DetectorBackend, RawDetection};
pub use frame::Frame;
pub use ingest::{open_source, FrameSource, SyntheticSource};
pub use session::{DetectionSession, PendingBoard, SessionStats, StreamEnd};
pub use stabilizer::{IdentityKey, PendingDetection, Stabilizer, StabilizerSettings};
pub use store::{AllTimeStats, DailySummary, DetectionRecord, FoodLog, WeeklySummary};
pub use tracker::{FoodTracker, LoggedFood};
