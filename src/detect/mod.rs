mod backend;
pub mod backends;
mod registry;
mod result;

pub use backend::DetectorBackend;
pub use backends::{NullBackend, ScriptedBackend};
pub use registry::BackendRegistry;
pub use result::{BoundingBox, RawDetection};
