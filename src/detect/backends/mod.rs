pub mod null;
pub mod scripted;

#[cfg(feature = "backend-tract")]
pub mod tract;

pub use null::NullBackend;
pub use scripted::ScriptedBackend;

#[cfg(feature = "backend-tract")]
pub use tract::TractBackend;
