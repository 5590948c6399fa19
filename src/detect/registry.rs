use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use crate::config::DetectionSettings;
use crate::detect::result::RawDetection;

use super::backend::DetectorBackend;
use super::backends::{NullBackend, ScriptedBackend};

/// Named detector backends with one default used for every frame.
///
/// Cloning shares the backends; each sits behind a `Mutex` since `detect`
/// needs `&mut self`.
#[derive(Clone)]
pub struct BackendRegistry {
    backends: HashMap<String, Arc<Mutex<dyn DetectorBackend>>>,
    default_name: Option<String>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self {
            backends: HashMap::new(),
            default_name: None,
        }
    }

    /// Build a registry holding the configured backend as default.
    ///
    /// If the configured backend cannot be constructed (missing model file,
    /// feature not compiled in, bad script) the `null` backend is installed
    /// instead so the stream keeps serving frames with no detections.
    pub fn from_settings(settings: &DetectionSettings) -> Self {
        let mut registry = Self::new();
        match build_backend(settings) {
            Ok(backend) => {
                log::info!("detector backend '{}' loaded", settings.backend);
                registry.register_boxed(backend);
            }
            Err(e) => {
                log::error!(
                    "detector backend '{}' unavailable, detections disabled: {}",
                    settings.backend,
                    e
                );
                registry.register(NullBackend::new());
            }
        }
        registry
    }

    /// Register a backend. The first registered backend becomes the default.
    pub fn register<B: DetectorBackend + 'static>(&mut self, backend: B) {
        self.insert(backend.name().to_string(), Arc::new(Mutex::new(backend)));
    }

    fn register_boxed(&mut self, backend: Box<dyn DetectorBackend>) {
        let name = backend.name().to_string();
        self.insert(name, Arc::new(Mutex::new(BoxedBackend(backend))));
    }

    fn insert(&mut self, name: String, backend: Arc<Mutex<dyn DetectorBackend>>) {
        if self.default_name.is_none() {
            self.default_name = Some(name.clone());
        }
        self.backends.insert(name, backend);
    }

    /// Switch the default to an already registered backend.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.backends.contains_key(name) {
            return Err(anyhow!("backend '{}' not registered", name));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    pub fn default_name(&self) -> Option<&str> {
        self.default_name.as_deref()
    }

    /// Get backend by name.
    pub fn get(&self, name: &str) -> Option<Arc<Mutex<dyn DetectorBackend>>> {
        self.backends.get(name).cloned()
    }

    /// Get default backend.
    pub fn default_backend(&self) -> Option<Arc<Mutex<dyn DetectorBackend>>> {
        self.default_name.as_ref().and_then(|name| self.get(name))
    }

    /// Names of all registered backends, unordered.
    pub fn list(&self) -> Vec<String> {
        self.backends.keys().cloned().collect()
    }

    /// Run the default backend on a frame.
    ///
    /// Never fails: a missing backend, a poisoned lock or an inference error
    /// is logged and the frame yields no detections.
    pub fn detect(&self, pixels: &[u8], width: u32, height: u32) -> Vec<RawDetection> {
        let Some(backend) = self.default_backend() else {
            return Vec::new();
        };
        let result = match backend.lock() {
            Ok(mut guard) => guard.detect(pixels, width, height),
            Err(_) => Err(anyhow!("backend lock poisoned")),
        };
        match result {
            Ok(detections) => detections,
            Err(e) => {
                log::warn!("detection failed, treating frame as empty: {}", e);
                Vec::new()
            }
        }
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

struct BoxedBackend(Box<dyn DetectorBackend>);

impl DetectorBackend for BoxedBackend {
    fn name(&self) -> &'static str {
        self.0.name()
    }

    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<RawDetection>> {
        self.0.detect(pixels, width, height)
    }

    fn warm_up(&mut self) -> Result<()> {
        self.0.warm_up()
    }
}

fn build_backend(settings: &DetectionSettings) -> Result<Box<dyn DetectorBackend>> {
    let mut backend: Box<dyn DetectorBackend> = match settings.backend.as_str() {
        "null" => Box::new(NullBackend::new()),
        "scripted" => {
            let path = settings
                .script_path
                .as_ref()
                .ok_or_else(|| anyhow!("scripted backend requires detection.script_path"))?;
            Box::new(ScriptedBackend::from_path(path)?)
        }
        "tract" => build_tract(settings)?,
        other => return Err(anyhow!("unknown detector backend '{}'", other)),
    };
    backend.warm_up()?;
    Ok(backend)
}

#[cfg(feature = "backend-tract")]
fn build_tract(settings: &DetectionSettings) -> Result<Box<dyn DetectorBackend>> {
    let backend = super::backends::TractBackend::new(
        &settings.model_path,
        settings.input_size,
        settings.input_size,
        settings.classes.clone(),
    )?
    .with_threshold(settings.confidence_threshold);
    Ok(Box::new(backend))
}

#[cfg(not(feature = "backend-tract"))]
fn build_tract(_settings: &DetectionSettings) -> Result<Box<dyn DetectorBackend>> {
    Err(anyhow!("tract backend requires the backend-tract feature"))
}
