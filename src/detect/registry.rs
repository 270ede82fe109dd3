use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};

use crate::detect::result::{BoundingBox, RegionClass};
use crate::error::{init_failure, ClipperError};
use crate::frame::FrameView;

use super::backend::DetectorBackend;

/// Thread-safe registry of detector backends.
///
/// Backends are wrapped in `Mutex` because `DetectorBackend::detect` takes `&mut self`.
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

    /// Register a backend under its own name. The first registered backend
    /// becomes the default.
    pub fn register<B: DetectorBackend + 'static>(&mut self, backend: B) {
        let name = backend.name().to_string();
        self.register_as(name, backend);
    }

    /// Register a backend under an explicit name, for setups that load the
    /// same backend type once per class.
    pub fn register_as<B: DetectorBackend + 'static>(
        &mut self,
        name: impl Into<String>,
        backend: B,
    ) {
        let name = name.into();
        if self.default_name.is_none() {
            self.default_name = Some(name.clone());
        }
        self.backends.insert(name, Arc::new(Mutex::new(backend)));
    }

    /// Set default backend by name.
    pub fn set_default(&mut self, name: &str) -> Result<()> {
        if !self.backends.contains_key(name) {
            return Err(anyhow!("backend '{}' not registered", name));
        }
        self.default_name = Some(name.to_string());
        Ok(())
    }

    /// Get backend by name.
    pub fn get(&self, name: &str) -> Option<Arc<Mutex<dyn DetectorBackend>>> {
        self.backends.get(name).cloned()
    }

    /// Get default backend.
    pub fn default_backend(&self) -> Option<Arc<Mutex<dyn DetectorBackend>>> {
        self.default_name.as_ref().and_then(|name| self.get(name))
    }

    /// List registered backends.
    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.backends.keys().cloned().collect();
        names.sort();
        names
    }

    /// Select a backend that supports the requested class.
    ///
    /// Prefers the default backend when it supports the class. Otherwise the
    /// first supporting backend in name order is used, so selection does not
    /// depend on hash order.
    pub fn backend_for_class(&self, class: RegionClass) -> Result<Arc<Mutex<dyn DetectorBackend>>> {
        if let Some(default_backend) = self.default_backend() {
            let supports = {
                let guard = default_backend
                    .lock()
                    .map_err(|_| anyhow!("default backend lock poisoned"))?;
                guard.supports(class)
            };
            if supports {
                return Ok(default_backend);
            }
        }

        for name in self.list() {
            let Some(backend) = self.get(&name) else {
                continue;
            };
            let supports = {
                let guard = backend
                    .lock()
                    .map_err(|_| anyhow!("backend lock poisoned"))?;
                guard.supports(class)
            };
            if supports {
                return Ok(backend);
            }
        }

        Err(anyhow!(
            "no registered backend supports class {}",
            class.as_str()
        ))
    }

    /// Run detection using a backend that supports the requested class.
    pub fn detect_class(
        &self,
        frame: &FrameView<'_>,
        class: RegionClass,
    ) -> Result<Vec<BoundingBox>> {
        let backend = self.backend_for_class(class)?;
        let mut guard = backend
            .lock()
            .map_err(|_| anyhow!("backend lock poisoned"))?;
        guard.detect(frame, class)
    }

    /// Run every backend's warm-up hook.
    pub fn warm_up(&self) -> Result<()> {
        for name in self.list() {
            if let Some(backend) = self.get(&name) {
                let mut guard = backend
                    .lock()
                    .map_err(|_| anyhow!("backend lock poisoned"))?;
                guard.warm_up()?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.backends.keys().collect();
        names.sort();
        f.debug_struct("BackendRegistry")
            .field("backends", &names)
            .field("default_name", &self.default_name)
            .finish()
    }
}

impl Default for BackendRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Infallible front of the registry.
///
/// `detect` never returns an error: any backend failure is logged and
/// replaced by an empty set, and counted in `failures()`.
pub struct RegionDetector {
    registry: BackendRegistry,
    failures: u64,
}

impl RegionDetector {
    /// Build a detector, failing at startup when either class has no backend.
    pub fn new(registry: BackendRegistry) -> Result<Self> {
        for class in [RegionClass::Face, RegionClass::Hand] {
            registry.backend_for_class(class).map_err(init_failure)?;
        }
        registry.warm_up().map_err(init_failure)?;
        Ok(Self {
            registry,
            failures: 0,
        })
    }

    pub fn detect(&mut self, frame: &FrameView<'_>, class: RegionClass) -> Vec<BoundingBox> {
        match self.registry.detect_class(frame, class) {
            Ok(boxes) => boxes,
            Err(e) => {
                self.failures += 1;
                let err = ClipperError::Detection(format!("{e:#}"));
                log::warn!(
                    "frame {}: {} {} (continuing with no {} regions)",
                    frame.index(),
                    class.as_str(),
                    err,
                    class.as_str()
                );
                Vec::new()
            }
        }
    }

    /// Number of detector calls that failed and were replaced by empty sets.
    pub fn failures(&self) -> u64 {
        self.failures
    }

    pub fn backends(&self) -> Vec<String> {
        self.registry.list()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::backends::ScriptedBackend;
    use crate::frame::Frame;

    struct HandOnly;

    impl DetectorBackend for HandOnly {
        fn name(&self) -> &'static str {
            "hand-only"
        }

        fn supports(&self, class: RegionClass) -> bool {
            class == RegionClass::Hand
        }

        fn detect(
            &mut self,
            _frame: &FrameView<'_>,
            _class: RegionClass,
        ) -> Result<Vec<BoundingBox>> {
            Err(anyhow!("malformed frame"))
        }
    }

    #[test]
    fn default_backend_is_preferred_when_it_supports_the_class() -> Result<()> {
        let mut registry = BackendRegistry::new();
        registry.register(ScriptedBackend::new());
        registry.register(HandOnly);

        let backend = registry.backend_for_class(RegionClass::Hand)?;
        let name = backend.lock().map_err(|_| anyhow!("poisoned"))?.name();
        assert_eq!(name, "scripted");

        registry.set_default("hand-only")?;
        let backend = registry.backend_for_class(RegionClass::Face)?;
        let name = backend.lock().map_err(|_| anyhow!("poisoned"))?.name();
        assert_eq!(name, "scripted");
        Ok(())
    }

    #[test]
    fn detector_requires_both_classes() {
        let mut registry = BackendRegistry::new();
        registry.register(HandOnly);
        let err = RegionDetector::new(registry).err().expect("missing face backend");
        let kind = err.downcast_ref::<ClipperError>().expect("clipper error");
        assert!(kind.is_fatal());
    }

    #[test]
    fn backend_errors_become_empty_sets() -> Result<()> {
        let mut registry = BackendRegistry::new();
        registry.register(HandOnly);
        registry.register(ScriptedBackend::new());
        registry.set_default("hand-only")?;
        let mut detector = RegionDetector::new(registry)?;

        let frame = Frame::new(vec![0u8; 12], 2, 2, 1, 30.0);
        assert!(detector.detect(&frame.view(), RegionClass::Hand).is_empty());
        assert!(detector.detect(&frame.view(), RegionClass::Face).is_empty());
        assert_eq!(detector.failures(), 1);
        Ok(())
    }
}
