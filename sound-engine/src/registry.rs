//! The named map of logical sources.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::math::Listener;
use crate::source::Source;

/// `sourcename -> Source`. The dispatcher worker takes the write side;
/// facade queries take the read side.
#[derive(Default)]
pub struct SourceRegistry {
    sources: RwLock<HashMap<String, Arc<Source>>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, source: Arc<Source>) -> Option<Arc<Source>> {
        self.sources
            .write()
            .insert(source.name().to_string(), source)
    }

    pub fn get(&self, name: &str) -> Option<Arc<Source>> {
        self.sources.read().get(name).cloned()
    }

    pub fn remove(&self, name: &str) -> Option<Arc<Source>> {
        self.sources.write().remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.sources.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.sources.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.read().is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.sources.read().keys().cloned().collect()
    }

    /// Cheap snapshot of all sources; callers lock bodies one at a time.
    pub fn snapshot(&self) -> Vec<Arc<Source>> {
        self.sources.read().values().cloned().collect()
    }

    /// Recompute gain and pan of every source against a moved listener.
    pub fn notify_listener_moved(&self, listener: &Listener, master_gain: f32) {
        for source in self.snapshot() {
            source.lock().recompute(listener, master_gain);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::{Attenuation, Vec3};
    use crate::source::SourceDesc;

    fn registry_with(names: &[&str]) -> SourceRegistry {
        let registry = SourceRegistry::new();
        for name in names {
            registry.insert(Arc::new(Source::new(
                SourceDesc::new(*name, "a.wav").position(Vec3::new(100.0, 0.0, 0.0)),
                Attenuation::Linear,
                200.0,
            )));
        }
        registry
    }

    #[test]
    fn insert_get_remove() {
        let registry = registry_with(&["a", "b"]);
        assert_eq!(registry.len(), 2);
        assert!(registry.get("a").is_some());
        assert!(registry.remove("a").is_some());
        assert!(registry.get("a").is_none());
        assert!(registry.remove("a").is_none());
    }

    #[test]
    fn one_source_per_name() {
        let registry = registry_with(&["a"]);
        let replaced = registry.insert(Arc::new(Source::new(
            SourceDesc::new("a", "other.wav"),
            Attenuation::None,
            0.0,
        )));
        assert!(replaced.is_some());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("a").unwrap().file(), "other.wav");
    }

    #[test]
    fn listener_move_recomputes_all() {
        let registry = registry_with(&["a", "b"]);
        let mut listener = Listener::new();
        registry.notify_listener_moved(&listener, 1.0);
        let far = registry.get("a").unwrap().lock().computed_gain;

        listener.set_position(Vec3::new(100.0, 0.0, 0.0));
        registry.notify_listener_moved(&listener, 1.0);
        let near = registry.get("a").unwrap().lock().computed_gain;
        assert!(near > far);
        assert_eq!(near, 1.0);
    }
}
