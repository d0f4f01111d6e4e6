//! Collector Registry: lookup by name and by capability, with
//! register/enable/disable mutation confined to process startup (spec §5:
//! "Collector Registry, populated at startup, read-only afterward").

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::domain::Capability;

use super::Collector;

struct Entry {
    collector: Arc<dyn Collector>,
    enabled: bool,
    priority: i32,
}

#[derive(Default)]
pub struct CollectorRegistry {
    entries: RwLock<HashMap<String, Entry>>,
}

impl CollectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, collector: Arc<dyn Collector>, priority: i32) {
        let name = collector.name().to_string();
        self.entries.write().insert(name, Entry { collector, enabled: true, priority });
    }

    pub fn set_enabled(&self, name: &str, enabled: bool) -> bool {
        let mut entries = self.entries.write();
        match entries.get_mut(name) {
            Some(entry) => {
                entry.enabled = enabled;
                true
            }
            None => false,
        }
    }

    pub fn by_name(&self, name: &str) -> Option<Arc<dyn Collector>> {
        let entries = self.entries.read();
        entries.get(name).filter(|e| e.enabled).map(|e| e.collector.clone())
    }

    /// Collectors advertising `capability`, in priority order (highest
    /// first). Disabled collectors are invisible (spec §4.1).
    pub fn by_capability(&self, capability: Capability) -> Vec<Arc<dyn Collector>> {
        let entries = self.entries.read();
        let mut matches: Vec<(i32, Arc<dyn Collector>)> = entries
            .values()
            .filter(|e| e.enabled && e.collector.capabilities().contains(&capability))
            .map(|e| (e.priority, e.collector.clone()))
            .collect();
        matches.sort_by(|a, b| b.0.cmp(&a.0));
        matches.into_iter().map(|(_, c)| c).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A snapshot of every registered collector, for the admin listing
    /// endpoint (spec §6).
    pub fn list(&self) -> Vec<CollectorSummary> {
        self.entries
            .read()
            .values()
            .map(|e| CollectorSummary {
                name: e.collector.name().to_string(),
                capabilities: e.collector.capabilities().to_vec(),
                enabled: e.enabled,
                priority: e.priority,
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct CollectorSummary {
    pub name: String,
    pub capabilities: Vec<Capability>,
    pub enabled: bool,
    pub priority: i32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::heuristic::HeuristicFallbackCollector;
    use crate::collectors::web::WebProbeCollector;

    #[test]
    fn disabled_collector_is_invisible_to_capability_lookup() {
        let registry = CollectorRegistry::new();
        let web = Arc::new(WebProbeCollector::new(reqwest::Client::new()));
        registry.register(web.clone(), 10);
        registry.register(Arc::new(HeuristicFallbackCollector::new()), 0);

        assert_eq!(registry.by_capability(Capability::Web).len(), 1);
        registry.set_enabled(web.name(), false);
        assert_eq!(registry.by_capability(Capability::Web).len(), 0);
    }

    #[test]
    fn capability_lookup_orders_by_priority() {
        let registry = CollectorRegistry::new();
        registry.register(Arc::new(WebProbeCollector::new(reqwest::Client::new())), 10);
        registry.register(Arc::new(HeuristicFallbackCollector::new()), 0);

        let matches = registry.by_capability(Capability::Web);
        assert_eq!(matches[0].name(), "web-probe");
        assert_eq!(matches[1].name(), "heuristic-fallback");
    }
}
