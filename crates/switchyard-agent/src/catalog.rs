//! The capability catalog: the availability-filtered, categorized view of
//! the registry used for one routing window.
//!
//! A catalog is an immutable snapshot value. Rebuilding produces a new
//! snapshot; readers holding the old `Arc` are never affected mid-build.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::capability::{
    CapabilityCategory, CapabilityDescriptor, CapabilityRegistry, SharedCapability,
};
use crate::probe::ProbeCache;

// ─────────────────────────────────────────────────────────────────────────────
// Catalog
// ─────────────────────────────────────────────────────────────────────────────

/// The filtered, categorized set of capabilities currently usable.
pub struct CapabilityCatalog {
    /// Included capabilities keyed by name.
    capabilities: HashMap<String, SharedCapability>,
    /// Per-category name lists, priority descending.
    by_category: HashMap<CapabilityCategory, Vec<String>>,
    /// All names, priority descending across the whole catalog.
    ordered: Vec<String>,
}

impl CapabilityCatalog {
    /// An empty catalog.
    pub fn empty() -> Self {
        Self {
            capabilities: HashMap::new(),
            by_category: HashMap::new(),
            ordered: Vec::new(),
        }
    }

    /// All included descriptors, priority descending.
    pub fn all(&self) -> Vec<&CapabilityDescriptor> {
        self.ordered
            .iter()
            .filter_map(|name| self.capabilities.get(name).map(|c| c.descriptor()))
            .collect()
    }

    /// Included descriptors in one category, priority descending.
    pub fn by_category(&self, category: CapabilityCategory) -> Vec<&CapabilityDescriptor> {
        self.by_category
            .get(&category)
            .map(|names| {
                names
                    .iter()
                    .filter_map(|name| self.capabilities.get(name).map(|c| c.descriptor()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Get an invokable capability by name.
    pub fn get(&self, name: &str) -> Option<SharedCapability> {
        self.capabilities.get(name).cloned()
    }

    /// Whether a capability is included.
    pub fn contains(&self, name: &str) -> bool {
        self.capabilities.contains_key(name)
    }

    /// Number of included capabilities.
    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    /// Whether the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    /// Whether any capability in the given category is included.
    pub fn has_category(&self, category: CapabilityCategory) -> bool {
        self.by_category
            .get(&category)
            .is_some_and(|names| !names.is_empty())
    }
}

impl std::fmt::Debug for CapabilityCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityCatalog")
            .field("capabilities", &self.ordered)
            .finish()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Builder
// ─────────────────────────────────────────────────────────────────────────────

/// Builds catalog snapshots from a registry and a probe cache.
pub struct CatalogBuilder;

impl CatalogBuilder {
    /// Build a catalog snapshot.
    ///
    /// Every required service id across the registry is deduplicated and
    /// probed once per build. A capability is included iff all its required
    /// services are available. No retries happen here; a failed probe
    /// excludes the capability for this build cycle only.
    pub async fn build(registry: &CapabilityRegistry, probes: &ProbeCache) -> Arc<CapabilityCatalog> {
        let all = registry.all();

        let mut service_ids: Vec<String> = all
            .iter()
            .flat_map(|c| c.descriptor().required_services.iter().cloned())
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        // Deterministic probe order for logs and tests.
        service_ids.sort_unstable();

        let mut availability: HashMap<String, bool> = HashMap::new();
        for service_id in service_ids {
            let available = probes.check(&service_id).await;
            availability.insert(service_id, available);
        }

        let mut included: Vec<SharedCapability> = all
            .into_iter()
            .filter(|c| {
                let descriptor = c.descriptor();
                let usable = descriptor
                    .required_services
                    .iter()
                    .all(|id| availability.get(id.as_str()).copied().unwrap_or(false));
                if !usable {
                    tracing::debug!(
                        capability = %descriptor.name,
                        "Excluded from catalog, backing service unavailable"
                    );
                }
                usable
            })
            .collect();

        // Priority descending, name ascending for deterministic ties.
        included.sort_by(|a, b| {
            b.descriptor()
                .priority
                .cmp(&a.descriptor().priority)
                .then_with(|| a.descriptor().name.cmp(&b.descriptor().name))
        });

        let ordered: Vec<String> = included
            .iter()
            .map(|c| c.descriptor().name.clone())
            .collect();

        let mut by_category: HashMap<CapabilityCategory, Vec<String>> = HashMap::new();
        for capability in &included {
            let descriptor = capability.descriptor();
            by_category
                .entry(descriptor.category)
                .or_default()
                .push(descriptor.name.clone());
        }

        let capabilities: HashMap<String, SharedCapability> = included
            .into_iter()
            .map(|c| (c.descriptor().name.clone(), c))
            .collect();

        tracing::debug!(
            included = capabilities.len(),
            registered = registry.len(),
            "Catalog built"
        );

        Arc::new(CapabilityCatalog {
            capabilities,
            by_category,
            ordered,
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::MockCapability;
    use crate::probe::MockProbe;

    fn descriptor(
        name: &str,
        category: CapabilityCategory,
        services: &[&str],
        priority: i32,
    ) -> CapabilityDescriptor {
        let mut d = CapabilityDescriptor::new(name, format!("{name} capability"), category);
        for s in services {
            d = d.with_service(*s);
        }
        d.with_priority(priority)
    }

    fn registry_of(descriptors: Vec<CapabilityDescriptor>) -> CapabilityRegistry {
        let mut registry = CapabilityRegistry::new();
        for d in descriptors {
            registry.register(MockCapability::new(d));
        }
        registry
    }

    #[tokio::test]
    async fn test_catalog_filters_exactly_by_availability() {
        let registry = registry_of(vec![
            descriptor("doc_search", CapabilityCategory::Documents, &["vector-index"], 0),
            descriptor(
                "bank_lookup",
                CapabilityCategory::ExternalData,
                &["ffiec-api"],
                0,
            ),
            descriptor(
                "filings",
                CapabilityCategory::ExternalData,
                &["ffiec-api", "edgar-api"],
                0,
            ),
        ]);
        let probes = ProbeCache::new(Arc::new(
            MockProbe::new()
                .with_service("vector-index", true)
                .with_service("ffiec-api", true)
                .with_service("edgar-api", false),
        ));

        let catalog = CatalogBuilder::build(&registry, &probes).await;

        assert_eq!(catalog.len(), 2);
        assert!(catalog.contains("doc_search"));
        assert!(catalog.contains("bank_lookup"));
        // One unavailable service excludes the whole capability.
        assert!(!catalog.contains("filings"));
    }

    #[tokio::test]
    async fn test_shared_service_probed_once_per_build() {
        let registry = registry_of(vec![
            descriptor("a", CapabilityCategory::ExternalData, &["shared-api"], 0),
            descriptor("b", CapabilityCategory::ExternalData, &["shared-api"], 0),
            descriptor("c", CapabilityCategory::Web, &["shared-api"], 0),
        ]);
        let probe = Arc::new(MockProbe::new().with_service("shared-api", true));
        let probes = ProbeCache::new(probe.clone());

        let catalog = CatalogBuilder::build(&registry, &probes).await;

        assert_eq!(catalog.len(), 3);
        assert_eq!(probe.check_count(), 1);
    }

    #[tokio::test]
    async fn test_category_grouping_priority_descending() {
        let registry = registry_of(vec![
            descriptor("low", CapabilityCategory::ExternalData, &[], 1),
            descriptor("high", CapabilityCategory::ExternalData, &[], 10),
            descriptor("mid", CapabilityCategory::ExternalData, &[], 5),
            descriptor("docs", CapabilityCategory::Documents, &[], 0),
        ]);
        let probes = ProbeCache::new(Arc::new(MockProbe::new()));

        let catalog = CatalogBuilder::build(&registry, &probes).await;

        let external: Vec<&str> = catalog
            .by_category(CapabilityCategory::ExternalData)
            .iter()
            .map(|d| d.name.as_str())
            .collect();
        assert_eq!(external, vec!["high", "mid", "low"]);

        assert!(catalog.has_category(CapabilityCategory::Documents));
        assert!(!catalog.has_category(CapabilityCategory::Web));
    }

    #[tokio::test]
    async fn test_no_required_services_always_included() {
        let registry = registry_of(vec![descriptor(
            "calculator",
            CapabilityCategory::Computation,
            &[],
            0,
        )]);
        // Probe says nothing is available, but the capability needs nothing.
        let probes = ProbeCache::new(Arc::new(MockProbe::new()));

        let catalog = CatalogBuilder::build(&registry, &probes).await;
        assert!(catalog.contains("calculator"));
    }

    #[tokio::test]
    async fn test_empty_registry_builds_empty_catalog() {
        let registry = CapabilityRegistry::new();
        let probes = ProbeCache::new(Arc::new(MockProbe::new()));

        let catalog = CatalogBuilder::build(&registry, &probes).await;
        assert!(catalog.is_empty());
        assert_eq!(catalog.all().len(), 0);
    }

    #[tokio::test]
    async fn test_rebuild_reflects_changed_availability() {
        let registry = registry_of(vec![descriptor(
            "doc_search",
            CapabilityCategory::Documents,
            &["vector-index"],
            0,
        )]);
        let probe = Arc::new(MockProbe::new().with_service("vector-index", false));
        let probes = ProbeCache::new(probe.clone());

        let first = CatalogBuilder::build(&registry, &probes).await;
        assert!(first.is_empty());

        probe.set_service("vector-index", true);
        probes.clear();

        let second = CatalogBuilder::build(&registry, &probes).await;
        assert!(second.contains("doc_search"));
        // The first snapshot is unaffected by the rebuild.
        assert!(first.is_empty());
    }
}
